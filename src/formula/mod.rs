//! Address formulas
//!
//! A formula such as `[<game.exe> + 0x10] + 0x4` names a class instance's
//! base address symbolically. Terms are literal hex offsets, `<module>`
//! base addresses and `[...]` pointer dereferences, joined by `+` or `-`.

mod ast;
mod lexer;
mod normalize;
mod parser;
mod resolve;

pub use ast::{Formula, Sign, Term};
pub use normalize::normalize_legacy;
pub use parser::parse;
pub use resolve::AddressResolver;
