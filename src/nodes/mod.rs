//! Typed node model
//!
//! A [`Project`] owns classes; each [`ClassNode`] is an ordered list of
//! [`Node`]s whose [`NodeKind`] says how to interpret its bytes. Classes
//! reference each other by [`ClassId`], either through pointers (which
//! may form cycles) or by embedding (which may not).
//!
//! Sizes depend on the target's pointer width, which every size query
//! takes explicitly.

mod bitfield;
mod class;
mod evaluator;
mod kind;
mod layout;
mod project;
mod value;

pub use bitfield::{BitField, BitMember};
pub use class::ClassNode;
pub use evaluator::{EvaluatedNode, Evaluator};
pub use kind::{ClassId, Node, NodeKind, VMethod};
pub use layout::{ClassLayout, HotSpot, NodeLayout, SubField};
pub use project::Project;
pub use value::{encode_text, read_value, write_value_text, NodeValue};
