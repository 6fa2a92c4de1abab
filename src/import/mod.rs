//! Import of class definitions written by other tools

pub mod legacy;
mod report;
mod tables;

pub use legacy::{import_file, import_str};
pub use report::{Diagnostic, ImportReport, Level};
pub use tables::{LegacyType, LegacyVersion, TYPES_2013, TYPES_2016};
