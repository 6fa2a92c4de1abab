//! Core type definitions
//!
//! Address wrapper, typed memory values, module information, scan results
//! and the shared error type.

mod address;
mod error;
mod process_info;
mod scan_result;
mod value;

// Re-export all public types
pub use address::{parse_u64, Address};
pub use error::{MemoryError, MemoryResult};
pub use process_info::{ModuleInfo, ProcessArchitecture};
pub use scan_result::{ScanCompareType, ScanResult, ScanResultSet};
pub use value::{MemoryValue, ValueType};

// Common type aliases
pub type ProcessId = u32;
