//! Core module containing fundamental types
//!
//! This module provides the foundational building blocks used throughout
//! the crate: address handling, memory values, module information and
//! error types.

pub mod types;

// Re-export commonly used types for convenience
pub use types::{
    Address, MemoryError, MemoryResult, MemoryValue, ModuleInfo, ProcessArchitecture, ScanResult,
    ValueType,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const AUTHORS: &str = env!("CARGO_PKG_AUTHORS");
