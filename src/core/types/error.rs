//! Error types shared by the accessor, buffer, node and scanner layers

use std::fmt;
use thiserror::Error;

/// Main error type for memory and node operations
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Process unavailable: {0}")]
    ProcessUnavailable(String),

    #[error("Process not found: {0}")]
    ProcessNotFound(String),

    #[error("Access denied to process {pid}: {reason}")]
    AccessDenied { pid: u32, reason: String },

    #[error("Failed to read memory at {address}: {reason}")]
    ReadFault { address: String, reason: String },

    #[error("Failed to write memory at {address}: {reason}")]
    WriteFault { address: String, reason: String },

    #[error("Out of bounds: {offset}+{size} exceeds buffer of {len} bytes")]
    OutOfBounds {
        offset: usize,
        size: usize,
        len: usize,
    },

    #[error("Cannot parse '{input}': {reason}")]
    ParseError { input: String, reason: String },

    #[error("Module not found: {0}")]
    UnresolvedModule(String),

    #[error("Cycle detected: {0}")]
    CycleDetected(String),

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Missing attribute '{attribute}' on <{element}>")]
    MissingAttribute { element: String, attribute: String },

    #[error("Invalid memory address: {0}")]
    InvalidAddress(String),

    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    #[error("Class not found: {0}")]
    ClassNotFound(String),

    #[error("Class name already in use: {0}")]
    DuplicateClassName(String),

    #[error("Class {0} is still referenced by other nodes")]
    ClassInUse(String),

    #[error("Invalid node: {0}")]
    InvalidNode(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Import failed: {0}")]
    ImportFailed(String),

    #[cfg(windows)]
    #[error("Windows API error: {0}")]
    WindowsApiError(#[from] windows::core::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type MemoryResult<T> = Result<T, MemoryError>;

impl MemoryError {
    pub fn access_denied(pid: u32, reason: impl Into<String>) -> Self {
        MemoryError::AccessDenied {
            pid,
            reason: reason.into(),
        }
    }

    /// `address` is rendered with its `Display` impl
    pub fn read_fault(address: impl fmt::Display, reason: impl Into<String>) -> Self {
        MemoryError::ReadFault {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    pub fn write_fault(address: impl fmt::Display, reason: impl Into<String>) -> Self {
        MemoryError::WriteFault {
            address: address.to_string(),
            reason: reason.into(),
        }
    }

    pub fn out_of_bounds(offset: usize, size: usize, len: usize) -> Self {
        MemoryError::OutOfBounds { offset, size, len }
    }

    pub fn parse_error(input: impl Into<String>, reason: impl Into<String>) -> Self {
        MemoryError::ParseError {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Creates a cycle error naming the offending containment
    pub fn cycle_detected(owner: &str, candidate: &str) -> Self {
        MemoryError::CycleDetected(format!("{} would contain {} by value", owner, candidate))
    }

    pub fn missing_attribute(element: impl Into<String>, attribute: impl Into<String>) -> Self {
        MemoryError::MissingAttribute {
            element: element.into(),
            attribute: attribute.into(),
        }
    }
}
