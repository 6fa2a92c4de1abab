//! Windows API bindings
//!
//! Thin `unsafe` wrappers over the system libraries; the backends in
//! [`super::backend`] are the only callers.

pub mod kernel32;
pub mod ntdll;
pub mod psapi;
