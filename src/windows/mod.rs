//! Windows API layer for process memory access
//!
//! All unsafe FFI calls are contained within this module. The native path
//! goes through kernel32/psapi, the fallback issues the NT system calls
//! directly on the same process handle.

pub mod backend;
pub mod bindings;
pub mod handle;

pub use backend::{NtBackend, WinApiBackend};
pub use handle::OwnedHandle;
