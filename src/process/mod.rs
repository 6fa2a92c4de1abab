//! Access to a foreign process's address space
//!
//! A [`ProcessHandle`] wraps one or two [`MemoryBackend`]s: the OS-native
//! process-memory API and, where the platform has one, a kernel-assisted
//! path used when the native API is blocked. [`SnapshotBackend`] stands in
//! for a live process when working from captured memory.

pub mod backend;
pub mod handle;
#[cfg(target_os = "linux")]
pub mod procfs;
pub mod snapshot;

pub use backend::MemoryBackend;
pub use handle::{AccessMode, ProcessHandle};
#[cfg(target_os = "linux")]
pub use procfs::ProcfsBackend;
pub use snapshot::SnapshotBackend;
