//! Default configuration values

use crate::process::AccessMode;

pub const ACCESS_MODE: AccessMode = AccessMode::Auto;

/// Scanner threads never exceed this, whatever the core count
pub const MAX_SCAN_THREADS: usize = 8;
pub const CHUNK_SIZE: usize = 64 * 1024;
pub const FAST_SCAN_ALIGNMENT: usize = 4;

pub const MAX_READ_SIZE: usize = 10 * 1024 * 1024;
pub const CACHE_ENTRIES: usize = 64;
pub const MAX_POINTER_DEPTH: usize = 8;

pub const LOG_LEVEL: &str = "info";

/// Scanner threads for this host
pub fn scan_threads() -> usize {
    num_cpus::get().clamp(1, MAX_SCAN_THREADS)
}
