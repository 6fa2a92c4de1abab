//! Client-side memory: buffers, the read cache, regions and the scanner
//!
//! - [`MemoryBuffer`] holds one contiguous remote range and answers typed
//!   reads without further I/O
//! - [`RegionCache`] de-duplicates reads within one evaluation pass
//! - [`regions`] describes and filters the target's address space
//! - [`Scanner`] searches that address space for values

pub mod buffer;
pub mod cache;
pub mod regions;
pub mod scanner;

pub use buffer::{MemoryBuffer, Scalar};
pub use cache::RegionCache;
pub use regions::{MemoryRegion, Protection, RegionFilter, RegionType, SettingState};
pub use scanner::{CancellationToken, ScanSettings, ScanState, Scanner};
