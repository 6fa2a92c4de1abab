//! Platform abstraction over a foreign address space

use crate::core::types::{Address, MemoryResult, ModuleInfo, ProcessArchitecture};
use crate::memory::regions::MemoryRegion;

/// One way of reaching a target process's memory.
///
/// Implementations report the number of bytes the OS actually transferred;
/// deciding whether a short transfer is acceptable is up to the caller
/// ([`ProcessHandle`](super::ProcessHandle) treats it as failure). Reads
/// must not mutate any state shared between callers.
pub trait MemoryBackend: Send + Sync {
    /// Short name used in log output
    fn name(&self) -> &'static str;

    /// Reads into `buffer`, returning the number of bytes transferred
    fn read_into(&self, address: Address, buffer: &mut [u8]) -> MemoryResult<usize>;

    /// Writes `data`, returning the number of bytes transferred
    fn write_from(&self, address: Address, data: &[u8]) -> MemoryResult<usize>;

    /// Enumerates committed regions of the address space
    fn regions(&self) -> MemoryResult<Vec<MemoryRegion>>;

    /// Enumerates loaded modules
    fn modules(&self) -> MemoryResult<Vec<ModuleInfo>>;

    /// Architecture of the target, which fixes its pointer width
    fn architecture(&self) -> ProcessArchitecture;
}
