//! Windows backends: Win32 process-memory API and the NT system-call path

use super::bindings::{kernel32, ntdll, psapi};
use super::handle::OwnedHandle;
use crate::core::types::{
    Address, MemoryError, MemoryResult, ModuleInfo, ProcessArchitecture, ProcessId,
};
use crate::memory::regions::{MemoryRegion, Protection, RegionType};
use crate::process::MemoryBackend;
use std::sync::Arc;
use tracing::{debug, warn};
use winapi::um::winnt::{
    HANDLE, MEM_COMMIT, MEM_IMAGE, MEM_MAPPED, PROCESS_QUERY_INFORMATION, PROCESS_VM_OPERATION,
    PROCESS_VM_READ, PROCESS_VM_WRITE,
};

const READ_WRITE_ACCESS: u32 =
    PROCESS_QUERY_INFORMATION | PROCESS_VM_READ | PROCESS_VM_WRITE | PROCESS_VM_OPERATION;
const READ_ACCESS: u32 = PROCESS_QUERY_INFORMATION | PROCESS_VM_READ;

/// `ReadProcessMemory` / `WriteProcessMemory` over an opened process handle
pub struct WinApiBackend {
    handle: Arc<OwnedHandle>,
    architecture: ProcessArchitecture,
}

/// `NtReadVirtualMemory` / `NtWriteVirtualMemory` over the same handle
pub struct NtBackend {
    handle: Arc<OwnedHandle>,
    architecture: ProcessArchitecture,
}

impl WinApiBackend {
    /// Opens the process read-write, falling back to read-only access
    pub fn open(pid: ProcessId) -> MemoryResult<Self> {
        let handle = match OwnedHandle::open(pid, READ_WRITE_ACCESS) {
            Ok(handle) => handle,
            Err(MemoryError::AccessDenied { .. }) => {
                debug!("Read-write access to {} denied, opening read-only", pid);
                OwnedHandle::open(pid, READ_ACCESS)?
            }
            Err(e) => return Err(e),
        };

        let architecture = query_architecture(handle.raw());
        Ok(WinApiBackend {
            handle: Arc::new(handle),
            architecture,
        })
    }

    /// The system-call path sharing this backend's handle
    pub fn kernel_path(&self) -> NtBackend {
        NtBackend {
            handle: Arc::clone(&self.handle),
            architecture: self.architecture,
        }
    }
}

fn query_architecture(handle: HANDLE) -> ProcessArchitecture {
    match unsafe { ntdll::is_wow64_process(handle) } {
        Ok(true) => ProcessArchitecture::X86,
        Ok(false) if cfg!(target_pointer_width = "64") => ProcessArchitecture::X64,
        Ok(false) => ProcessArchitecture::X86,
        Err(e) => {
            warn!("Could not determine target architecture: {}", e);
            ProcessArchitecture::Unknown
        }
    }
}

/// Walks the address space with VirtualQueryEx, keeping committed regions
fn query_regions(handle: HANDLE) -> Vec<MemoryRegion> {
    let mut regions = Vec::new();
    let mut address = 0u64;

    while let Some(mbi) = unsafe { kernel32::virtual_query_ex(handle, address) } {
        let base = mbi.BaseAddress as u64;
        let size = mbi.RegionSize as u64;

        if mbi.State == MEM_COMMIT {
            let region_type = match mbi.Type {
                MEM_IMAGE => RegionType::Image,
                MEM_MAPPED => RegionType::Mapped,
                _ => RegionType::Private,
            };
            regions.push(MemoryRegion::new(
                Address::new(base),
                size,
                Protection::from_page_flags(mbi.Protect),
                region_type,
            ));
        }

        match base.checked_add(size) {
            Some(next) if next > address => address = next,
            _ => break,
        }
    }

    regions
}

fn query_modules(handle: HANDLE) -> MemoryResult<Vec<ModuleInfo>> {
    let mut modules = Vec::new();
    for hmodule in unsafe { psapi::enum_process_modules(handle)? } {
        let info = unsafe { psapi::get_module_information(handle, hmodule)? };
        let name = unsafe { psapi::get_module_base_name(handle, hmodule)? };

        let mut module = ModuleInfo::new(
            name,
            Address::new(info.lpBaseOfDll as u64),
            info.SizeOfImage as u64,
        );
        if let Ok(path) = unsafe { psapi::get_module_file_name(handle, hmodule) } {
            module.path = path;
        }
        modules.push(module);
    }
    Ok(modules)
}

impl MemoryBackend for WinApiBackend {
    fn name(&self) -> &'static str {
        "winapi"
    }

    fn read_into(&self, address: Address, buffer: &mut [u8]) -> MemoryResult<usize> {
        unsafe { kernel32::read_process_memory(self.handle.raw(), address, buffer) }
    }

    fn write_from(&self, address: Address, data: &[u8]) -> MemoryResult<usize> {
        unsafe { kernel32::write_process_memory(self.handle.raw(), address, data) }
    }

    fn regions(&self) -> MemoryResult<Vec<MemoryRegion>> {
        Ok(query_regions(self.handle.raw()))
    }

    fn modules(&self) -> MemoryResult<Vec<ModuleInfo>> {
        query_modules(self.handle.raw())
    }

    fn architecture(&self) -> ProcessArchitecture {
        self.architecture
    }
}

impl MemoryBackend for NtBackend {
    fn name(&self) -> &'static str {
        "ntdll"
    }

    fn read_into(&self, address: Address, buffer: &mut [u8]) -> MemoryResult<usize> {
        unsafe { ntdll::read_virtual_memory(self.handle.raw(), address, buffer) }
    }

    fn write_from(&self, address: Address, data: &[u8]) -> MemoryResult<usize> {
        unsafe { ntdll::write_virtual_memory(self.handle.raw(), address, data) }
    }

    fn regions(&self) -> MemoryResult<Vec<MemoryRegion>> {
        Ok(query_regions(self.handle.raw()))
    }

    fn modules(&self) -> MemoryResult<Vec<ModuleInfo>> {
        query_modules(self.handle.raw())
    }

    fn architecture(&self) -> ProcessArchitecture {
        self.architecture
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg_attr(miri, ignore = "FFI not supported in Miri")]
    fn test_open_current_process() {
        let backend = WinApiBackend::open(std::process::id()).unwrap();
        let value = 0x5151_u32;
        let mut buffer = [0u8; 4];
        let address = Address::new(&value as *const u32 as u64);

        assert_eq!(backend.read_into(address, &mut buffer).unwrap(), 4);
        assert_eq!(u32::from_le_bytes(buffer), value);

        let kernel = backend.kernel_path();
        buffer = [0; 4];
        assert_eq!(kernel.read_into(address, &mut buffer).unwrap(), 4);
        assert_eq!(u32::from_le_bytes(buffer), value);

        assert!(!backend.regions().unwrap().is_empty());
        assert!(!backend.modules().unwrap().is_empty());
    }

    #[test]
    #[cfg_attr(miri, ignore = "FFI not supported in Miri")]
    fn test_open_invalid_process() {
        assert!(WinApiBackend::open(0).is_err());
    }
}
