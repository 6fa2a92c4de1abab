//! Binding formulas to a live target

use crate::core::types::{Address, MemoryResult};
use crate::process::ProcessHandle;
use tracing::debug;

/// What a formula needs from a target to be evaluated
pub trait AddressResolver {
    /// Base address of a loaded module, `UnresolvedModule` if absent
    fn module_base(&self, name: &str) -> MemoryResult<Address>;

    /// Reads a pointer-width value at `address`
    fn read_pointer(&self, address: Address) -> MemoryResult<Address>;

    /// Pointer width of the target in bytes
    fn pointer_size(&self) -> usize;
}

impl AddressResolver for ProcessHandle {
    fn module_base(&self, name: &str) -> MemoryResult<Address> {
        let module = self.find_module(name)?;
        debug!("Module {} is at {}", module.name, module.base_address);
        Ok(module.base_address)
    }

    fn read_pointer(&self, address: Address) -> MemoryResult<Address> {
        ProcessHandle::read_pointer(self, address)
    }

    fn pointer_size(&self) -> usize {
        ProcessHandle::pointer_size(self)
    }
}
