//! Owned process HANDLE shared by the native and kernel-assisted paths

use super::bindings::kernel32;
use tracing::debug;
use winapi::um::winnt::HANDLE;

/// Closes the wrapped HANDLE on drop
pub struct OwnedHandle {
    handle: HANDLE,
    pid: u32,
}

impl OwnedHandle {
    /// Open a process with the given access rights
    pub fn open(pid: u32, access: u32) -> crate::core::types::MemoryResult<Self> {
        let handle = kernel32::open_process(pid, access)?;
        Ok(OwnedHandle { handle, pid })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Get the raw handle
    pub fn raw(&self) -> HANDLE {
        self.handle
    }
}

impl Drop for OwnedHandle {
    fn drop(&mut self) {
        if let Err(e) = unsafe { kernel32::close_handle(self.handle) } {
            debug!("Closing handle of process {} failed: {}", self.pid, e);
        }
    }
}

// HANDLEs are process-wide values; the OS serialises access to the object
unsafe impl Send for OwnedHandle {}
unsafe impl Sync for OwnedHandle {}
