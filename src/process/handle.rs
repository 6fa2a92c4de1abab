//! Attached-process handle with primary and fallback access paths

use super::backend::MemoryBackend;
use crate::core::types::{
    Address, MemoryError, MemoryResult, ModuleInfo, ProcessArchitecture, ProcessId,
};
use crate::memory::regions::MemoryRegion;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info};

/// Which access path a handle uses for reads and writes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// Native API first, kernel-assisted path when the native one fails
    #[default]
    Auto,
    /// Native process-memory API only
    Native,
    /// Kernel-assisted path only
    Kernel,
}

impl FromStr for AccessMode {
    type Err = MemoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(AccessMode::Auto),
            "native" => Ok(AccessMode::Native),
            "kernel" => Ok(AccessMode::Kernel),
            _ => Err(MemoryError::parse_error(s, "expected auto, native or kernel")),
        }
    }
}

struct Backends {
    primary: Box<dyn MemoryBackend>,
    fallback: Option<Box<dyn MemoryBackend>>,
}

/// Handle to one attached process.
///
/// Reads share the internal lock and may run concurrently; writes and
/// [`detach`](ProcessHandle::detach) take it exclusively, so a detach never
/// races an in-flight read. Every transfer must move exactly the requested
/// number of bytes, short transfers are reported as faults.
pub struct ProcessHandle {
    pid: ProcessId,
    mode: AccessMode,
    architecture: ProcessArchitecture,
    backends: RwLock<Option<Backends>>,
}

impl ProcessHandle {
    /// Attach to a process using the platform's native backends
    pub fn attach(pid: ProcessId) -> MemoryResult<Self> {
        Self::attach_with_mode(pid, AccessMode::Auto)
    }

    /// Attach to a process, choosing the access path
    pub fn attach_with_mode(pid: ProcessId, mode: AccessMode) -> MemoryResult<Self> {
        let (primary, fallback) = platform_backends(pid)?;
        let handle = Self::from_backends(pid, primary, fallback, mode);
        info!(
            "Attached to process {} ({:?}, {:?})",
            pid, handle.architecture, mode
        );
        Ok(handle)
    }

    /// Build a handle over explicit backends
    pub fn from_backends(
        pid: ProcessId,
        primary: Box<dyn MemoryBackend>,
        fallback: Option<Box<dyn MemoryBackend>>,
        mode: AccessMode,
    ) -> Self {
        ProcessHandle {
            pid,
            mode,
            architecture: primary.architecture(),
            backends: RwLock::new(Some(Backends { primary, fallback })),
        }
    }

    pub fn pid(&self) -> ProcessId {
        self.pid
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Architecture of the target, read from the process at attach time
    pub fn architecture(&self) -> ProcessArchitecture {
        self.architecture
    }

    /// Width of a pointer in the target process
    pub fn pointer_size(&self) -> usize {
        self.architecture.pointer_size()
    }

    pub fn is_attached(&self) -> bool {
        self.backends.read().map(|b| b.is_some()).unwrap_or(false)
    }

    /// Release the OS handles. Later operations fail with `ProcessUnavailable`.
    pub fn detach(&self) -> MemoryResult<()> {
        let mut backends = self.backends.write().map_err(|_| self.lock_poisoned())?;
        if backends.take().is_some() {
            info!("Detached from process {}", self.pid);
        }
        Ok(())
    }

    /// Reads `size` bytes at `address` into `buffer[offset..offset + size]`.
    ///
    /// `offset` positions the data inside the destination buffer; the
    /// source address is used as given.
    pub fn read(
        &self,
        address: Address,
        buffer: &mut [u8],
        offset: usize,
        size: usize,
    ) -> MemoryResult<()> {
        if size == 0 {
            return Err(MemoryError::read_fault(address, "zero-sized read"));
        }
        let end = offset
            .checked_add(size)
            .filter(|&end| end <= buffer.len())
            .ok_or_else(|| MemoryError::out_of_bounds(offset, size, buffer.len()))?;
        let target = &mut buffer[offset..end];

        let guard = self.lock_read()?;
        self.dispatch(&guard, |backend| {
            let read = backend.read_into(address, target)?;
            if read != size {
                return Err(MemoryError::read_fault(
                    address,
                    format!("partial read of {} / {} bytes", read, size),
                ));
            }
            Ok(())
        })
    }

    /// Reads `size` bytes into a fresh vector
    pub fn read_bytes(&self, address: Address, size: usize) -> MemoryResult<Vec<u8>> {
        let mut buffer = vec![0u8; size];
        self.read(address, &mut buffer, 0, size)?;
        Ok(buffer)
    }

    /// Reads a target-width pointer
    pub fn read_pointer(&self, address: Address) -> MemoryResult<Address> {
        let mut raw = [0u8; 8];
        let width = self.pointer_size();
        self.read(address, &mut raw, 0, width)?;
        Ok(Address::new(u64::from_le_bytes(raw)))
    }

    /// Writes all of `data` at `address`
    pub fn write(&self, address: Address, data: &[u8]) -> MemoryResult<()> {
        if data.is_empty() {
            return Err(MemoryError::write_fault(address, "zero-sized write"));
        }

        let guard = self
            .backends
            .write()
            .map_err(|_| self.lock_poisoned())?;
        let backends = guard
            .as_ref()
            .ok_or_else(|| self.detached())?;

        self.select(backends, |backend| {
            let written = backend.write_from(address, data)?;
            if written != data.len() {
                return Err(MemoryError::write_fault(
                    address,
                    format!("partial write of {} / {} bytes", written, data.len()),
                ));
            }
            debug!("Wrote {} bytes at {} via {}", written, address, backend.name());
            Ok(())
        })
    }

    /// Enumerates the target's memory regions
    pub fn regions(&self) -> MemoryResult<Vec<MemoryRegion>> {
        let guard = self.lock_read()?;
        self.dispatch(&guard, |backend| backend.regions())
    }

    /// Enumerates the target's loaded modules
    pub fn modules(&self) -> MemoryResult<Vec<ModuleInfo>> {
        let guard = self.lock_read()?;
        self.dispatch(&guard, |backend| backend.modules())
    }

    /// Finds a module by name, ignoring case
    pub fn find_module(&self, name: &str) -> MemoryResult<ModuleInfo> {
        self.modules()?
            .into_iter()
            .find(|module| module.matches_name(name))
            .ok_or_else(|| MemoryError::UnresolvedModule(name.to_string()))
    }

    fn lock_read(&self) -> MemoryResult<RwLockReadGuard<'_, Option<Backends>>> {
        self.backends.read().map_err(|_| self.lock_poisoned())
    }

    fn dispatch<T, F>(&self, guard: &Option<Backends>, op: F) -> MemoryResult<T>
    where
        F: FnMut(&dyn MemoryBackend) -> MemoryResult<T>,
    {
        let backends = guard.as_ref().ok_or_else(|| self.detached())?;
        self.select(backends, op)
    }

    fn select<T, F>(&self, backends: &Backends, mut op: F) -> MemoryResult<T>
    where
        F: FnMut(&dyn MemoryBackend) -> MemoryResult<T>,
    {
        match self.mode {
            AccessMode::Native => op(backends.primary.as_ref()),
            AccessMode::Kernel => match backends.fallback.as_deref() {
                Some(fallback) => op(fallback),
                None => Err(MemoryError::UnsupportedOperation(
                    "no kernel-assisted access path for this target".to_string(),
                )),
            },
            AccessMode::Auto => match op(backends.primary.as_ref()) {
                Ok(value) => Ok(value),
                Err(primary_error) => match backends.fallback.as_deref() {
                    Some(fallback) => {
                        debug!(
                            "{} failed ({}), retrying via {}",
                            backends.primary.name(),
                            primary_error,
                            fallback.name()
                        );
                        op(fallback)
                    }
                    None => Err(primary_error),
                },
            },
        }
    }

    fn detached(&self) -> MemoryError {
        MemoryError::ProcessUnavailable(format!("process {} is detached", self.pid))
    }

    fn lock_poisoned(&self) -> MemoryError {
        MemoryError::ProcessUnavailable(format!("handle lock for process {} poisoned", self.pid))
    }
}

#[cfg(target_os = "linux")]
fn platform_backends(
    pid: ProcessId,
) -> MemoryResult<(Box<dyn MemoryBackend>, Option<Box<dyn MemoryBackend>>)> {
    let primary = super::procfs::ProcfsBackend::open(pid)?;
    Ok((Box::new(primary), None))
}

#[cfg(windows)]
fn platform_backends(
    pid: ProcessId,
) -> MemoryResult<(Box<dyn MemoryBackend>, Option<Box<dyn MemoryBackend>>)> {
    let primary = crate::windows::WinApiBackend::open(pid)?;
    let fallback = primary.kernel_path();
    Ok((Box::new(primary), Some(Box::new(fallback))))
}

#[cfg(not(any(target_os = "linux", windows)))]
fn platform_backends(
    pid: ProcessId,
) -> MemoryResult<(Box<dyn MemoryBackend>, Option<Box<dyn MemoryBackend>>)> {
    Err(MemoryError::UnsupportedOperation(format!(
        "attaching to process {} is not supported on this platform",
        pid
    )))
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("pid", &self.pid)
            .field("mode", &self.mode)
            .field("architecture", &self.architecture)
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl fmt::Display for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ProcessHandle(pid={}, attached={})",
            self.pid,
            self.is_attached()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::regions::{Protection, RegionType};
    use crate::process::SnapshotBackend;

    fn snapshot() -> SnapshotBackend {
        let snapshot = SnapshotBackend::new(ProcessArchitecture::X64);
        snapshot
            .map(
                Address::new(0x1000),
                (0u8..32).collect(),
                Protection::READ_WRITE,
                RegionType::Private,
            )
            .unwrap();
        snapshot
            .add_module("game.exe", Address::new(0x40_0000), 0x100)
            .unwrap();
        snapshot
    }

    fn handle(mode: AccessMode) -> (SnapshotBackend, ProcessHandle) {
        let image = snapshot();
        let handle = ProcessHandle::from_backends(
            42,
            Box::new(image.denying()),
            Some(Box::new(image.clone())),
            mode,
        );
        (image, handle)
    }

    #[test]
    fn test_offset_applies_to_destination() {
        let (_, handle) = handle(AccessMode::Auto);
        let mut buffer = [0xFFu8; 8];
        handle.read(Address::new(0x1004), &mut buffer, 2, 4).unwrap();
        assert_eq!(buffer, [0xFF, 0xFF, 4, 5, 6, 7, 0xFF, 0xFF]);
    }

    #[test]
    fn test_read_bounds_checked_against_destination() {
        let (_, handle) = handle(AccessMode::Auto);
        let mut buffer = [0u8; 4];
        assert!(matches!(
            handle.read(Address::new(0x1000), &mut buffer, 2, 4),
            Err(MemoryError::OutOfBounds { .. })
        ));
        assert!(matches!(
            handle.read(Address::new(0x1000), &mut buffer, 0, 0),
            Err(MemoryError::ReadFault { .. })
        ));
    }

    #[test]
    fn test_partial_read_is_a_fault() {
        let (_, handle) = handle(AccessMode::Auto);
        // The mapping ends at 0x1020.
        assert!(matches!(
            handle.read_bytes(Address::new(0x101C), 8),
            Err(MemoryError::ReadFault { .. })
        ));
    }

    #[test]
    fn test_access_modes() {
        let (_, auto) = handle(AccessMode::Auto);
        assert_eq!(auto.read_bytes(Address::new(0x1000), 2).unwrap(), vec![0, 1]);

        let (_, native) = handle(AccessMode::Native);
        assert!(matches!(
            native.read_bytes(Address::new(0x1000), 2),
            Err(MemoryError::AccessDenied { .. })
        ));

        let (_, kernel) = handle(AccessMode::Kernel);
        assert_eq!(kernel.read_bytes(Address::new(0x1001), 1).unwrap(), vec![1]);

        let lone = ProcessHandle::from_backends(1, Box::new(snapshot()), None, AccessMode::Kernel);
        assert!(matches!(
            lone.read_bytes(Address::new(0x1000), 1),
            Err(MemoryError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_write_and_read_pointer() {
        let (image, handle) = handle(AccessMode::Auto);
        handle
            .write(Address::new(0x1008), &0x40_0010u64.to_le_bytes())
            .unwrap();
        assert_eq!(
            handle.read_pointer(Address::new(0x1008)).unwrap(),
            Address::new(0x40_0010)
        );
        assert_eq!(image.peek(Address::new(0x1008), 1).unwrap(), vec![0x10]);
    }

    #[test]
    fn test_pointer_width_follows_architecture() {
        let image = SnapshotBackend::new(ProcessArchitecture::X86);
        image
            .map(
                Address::new(0x1000),
                vec![0x78, 0x56, 0x34, 0x12, 0xAA, 0xBB, 0xCC, 0xDD],
                Protection::READ,
                RegionType::Private,
            )
            .unwrap();
        let handle = ProcessHandle::from_backends(1, Box::new(image), None, AccessMode::Native);
        assert_eq!(handle.pointer_size(), 4);
        assert_eq!(
            handle.read_pointer(Address::new(0x1000)).unwrap(),
            Address::new(0x1234_5678)
        );
    }

    #[test]
    fn test_find_module_case_insensitive() {
        let (_, handle) = handle(AccessMode::Auto);
        let module = handle.find_module("GAME.EXE").unwrap();
        assert_eq!(module.base_address, Address::new(0x40_0000));
        assert!(matches!(
            handle.find_module("other.dll"),
            Err(MemoryError::UnresolvedModule(_))
        ));
    }

    #[test]
    fn test_detach() {
        let (_, handle) = handle(AccessMode::Auto);
        assert!(handle.is_attached());
        handle.detach().unwrap();
        assert!(!handle.is_attached());
        assert!(matches!(
            handle.read_bytes(Address::new(0x1000), 4),
            Err(MemoryError::ProcessUnavailable(_))
        ));
        // Detaching twice is harmless.
        handle.detach().unwrap();
    }

    #[test]
    fn test_access_mode_from_str() {
        assert_eq!("KERNEL".parse::<AccessMode>().unwrap(), AccessMode::Kernel);
        assert!("driver".parse::<AccessMode>().is_err());
    }
}
