//! In-memory process image
//!
//! A [`SnapshotBackend`] behaves like a live process: reads and writes go
//! through the same region and protection checks, modules can be looked
//! up by name, and short transfers are reported as such. It serves offline
//! analysis of captured memory and drives the test-suite.

use super::backend::MemoryBackend;
use crate::core::types::{Address, MemoryError, MemoryResult, ModuleInfo, ProcessArchitecture};
use crate::memory::regions::{MemoryRegion, Protection, RegionType};
use std::sync::{Arc, RwLock};

struct SnapshotRegion {
    region: MemoryRegion,
    bytes: Vec<u8>,
}

#[derive(Default)]
struct SnapshotImage {
    regions: Vec<SnapshotRegion>,
    modules: Vec<ModuleInfo>,
}

/// Shared, cloneable in-memory process image
#[derive(Clone)]
pub struct SnapshotBackend {
    image: Arc<RwLock<SnapshotImage>>,
    architecture: ProcessArchitecture,
    deny_access: bool,
}

fn poisoned<T>(_: std::sync::PoisonError<T>) -> MemoryError {
    MemoryError::ProcessUnavailable("snapshot lock poisoned".to_string())
}

impl SnapshotBackend {
    /// Creates an empty image for a target of the given architecture
    pub fn new(architecture: ProcessArchitecture) -> Self {
        SnapshotBackend {
            image: Arc::new(RwLock::new(SnapshotImage::default())),
            architecture,
            deny_access: false,
        }
    }

    /// Maps `bytes` at `base`, keeping regions ordered by address
    pub fn map(
        &self,
        base: Address,
        bytes: Vec<u8>,
        protection: Protection,
        region_type: RegionType,
    ) -> MemoryResult<()> {
        let region = MemoryRegion::new(base, bytes.len() as u64, protection, region_type);
        let mut image = self.image.write().map_err(poisoned)?;

        let overlaps = image.regions.iter().any(|r| {
            r.region.base_address < region.end_address()
                && region.base_address < r.region.end_address()
        });
        if overlaps {
            return Err(MemoryError::InvalidAddress(format!(
                "region at {} overlaps an existing mapping",
                base
            )));
        }

        let at = image
            .regions
            .partition_point(|r| r.region.base_address < base);
        image.regions.insert(at, SnapshotRegion { region, bytes });
        Ok(())
    }

    /// Registers a module, mapping an image region of `size` zero bytes for it
    pub fn add_module(&self, name: &str, base: Address, size: u64) -> MemoryResult<()> {
        self.map(
            base,
            vec![0; size as usize],
            Protection::READ_WRITE,
            RegionType::Image,
        )?;
        let mut image = self.image.write().map_err(poisoned)?;
        image.modules.push(ModuleInfo::new(name, base, size));
        Ok(())
    }

    /// Overwrites bytes regardless of page protection
    pub fn poke(&self, address: Address, data: &[u8]) -> MemoryResult<()> {
        let mut image = self.image.write().map_err(poisoned)?;
        let written = transfer(&mut image.regions, address, data.len(), |chunk, at, done| {
            chunk[at..at + done.len()].copy_from_slice(&data[done.start..done.end]);
            true
        });
        if written == data.len() {
            Ok(())
        } else {
            Err(MemoryError::write_fault(address, "address not mapped"))
        }
    }

    /// Reads bytes regardless of page protection
    pub fn peek(&self, address: Address, len: usize) -> MemoryResult<Vec<u8>> {
        let mut out = vec![0u8; len];
        let mut image = self.image.write().map_err(poisoned)?;
        let read = transfer(&mut image.regions, address, len, |chunk, at, done| {
            out[done.start..done.end].copy_from_slice(&chunk[at..at + done.len()]);
            true
        });
        if read == len {
            Ok(out)
        } else {
            Err(MemoryError::read_fault(address, "address not mapped"))
        }
    }

    /// A handle onto the same image whose every access is refused, standing
    /// in for a target that blocks the native API
    pub fn denying(&self) -> Self {
        SnapshotBackend {
            deny_access: true,
            ..self.clone()
        }
    }

    fn check_access(&self) -> MemoryResult<()> {
        if self.deny_access {
            Err(MemoryError::access_denied(0, "snapshot access refused"))
        } else {
            Ok(())
        }
    }
}

/// Walks contiguous regions starting at `address` for up to `len` bytes.
///
/// `visit(region_bytes, offset_in_region, range_in_request)` returns false
/// to stop at a region it may not touch. Returns the number of bytes
/// visited.
fn transfer<F>(regions: &mut [SnapshotRegion], address: Address, len: usize, mut visit: F) -> usize
where
    F: FnMut(&mut Vec<u8>, usize, std::ops::Range<usize>) -> bool,
{
    let mut done = 0usize;
    let mut cursor = address;
    let start = regions.partition_point(|r| r.region.end_address() <= address);

    for entry in regions.iter_mut().skip(start) {
        if done == len || !entry.region.contains(cursor) {
            break;
        }

        let at = (cursor.as_u64() - entry.region.base_address.as_u64()) as usize;
        let take = (entry.bytes.len() - at).min(len - done);
        if !visit(&mut entry.bytes, at, done..done + take) {
            break;
        }

        done += take;
        cursor = cursor + take;
    }

    done
}

impl MemoryBackend for SnapshotBackend {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    fn read_into(&self, address: Address, buffer: &mut [u8]) -> MemoryResult<usize> {
        self.check_access()?;
        let mut image = self.image.write().map_err(poisoned)?;

        let read = transfer(&mut image.regions, address, buffer.len(), |chunk, at, done| {
            buffer[done.start..done.end].copy_from_slice(&chunk[at..at + done.len()]);
            true
        });

        if read == 0 && !buffer.is_empty() {
            return Err(MemoryError::read_fault(address, "address not mapped"));
        }
        Ok(read)
    }

    fn write_from(&self, address: Address, data: &[u8]) -> MemoryResult<usize> {
        self.check_access()?;
        let mut image = self.image.write().map_err(poisoned)?;

        let writable: Vec<(Address, bool)> = image
            .regions
            .iter()
            .map(|r| (r.region.base_address, r.region.protection.writable))
            .collect();

        let written = transfer(&mut image.regions, address, data.len(), |chunk, at, done| {
            let base = address.as_u64() + done.start as u64 - at as u64;
            let allowed = writable
                .iter()
                .any(|(b, w)| b.as_u64() == base && *w);
            if allowed {
                chunk[at..at + done.len()].copy_from_slice(&data[done.start..done.end]);
            }
            allowed
        });

        if written == 0 && !data.is_empty() {
            return Err(MemoryError::write_fault(address, "address not writable"));
        }
        Ok(written)
    }

    fn regions(&self) -> MemoryResult<Vec<MemoryRegion>> {
        self.check_access()?;
        let image = self.image.read().map_err(poisoned)?;
        Ok(image.regions.iter().map(|r| r.region.clone()).collect())
    }

    fn modules(&self) -> MemoryResult<Vec<ModuleInfo>> {
        self.check_access()?;
        let image = self.image.read().map_err(poisoned)?;
        Ok(image.modules.clone())
    }

    fn architecture(&self) -> ProcessArchitecture {
        self.architecture
    }
}
