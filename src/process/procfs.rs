//! Linux backend over `/proc/<pid>/mem` and `/proc/<pid>/maps`

use super::backend::MemoryBackend;
use crate::core::types::{
    Address, MemoryError, MemoryResult, ModuleInfo, ProcessArchitecture, ProcessId,
};
use crate::memory::regions::{MemoryRegion, Protection, RegionType};
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads and writes a process through its procfs memory file
pub struct ProcfsBackend {
    pid: ProcessId,
    mem: File,
    writable: bool,
    architecture: ProcessArchitecture,
}

impl ProcfsBackend {
    /// Opens `/proc/<pid>/mem`, read-write when permitted, read-only otherwise
    pub fn open(pid: ProcessId) -> MemoryResult<Self> {
        let root = PathBuf::from(format!("/proc/{}", pid));
        if !root.exists() {
            return Err(MemoryError::ProcessNotFound(format!("PID: {}", pid)));
        }

        let mem_path = root.join("mem");
        let (mem, writable) = match OpenOptions::new().read(true).write(true).open(&mem_path) {
            Ok(file) => (file, true),
            Err(_) => (
                File::open(&mem_path).map_err(|e| map_open_error(pid, e))?,
                false,
            ),
        };

        let architecture = read_elf_class(&root.join("exe")).unwrap_or_else(|e| {
            debug!("Could not read ELF class of PID {}: {}", pid, e);
            ProcessArchitecture::Unknown
        });

        debug!(
            "Opened /proc/{}/mem (writable: {}, architecture: {:?})",
            pid, writable, architecture
        );

        Ok(ProcfsBackend {
            pid,
            mem,
            writable,
            architecture,
        })
    }

    fn maps(&self) -> MemoryResult<Vec<MapsEntry>> {
        let text = fs::read_to_string(format!("/proc/{}/maps", self.pid))
            .map_err(|e| map_open_error(self.pid, e))?;
        Ok(text.lines().filter_map(MapsEntry::parse).collect())
    }
}

fn map_open_error(pid: ProcessId, error: io::Error) -> MemoryError {
    match error.kind() {
        io::ErrorKind::NotFound => MemoryError::ProcessNotFound(format!("PID: {}", pid)),
        io::ErrorKind::PermissionDenied => MemoryError::access_denied(pid, error.to_string()),
        _ => MemoryError::ProcessUnavailable(format!("PID {}: {}", pid, error)),
    }
}

/// Reads `EI_CLASS` from the executable's ELF header
fn read_elf_class(exe: &Path) -> io::Result<ProcessArchitecture> {
    let mut header = [0u8; 5];
    File::open(exe)?.read_exact(&mut header)?;

    if &header[..4] != b"\x7FELF" {
        return Ok(ProcessArchitecture::Unknown);
    }

    Ok(match header[4] {
        1 => ProcessArchitecture::X86,
        2 => ProcessArchitecture::X64,
        _ => ProcessArchitecture::Unknown,
    })
}

/// One line of `/proc/<pid>/maps`
#[derive(Debug, Clone, PartialEq, Eq)]
struct MapsEntry {
    start: u64,
    end: u64,
    perms: String,
    path: Option<String>,
}

impl MapsEntry {
    fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split_whitespace();
        let range = fields.next()?;
        let perms = fields.next()?.to_string();
        // offset, device, inode
        let mut rest = fields.skip(3);
        let path = rest.next().map(|first| {
            let tail: Vec<&str> = rest.collect();
            if tail.is_empty() {
                first.to_string()
            } else {
                format!("{} {}", first, tail.join(" "))
            }
        });

        let (start, end) = range.split_once('-')?;
        Some(MapsEntry {
            start: u64::from_str_radix(start, 16).ok()?,
            end: u64::from_str_radix(end, 16).ok()?,
            perms,
            path,
        })
    }

    fn file_path(&self) -> Option<&str> {
        self.path.as_deref().filter(|p| p.starts_with('/'))
    }
}

/// Classifies maps entries: file mappings of a file that has an executable
/// mapping are image, other file mappings are mapped, the rest is private
fn classify(entries: &[MapsEntry]) -> Vec<MemoryRegion> {
    let images: HashSet<&str> = entries
        .iter()
        .filter(|e| e.perms.as_bytes().get(2) == Some(&b'x'))
        .filter_map(MapsEntry::file_path)
        .collect();

    entries
        .iter()
        .map(|e| {
            let region_type = match e.file_path() {
                Some(path) if images.contains(path) => RegionType::Image,
                Some(_) => RegionType::Mapped,
                None => RegionType::Private,
            };

            MemoryRegion::new(
                Address::new(e.start),
                e.end - e.start,
                Protection::from_maps_perms(&e.perms, e.file_path().is_some()),
                region_type,
            )
        })
        .collect()
}

/// Groups image mappings by file into modules spanning all their mappings
fn collect_modules(entries: &[MapsEntry]) -> Vec<ModuleInfo> {
    let mut spans: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for entry in entries {
        if let Some(path) = entry.file_path() {
            let span = spans.entry(path).or_insert((entry.start, entry.end));
            span.0 = span.0.min(entry.start);
            span.1 = span.1.max(entry.end);
        }
    }

    let mut modules: Vec<ModuleInfo> = spans
        .into_iter()
        .map(|(path, (start, end))| {
            let name = Path::new(path)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.to_string());
            let mut module = ModuleInfo::new(name, Address::new(start), end - start);
            module.path = PathBuf::from(path);
            module
        })
        .collect();

    modules.sort_by_key(|m| m.base_address);
    modules
}

impl MemoryBackend for ProcfsBackend {
    fn name(&self) -> &'static str {
        "procfs"
    }

    fn read_into(&self, address: Address, buffer: &mut [u8]) -> MemoryResult<usize> {
        self.mem
            .read_at(buffer, address.as_u64())
            .map_err(|e| MemoryError::read_fault(address, e.to_string()))
    }

    fn write_from(&self, address: Address, data: &[u8]) -> MemoryResult<usize> {
        if !self.writable {
            return Err(MemoryError::access_denied(
                self.pid,
                "memory file opened read-only",
            ));
        }

        self.mem
            .write_at(data, address.as_u64())
            .map_err(|e| MemoryError::write_fault(address, e.to_string()))
    }

    fn regions(&self) -> MemoryResult<Vec<MemoryRegion>> {
        Ok(classify(&self.maps()?))
    }

    fn modules(&self) -> MemoryResult<Vec<ModuleInfo>> {
        let entries = self.maps()?;
        let images: Vec<MapsEntry> = classify(&entries)
            .iter()
            .zip(entries.iter())
            .filter(|(region, _)| region.region_type == RegionType::Image)
            .map(|(_, entry)| entry.clone())
            .collect();
        Ok(collect_modules(&images))
    }

    fn architecture(&self) -> ProcessArchitecture {
        self.architecture
    }
}
