//! Memory regions of a target process
//!
//! Backends translate their native region descriptions (`VirtualQueryEx`
//! records, `/proc/<pid>/maps` lines, snapshot tables) into
//! [`MemoryRegion`], and the scanner narrows them with a [`RegionFilter`].

pub mod filter;

pub use filter::{RegionFilter, SettingState};

use crate::core::types::Address;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Type of memory region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionType {
    /// Private memory
    Private,
    /// Mapped memory (file mapping)
    Mapped,
    /// Image memory (executable/library)
    Image,
}

/// Page protection of a region
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Protection {
    pub readable: bool,
    pub writable: bool,
    pub executable: bool,
    pub copy_on_write: bool,
    pub guarded: bool,
}

impl Protection {
    pub const READ: Protection = Protection {
        readable: true,
        writable: false,
        executable: false,
        copy_on_write: false,
        guarded: false,
    };

    pub const READ_WRITE: Protection = Protection {
        writable: true,
        ..Protection::READ
    };

    pub const READ_EXECUTE: Protection = Protection {
        executable: true,
        ..Protection::READ
    };

    /// Decodes Windows `PAGE_*` protection constants
    pub fn from_page_flags(protect: u32) -> Self {
        const PAGE_NOACCESS: u32 = 0x01;
        const PAGE_READONLY: u32 = 0x02;
        const PAGE_READWRITE: u32 = 0x04;
        const PAGE_WRITECOPY: u32 = 0x08;
        const PAGE_EXECUTE: u32 = 0x10;
        const PAGE_EXECUTE_READ: u32 = 0x20;
        const PAGE_EXECUTE_READWRITE: u32 = 0x40;
        const PAGE_EXECUTE_WRITECOPY: u32 = 0x80;
        const PAGE_GUARD: u32 = 0x100;

        let readable_bits = PAGE_READONLY
            | PAGE_READWRITE
            | PAGE_WRITECOPY
            | PAGE_EXECUTE_READ
            | PAGE_EXECUTE_READWRITE
            | PAGE_EXECUTE_WRITECOPY;

        Protection {
            readable: protect & PAGE_NOACCESS == 0 && protect & readable_bits != 0,
            writable: protect
                & (PAGE_READWRITE
                    | PAGE_WRITECOPY
                    | PAGE_EXECUTE_READWRITE
                    | PAGE_EXECUTE_WRITECOPY)
                != 0,
            executable: protect
                & (PAGE_EXECUTE
                    | PAGE_EXECUTE_READ
                    | PAGE_EXECUTE_READWRITE
                    | PAGE_EXECUTE_WRITECOPY)
                != 0,
            copy_on_write: protect & (PAGE_WRITECOPY | PAGE_EXECUTE_WRITECOPY) != 0,
            guarded: protect & PAGE_GUARD != 0,
        }
    }

    /// Decodes the `rwxp` permission column of `/proc/<pid>/maps`.
    ///
    /// Only a private writable mapping of a file is copy-on-write; anonymous
    /// private memory (heap, stack, `.bss`) is plain read-write.
    pub fn from_maps_perms(perms: &str, file_backed: bool) -> Self {
        let bytes = perms.as_bytes();
        let flag = |i: usize, c: u8| bytes.get(i) == Some(&c);
        let writable = flag(1, b'w');

        Protection {
            readable: flag(0, b'r'),
            writable,
            executable: flag(2, b'x'),
            copy_on_write: file_backed && writable && flag(3, b'p'),
            guarded: false,
        }
    }
}

impl fmt::Display for Protection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = |set: bool, ch: char| if set { ch } else { '-' };
        write!(
            f,
            "{}{}{}{}",
            c(self.readable, 'r'),
            c(self.writable, 'w'),
            c(self.executable, 'x'),
            if self.guarded {
                'g'
            } else {
                c(self.copy_on_write, 'c')
            }
        )
    }
}

/// A committed range of the target's address space
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryRegion {
    /// Base address of the region
    pub base_address: Address,
    /// Size of the region in bytes
    pub size: u64,
    pub protection: Protection,
    pub region_type: RegionType,
}

impl MemoryRegion {
    pub fn new(
        base_address: Address,
        size: u64,
        protection: Protection,
        region_type: RegionType,
    ) -> Self {
        MemoryRegion {
            base_address,
            size,
            protection,
            region_type,
        }
    }

    /// Get the end address of the region
    pub fn end_address(&self) -> Address {
        self.base_address + self.size
    }

    /// Check if an address is within this region
    pub fn contains(&self, address: Address) -> bool {
        address >= self.base_address && address < self.end_address()
    }

    /// Clips the region to `[start, stop)`, returning `None` if nothing remains
    pub fn clip(&self, start: Address, stop: Address) -> Option<MemoryRegion> {
        let base = self.base_address.max(start);
        let end = self.end_address().min(stop);
        if base >= end {
            return None;
        }

        Some(MemoryRegion {
            base_address: base,
            size: end.as_u64() - base.as_u64(),
            ..self.clone()
        })
    }
}
