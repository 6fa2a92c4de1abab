//! Process architecture and module information types

use super::Address;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Target architecture; only the pointer width matters to this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessArchitecture {
    X86,
    X64,
    ARM,
    ARM64,
    Unknown,
}

impl ProcessArchitecture {
    /// Pointer width in bytes; unknown targets are treated as 64-bit
    pub fn pointer_size(&self) -> usize {
        match self {
            ProcessArchitecture::X86 | ProcessArchitecture::ARM => 4,
            ProcessArchitecture::X64 | ProcessArchitecture::ARM64 => 8,
            ProcessArchitecture::Unknown => 8,
        }
    }

    pub fn is_64bit(&self) -> bool {
        self.pointer_size() == 8
    }
}

/// A mapped executable image, the anchor for `<module>` formula terms
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleInfo {
    pub name: String,
    pub path: PathBuf,
    pub base_address: Address,
    pub size: u64,
}

impl ModuleInfo {
    pub fn new(name: impl Into<String>, base_address: Address, size: u64) -> Self {
        ModuleInfo {
            name: name.into(),
            path: PathBuf::new(),
            base_address,
            size,
        }
    }

    /// First address past the image
    pub fn end_address(&self) -> Address {
        self.base_address + self.size
    }

    pub fn contains_address(&self, address: Address) -> bool {
        address >= self.base_address && address < self.end_address()
    }

    /// Case-insensitive name comparison, as module names are on Windows
    pub fn matches_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_widths() {
        assert_eq!(ProcessArchitecture::ARM.pointer_size(), 4);
        assert_eq!(ProcessArchitecture::Unknown.pointer_size(), 8);
        assert!(ProcessArchitecture::ARM64.is_64bit());
        assert!(!ProcessArchitecture::X86.is_64bit());
    }

    #[test]
    fn test_module_bounds_are_half_open() {
        let module = ModuleInfo::new("client.dll", Address::new(0x7FF6_0000), 0x2000);
        assert_eq!(module.end_address(), Address::new(0x7FF6_2000));
        assert!(module.contains_address(Address::new(0x7FF6_0000)));
        assert!(module.contains_address(Address::new(0x7FF6_1FFF)));
        assert!(!module.contains_address(module.end_address()));
        assert!(module.matches_name("Client.DLL"));
        assert!(!module.matches_name("client"));
    }
}
