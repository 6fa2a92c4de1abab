//! Memory region filtering functionality

use crate::core::types::Address;
use crate::memory::regions::{MemoryRegion, RegionType};
use serde::{Deserialize, Serialize};

/// Tri-state inclusion rule for one protection axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettingState {
    /// The region must have the property
    Yes,
    /// The region must not have the property
    No,
    /// The property is ignored
    Indeterminate,
}

impl SettingState {
    /// Checks a region property against this rule
    pub fn admits(self, property: bool) -> bool {
        match self {
            SettingState::Yes => property,
            SettingState::No => !property,
            SettingState::Indeterminate => true,
        }
    }
}

/// Filter deciding which regions a scan visits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionFilter {
    pub start_address: Address,
    pub stop_address: Address,
    pub writable: SettingState,
    pub executable: SettingState,
    pub copy_on_write: SettingState,
    pub include_private: bool,
    pub include_image: bool,
    pub include_mapped: bool,
}

impl Default for RegionFilter {
    fn default() -> Self {
        RegionFilter {
            start_address: Address::null(),
            stop_address: Address::new(u64::MAX),
            writable: SettingState::Indeterminate,
            executable: SettingState::Indeterminate,
            copy_on_write: SettingState::Indeterminate,
            include_private: true,
            include_image: true,
            include_mapped: true,
        }
    }
}

impl RegionFilter {
    /// Check if a region matches the filter criteria, ignoring the address range
    pub fn matches(&self, region: &MemoryRegion) -> bool {
        let protection = region.protection;

        if !protection.readable || protection.guarded || region.size == 0 {
            return false;
        }

        let type_enabled = match region.region_type {
            RegionType::Private => self.include_private,
            RegionType::Image => self.include_image,
            RegionType::Mapped => self.include_mapped,
        };

        type_enabled
            && self.writable.admits(protection.writable)
            && self.executable.admits(protection.executable)
            && self.copy_on_write.admits(protection.copy_on_write)
    }

    /// Apply the filter, clipping surviving regions to the address range
    pub fn apply(&self, regions: &[MemoryRegion]) -> Vec<MemoryRegion> {
        regions
            .iter()
            .filter(|region| self.matches(region))
            .filter_map(|region| region.clip(self.start_address, self.stop_address))
            .collect()
    }

    /// Get total size of regions matching the filter
    pub fn total_size(&self, regions: &[MemoryRegion]) -> u64 {
        self.apply(regions).iter().map(|region| region.size).sum()
    }
}
