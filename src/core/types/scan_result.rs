//! Scan result and comparison types

use super::{Address, MemoryValue};
use serde::{Deserialize, Serialize};

/// Result from a memory scan operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub address: Address,
    pub value: MemoryValue,
    pub previous_value: Option<MemoryValue>,
}

impl ScanResult {
    /// Creates a new scan result
    pub fn new(address: Address, value: MemoryValue) -> Self {
        ScanResult {
            address,
            value,
            previous_value: None,
        }
    }

    /// Creates a scan result with previous value for comparison
    pub fn with_previous(address: Address, value: MemoryValue, previous: MemoryValue) -> Self {
        ScanResult {
            address,
            value,
            previous_value: Some(previous),
        }
    }
}

/// Ordered set of scan results, unique and sorted by address
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanResultSet {
    results: Vec<ScanResult>,
}

impl ScanResultSet {
    /// Builds a set, sorting by address and dropping duplicate addresses
    pub fn from_results(mut results: Vec<ScanResult>) -> Self {
        results.sort_by_key(|r| r.address);
        results.dedup_by_key(|r| r.address);
        ScanResultSet { results }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ScanResult> {
        self.results.iter()
    }

    /// Looks up the result recorded for an address
    pub fn get(&self, address: Address) -> Option<&ScanResult> {
        self.results
            .binary_search_by_key(&address, |r| r.address)
            .ok()
            .map(|i| &self.results[i])
    }

    pub fn addresses(&self) -> impl Iterator<Item = Address> + '_ {
        self.results.iter().map(|r| r.address)
    }

    pub fn as_slice(&self) -> &[ScanResult] {
        &self.results
    }
}

impl<'a> IntoIterator for &'a ScanResultSet {
    type Item = &'a ScanResult;
    type IntoIter = std::slice::Iter<'a, ScanResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

/// Comparison applied to each candidate during a scan pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum ScanCompareType {
    /// Records every candidate; first pass only
    Unknown,
    Equal(MemoryValue),
    NotEqual(MemoryValue),
    GreaterThan(MemoryValue),
    GreaterOrEqual(MemoryValue),
    LessThan(MemoryValue),
    LessOrEqual(MemoryValue),
    Between(MemoryValue, MemoryValue),
    Changed,
    NotChanged,
    Increased,
    Decreased,
    IncreasedBy(MemoryValue),
    DecreasedBy(MemoryValue),
}

impl ScanCompareType {
    /// Checks if this comparison needs the previously recorded value
    pub fn requires_previous(&self) -> bool {
        matches!(
            self,
            ScanCompareType::Changed
                | ScanCompareType::NotChanged
                | ScanCompareType::Increased
                | ScanCompareType::Decreased
                | ScanCompareType::IncreasedBy(_)
                | ScanCompareType::DecreasedBy(_)
        )
    }

    /// Checks if this comparison carries a user value
    pub fn requires_value(&self) -> bool {
        !self.requires_previous() && !matches!(self, ScanCompareType::Unknown)
    }
}
