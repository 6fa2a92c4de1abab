//! Value scanning over a target's memory regions
//!
//! A first scan walks every region admitted by the [`ScanSettings`] filter,
//! reading it in chunks and testing each candidate address. Later scans
//! re-read only the addresses kept by the previous pass and compare the
//! new value against the recorded one.

use super::regions::{MemoryRegion, RegionFilter, SettingState};
use crate::config::ScannerConfig;
use crate::core::types::{
    Address, MemoryError, MemoryResult, MemoryValue, ProcessArchitecture, ScanCompareType,
    ScanResult, ScanResultSet, ValueType,
};
use crate::process::ProcessHandle;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared flag asking a running scan to stop
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(AtomicOrdering::SeqCst)
    }
}

/// Options for a first scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSettings {
    pub start_address: Address,
    pub stop_address: Address,
    pub writable: SettingState,
    pub executable: SettingState,
    pub copy_on_write: SettingState,
    pub include_private: bool,
    pub include_image: bool,
    pub include_mapped: bool,
    /// Only test addresses aligned to `fast_scan_alignment`
    pub fast_scan: bool,
    pub fast_scan_alignment: usize,
    pub value_type: ValueType,
}

impl Default for ScanSettings {
    fn default() -> Self {
        ScanSettings {
            start_address: Address::null(),
            stop_address: Address::new(0x7FFF_FFFF_FFFF),
            writable: SettingState::Yes,
            executable: SettingState::Indeterminate,
            copy_on_write: SettingState::No,
            include_private: true,
            include_image: true,
            include_mapped: false,
            fast_scan: true,
            fast_scan_alignment: 4,
            value_type: ValueType::I32,
        }
    }
}

impl ScanSettings {
    /// Defaults with the user-space upper bound of the given architecture
    pub fn for_architecture(architecture: ProcessArchitecture) -> Self {
        let stop_address = if architecture.is_64bit() {
            Address::new(0x7FFF_FFFF_FFFF)
        } else {
            Address::new(0x7FFF_FFFF)
        };
        ScanSettings {
            stop_address,
            ..Self::default()
        }
    }

    /// The region filter these settings describe
    pub fn region_filter(&self) -> RegionFilter {
        RegionFilter {
            start_address: self.start_address,
            stop_address: self.stop_address,
            writable: self.writable,
            executable: self.executable,
            copy_on_write: self.copy_on_write,
            include_private: self.include_private,
            include_image: self.include_image,
            include_mapped: self.include_mapped,
        }
    }

    fn step(&self) -> usize {
        if self.fast_scan {
            self.fast_scan_alignment.max(1)
        } else {
            1
        }
    }
}

/// Scanner lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScanState {
    Idle,
    Scanning,
    HasResults,
}

/// Iterative memory scanner
pub struct Scanner {
    pool: rayon::ThreadPool,
    chunk_size: usize,
    state: ScanState,
    results: ScanResultSet,
}

impl Scanner {
    /// Create a scanner using `max_threads` workers and reads of `chunk_size` bytes
    pub fn new(max_threads: usize, chunk_size: usize) -> MemoryResult<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_threads.max(1))
            .thread_name(|i| format!("memclass-scan-{}", i))
            .build()
            .map_err(|e| MemoryError::InvalidState(format!("scanner thread pool: {}", e)))?;

        Ok(Scanner {
            pool,
            chunk_size: chunk_size.max(1),
            state: ScanState::Idle,
            results: ScanResultSet::default(),
        })
    }

    /// Create a scanner from the `[scanner]` configuration section
    pub fn from_config(config: &ScannerConfig) -> MemoryResult<Self> {
        Self::new(config.max_threads, config.chunk_size)
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn results(&self) -> &ScanResultSet {
        &self.results
    }

    /// Drops all results and returns to `Idle`
    pub fn reset(&mut self) {
        self.results = ScanResultSet::default();
        self.state = ScanState::Idle;
    }

    /// Scans every region admitted by `settings`.
    ///
    /// Unreadable regions are skipped. On cancellation the previous results
    /// and state are left untouched and `Cancelled` is returned.
    pub fn first_scan(
        &mut self,
        handle: &ProcessHandle,
        settings: &ScanSettings,
        compare: &ScanCompareType,
        cancel: &CancellationToken,
    ) -> MemoryResult<&ScanResultSet> {
        if compare.requires_previous() {
            return Err(MemoryError::InvalidState(format!(
                "{:?} needs a previous scan",
                compare
            )));
        }
        let width = value_width(settings.value_type, compare)?;
        check_comparable(settings.value_type, compare)?;

        let regions = settings.region_filter().apply(&handle.regions()?);
        let total: u64 = regions.iter().map(|r| r.size).sum();
        info!(
            "First scan over {} regions ({} bytes), {:?}",
            regions.len(),
            total,
            compare
        );

        let previous_state = self.state;
        self.state = ScanState::Scanning;

        let job = RegionScan {
            handle,
            compare,
            value_type: settings.value_type,
            width,
            step: settings.step(),
            chunk_size: self.chunk_size,
            cancel,
        };
        let found: Vec<Vec<ScanResult>> = self
            .pool
            .install(|| regions.par_iter().map(|region| job.scan(region)).collect());

        if cancel.is_cancelled() {
            self.state = previous_state;
            info!("First scan cancelled");
            return Err(MemoryError::Cancelled);
        }

        self.results = ScanResultSet::from_results(found.into_iter().flatten().collect());
        self.state = ScanState::HasResults;
        info!("First scan found {} results", self.results.len());
        Ok(&self.results)
    }

    /// Re-reads the previous results and keeps those still matching
    pub fn next_scan(
        &mut self,
        handle: &ProcessHandle,
        compare: &ScanCompareType,
        cancel: &CancellationToken,
    ) -> MemoryResult<&ScanResultSet> {
        if self.state != ScanState::HasResults {
            return Err(MemoryError::InvalidState(
                "next scan requires results from a previous scan".to_string(),
            ));
        }
        if matches!(compare, ScanCompareType::Unknown) {
            return Err(MemoryError::InvalidState(
                "unknown-value comparison is only valid on the first scan".to_string(),
            ));
        }
        if let Some(first) = self.results.iter().next() {
            check_comparable(first.value.value_type(), compare)?;
        }

        self.state = ScanState::Scanning;
        let candidates = self.results.as_slice();

        let kept: Vec<Option<ScanResult>> = self.pool.install(|| {
            candidates
                .par_iter()
                .map(|previous| {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    rescan(handle, previous, compare)
                })
                .collect()
        });

        if cancel.is_cancelled() {
            self.state = ScanState::HasResults;
            info!("Next scan cancelled");
            return Err(MemoryError::Cancelled);
        }

        let before = self.results.len();
        self.results = ScanResultSet::from_results(kept.into_iter().flatten().collect());
        self.state = ScanState::HasResults;
        info!("Next scan kept {} of {} results", self.results.len(), before);
        Ok(&self.results)
    }
}

fn rescan(
    handle: &ProcessHandle,
    previous: &ScanResult,
    compare: &ScanCompareType,
) -> Option<ScanResult> {
    let value_type = previous.value.value_type();
    let bytes = handle
        .read_bytes(previous.address, previous.value.size())
        .ok()?;
    let current = MemoryValue::from_bytes(&bytes, value_type)?;

    if matches_value(compare, &current, Some(&previous.value)) {
        Some(ScanResult::with_previous(
            previous.address,
            current,
            previous.value.clone(),
        ))
    } else {
        None
    }
}

/// Everything a worker needs to scan one region
struct RegionScan<'a> {
    handle: &'a ProcessHandle,
    compare: &'a ScanCompareType,
    value_type: ValueType,
    width: usize,
    step: usize,
    chunk_size: usize,
    cancel: &'a CancellationToken,
}

impl RegionScan<'_> {
    /// Reads the region chunk by chunk. Consecutive chunks overlap by
    /// `width - 1` bytes so values straddling a boundary are tested once.
    fn scan(&self, region: &MemoryRegion) -> Vec<ScanResult> {
        let mut results = Vec::new();
        let size = region.size as usize;
        let overlap = self.width - 1;
        let mut chunk = vec![0u8; self.chunk_size + overlap];
        let mut offset = 0usize;

        while offset < size {
            if self.cancel.is_cancelled() {
                break;
            }

            let chunk_start = region.base_address + offset;
            let len = (self.chunk_size + overlap).min(size - offset);
            if len < self.width {
                break;
            }

            match self.handle.read(chunk_start, &mut chunk, 0, len) {
                Ok(()) => self.test_chunk(chunk_start, &chunk[..len], &mut results),
                Err(e) => {
                    warn!("Skipping unreadable range at {}: {}", chunk_start, e);
                }
            }

            offset += self.chunk_size;
        }

        debug!(
            "Region {} ({} bytes): {} matches",
            region.base_address,
            region.size,
            results.len()
        );
        results
    }

    fn test_chunk(&self, chunk_start: Address, bytes: &[u8], results: &mut Vec<ScanResult>) {
        let first = (chunk_start.align_up(self.step as u64).as_u64() - chunk_start.as_u64()) as usize;
        // Candidates that start inside this chunk; later ones belong to the next
        let last = self.chunk_size.min(bytes.len() + 1 - self.width);

        for i in (first..last).step_by(self.step) {
            let Some(value) = MemoryValue::from_bytes(&bytes[i..i + self.width], self.value_type)
            else {
                continue;
            };
            if matches_value(self.compare, &value, None) {
                results.push(ScanResult::new(chunk_start + i, value));
            }
        }
    }
}

/// Byte width of one candidate value
fn value_width(value_type: ValueType, compare: &ScanCompareType) -> MemoryResult<usize> {
    if let Some(size) = value_type.size() {
        return Ok(size);
    }

    let pattern = match compare {
        ScanCompareType::Equal(v) | ScanCompareType::NotEqual(v) => v,
        _ => {
            return Err(MemoryError::InvalidState(format!(
                "{:?} scans need an exact value to compare against",
                value_type
            )))
        }
    };

    let width = pattern.to_bytes().len();
    if width == 0 {
        return Err(MemoryError::parse_error("", "empty search value"));
    }
    Ok(width)
}

/// Rejects ordered comparisons on strings and byte arrays
fn check_comparable(value_type: ValueType, compare: &ScanCompareType) -> MemoryResult<()> {
    let equality_only = matches!(
        compare,
        ScanCompareType::Unknown
            | ScanCompareType::Equal(_)
            | ScanCompareType::NotEqual(_)
            | ScanCompareType::Changed
            | ScanCompareType::NotChanged
    );

    if value_type.is_numeric() || equality_only {
        Ok(())
    } else {
        Err(MemoryError::UnsupportedOperation(format!(
            "{:?} comparison on {:?} values",
            compare, value_type
        )))
    }
}

fn values_equal(a: &MemoryValue, b: &MemoryValue) -> bool {
    match (a.as_i128(), b.as_i128()) {
        (Some(x), Some(y)) => x == y,
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => a.to_bytes() == b.to_bytes(),
        },
    }
}

fn ordering(a: &MemoryValue, b: &MemoryValue) -> Option<Ordering> {
    match (a.as_i128(), b.as_i128()) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

/// Whether `to - from` equals `delta`
fn changed_by(from: &MemoryValue, to: &MemoryValue, delta: &MemoryValue) -> bool {
    match (from.as_i128(), to.as_i128(), delta.as_i128()) {
        (Some(f), Some(t), Some(d)) => t - f == d,
        _ => match (from.as_f64(), to.as_f64(), delta.as_f64()) {
            (Some(f), Some(t), Some(d)) => ((t - f) - d).abs() <= d.abs().max(1.0) * 1e-6,
            _ => false,
        },
    }
}

/// Tests one value against a comparison
pub fn matches_value(
    compare: &ScanCompareType,
    current: &MemoryValue,
    previous: Option<&MemoryValue>,
) -> bool {
    use ScanCompareType::*;

    let is = |v: &MemoryValue, wanted: &[Ordering]| {
        ordering(current, v).map_or(false, |o| wanted.contains(&o))
    };

    match compare {
        Unknown => true,
        Equal(v) => values_equal(current, v),
        NotEqual(v) => !values_equal(current, v),
        GreaterThan(v) => is(v, &[Ordering::Greater]),
        GreaterOrEqual(v) => is(v, &[Ordering::Greater, Ordering::Equal]),
        LessThan(v) => is(v, &[Ordering::Less]),
        LessOrEqual(v) => is(v, &[Ordering::Less, Ordering::Equal]),
        Between(low, high) => {
            is(low, &[Ordering::Greater, Ordering::Equal]) && is(high, &[Ordering::Less, Ordering::Equal])
        }
        Changed => previous.map_or(false, |p| !values_equal(current, p)),
        NotChanged => previous.map_or(false, |p| values_equal(current, p)),
        Increased => previous.map_or(false, |p| is(p, &[Ordering::Greater])),
        Decreased => previous.map_or(false, |p| is(p, &[Ordering::Less])),
        IncreasedBy(d) => previous.map_or(false, |p| changed_by(p, current, d)),
        DecreasedBy(d) => previous.map_or(false, |p| changed_by(current, p, d)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::regions::{Protection, RegionType};
    use crate::process::{AccessMode, SnapshotBackend};

    fn target() -> (SnapshotBackend, ProcessHandle) {
        let image = SnapshotBackend::new(ProcessArchitecture::X64);
        let mut bytes = vec![0u8; 0x100];
        bytes[0x10..0x14].copy_from_slice(&1337i32.to_le_bytes());
        bytes[0x40..0x44].copy_from_slice(&1337i32.to_le_bytes());
        image
            .map(Address::new(0x10000), bytes, Protection::READ_WRITE, RegionType::Private)
            .unwrap();
        image
            .map(
                Address::new(0x20000),
                1337i32.to_le_bytes().repeat(4),
                Protection::READ,
                RegionType::Private,
            )
            .unwrap();
        let handle =
            ProcessHandle::from_backends(1, Box::new(image.clone()), None, AccessMode::Native);
        (image, handle)
    }

    fn equal(v: i32) -> ScanCompareType {
        ScanCompareType::Equal(MemoryValue::I32(v))
    }

    #[test]
    fn test_first_scan_respects_filter() {
        let (_, handle) = target();
        let mut scanner = Scanner::new(2, 0x40).unwrap();
        let token = CancellationToken::new();

        let results = scanner
            .first_scan(&handle, &ScanSettings::default(), &equal(1337), &token)
            .unwrap();
        let addresses: Vec<_> = results.addresses().collect();
        // The read-only region is excluded by the default writable = Yes.
        assert_eq!(addresses, vec![Address::new(0x10010), Address::new(0x10040)]);
        assert_eq!(scanner.state(), ScanState::HasResults);
    }

    #[test]
    fn test_value_straddling_chunk_boundary() {
        let (image, handle) = target();
        image.poke(Address::new(0x1007E), &(-5i32).to_le_bytes()).unwrap();
        let mut scanner = Scanner::new(1, 0x40).unwrap();
        let settings = ScanSettings {
            fast_scan: false,
            ..ScanSettings::default()
        };

        let results = scanner
            .first_scan(&handle, &settings, &equal(-5), &CancellationToken::new())
            .unwrap();
        assert_eq!(results.addresses().collect::<Vec<_>>(), vec![Address::new(0x1007E)]);
    }

    #[test]
    fn test_fast_scan_skips_unaligned() {
        let (image, handle) = target();
        image.poke(Address::new(0x10081), &77i32.to_le_bytes()).unwrap();
        let mut scanner = Scanner::new(1, 0x40).unwrap();

        let fast = scanner
            .first_scan(&handle, &ScanSettings::default(), &equal(77), &CancellationToken::new())
            .unwrap();
        assert!(fast.is_empty());

        let settings = ScanSettings {
            fast_scan: false,
            ..ScanSettings::default()
        };
        let slow = scanner
            .first_scan(&handle, &settings, &equal(77), &CancellationToken::new())
            .unwrap();
        assert_eq!(slow.len(), 1);
    }

    #[test]
    fn test_next_scan_narrows_on_changed() {
        let (image, handle) = target();
        image.poke(Address::new(0x10010), &5i32.to_le_bytes()).unwrap();
        image.poke(Address::new(0x10040), &7i32.to_le_bytes()).unwrap();

        let mut scanner = Scanner::new(2, 0x1000).unwrap();
        let token = CancellationToken::new();
        let between = ScanCompareType::Between(MemoryValue::I32(5), MemoryValue::I32(7));
        assert_eq!(
            scanner
                .first_scan(&handle, &ScanSettings::default(), &between, &token)
                .unwrap()
                .len(),
            2
        );

        image.poke(Address::new(0x10040), &9i32.to_le_bytes()).unwrap();
        let kept = scanner
            .next_scan(&handle, &ScanCompareType::Changed, &token)
            .unwrap();
        assert_eq!(kept.len(), 1);
        let only = kept.get(Address::new(0x10040)).unwrap();
        assert_eq!(only.value, MemoryValue::I32(9));
        assert_eq!(only.previous_value, Some(MemoryValue::I32(7)));
    }

    #[test]
    fn test_next_scan_requires_results() {
        let (_, handle) = target();
        let mut scanner = Scanner::new(1, 0x1000).unwrap();
        assert!(matches!(
            scanner.next_scan(&handle, &ScanCompareType::Changed, &CancellationToken::new()),
            Err(MemoryError::InvalidState(_))
        ));
        assert!(scanner
            .first_scan(
                &handle,
                &ScanSettings::default(),
                &ScanCompareType::Increased,
                &CancellationToken::new()
            )
            .is_err());
    }

    #[test]
    fn test_cancelled_scan_keeps_previous_state() {
        let (_, handle) = target();
        let mut scanner = Scanner::new(1, 0x1000).unwrap();
        scanner
            .first_scan(&handle, &ScanSettings::default(), &equal(1337), &CancellationToken::new())
            .unwrap();

        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            scanner.first_scan(&handle, &ScanSettings::default(), &equal(0), &token),
            Err(MemoryError::Cancelled)
        ));
        assert_eq!(scanner.state(), ScanState::HasResults);
        assert_eq!(scanner.results().len(), 2);

        scanner.reset();
        assert_eq!(scanner.state(), ScanState::Idle);
        assert!(scanner.results().is_empty());
    }

    #[test]
    fn test_byte_pattern_scan() {
        let (image, handle) = target();
        image.poke(Address::new(0x10090), b"\xDE\xAD\xBE\xEF").unwrap();
        let mut scanner = Scanner::new(1, 0x40).unwrap();
        let settings = ScanSettings {
            value_type: ValueType::Bytes,
            fast_scan: false,
            ..ScanSettings::default()
        };
        let pattern = ScanCompareType::Equal(MemoryValue::Bytes(vec![0xDE, 0xAD, 0xBE, 0xEF]));

        let results = scanner
            .first_scan(&handle, &settings, &pattern, &CancellationToken::new())
            .unwrap();
        assert_eq!(results.addresses().collect::<Vec<_>>(), vec![Address::new(0x10090)]);

        let ordered = ScanCompareType::GreaterThan(MemoryValue::Bytes(vec![1]));
        assert!(scanner
            .first_scan(&handle, &settings, &ordered, &CancellationToken::new())
            .is_err());
    }

    #[test]
    fn test_matches_value_comparisons() {
        let five = MemoryValue::I32(5);
        let seven = MemoryValue::I32(7);

        assert!(matches_value(&ScanCompareType::GreaterThan(five.clone()), &seven, None));
        assert!(matches_value(&ScanCompareType::LessOrEqual(seven.clone()), &seven, None));
        assert!(matches_value(&ScanCompareType::Increased, &seven, Some(&five)));
        assert!(matches_value(
            &ScanCompareType::IncreasedBy(MemoryValue::I32(2)),
            &seven,
            Some(&five)
        ));
        assert!(matches_value(
            &ScanCompareType::DecreasedBy(MemoryValue::I32(2)),
            &five,
            Some(&seven)
        ));
        assert!(!matches_value(&ScanCompareType::Changed, &seven, None));
        assert!(matches_value(
            &ScanCompareType::Equal(MemoryValue::F32(1.5)),
            &MemoryValue::F32(1.5),
            None
        ));
    }

    #[test]
    fn test_settings_for_architecture() {
        let settings = ScanSettings::for_architecture(ProcessArchitecture::X86);
        assert_eq!(settings.stop_address, Address::new(0x7FFF_FFFF));
        assert_eq!(settings.region_filter().writable, SettingState::Yes);
    }
}
