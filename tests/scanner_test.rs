//! Integration tests for first and next scans over a snapshot process

use memclass::core::types::ScanCompareType;
use memclass::memory::scanner::{matches_value, ScanState};
use memclass::memory::{Protection, RegionType, SettingState};
use memclass::{
    AccessMode, Address, CancellationToken, MemoryError, MemoryValue, ProcessArchitecture,
    ProcessHandle, ScanSettings, Scanner, SnapshotBackend, ValueType,
};
use pretty_assertions::assert_eq;

const HEAP: u64 = 0x30_0000;

fn target() -> (SnapshotBackend, ProcessHandle) {
    let image = SnapshotBackend::new(ProcessArchitecture::X64);
    image
        .map(
            Address::new(HEAP),
            vec![0; 0x400],
            Protection::READ_WRITE,
            RegionType::Private,
        )
        .unwrap();
    image
        .poke(Address::new(HEAP + 0x20), &5i32.to_le_bytes())
        .unwrap();
    image
        .poke(Address::new(HEAP + 0x80), &7i32.to_le_bytes())
        .unwrap();
    let handle = ProcessHandle::from_backends(11, Box::new(image.clone()), None, AccessMode::Auto);
    (image, handle)
}

fn positive() -> ScanCompareType {
    ScanCompareType::GreaterThan(MemoryValue::I32(0))
}

#[test]
fn test_changed_narrows_to_modified_address() {
    let (image, handle) = target();
    let mut scanner = Scanner::new(4, 0x100).unwrap();
    let token = CancellationToken::new();

    let first: Vec<_> = scanner
        .first_scan(&handle, &ScanSettings::default(), &positive(), &token)
        .unwrap()
        .iter()
        .map(|r| (r.address, r.value.clone()))
        .collect();
    assert_eq!(
        first,
        vec![
            (Address::new(HEAP + 0x20), MemoryValue::I32(5)),
            (Address::new(HEAP + 0x80), MemoryValue::I32(7)),
        ]
    );

    image
        .poke(Address::new(HEAP + 0x80), &9i32.to_le_bytes())
        .unwrap();
    let next = scanner
        .next_scan(&handle, &ScanCompareType::Changed, &token)
        .unwrap();

    assert_eq!(next.len(), 1);
    let kept = next.get(Address::new(HEAP + 0x80)).unwrap();
    assert_eq!(kept.value, MemoryValue::I32(9));
    assert_eq!(kept.previous_value, Some(MemoryValue::I32(7)));
}

#[test]
fn test_increased_by_chain() {
    let (image, handle) = target();
    let mut scanner = Scanner::new(2, 0x80).unwrap();
    let token = CancellationToken::new();
    scanner
        .first_scan(&handle, &ScanSettings::default(), &positive(), &token)
        .unwrap();

    image
        .poke(Address::new(HEAP + 0x20), &8i32.to_le_bytes())
        .unwrap();
    image
        .poke(Address::new(HEAP + 0x80), &6i32.to_le_bytes())
        .unwrap();

    let increased = scanner
        .next_scan(
            &handle,
            &ScanCompareType::IncreasedBy(MemoryValue::I32(3)),
            &token,
        )
        .unwrap();
    let addresses: Vec<_> = increased.addresses().collect();
    assert_eq!(addresses, vec![Address::new(HEAP + 0x20)]);

    // The survivor has not moved since the last pass.
    let unchanged = scanner
        .next_scan(&handle, &ScanCompareType::NotChanged, &token)
        .unwrap();
    assert_eq!(unchanged.len(), 1);
}

#[test]
fn test_byte_pattern_scan() {
    let (image, handle) = target();
    image
        .poke(Address::new(HEAP + 0x1FE), &[0xDE, 0xAD, 0xBE, 0xEF])
        .unwrap();
    let mut scanner = Scanner::new(1, 0x100).unwrap();
    let settings = ScanSettings {
        value_type: ValueType::Bytes,
        fast_scan: false,
        ..ScanSettings::default()
    };
    let pattern = MemoryValue::parse("DE AD BE EF", ValueType::Bytes).unwrap();

    let results = scanner
        .first_scan(
            &handle,
            &settings,
            &ScanCompareType::Equal(pattern),
            &CancellationToken::new(),
        )
        .unwrap();
    let addresses: Vec<_> = results.addresses().collect();
    assert_eq!(addresses, vec![Address::new(HEAP + 0x1FE)]);
}

#[test]
fn test_region_filter_applies() {
    let (image, handle) = target();
    image
        .map(
            Address::new(0x50_0000),
            5i32.to_le_bytes().to_vec(),
            Protection::READ_EXECUTE,
            RegionType::Image,
        )
        .unwrap();
    let mut scanner = Scanner::new(2, 0x100).unwrap();
    let token = CancellationToken::new();

    let settings = ScanSettings {
        writable: SettingState::Indeterminate,
        executable: SettingState::Yes,
        ..ScanSettings::default()
    };
    let results = scanner
        .first_scan(
            &handle,
            &settings,
            &ScanCompareType::Equal(MemoryValue::I32(5)),
            &token,
        )
        .unwrap();
    let addresses: Vec<_> = results.addresses().collect();
    assert_eq!(addresses, vec![Address::new(0x50_0000)]);
}

#[test]
fn test_cancelled_scan_keeps_previous_results() {
    let (_, handle) = target();
    let mut scanner = Scanner::new(2, 0x100).unwrap();
    let token = CancellationToken::new();
    scanner
        .first_scan(&handle, &ScanSettings::default(), &positive(), &token)
        .unwrap();

    let cancelled = CancellationToken::new();
    cancelled.cancel();
    let err = scanner
        .next_scan(&handle, &ScanCompareType::NotChanged, &cancelled)
        .unwrap_err();
    assert!(matches!(err, MemoryError::Cancelled));
    assert_eq!(scanner.state(), ScanState::HasResults);
    assert_eq!(scanner.results().len(), 2);

    scanner.reset();
    assert_eq!(scanner.state(), ScanState::Idle);
    assert!(matches!(
        scanner.next_scan(&handle, &ScanCompareType::Changed, &token),
        Err(MemoryError::InvalidState(_))
    ));
}

#[test]
fn test_comparison_table() {
    let cases = [
        (ScanCompareType::Between(MemoryValue::I32(5), MemoryValue::I32(7)), 5, None, true),
        (ScanCompareType::Between(MemoryValue::I32(5), MemoryValue::I32(7)), 8, None, false),
        (ScanCompareType::LessOrEqual(MemoryValue::I32(5)), 5, None, true),
        (ScanCompareType::Increased, 6, Some(5), true),
        (ScanCompareType::Decreased, 6, Some(5), false),
        (ScanCompareType::DecreasedBy(MemoryValue::I32(2)), 3, Some(5), true),
        (ScanCompareType::Changed, 5, None, false),
    ];

    for (compare, current, previous, expected) in cases {
        let previous = previous.map(MemoryValue::I32);
        assert_eq!(
            matches_value(&compare, &MemoryValue::I32(current), previous.as_ref()),
            expected,
            "{:?} on {} after {:?}",
            compare,
            current,
            previous
        );
    }

    let delta = ScanCompareType::IncreasedBy(MemoryValue::F32(0.1));
    assert!(matches_value(
        &delta,
        &MemoryValue::F32(1.1),
        Some(&MemoryValue::F32(1.0))
    ));
}
