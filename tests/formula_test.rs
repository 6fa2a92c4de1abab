//! Integration tests for address formulas against custom and live resolvers

use memclass::formula::{normalize_legacy, Sign, Term};
use memclass::memory::{Protection, RegionType};
use memclass::{
    AccessMode, Address, AddressResolver, Formula, MemoryError, MemoryResult,
    ProcessArchitecture, ProcessHandle, SnapshotBackend,
};
use pretty_assertions::assert_eq;
use std::cell::Cell;
use std::collections::HashMap;

/// Resolver over fixed tables that counts pointer reads
struct TableResolver {
    modules: HashMap<String, u64>,
    pointers: HashMap<u64, u64>,
    pointer_size: usize,
    reads: Cell<usize>,
}

impl TableResolver {
    fn new(pointer_size: usize) -> Self {
        TableResolver {
            modules: HashMap::from([
                ("client.dll".to_string(), 0x1000_0000),
                ("game.exe".to_string(), 0x1000),
            ]),
            pointers: HashMap::from([(0x1000_0100, 0x5000), (0x5008, 0x6000), (0x1000, 0x5000)]),
            pointer_size,
            reads: Cell::new(0),
        }
    }
}

impl AddressResolver for TableResolver {
    fn module_base(&self, name: &str) -> MemoryResult<Address> {
        self.modules
            .get(name)
            .map(|&base| Address::new(base))
            .ok_or_else(|| MemoryError::UnresolvedModule(name.to_string()))
    }

    fn read_pointer(&self, address: Address) -> MemoryResult<Address> {
        self.reads.set(self.reads.get() + 1);
        self.pointers
            .get(&address.as_u64())
            .map(|&target| Address::new(target))
            .ok_or_else(|| MemoryError::read_fault(address, "unmapped"))
    }

    fn pointer_size(&self) -> usize {
        self.pointer_size
    }
}

#[test]
fn test_pointer_chain() {
    let resolver = TableResolver::new(8);
    let formula: Formula = "[[<client.dll> + 100] + 8] + 0x20".parse().unwrap();

    assert_eq!(formula.evaluate(&resolver).unwrap(), Address::new(0x6020));
    assert_eq!(resolver.reads.get(), 2);
}

#[test]
fn test_bracket_replaces_running_total() {
    let resolver = TableResolver::new(8);

    let formula: Formula = "10 + [<game.exe>]".parse().unwrap();
    assert_eq!(formula.evaluate(&resolver).unwrap(), Address::new(0x5000));

    let formula: Formula = "10 + [<game.exe>] + 8".parse().unwrap();
    assert_eq!(formula.evaluate(&resolver).unwrap(), Address::new(0x5008));

    let formula: Formula = "<client.dll> + [[<game.exe>] + 8]".parse().unwrap();
    assert_eq!(formula.evaluate(&resolver).unwrap(), Address::new(0x6000));
    assert_eq!(resolver.reads.get(), 4);
}

#[test]
fn test_subtracted_bracket_rejected() {
    assert!(matches!(
        "0x100 - [<game.exe>]".parse::<Formula>(),
        Err(MemoryError::ParseError { .. })
    ));
}

#[test]
fn test_constant_formula_reads_nothing() {
    let resolver = TableResolver::new(8);
    let formula: Formula = "0x400000 + 10 - 0x4".parse().unwrap();

    assert!(formula.is_constant());
    assert_eq!(formula.evaluate(&resolver).unwrap(), Address::new(0x40_000C));
    assert_eq!(resolver.reads.get(), 0);
}

#[test]
fn test_errors_propagate() {
    let resolver = TableResolver::new(8);
    let unresolved: Formula = "<server.dll> + 4".parse().unwrap();
    assert!(matches!(
        unresolved.evaluate(&resolver),
        Err(MemoryError::UnresolvedModule(name)) if name == "server.dll"
    ));

    let unreadable: Formula = "[<client.dll>]".parse().unwrap();
    assert!(matches!(
        unreadable.evaluate(&resolver),
        Err(MemoryError::ReadFault { .. })
    ));
}

#[test]
fn test_narrow_target_wraps() {
    let resolver = TableResolver::new(4);
    let formula: Formula = "<client.dll> - 10000001".parse().unwrap();
    assert_eq!(formula.evaluate(&resolver).unwrap(), Address::new(0xFFFF_FFFF));
}

#[test]
fn test_built_formula_displays_normalised() {
    let formula = Formula::new(Term::Deref(
        Formula::new(Term::Module("client.dll".into())).then(Sign::Plus, Term::Offset(0x100)),
    ))
    .then(Sign::Plus, Term::Offset(0x8));

    assert_eq!(formula.to_string(), "[<client.dll> + 0x100] + 0x8");
    assert_eq!(formula.to_string().parse::<Formula>().unwrap(), formula);
}

#[test]
fn test_legacy_text_against_a_process() {
    let image = SnapshotBackend::new(ProcessArchitecture::X64);
    image
        .add_module("game.exe", Address::new(0x14000_0000), 0x1000)
        .unwrap();
    image
        .poke(Address::new(0x14000_0010), &0x7000u64.to_le_bytes())
        .unwrap();
    image
        .map(
            Address::new(0x7000),
            vec![0; 0x100],
            Protection::READ_WRITE,
            RegionType::Private,
        )
        .unwrap();
    let handle = ProcessHandle::from_backends(9, Box::new(image), None, AccessMode::Auto);

    let formula: Formula = normalize_legacy("*\"game.exe\"+10").parse().unwrap();
    assert_eq!(formula.to_string(), "[<game.exe> + 0x10]");
    assert_eq!(formula.evaluate(&handle).unwrap(), Address::new(0x7000));
}

#[test]
fn test_serde_uses_text_form() {
    let formula: Formula = "[<game.exe> + 0x10] + 0x4".parse().unwrap();
    let json = serde_json::to_string(&formula).unwrap();
    assert_eq!(json, "\"[<game.exe> + 0x10] + 0x4\"");
    assert_eq!(serde_json::from_str::<Formula>(&json).unwrap(), formula);
}
