//! memclass: typed class overlays over the memory of a running process
//!
//! The crate is layered bottom-up:
//!
//! - [`process`] attaches to a target and moves bytes in and out of it
//! - [`memory`] buffers remote ranges, caches reads and scans for values
//! - [`formula`] parses and evaluates address expressions
//! - [`nodes`] describes classes as ordered lists of typed nodes and
//!   evaluates them against live memory
//! - [`import`] reads class definitions saved by older tools
//! - [`config`] loads the `memclass.toml` settings

pub mod config;
pub mod core;
pub mod formula;
pub mod import;
pub mod memory;
pub mod nodes;
pub mod process;
#[cfg(windows)]
pub mod windows;

// Re-export main types from core module
pub use core::types::{
    Address, MemoryError, MemoryResult, MemoryValue, ModuleInfo, ProcessArchitecture, ProcessId,
    ScanCompareType, ValueType,
};

pub use formula::{AddressResolver, Formula};
pub use import::{import_file, import_str, ImportReport};
pub use memory::{CancellationToken, MemoryBuffer, RegionCache, ScanSettings, Scanner};
pub use nodes::{ClassId, EvaluatedNode, Evaluator, Node, NodeKind, Project};
pub use process::{AccessMode, ProcessHandle, SnapshotBackend};

pub use core::{AUTHORS, VERSION};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Protection, RegionType};

    #[test]
    fn test_version_matches_package() {
        assert_eq!(VERSION, env!("CARGO_PKG_VERSION"));
        assert_eq!(AUTHORS, env!("CARGO_PKG_AUTHORS"));
    }

    #[test]
    fn test_reexports_compose() {
        let snapshot = SnapshotBackend::new(ProcessArchitecture::X64);
        snapshot
            .map(
                Address::new(0x1000),
                0x2000u64.to_le_bytes().to_vec(),
                Protection::READ_WRITE,
                RegionType::Private,
            )
            .unwrap();
        let handle = ProcessHandle::from_backends(7, Box::new(snapshot), None, AccessMode::Auto);

        let formula: Formula = "[1000] + 8".parse().unwrap();
        assert_eq!(formula.evaluate(&handle).unwrap(), Address::new(0x2008));
    }

    #[test]
    fn test_project_reexports() {
        let mut project = Project::new();
        let id = project.add_class("Player").unwrap();
        project
            .add_node(id, Node::new("health", NodeKind::Int32))
            .unwrap();
        assert_eq!(project.class_size(id, 8).unwrap(), 4);
        assert_eq!(project.find_class("Player"), Some(id));
    }
}
