//! Integration tests for importing legacy class files

use memclass::import::{import_file, import_str, Level};
use memclass::nodes::NodeKind;
use memclass::MemoryError;
use pretty_assertions::assert_eq;
use std::io::Write;

const PROJECT_2016: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!--ReClass 2016-->
<ReClass>
    <Class Name="Vehicle" Type="28" Comment="" Offset="0" strOffset="*&quot;client.dll&quot;+1C" Code="">
        <Node Name="speed" Type="13" Size="4" bHidden="0" Comment="m/s"/>
        <Node Name="flags" Type="31" Size="2" bHidden="0" Comment=""/>
        <Node Name="kills" Type="32" Size="8" bHidden="0" Comment=""/>
        <Node Name="wheels" Type="34" Size="8" bHidden="0" Comment="" Count="4" Pointer="Wheel"/>
        <Node Name="label" Type="18" Size="16" bHidden="0" Comment=""/>
    </Class>
    <Class Name="Wheel" Type="28" Comment="" Offset="0" strOffset="0" Code="">
        <Node Name="radius" Type="13" Size="4" bHidden="0" Comment=""/>
        <Node Name="owner" Type="8" Size="8" bHidden="0" Comment="" Pointer="Vehicle"/>
    </Class>
</ReClass>
"#;

#[test]
fn test_2016_types_and_references() {
    let (project, report) = import_str(PROJECT_2016, 8).unwrap();
    assert!(report.is_clean(), "{:?}", report);

    let vehicle = project.find_class("Vehicle").unwrap();
    let wheel = project.find_class("Wheel").unwrap();
    let class = project.class(vehicle).unwrap();
    assert_eq!(class.address.to_string(), "[<client.dll> + 0x1C]");

    let nodes = class.nodes();
    assert_eq!(nodes[0].comment, "m/s");
    match nodes[1].kind() {
        NodeKind::BitField(bits) => assert_eq!(bits.bits(), 16),
        other => panic!("expected a bit field, got {:?}", other),
    }
    assert_eq!(nodes[2].kind(), &NodeKind::UInt64);
    assert_eq!(
        nodes[3].kind(),
        &NodeKind::ClassPtrArray {
            inner: wheel,
            count: 4
        }
    );
    // Pointers may point back at their owner's class.
    assert_eq!(
        project.class(wheel).unwrap().nodes()[1].kind(),
        &NodeKind::ClassPtr { inner: vehicle }
    );
    assert_eq!(nodes[4].kind(), &NodeKind::Utf8Text { length: 16 });
}

#[test]
fn test_unknown_reference_skips_node() {
    let text = r#"<!--ReClass 2016-->
<ReClass>
    <Class Name="Vehicle">
        <Node Name="driver" Type="8" Size="8" Pointer="Driver"/>
        <Node Name="seats" Type="4" Size="4"/>
    </Class>
</ReClass>"#;
    let (project, report) = import_str(text, 8).unwrap();

    let vehicle = project.find_class("Vehicle").unwrap();
    let names: Vec<_> = project
        .class(vehicle)
        .unwrap()
        .nodes()
        .iter()
        .map(|n| n.name.as_str())
        .collect();
    assert_eq!(names, vec!["seats"]);
    assert_eq!(report.warnings().count(), 1);
    assert!(report.entries()[0].message.contains("Driver"));
}

#[test]
fn test_unknown_type_reports_error_then_warning() {
    let text = r#"<!--ReClass 2016-->
<ReClass>
    <Class Name="Broken">
        <Node Name="ok" Type="10" Size="4"/>
        <Node Name="future" Type="99" Size="4"/>
    </Class>
</ReClass>"#;
    let (project, report) = import_str(text, 8).unwrap();

    let broken = project.find_class("Broken").unwrap();
    assert_eq!(project.class(broken).unwrap().len(), 1);

    let levels: Vec<_> = report.entries().iter().map(|d| d.level).collect();
    assert_eq!(levels, vec![Level::Error, Level::Warning]);
    assert!(report.entries()[0].message.contains("99"));
    assert!(report.entries()[1].message.contains("<Node"));
}

#[test]
fn test_padding_follows_pointer_width() {
    let text = r#"<!--ReClass 2013-->
<ReClass>
    <Class Name="Pad">
        <Node Name="gap" Type="21" Size="13"/>
    </Class>
</ReClass>"#;

    let kinds = |pointer_size| {
        let (project, _) = import_str(text, pointer_size).unwrap();
        let id = project.find_class("Pad").unwrap();
        let kinds: Vec<_> = project
            .class(id)
            .unwrap()
            .nodes()
            .iter()
            .map(|n| n.kind().type_name())
            .collect();
        (kinds, project.class_size(id, pointer_size).unwrap())
    };

    assert_eq!(kinds(8), (vec!["Hex64", "Hex32", "Hex8"], 13));
    assert_eq!(kinds(4), (vec!["Hex32", "Hex32", "Hex32", "Hex8"], 13));
}

#[test]
fn test_oversized_nodes_are_bounded() {
    let text = r#"<!--ReClass 2016-->
<ReClass>
    <Class Name="Huge">
        <Node Name="bits" Type="31" Size="3000000000000000000"/>
        <Node Name="gap" Type="21" Size="4000000000"/>
        <Node Name="tail" Type="10" Size="4"/>
    </Class>
</ReClass>"#;
    let (project, report) = import_str(text, 8).unwrap();
    let id = project.find_class("Huge").unwrap();
    let nodes = project.class(id).unwrap().nodes();

    assert_eq!(nodes[0].kind().type_name(), "BitField");
    assert_eq!(nodes.last().unwrap().name, "tail");
    // 8 bits, 64 KiB of padding in Hex64 nodes, then the int
    assert_eq!(nodes.len(), 1 + 0x10000 / 8 + 1);
    assert_eq!(project.class_size(id, 8).unwrap(), 8 + 0x10000 + 4);

    assert_eq!(report.errors().count(), 0);
    assert_eq!(report.warnings().count(), 1);
    assert!(report.warnings().any(|w| w.message.contains("4000000000")));
}

#[test]
fn test_malformed_numbers_default_with_warning() {
    let text = r#"<!--ReClass 2016-->
<ReClass>
    <Class Name="Texts">
        <Node Name="name" Type="19" Size="many"/>
    </Class>
</ReClass>"#;
    let (project, report) = import_str(text, 8).unwrap();
    let id = project.find_class("Texts").unwrap();
    assert_eq!(
        project.class(id).unwrap().nodes()[0].kind(),
        &NodeKind::Utf16Text { length: 0 }
    );
    assert_eq!(report.warnings().count(), 1);
    assert_eq!(report.errors().count(), 0);
}

#[test]
fn test_import_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(PROJECT_2016.as_bytes()).unwrap();

    let (project, _) = import_file(file.path(), 8).unwrap();
    assert_eq!(project.len(), 2);

    assert!(matches!(
        import_file(file.path().with_extension("missing"), 8),
        Err(MemoryError::IoError(_))
    ));
}

#[test]
fn test_not_xml_is_rejected() {
    assert!(matches!(
        import_str("<ReClass><Class Name=\"A\"></ReClass>", 8),
        Err(MemoryError::ImportFailed(_))
    ));
}
