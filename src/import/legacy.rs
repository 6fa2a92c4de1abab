//! Import of ReClass 2011-2016 XML class files
//!
//! Classes are created in a first pass so nodes may refer to classes
//! declared later in the file. Problems with single nodes never abort the
//! import: the node is skipped or patched and the problem is recorded in
//! the [`ImportReport`].

use super::report::ImportReport;
use super::tables::{LegacyType, LegacyVersion};
use crate::core::types::{MemoryError, MemoryResult};
use crate::formula::{normalize_legacy, Formula};
use crate::nodes::{BitField, ClassId, Node, NodeKind, Project, VMethod};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Largest padding or inline text a single legacy node may declare
const MAX_NODE_SIZE: usize = 0x10000;

/// Parsed element with owned attributes
#[derive(Debug, Clone, Default)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> MemoryResult<Self> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute
                .map_err(|e| MemoryError::ImportFailed(format!("bad attribute on <{}>: {}", name, e)))?;
            let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
            let value = attribute
                .unescape_value()
                .map_err(|e| MemoryError::ImportFailed(format!("bad value for {}: {}", key, e)))?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(Element {
            name,
            attributes,
            children: Vec::new(),
        })
    }

    fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Start tag as it appeared, for diagnostics
    fn dump(&self) -> String {
        let mut out = format!("<{}", self.name);
        for (key, value) in &self.attributes {
            out.push_str(&format!(" {}=\"{}\"", key, value));
        }
        out.push_str("/>");
        out
    }
}

/// Header comment plus root element
fn parse_document(text: &str) -> MemoryResult<(Option<String>, Element)> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut comment = None;
    let mut stack: Vec<Element> = Vec::new();
    let mut root = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            MemoryError::ImportFailed(format!(
                "malformed XML at byte {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        match event {
            Event::Comment(text) if root.is_none() && stack.is_empty() && comment.is_none() => {
                comment = Some(String::from_utf8_lossy(&text).trim().to_string());
            }
            Event::Start(start) => stack.push(Element::from_start(&start)?),
            Event::Empty(start) => {
                let element = Element::from_start(&start)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => root = root.or(Some(element)),
                }
            }
            Event::End(_) => {
                if let Some(element) = stack.pop() {
                    match stack.last_mut() {
                        Some(parent) => parent.children.push(element),
                        None => root = root.or(Some(element)),
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    let root = root.ok_or_else(|| MemoryError::ImportFailed("document has no root element".to_string()))?;
    Ok((comment, root))
}

/// Imports a legacy class file from text.
///
/// `pointer_size` is the width of the target the classes will be used
/// with; it decides how padding nodes are split into hex nodes.
pub fn import_str(text: &str, pointer_size: usize) -> MemoryResult<(Project, ImportReport)> {
    let (comment, root) = parse_document(text)?;
    let mut report = ImportReport::new();

    let version = match comment.as_deref().and_then(LegacyVersion::detect) {
        Some(version) => version,
        None => {
            report.warning(format!(
                "No version comment found ({:?}), assuming {}",
                comment.unwrap_or_default(),
                LegacyVersion::V2016
            ));
            LegacyVersion::V2016
        }
    };
    debug!("Importing {} document with root <{}>", version, root.name);

    let mut importer = Importer {
        project: Project::new(),
        report,
        version,
        pointer_size,
    };
    importer.run(&root);

    info!(
        "Imported {} classes ({} warnings, {} errors)",
        importer.project.len(),
        importer.report.warnings().count(),
        importer.report.errors().count()
    );
    Ok((importer.project, importer.report))
}

/// Imports a legacy class file from disk
pub fn import_file(path: impl AsRef<Path>, pointer_size: usize) -> MemoryResult<(Project, ImportReport)> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    debug!("Read {} bytes from {}", text.len(), path.display());
    import_str(&text, pointer_size)
}

struct Importer {
    project: Project,
    report: ImportReport,
    version: LegacyVersion,
    pointer_size: usize,
}

impl Importer {
    fn run(&mut self, root: &Element) {
        let mut classes = Vec::new();
        for element in root.children_named("Class") {
            if let Some(id) = self.declare_class(element) {
                classes.push((id, element));
            }
        }

        for (id, element) in classes {
            let class_name = element.attr("Name").unwrap_or_default();
            for node in element.children_named("Node") {
                self.import_node(id, class_name, node);
            }
        }
    }

    fn declare_class(&mut self, element: &Element) -> Option<ClassId> {
        let Some(name) = element.attr("Name").filter(|n| !n.trim().is_empty()) else {
            self.report.warning(format!(
                "{}, skipping {}",
                MemoryError::missing_attribute("Class", "Name"),
                element.dump()
            ));
            return None;
        };

        let id = match self.project.add_class(name) {
            Ok(id) => id,
            Err(err) => {
                self.report.warning(format!("Skipping class {}: {}", name, err));
                return None;
            }
        };

        // strOffset holds the address string; Offset is a plain decimal number.
        let formula = match (element.attr("strOffset"), element.attr("Offset")) {
            (Some(text), _) => Some((text, normalize_legacy(text).parse::<Formula>())),
            (None, Some(text)) => Some((
                text,
                text.trim()
                    .parse::<u64>()
                    .map(Formula::offset)
                    .map_err(|_| MemoryError::parse_error(text, "expected a decimal offset")),
            )),
            (None, None) => None,
        };

        // The class was just added, so the lookup succeeds.
        if let Ok(class) = self.project.class_mut(id) {
            class.comment = element.attr("Comment").unwrap_or_default().to_string();
            match formula {
                Some((_, Ok(formula))) => class.address = formula,
                Some((text, Err(err))) => self.report.warning(format!(
                    "Class {} has an unusable address {:?}: {}",
                    name, text, err
                )),
                None => {}
            }
        }
        Some(id)
    }

    fn import_node(&mut self, class: ClassId, class_name: &str, element: &Element) {
        let name = element.attr("Name").unwrap_or_default().to_string();
        let index = self.number(element, "Type");

        let Some(legacy) = self.version.lookup(index) else {
            self.report.error(format!(
                "{} for node {:?} in class {}",
                MemoryError::UnknownNodeType(index.to_string()),
                name,
                class_name
            ));
            self.report.warning(format!("Skipped element {}", element.dump()));
            return;
        };

        let kinds = match self.convert(legacy, element, &name, class_name) {
            Some(kinds) => kinds,
            None => return,
        };

        let comment = element.attr("Comment").unwrap_or_default();
        let hidden = element.attr("bHidden") == Some("1");
        let count = kinds.len();

        for (i, kind) in kinds.into_iter().enumerate() {
            let node_name = if i == 0 { name.clone() } else { format!("{}_{}", name, i) };
            let node = Node::new(node_name, kind).with_comment(comment).hidden(hidden);
            if let Err(err) = self.project.add_node(class, node) {
                self.report.warning(format!(
                    "Skipping node {:?} in class {}: {}",
                    name, class_name, err
                ));
                return;
            }
        }

        if count > 1 {
            debug!("Expanded {:?} into {} hex nodes", name, count);
        }
    }

    /// Node kinds for one element; padding can yield several
    fn convert(
        &mut self,
        legacy: LegacyType,
        element: &Element,
        name: &str,
        class_name: &str,
    ) -> Option<Vec<NodeKind>> {
        let kind = match legacy {
            LegacyType::Hex8 => NodeKind::Hex8,
            LegacyType::Hex16 => NodeKind::Hex16,
            LegacyType::Hex32 => NodeKind::Hex32,
            LegacyType::Hex64 => NodeKind::Hex64,
            LegacyType::Int8 => NodeKind::Int8,
            LegacyType::Int16 => NodeKind::Int16,
            LegacyType::Int32 => NodeKind::Int32,
            LegacyType::Int64 => NodeKind::Int64,
            LegacyType::UInt8 => NodeKind::UInt8,
            LegacyType::UInt16 => NodeKind::UInt16,
            LegacyType::UInt32 => NodeKind::UInt32,
            LegacyType::UInt64 => NodeKind::UInt64,
            LegacyType::Float => NodeKind::Float,
            LegacyType::Double => NodeKind::Double,
            LegacyType::Vector2 => NodeKind::Vector2,
            LegacyType::Vector3 => NodeKind::Vector3,
            LegacyType::Vector4 => NodeKind::Vector4,
            LegacyType::Matrix4x4 => NodeKind::Matrix4x4,
            LegacyType::FunctionPtr => NodeKind::FunctionPtr,
            LegacyType::Utf8TextPtr => NodeKind::Utf8TextPtr,
            LegacyType::Utf16TextPtr => NodeKind::Utf16TextPtr,
            LegacyType::Utf8Text => NodeKind::Utf8Text {
                length: self.bounded_size(element, name, class_name),
            },
            LegacyType::Utf16Text => NodeKind::Utf16Text {
                length: self.bounded_size(element, name, class_name) / 2,
            },
            LegacyType::Custom => {
                let size = self.bounded_size(element, name, class_name);
                return Some(self.padding(size));
            }
            LegacyType::BitField => {
                let bits = self.size(element).saturating_mul(8).clamp(1, 64) as u32;
                NodeKind::BitField(BitField::new(bits).ok()?)
            }
            LegacyType::VTable => NodeKind::VTable {
                methods: element
                    .children_named("Function")
                    .map(|f| VMethod {
                        name: f.attr("Name").unwrap_or_default().to_string(),
                        comment: f.attr("Comment").unwrap_or_default().to_string(),
                    })
                    .collect(),
            },
            LegacyType::ClassPtr => NodeKind::ClassPtr {
                inner: self.reference(element, &["Pointer"], name, class_name)?,
            },
            LegacyType::ClassInstance => NodeKind::ClassInstance {
                inner: self.reference(element, &["Instance", "Pointer"], name, class_name)?,
            },
            LegacyType::ClassPtrArray => NodeKind::ClassPtrArray {
                inner: self.reference(element, &["Pointer"], name, class_name)?,
                count: self.count(element),
            },
            LegacyType::ClassInstanceArray => NodeKind::ClassInstanceArray {
                inner: self.reference(element, &["Instance"], name, class_name)?,
                count: self.count(element),
            },
        };
        Some(vec![kind])
    }

    /// Hex nodes covering `size` bytes, widest first
    fn padding(&mut self, size: usize) -> Vec<NodeKind> {
        let mut remaining = size;
        let mut kinds = Vec::new();

        let widest = if self.pointer_size >= 8 { 8 } else { 4 };
        for width in [8usize, 4, 2, 1] {
            if width > widest {
                continue;
            }
            while remaining >= width {
                kinds.push(match width {
                    8 => NodeKind::Hex64,
                    4 => NodeKind::Hex32,
                    2 => NodeKind::Hex16,
                    _ => NodeKind::Hex8,
                });
                remaining -= width;
            }
        }

        if kinds.is_empty() {
            self.report.warning("Padding node with zero size produced no nodes");
        }
        kinds
    }

    /// Resolves the referenced class named by the first present attribute,
    /// or by a child `<Array Name=...>`
    fn reference(
        &mut self,
        element: &Element,
        keys: &[&str],
        name: &str,
        class_name: &str,
    ) -> Option<ClassId> {
        let target = keys
            .iter()
            .find_map(|key| element.attr(key))
            .or_else(|| element.children_named("Array").find_map(|a| a.attr("Name")));

        let Some(target) = target else {
            self.report.warning(format!(
                "Skipping node {:?} in class {}: no referenced class given",
                name, class_name
            ));
            return None;
        };

        let found = self.project.find_class(target);
        if found.is_none() {
            self.report.warning(format!(
                "Skipping node {:?} in class {}: unknown class {:?}",
                name, class_name, target
            ));
        }
        found
    }

    fn size(&mut self, element: &Element) -> usize {
        usize::try_from(self.number(element, "Size")).unwrap_or(usize::MAX)
    }

    /// Size clamped to [`MAX_NODE_SIZE`], with a warning when it had to be
    fn bounded_size(&mut self, element: &Element, name: &str, class_name: &str) -> usize {
        let size = self.size(element);
        if size > MAX_NODE_SIZE {
            self.report.warning(format!(
                "Node {:?} in class {} declares {} bytes, truncated to {}",
                name, class_name, size, MAX_NODE_SIZE
            ));
        }
        size.min(MAX_NODE_SIZE)
    }

    fn count(&mut self, element: &Element) -> usize {
        let key = if element.attr("Total").is_some() { "Total" } else { "Count" };
        usize::try_from(self.number(element, key)).unwrap_or(usize::MAX)
    }

    /// Reads a decimal attribute; missing or malformed values become 0
    fn number(&mut self, element: &Element, key: &str) -> u64 {
        match element.attr(key).map(|v| v.trim().parse::<u64>()) {
            Some(Ok(value)) => value,
            Some(Err(_)) | None => {
                let name = element.attr("Name").unwrap_or_default();
                self.report.warning(format!(
                    "{} on {:?}, using 0",
                    MemoryError::missing_attribute(element.name.clone(), key),
                    name
                ));
                0
            }
        }
    }
}
