//! Node kinds and the node record

use super::bitfield::BitField;
use serde::Serialize;
use std::fmt;

/// Stable handle of a class inside a [`Project`](super::Project)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ClassId(pub(crate) usize);

impl ClassId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Virtual method descriptor. Its address is only known at evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VMethod {
    pub name: String,
    pub comment: String,
}

impl VMethod {
    pub fn new(name: impl Into<String>) -> Self {
        VMethod {
            name: name.into(),
            comment: String::new(),
        }
    }
}

/// What a node is and, for parameterised kinds, its parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum NodeKind {
    Hex8,
    Hex16,
    Hex32,
    Hex64,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Bool,
    Float,
    Double,
    Vector2,
    Vector3,
    Vector4,
    Matrix3x3,
    Matrix3x4,
    Matrix4x4,
    /// Inline UTF-8 text, `length` in bytes
    Utf8Text { length: usize },
    /// Inline UTF-16 text, `length` in code units
    Utf16Text { length: usize },
    Utf8TextPtr,
    Utf16TextPtr,
    Pointer,
    FunctionPtr,
    BitField(BitField),
    ClassPtr { inner: ClassId },
    ClassInstance { inner: ClassId },
    ClassPtrArray { inner: ClassId, count: usize },
    ClassInstanceArray { inner: ClassId, count: usize },
    VTable { methods: Vec<VMethod> },
}

impl NodeKind {
    /// Short type name used in listings and diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::Hex8 => "Hex8",
            NodeKind::Hex16 => "Hex16",
            NodeKind::Hex32 => "Hex32",
            NodeKind::Hex64 => "Hex64",
            NodeKind::Int8 => "Int8",
            NodeKind::Int16 => "Int16",
            NodeKind::Int32 => "Int32",
            NodeKind::Int64 => "Int64",
            NodeKind::UInt8 => "UInt8",
            NodeKind::UInt16 => "UInt16",
            NodeKind::UInt32 => "UInt32",
            NodeKind::UInt64 => "UInt64",
            NodeKind::Bool => "Bool",
            NodeKind::Float => "Float",
            NodeKind::Double => "Double",
            NodeKind::Vector2 => "Vector2",
            NodeKind::Vector3 => "Vector3",
            NodeKind::Vector4 => "Vector4",
            NodeKind::Matrix3x3 => "Matrix3x3",
            NodeKind::Matrix3x4 => "Matrix3x4",
            NodeKind::Matrix4x4 => "Matrix4x4",
            NodeKind::Utf8Text { .. } => "Utf8Text",
            NodeKind::Utf16Text { .. } => "Utf16Text",
            NodeKind::Utf8TextPtr => "Utf8TextPtr",
            NodeKind::Utf16TextPtr => "Utf16TextPtr",
            NodeKind::Pointer => "Pointer",
            NodeKind::FunctionPtr => "FunctionPtr",
            NodeKind::BitField(_) => "BitField",
            NodeKind::ClassPtr { .. } => "ClassPtr",
            NodeKind::ClassInstance { .. } => "ClassInstance",
            NodeKind::ClassPtrArray { .. } => "ClassPtrArray",
            NodeKind::ClassInstanceArray { .. } => "ClassInstanceArray",
            NodeKind::VTable { .. } => "VTable",
        }
    }

    /// Size in bytes when it does not depend on another class.
    ///
    /// `None` for kinds that embed a class by value.
    pub fn fixed_size(&self, pointer_size: usize) -> Option<usize> {
        let size = match self {
            NodeKind::Hex8 | NodeKind::Int8 | NodeKind::UInt8 | NodeKind::Bool => 1,
            NodeKind::Hex16 | NodeKind::Int16 | NodeKind::UInt16 => 2,
            NodeKind::Hex32 | NodeKind::Int32 | NodeKind::UInt32 | NodeKind::Float => 4,
            NodeKind::Hex64 | NodeKind::Int64 | NodeKind::UInt64 | NodeKind::Double => 8,
            NodeKind::Vector2 | NodeKind::Vector3 | NodeKind::Vector4 => {
                4 * self.float_count()
            }
            NodeKind::Matrix3x3 | NodeKind::Matrix3x4 | NodeKind::Matrix4x4 => {
                4 * self.float_count()
            }
            NodeKind::Utf8Text { length } => *length,
            NodeKind::Utf16Text { length } => length.saturating_mul(2),
            NodeKind::Utf8TextPtr
            | NodeKind::Utf16TextPtr
            | NodeKind::Pointer
            | NodeKind::FunctionPtr
            | NodeKind::ClassPtr { .. }
            | NodeKind::VTable { .. } => pointer_size,
            NodeKind::ClassPtrArray { count, .. } => count.saturating_mul(pointer_size),
            NodeKind::BitField(field) => field.size(),
            NodeKind::ClassInstance { .. } | NodeKind::ClassInstanceArray { .. } => return None,
        };
        Some(size)
    }

    /// Number of `f32` components for vector and matrix kinds
    pub fn float_count(&self) -> usize {
        match self {
            NodeKind::Vector2 => 2,
            NodeKind::Vector3 => 3,
            NodeKind::Vector4 => 4,
            NodeKind::Matrix3x3 => 9,
            NodeKind::Matrix3x4 => 12,
            NodeKind::Matrix4x4 => 16,
            _ => 0,
        }
    }

    /// Class referenced by this node, if any
    pub fn inner(&self) -> Option<ClassId> {
        match self {
            NodeKind::ClassPtr { inner }
            | NodeKind::ClassInstance { inner }
            | NodeKind::ClassPtrArray { inner, .. }
            | NodeKind::ClassInstanceArray { inner, .. } => Some(*inner),
            _ => None,
        }
    }

    pub(crate) fn inner_mut(&mut self) -> Option<&mut ClassId> {
        match self {
            NodeKind::ClassPtr { inner }
            | NodeKind::ClassInstance { inner }
            | NodeKind::ClassPtrArray { inner, .. }
            | NodeKind::ClassInstanceArray { inner, .. } => Some(inner),
            _ => None,
        }
    }

    /// True when the referenced class is embedded rather than pointed to
    pub fn embeds_inner(&self) -> bool {
        matches!(
            self,
            NodeKind::ClassInstance { .. } | NodeKind::ClassInstanceArray { .. }
        )
    }

    /// Pointer-style references may form cycles, so they skip the check
    pub fn skips_cycle_check(&self) -> bool {
        matches!(self, NodeKind::ClassPtr { .. } | NodeKind::ClassPtrArray { .. })
    }
}

/// One typed field of a class
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Node {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub comment: String,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
    #[serde(flatten)]
    kind: NodeKind,
}

impl Node {
    pub fn new(name: impl Into<String>, kind: NodeKind) -> Self {
        Node {
            name: name.into(),
            comment: String::new(),
            hidden: false,
            kind,
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    /// Kind edits that can change references go through the project
    pub(crate) fn kind_mut(&mut self) -> &mut NodeKind {
        &mut self.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_sizes() {
        assert_eq!(NodeKind::Hex8.fixed_size(8), Some(1));
        assert_eq!(NodeKind::Double.fixed_size(8), Some(8));
        assert_eq!(NodeKind::Vector3.fixed_size(8), Some(12));
        assert_eq!(NodeKind::Matrix3x4.fixed_size(8), Some(48));
        assert_eq!(NodeKind::Matrix4x4.fixed_size(4), Some(64));
        assert_eq!(NodeKind::Utf16Text { length: 5 }.fixed_size(8), Some(10));
        assert_eq!(NodeKind::Pointer.fixed_size(4), Some(4));
        assert_eq!(NodeKind::VTable { methods: vec![] }.fixed_size(8), Some(8));
        assert_eq!(
            NodeKind::ClassPtrArray { inner: ClassId(0), count: 3 }.fixed_size(4),
            Some(12)
        );
        assert_eq!(NodeKind::ClassInstance { inner: ClassId(0) }.fixed_size(8), None);
    }

    #[test]
    fn test_reference_classification() {
        let ptr = NodeKind::ClassPtr { inner: ClassId(2) };
        let inst = NodeKind::ClassInstanceArray { inner: ClassId(3), count: 1 };
        assert_eq!(ptr.inner(), Some(ClassId(2)));
        assert!(ptr.skips_cycle_check());
        assert!(!ptr.embeds_inner());
        assert!(inst.embeds_inner());
        assert!(!inst.skips_cycle_check());
        assert_eq!(NodeKind::Int32.inner(), None);
    }

    #[test]
    fn test_node_serializes_flat() {
        let node = Node::new("health", NodeKind::Int32);
        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json, serde_json::json!({"name": "health", "kind": "Int32"}));
    }
}
