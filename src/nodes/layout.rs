//! Byte layout of a class and the editable regions inside it

use super::kind::{ClassId, NodeKind};
use super::project::Project;
use crate::core::types::MemoryResult;
use serde::Serialize;

/// Part of a node an edit is aimed at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubField {
    /// The node as a whole
    Value,
    /// One float of a vector or matrix
    Component(usize),
    /// One bit field member
    Member(usize),
    /// One virtual method of a vtable
    Method(usize),
    /// One array element
    Element(usize),
}

/// Byte range that maps back to a `(node, sub-field)` pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HotSpot {
    /// Index of the node in its class
    pub node: usize,
    pub field: SubField,
    /// Offset from the start of the class
    pub offset: usize,
    pub size: usize,
}

impl HotSpot {
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.offset && offset - self.offset < self.size
    }
}

/// Placement of one node
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeLayout {
    pub index: usize,
    pub name: String,
    pub type_name: &'static str,
    pub offset: usize,
    pub size: usize,
    pub hidden: bool,
}

/// Offsets of every node in a class plus the hot spots over them
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassLayout {
    pub class: ClassId,
    pub size: usize,
    pub nodes: Vec<NodeLayout>,
    pub hot_spots: Vec<HotSpot>,
}

impl ClassLayout {
    /// Computes the layout for the given pointer width.
    ///
    /// Hidden nodes keep their bytes but get no hot spots.
    pub fn compute(project: &Project, class: ClassId, pointer_size: usize) -> MemoryResult<Self> {
        let mut nodes = Vec::new();
        let mut hot_spots = Vec::new();
        let mut offset = 0usize;

        for (index, node) in project.class(class)?.nodes().iter().enumerate() {
            let size = project.node_size(node, pointer_size)?;
            nodes.push(NodeLayout {
                index,
                name: node.name.clone(),
                type_name: node.kind().type_name(),
                offset,
                size,
                hidden: node.hidden,
            });

            if !node.hidden {
                let mut spot = |field, start: usize, len: usize| {
                    hot_spots.push(HotSpot {
                        node: index,
                        field,
                        offset: offset + start,
                        size: len,
                    })
                };

                match node.kind() {
                    NodeKind::ClassInstanceArray { count, .. } => {
                        let element = if *count == 0 { 0 } else { size / count };
                        for i in 0..*count {
                            spot(SubField::Element(i), i * element, element);
                        }
                    }
                    NodeKind::ClassPtrArray { count, .. } => {
                        for i in 0..*count {
                            spot(SubField::Element(i), i * pointer_size, pointer_size);
                        }
                    }
                    kind => {
                        spot(SubField::Value, 0, size);
                        match kind {
                            NodeKind::BitField(field) => {
                                for i in 0..field.members().len() {
                                    let (start, len) = field.member_span(i)?;
                                    spot(SubField::Member(i), start, len);
                                }
                            }
                            NodeKind::VTable { methods } => {
                                for i in 0..methods.len() {
                                    spot(SubField::Method(i), 0, size);
                                }
                            }
                            _ => {
                                for i in 0..kind.float_count() {
                                    spot(SubField::Component(i), i * 4, 4);
                                }
                            }
                        }
                    }
                }
            }

            offset = offset.saturating_add(size);
        }

        Ok(ClassLayout {
            class,
            size: offset,
            nodes,
            hot_spots,
        })
    }

    /// The node whose bytes include `offset`
    pub fn node_at(&self, offset: usize) -> Option<&NodeLayout> {
        self.nodes
            .iter()
            .find(|n| offset >= n.offset && offset - n.offset < n.size)
    }

    /// The narrowest hot spot containing `offset`; the first one wins a tie
    pub fn hot_spot_at(&self, offset: usize) -> Option<&HotSpot> {
        self.hot_spots
            .iter()
            .filter(|spot| spot.contains(offset))
            .fold(None, |best: Option<&HotSpot>, spot| match best {
                Some(b) if b.size <= spot.size => Some(b),
                _ => Some(spot),
            })
    }

    /// The hot spot for a given node and sub-field
    pub fn hot_spot(&self, node: usize, field: SubField) -> Option<&HotSpot> {
        self.hot_spots
            .iter()
            .find(|spot| spot.node == node && spot.field == field)
    }
}
