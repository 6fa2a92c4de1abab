//! Class arena with structural edits and the containment cycle check

use super::class::ClassNode;
use super::kind::{ClassId, Node, NodeKind};
use super::layout::ClassLayout;
use crate::core::types::{MemoryError, MemoryResult};
use std::collections::HashSet;
use tracing::debug;

/// Owns every class. Classes refer to each other by [`ClassId`].
///
/// The containment graph formed by [`NodeKind::ClassInstance`] and
/// [`NodeKind::ClassInstanceArray`] edges is kept acyclic: every edit that
/// could add such an edge is checked first and rejected with
/// `CycleDetected`, leaving the project untouched. Pointer references are
/// not checked.
#[derive(Debug, Clone, Default)]
pub struct Project {
    classes: Vec<Option<ClassNode>>,
}

impl Project {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an empty class. Names must be unique and non-empty.
    pub fn add_class(&mut self, name: impl Into<String>) -> MemoryResult<ClassId> {
        let name = self.check_name(name.into(), None)?;
        let id = ClassId(self.classes.len());
        debug!("Added class {} as {}", name, id);
        self.classes.push(Some(ClassNode::new(name)));
        Ok(id)
    }

    /// Removes a class that no other class references
    pub fn remove_class(&mut self, id: ClassId) -> MemoryResult<ClassNode> {
        let name = self.class(id)?.name().to_string();
        if self.references_to(id).iter().any(|(owner, _)| *owner != id) {
            return Err(MemoryError::ClassInUse(name));
        }

        let removed = self.classes[id.0].take();
        debug!("Removed class {}", name);
        removed.ok_or_else(|| MemoryError::ClassNotFound(id.to_string()))
    }

    pub fn rename_class(&mut self, id: ClassId, name: impl Into<String>) -> MemoryResult<()> {
        let name = self.check_name(name.into(), Some(id))?;
        self.class_mut(id)?.set_name(name);
        Ok(())
    }

    pub fn class(&self, id: ClassId) -> MemoryResult<&ClassNode> {
        self.classes
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| MemoryError::ClassNotFound(id.to_string()))
    }

    /// Mutable access to a class's comment and address
    pub fn class_mut(&mut self, id: ClassId) -> MemoryResult<&mut ClassNode> {
        self.classes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| MemoryError::ClassNotFound(id.to_string()))
    }

    pub fn find_class(&self, name: &str) -> Option<ClassId> {
        self.classes()
            .find(|(_, class)| class.name() == name)
            .map(|(id, _)| id)
    }

    /// Live classes in creation order
    pub fn classes(&self) -> impl Iterator<Item = (ClassId, &ClassNode)> {
        self.classes
            .iter()
            .enumerate()
            .filter_map(|(index, class)| class.as_ref().map(|c| (ClassId(index), c)))
    }

    pub fn len(&self) -> usize {
        self.classes().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every `(class, node index)` whose node refers to `target`
    pub fn references_to(&self, target: ClassId) -> Vec<(ClassId, usize)> {
        self.classes()
            .flat_map(|(id, class)| {
                class
                    .nodes()
                    .iter()
                    .enumerate()
                    .filter(move |(_, node)| node.kind().inner() == Some(target))
                    .map(move |(index, _)| (id, index))
            })
            .collect()
    }

    pub fn add_node(&mut self, class: ClassId, node: Node) -> MemoryResult<usize> {
        let index = self.class(class)?.len();
        self.insert_node(class, index, node)?;
        Ok(index)
    }

    pub fn insert_node(&mut self, class: ClassId, index: usize, node: Node) -> MemoryResult<()> {
        let len = self.class(class)?.len();
        if index > len {
            return Err(MemoryError::InvalidNode(format!(
                "insert position {} past end of {} nodes",
                index, len
            )));
        }
        self.validate_kind(class, node.kind())?;
        self.class_mut(class)?.nodes_mut().insert(index, node);
        Ok(())
    }

    pub fn remove_node(&mut self, class: ClassId, index: usize) -> MemoryResult<Node> {
        self.node(class, index)?;
        Ok(self.class_mut(class)?.nodes_mut().remove(index))
    }

    /// Moves the node at `from` so that it ends up at `to`
    pub fn move_node(&mut self, class: ClassId, from: usize, to: usize) -> MemoryResult<()> {
        self.node(class, from)?;
        self.node(class, to)?;
        let nodes = self.class_mut(class)?.nodes_mut();
        let node = nodes.remove(from);
        nodes.insert(to, node);
        Ok(())
    }

    /// Swaps in a new node, returning the old one
    pub fn replace_node(&mut self, class: ClassId, index: usize, node: Node) -> MemoryResult<Node> {
        self.node(class, index)?;
        self.validate_kind(class, node.kind())?;
        let slot = &mut self.class_mut(class)?.nodes_mut()[index];
        Ok(std::mem::replace(slot, node))
    }

    pub fn node(&self, class: ClassId, index: usize) -> MemoryResult<&Node> {
        let class_node = self.class(class)?;
        class_node.node(index).ok_or_else(|| {
            MemoryError::InvalidNode(format!(
                "{} has no node #{} ({} nodes)",
                class_node.name(),
                index,
                class_node.len()
            ))
        })
    }

    /// Mutable access to a node's name, comment and visibility
    pub fn node_mut(&mut self, class: ClassId, index: usize) -> MemoryResult<&mut Node> {
        self.node(class, index)?;
        Ok(&mut self.class_mut(class)?.nodes_mut()[index])
    }

    /// Sets an array's element count. Negative counts clamp to zero.
    pub fn set_array_count(&mut self, class: ClassId, index: usize, count: i64) -> MemoryResult<usize> {
        let clamped = usize::try_from(count.max(0)).unwrap_or(usize::MAX);
        match self.node_mut(class, index)?.kind_mut() {
            NodeKind::ClassPtrArray { count, .. } | NodeKind::ClassInstanceArray { count, .. } => {
                *count = clamped;
                Ok(clamped)
            }
            other => Err(MemoryError::InvalidNode(format!(
                "{} has no element count",
                other.type_name()
            ))),
        }
    }

    pub fn set_bitfield_bits(&mut self, class: ClassId, index: usize, bits: u32) -> MemoryResult<()> {
        match self.node_mut(class, index)?.kind_mut() {
            NodeKind::BitField(field) => field.set_bits(bits),
            other => Err(MemoryError::InvalidNode(format!(
                "{} is not a bit field",
                other.type_name()
            ))),
        }
    }

    pub fn set_text_length(&mut self, class: ClassId, index: usize, length: usize) -> MemoryResult<()> {
        match self.node_mut(class, index)?.kind_mut() {
            NodeKind::Utf8Text { length: current } | NodeKind::Utf16Text { length: current } => {
                *current = length;
                Ok(())
            }
            other => Err(MemoryError::InvalidNode(format!(
                "{} has no text length",
                other.type_name()
            ))),
        }
    }

    /// Points a reference node at a different class.
    ///
    /// Embedding references are rejected with `CycleDetected` when
    /// `candidate` already contains `class` by value, directly or
    /// through other classes. Pointer references are always accepted.
    pub fn change_inner_node(
        &mut self,
        class: ClassId,
        index: usize,
        candidate: ClassId,
    ) -> MemoryResult<()> {
        self.class(candidate)?;
        let kind = self.node(class, index)?.kind();
        if kind.inner().is_none() {
            return Err(MemoryError::InvalidNode(format!(
                "{} does not reference a class",
                kind.type_name()
            )));
        }
        if !kind.skips_cycle_check() {
            self.check_embedding(class, candidate)?;
        }

        if let Some(inner) = self.node_mut(class, index)?.kind_mut().inner_mut() {
            *inner = candidate;
        }
        Ok(())
    }

    /// Bytes of one instance of `class`
    pub fn class_size(&self, class: ClassId, pointer_size: usize) -> MemoryResult<usize> {
        self.class(class)?
            .nodes()
            .iter()
            .try_fold(0usize, |total, node| {
                Ok(total.saturating_add(self.node_size(node, pointer_size)?))
            })
    }

    pub fn node_size(&self, node: &Node, pointer_size: usize) -> MemoryResult<usize> {
        if let Some(size) = node.kind().fixed_size(pointer_size) {
            return Ok(size);
        }
        match node.kind() {
            NodeKind::ClassInstance { inner } => self.class_size(*inner, pointer_size),
            NodeKind::ClassInstanceArray { inner, count } => {
                Ok(self.class_size(*inner, pointer_size)?.saturating_mul(*count))
            }
            other => Err(MemoryError::InvalidNode(format!(
                "no size rule for {}",
                other.type_name()
            ))),
        }
    }

    /// Byte offset of node `index`; `index == len` gives the class size
    pub fn child_offset(&self, class: ClassId, index: usize, pointer_size: usize) -> MemoryResult<usize> {
        let class_node = self.class(class)?;
        if index > class_node.len() {
            return Err(MemoryError::InvalidNode(format!(
                "{} has no node #{}",
                class_node.name(),
                index
            )));
        }
        class_node.nodes()[..index]
            .iter()
            .try_fold(0usize, |total, node| {
                Ok(total.saturating_add(self.node_size(node, pointer_size)?))
            })
    }

    /// Node offsets and editable hot spots of a class
    pub fn layout(&self, class: ClassId, pointer_size: usize) -> MemoryResult<ClassLayout> {
        ClassLayout::compute(self, class, pointer_size)
    }

    fn check_name(&self, name: String, renaming: Option<ClassId>) -> MemoryResult<String> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(MemoryError::InvalidNode("class name is empty".to_string()));
        }
        match self.find_class(&name) {
            Some(existing) if Some(existing) != renaming => Err(MemoryError::DuplicateClassName(name)),
            _ => Ok(name),
        }
    }

    fn validate_kind(&self, owner: ClassId, kind: &NodeKind) -> MemoryResult<()> {
        if let Some(inner) = kind.inner() {
            self.class(inner)?;
            if kind.embeds_inner() {
                self.check_embedding(owner, inner)?;
            }
        }
        Ok(())
    }

    fn check_embedding(&self, owner: ClassId, candidate: ClassId) -> MemoryResult<()> {
        if owner == candidate || self.embeds(candidate, owner) {
            let name = |id| self.class(id).map(|c| c.name().to_string()).unwrap_or_default();
            return Err(MemoryError::cycle_detected(&name(owner), &name(candidate)));
        }
        Ok(())
    }

    /// Whether `from` contains `target` by value at any depth
    fn embeds(&self, from: ClassId, target: ClassId) -> bool {
        let mut seen = HashSet::new();
        let mut pending = vec![from];

        while let Some(current) = pending.pop() {
            if !seen.insert(current) {
                continue;
            }
            let Ok(class) = self.class(current) else {
                continue;
            };
            for node in class.nodes() {
                if !node.kind().embeds_inner() {
                    continue;
                }
                if let Some(inner) = node.kind().inner() {
                    if inner == target {
                        return true;
                    }
                    pending.push(inner);
                }
            }
        }
        false
    }
}
