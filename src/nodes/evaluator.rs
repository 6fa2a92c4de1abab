//! Overlaying a class on live memory
//!
//! The evaluator reads each class instance with one remote read, then
//! interprets every node from that snapshot. Pointers to other classes are
//! followed until the configured depth, a null pointer, or a target that is
//! already being expanded further up the chain.

use super::kind::{ClassId, Node, NodeKind};
use super::project::Project;
use super::value::{decode_utf16, decode_utf8, pointer_at, read_value, NodeValue};
use crate::config::MemoryConfig;
use crate::core::types::{Address, MemoryError, MemoryResult};
use crate::formula::AddressResolver;
use crate::memory::{MemoryBuffer, RegionCache};
use crate::process::ProcessHandle;
use serde::Serialize;
use tracing::{debug, warn};

/// Longest string read through a text pointer, in bytes
const TEXT_PTR_LIMIT: usize = 256;

/// One node after evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EvaluatedNode {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: &'static str,
    pub offset: usize,
    pub address: Address,
    pub size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<NodeValue>,
    /// String behind a text pointer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<EvaluatedNode>,
    /// Why a pointer was not followed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub hidden: bool,
}

impl EvaluatedNode {
    fn new(name: impl Into<String>, type_name: &'static str, offset: usize, address: Address, size: usize) -> Self {
        EvaluatedNode {
            name: name.into(),
            type_name,
            offset,
            address,
            size,
            value: None,
            text: None,
            children: Vec::new(),
            note: None,
            error: None,
            hidden: false,
        }
    }

    /// Finds a direct child by name
    pub fn child(&self, name: &str) -> Option<&EvaluatedNode> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Follows a `/`-separated path of child names
    pub fn path(&self, path: &str) -> Option<&EvaluatedNode> {
        path.split('/')
            .filter(|part| !part.is_empty())
            .try_fold(self, |node, part| node.child(part))
    }
}

/// Walks classes over a live target
pub struct Evaluator<'a> {
    handle: &'a ProcessHandle,
    project: &'a Project,
    cache: RegionCache,
    max_depth: usize,
    max_read_size: usize,
    pointer_size: usize,
}

impl<'a> Evaluator<'a> {
    pub fn new(handle: &'a ProcessHandle, project: &'a Project) -> Self {
        Self::from_config(handle, project, &MemoryConfig::default())
    }

    pub fn from_config(handle: &'a ProcessHandle, project: &'a Project, config: &MemoryConfig) -> Self {
        Evaluator {
            handle,
            project,
            cache: RegionCache::new(config.cache_entries),
            max_depth: config.max_pointer_depth,
            max_read_size: config.max_read_size,
            pointer_size: handle.pointer_size(),
        }
    }

    /// Limits how many pointers are followed from the root
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// `(hits, misses)` of the read cache
    pub fn cache_stats(&self) -> (u64, u64) {
        self.cache.stats()
    }

    /// Evaluates a class at the address its formula resolves to
    pub fn evaluate(&mut self, class: ClassId) -> MemoryResult<EvaluatedNode> {
        let formula = &self.project.class(class)?.address;
        let address = formula.evaluate(self.handle)?;
        debug!("{} resolved to {}", formula, address);
        self.evaluate_at(class, address)
    }

    /// Evaluates a class at an explicit address.
    ///
    /// Fails only if the root instance cannot be read; failures below the
    /// root are recorded on the affected node.
    pub fn evaluate_at(&mut self, class: ClassId, address: Address) -> MemoryResult<EvaluatedNode> {
        self.cache.clear();
        let mut path = Vec::new();
        self.instance(class, address, 0, &mut path)
    }

    fn instance(
        &mut self,
        class: ClassId,
        address: Address,
        depth: usize,
        path: &mut Vec<(ClassId, Address)>,
    ) -> MemoryResult<EvaluatedNode> {
        let project = self.project;
        let class_node = project.class(class)?;
        let size = project.class_size(class, self.pointer_size)?;
        if size > self.max_read_size {
            return Err(MemoryError::InvalidState(format!(
                "{} is {} bytes, above the {} byte read limit",
                class_node.name(),
                size,
                self.max_read_size
            )));
        }

        let buffer = if size == 0 {
            MemoryBuffer::zeroed(address, 0, self.pointer_size)
        } else {
            self.cache.load_buffer(self.handle, address, size)?
        };

        let mut root = EvaluatedNode::new(class_node.name(), "Class", 0, address, size);
        path.push((class, address));
        let children = self.members(class, &buffer, 0, depth, path);
        path.pop();
        root.children = children?;
        Ok(root)
    }

    fn members(
        &mut self,
        class: ClassId,
        buffer: &MemoryBuffer,
        base: usize,
        depth: usize,
        path: &mut Vec<(ClassId, Address)>,
    ) -> MemoryResult<Vec<EvaluatedNode>> {
        let project = self.project;
        let mut offset = base;
        let mut out = Vec::new();

        for node in project.class(class)?.nodes() {
            let size = project.node_size(node, self.pointer_size)?;
            out.push(self.node(node, buffer, offset, base, size, depth, path)?);
            offset += size;
        }
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn node(
        &mut self,
        node: &Node,
        buffer: &MemoryBuffer,
        offset: usize,
        base: usize,
        size: usize,
        depth: usize,
        path: &mut Vec<(ClassId, Address)>,
    ) -> MemoryResult<EvaluatedNode> {
        let kind = node.kind();
        let mut out = EvaluatedNode::new(
            node.name.clone(),
            kind.type_name(),
            offset - base,
            buffer.address() + offset,
            size,
        );
        out.hidden = node.hidden;

        match kind {
            NodeKind::ClassInstance { inner } => {
                out.children = self.members(*inner, buffer, offset, depth, path)?;
            }
            NodeKind::ClassInstanceArray { inner, count } => {
                let element = self.project.class_size(*inner, self.pointer_size)?;
                for i in 0..*count {
                    let start = offset + i * element;
                    let mut item = EvaluatedNode::new(
                        format!("[{}]", i),
                        "ClassInstance",
                        i * element,
                        buffer.address() + start,
                        element,
                    );
                    item.children = self.members(*inner, buffer, start, depth, path)?;
                    out.children.push(item);
                }
            }
            NodeKind::ClassPtrArray { inner, count } => {
                for i in 0..*count {
                    let start = offset + i * self.pointer_size;
                    let mut item = EvaluatedNode::new(
                        format!("[{}]", i),
                        "ClassPtr",
                        i * self.pointer_size,
                        buffer.address() + start,
                        self.pointer_size,
                    );
                    let target = pointer_at(buffer, start, self.pointer_size)?;
                    item.value = Some(NodeValue::Pointer(target));
                    self.follow(&mut item, *inner, target, depth, path);
                    out.children.push(item);
                }
            }
            NodeKind::ClassPtr { inner } => {
                let target = pointer_at(buffer, offset, self.pointer_size)?;
                out.value = Some(NodeValue::Pointer(target));
                self.follow(&mut out, *inner, target, depth, path);
            }
            NodeKind::VTable { methods } => {
                let table = pointer_at(buffer, offset, self.pointer_size)?;
                out.value = Some(NodeValue::Pointer(table));
                for (i, method) in methods.iter().enumerate() {
                    let slot = table + (i * self.pointer_size);
                    let mut entry = EvaluatedNode::new(
                        method.name.clone(),
                        "VMethod",
                        i * self.pointer_size,
                        slot,
                        self.pointer_size,
                    );
                    if !table.is_null() {
                        match self.handle.read_pointer(slot) {
                            Ok(function) => entry.value = Some(NodeValue::Pointer(function)),
                            Err(err) => entry.error = Some(err.to_string()),
                        }
                    }
                    out.children.push(entry);
                }
            }
            NodeKind::Utf8TextPtr | NodeKind::Utf16TextPtr => {
                let target = pointer_at(buffer, offset, self.pointer_size)?;
                out.value = Some(NodeValue::Pointer(target));
                if !target.is_null() {
                    let wide = matches!(kind, NodeKind::Utf16TextPtr);
                    match self.remote_text(target, wide) {
                        Ok(text) => out.text = Some(text),
                        Err(err) => out.error = Some(err.to_string()),
                    }
                }
            }
            _ => out.value = read_value(kind, buffer, offset, self.pointer_size)?,
        }

        Ok(out)
    }

    fn follow(
        &mut self,
        out: &mut EvaluatedNode,
        inner: ClassId,
        target: Address,
        depth: usize,
        path: &mut Vec<(ClassId, Address)>,
    ) {
        if target.is_null() {
            return;
        }
        if depth + 1 > self.max_depth {
            out.note = Some(format!("pointer depth limit {} reached", self.max_depth));
            return;
        }
        if path.contains(&(inner, target)) {
            out.note = Some(format!("already expanded at {}", target));
            return;
        }

        match self.instance(inner, target, depth + 1, path) {
            Ok(instance) => out.children = instance.children,
            Err(err) => {
                warn!("Could not follow {} to {}: {}", out.name, target, err);
                out.error = Some(err.to_string());
            }
        }
    }

    /// Reads a NUL-terminated string, shrinking the read near region ends
    fn remote_text(&mut self, address: Address, wide: bool) -> MemoryResult<String> {
        let mut size = TEXT_PTR_LIMIT;
        loop {
            match self.handle.read_bytes(address, size) {
                Ok(bytes) if wide => return Ok(decode_utf16(&bytes)),
                Ok(bytes) => return Ok(decode_utf8(&bytes)),
                Err(err) if size <= 8 => return Err(err),
                Err(_) => size /= 4,
            }
        }
    }
}
