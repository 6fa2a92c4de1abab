//! Class definitions

use super::kind::Node;
use crate::formula::Formula;
use serde::Serialize;

/// Named, ordered composition of nodes, laid out back to back.
///
/// The node list is only changed through [`Project`](super::Project) so
/// reference edits always pass the cycle check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassNode {
    name: String,
    pub comment: String,
    /// Where instances of this class live in the target
    pub address: Formula,
    nodes: Vec<Node>,
}

impl ClassNode {
    pub(crate) fn new(name: String) -> Self {
        ClassNode {
            name,
            comment: String::new(),
            address: Formula::default(),
            nodes: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: String) {
        self.name = name;
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut Vec<Node> {
        &mut self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
