#![forbid(unsafe_code)]

//! Observer-side structure state: the current forest, its flat node list and
//! an id index, plus the lookups the tree view needs.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use rdt_core::NodeId;

use crate::node::Node;
use crate::raw::{NodeType, StructureUpdates};
use crate::reconcile::reconcile;

#[derive(Debug, Default)]
pub struct Structure {
    roots: Vec<Rc<Node>>,
    nodes: Vec<Rc<Node>>,
    index: HashMap<NodeId, usize>,
}

impl Structure {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one update and return the new flat node list.
    pub fn apply(&mut self, updates: &StructureUpdates) -> &[Rc<Node>] {
        let out = reconcile(&self.roots, updates);
        self.index = out
            .nodes
            .iter()
            .enumerate()
            .map(|(at, node)| (node.id().clone(), at))
            .collect();
        self.roots = out.roots;
        self.nodes = out.nodes;
        &self.nodes
    }

    /// Forget every node.
    pub fn clear(&mut self) {
        self.roots.clear();
        self.nodes.clear();
        self.index.clear();
    }

    #[must_use]
    pub fn roots(&self) -> &[Rc<Node>] {
        &self.roots
    }

    /// Flat node list, parent before its subtree.
    #[must_use]
    pub fn nodes(&self) -> &[Rc<Node>] {
        &self.nodes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&Rc<Node>> {
        self.index.get(id).and_then(|&at| self.nodes.get(at))
    }

    /// Position of `id` in the flat list.
    #[must_use]
    pub fn position(&self, id: &NodeId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Ancestors of `id`, nearest first. Empty for roots and unknown ids.
    #[must_use]
    pub fn ancestors(&self, id: &NodeId) -> Vec<Rc<Node>> {
        let mut out = Vec::new();
        let mut current = self.node(id).and_then(|node| node.parent());
        while let Some(node) = current {
            current = node.parent();
            out.push(node);
        }
        out
    }

    /// The node itself if it is a component, else its nearest component
    /// ancestor.
    #[must_use]
    pub fn closest_component(&self, id: &NodeId) -> Option<Rc<Node>> {
        let node = self.node(id)?;
        if node.kind() == NodeType::Component {
            return Some(Rc::clone(node));
        }
        self.ancestors(id)
            .into_iter()
            .find(|ancestor| ancestor.kind() == NodeType::Component)
    }

    /// Flat list with the subtrees of `collapsed` nodes left out (the
    /// collapsed nodes themselves stay visible).
    #[must_use]
    pub fn visible_nodes(&self, collapsed: &HashSet<NodeId>) -> Vec<Rc<Node>> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut hidden_below: Option<usize> = None;
        for node in &self.nodes {
            if let Some(level) = hidden_below {
                if node.level() > level {
                    continue;
                }
                hidden_below = None;
            }
            if collapsed.contains(node.id()) {
                hidden_below = Some(node.level());
            }
            out.push(Rc::clone(node));
        }
        out
    }
}
