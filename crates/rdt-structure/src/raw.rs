#![forbid(unsafe_code)]

//! Wire shapes of structure updates.

use indexmap::IndexMap;
use rdt_core::NodeId;
use serde::{Deserialize, Serialize};

/// Kind of one owner node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Root,
    Component,
    Element,
    Effect,
    RenderEffect,
    Memo,
    Computation,
    Refresh,
    Context,
    CatchError,
    Signal,
    Store,
    #[serde(other)]
    Unknown,
}

/// One owner as sent by the subject, with its full subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOwner {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<RawOwner>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub hmr: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub frozen: bool,
}

impl RawOwner {
    #[must_use]
    pub fn new(id: impl Into<NodeId>, kind: NodeType) -> Self {
        Self {
            id: id.into(),
            kind,
            name: None,
            children: Vec::new(),
            hmr: false,
            frozen: false,
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_children(mut self, children: Vec<RawOwner>) -> Self {
        self.children = children;
        self
    }

    #[must_use]
    pub fn with_hmr(mut self, hmr: bool) -> Self {
        self.hmr = hmr;
        self
    }

    #[must_use]
    pub fn with_frozen(mut self, frozen: bool) -> Self {
        self.frozen = frozen;
        self
    }
}

/// Changed subtrees of one root, keyed by the id of each subtree's top node.
pub type RootUpdate = IndexMap<NodeId, RawOwner>;

/// One structure update.
///
/// With `partial` set, only the listed subtrees changed and only roots listed
/// in `removed` are gone. Without it, `updated` names every root that still
/// exists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureUpdates {
    #[serde(default)]
    pub removed: Vec<NodeId>,
    #[serde(default)]
    pub updated: IndexMap<NodeId, RootUpdate>,
    #[serde(default)]
    pub partial: bool,
}

impl StructureUpdates {
    /// A full update listing `roots` as the complete set.
    #[must_use]
    pub fn full(roots: impl IntoIterator<Item = RawOwner>) -> Self {
        let updated = roots
            .into_iter()
            .map(|root| {
                let id = root.id.clone();
                (id.clone(), IndexMap::from([(id, root)]))
            })
            .collect();
        Self {
            removed: Vec::new(),
            updated,
            partial: false,
        }
    }

    /// A partial update that removes `removed` and changes nothing else.
    #[must_use]
    pub fn removal(removed: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            removed: removed.into_iter().collect(),
            updated: IndexMap::new(),
            partial: true,
        }
    }

    /// Record `subtree` as changed under `root`.
    #[must_use]
    pub fn with_subtree(mut self, root: impl Into<NodeId>, subtree: RawOwner) -> Self {
        self.updated
            .entry(root.into())
            .or_default()
            .insert(subtree.id.clone(), subtree);
        self
    }
}
