#![forbid(unsafe_code)]

//! Mirrored owner node.
//!
//! Nodes are shared as `Rc<Node>`: a parent owns its children, a child holds
//! a `Weak` back-reference to its parent, so a dropped subtree is freed
//! without cycles. Everything a reconcile may change lives in a `Cell` or
//! `RefCell`, which lets the reconciler update a node in place and keep its
//! identity.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use rdt_core::NodeId;

use crate::raw::{NodeType, RawOwner};

pub struct Node {
    id: NodeId,
    kind: NodeType,
    name: Option<String>,
    hmr: bool,
    level: Cell<usize>,
    frozen: Cell<bool>,
    parent: RefCell<Weak<Node>>,
    children: RefCell<Vec<Rc<Node>>>,
}

impl Node {
    /// A fresh node without children.
    ///
    /// `hmr` is only taken from component owners.
    pub(crate) fn from_raw(raw: &RawOwner, parent: Weak<Node>, level: usize) -> Rc<Self> {
        Rc::new(Self {
            id: raw.id.clone(),
            kind: raw.kind,
            name: raw.name.clone(),
            hmr: raw.kind == NodeType::Component && raw.hmr,
            level: Cell::new(level),
            frozen: Cell::new(raw.frozen),
            parent: RefCell::new(parent),
            children: RefCell::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    #[must_use]
    pub fn kind(&self) -> NodeType {
        self.kind
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Whether the component was created by hot module replacement.
    #[must_use]
    pub fn hmr(&self) -> bool {
        self.hmr
    }

    /// Depth in the forest; roots are at level 0.
    #[must_use]
    pub fn level(&self) -> usize {
        self.level.get()
    }

    /// Once set, stays set for the node's lifetime.
    #[must_use]
    pub fn frozen(&self) -> bool {
        self.frozen.get()
    }

    #[must_use]
    pub fn parent(&self) -> Option<Rc<Node>> {
        self.parent.borrow().upgrade()
    }

    /// Snapshot of the children in subject order.
    #[must_use]
    pub fn children(&self) -> Vec<Rc<Node>> {
        self.children.borrow().clone()
    }

    #[must_use]
    pub fn child_count(&self) -> usize {
        self.children.borrow().len()
    }

    pub(crate) fn set_level(&self, level: usize) {
        self.level.set(level);
    }

    pub(crate) fn freeze(&self) {
        self.frozen.set(true);
    }

    pub(crate) fn set_parent(&self, parent: Weak<Node>) {
        *self.parent.borrow_mut() = parent;
    }

    pub(crate) fn replace_children(&self, children: Vec<Rc<Node>>) {
        *self.children.borrow_mut() = children;
    }

    pub(crate) fn retain_children(&self, keep: impl FnMut(&Rc<Node>) -> bool) {
        self.children.borrow_mut().retain(keep);
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("level", &self.level())
            .field("children", &self.child_count())
            .finish()
    }
}
