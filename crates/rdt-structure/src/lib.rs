#![forbid(unsafe_code)]

//! Structure reconciler: turns a stream of owner-tree updates into a stable
//! forest of [`Node`]s and a flat, parent-first node list.
//!
//! Node identity is preserved for every id that stays present, so views and
//! caches keyed by node (hover, selection, highlight) survive updates.

pub mod node;
pub mod raw;
pub mod reconcile;
pub mod structure;

pub use node::Node;
pub use raw::{NodeType, RawOwner, RootUpdate, StructureUpdates};
pub use reconcile::{Reconciled, reconcile};
pub use structure::Structure;
