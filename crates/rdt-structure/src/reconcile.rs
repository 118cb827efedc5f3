#![forbid(unsafe_code)]

//! Reconciling a forest against one [`StructureUpdates`].
//!
//! # Algorithm
//!
//! 1. Keep each previous root unless it is gone: listed in `removed` for a
//!    partial update, absent from `updated` for a full one.
//! 2. Walk each kept root in pre-order. Every node gets its level rewritten.
//!    When raw data exists for the node (a subtree keyed by its id in the
//!    root's update, or the raw child handed down by its parent) its child
//!    list is rebuilt from the raw children, reusing existing child nodes by
//!    id and creating fresh ones for the rest. Without raw data the existing
//!    children are kept, minus any listed in `removed`, and the walk goes on
//!    looking for deeper raw data.
//! 3. Roots in `updated` that were not kept are created fresh at level 0.
//! 4. Every visited node is appended to the flat list as it is visited, so
//!    the list is parent-first with each subtree contiguous.
//!
//! # Invariants
//!
//! 1. A node whose id stays present keeps its `Rc` identity.
//! 2. `child.level() == parent.level() + 1`; roots are at level 0.
//! 3. `frozen` is never cleared; `hmr` is only read when a node is created.
//!
//! The walk uses an explicit stack, so deep owner chains do not grow the
//! call stack.

use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use rdt_core::NodeId;

use crate::node::Node;
use crate::raw::{RawOwner, RootUpdate, StructureUpdates};

/// Output of [`reconcile`].
#[derive(Debug, Default, Clone)]
pub struct Reconciled {
    pub roots: Vec<Rc<Node>>,
    /// Every node of the forest, parent before its subtree.
    pub nodes: Vec<Rc<Node>>,
}

/// Apply `updates` to the forest rooted at `prev_roots`.
#[must_use]
pub fn reconcile(prev_roots: &[Rc<Node>], updates: &StructureUpdates) -> Reconciled {
    let removed: HashSet<&NodeId> = updates.removed.iter().collect();
    let mut out = Reconciled::default();
    let mut kept: HashSet<&NodeId> = HashSet::new();

    for root in prev_roots {
        let id = root.id();
        let gone = if updates.partial {
            removed.contains(id)
        } else {
            !updates.updated.contains_key(id)
        };
        if gone {
            tracing::debug!(node_id = %id, partial = updates.partial, "root removed");
            continue;
        }
        kept.insert(id);
        walk(root, None, updates.updated.get(id), &removed, &mut out.nodes);
        out.roots.push(Rc::clone(root));
    }

    for (root_id, subtrees) in &updates.updated {
        if kept.contains(root_id) {
            continue;
        }
        let Some(raw) = subtrees.get(root_id) else {
            tracing::warn!(node_id = %root_id, "new root sent without its own subtree");
            continue;
        };
        let root = Node::from_raw(raw, Weak::new(), 0);
        walk(&root, Some(raw), Some(subtrees), &removed, &mut out.nodes);
        out.roots.push(root);
    }

    tracing::debug!(
        roots = out.roots.len(),
        nodes = out.nodes.len(),
        partial = updates.partial,
        "structure reconciled"
    );
    out
}

fn walk<'u>(
    top: &Rc<Node>,
    nested: Option<&'u RawOwner>,
    subtrees: Option<&'u RootUpdate>,
    removed: &HashSet<&NodeId>,
    nodes: &mut Vec<Rc<Node>>,
) {
    let mut stack: Vec<(Rc<Node>, Option<&'u RawOwner>, usize)> =
        vec![(Rc::clone(top), nested, 0)];

    while let Some((node, nested, level)) = stack.pop() {
        node.set_level(level);
        nodes.push(Rc::clone(&node));

        let raw = subtrees
            .and_then(|subtrees| subtrees.get(node.id()))
            .or(nested);
        let next: Vec<(Rc<Node>, Option<&'u RawOwner>)> = match raw {
            Some(raw) => {
                if raw.frozen {
                    node.freeze();
                }
                let mut existing: HashMap<NodeId, Rc<Node>> = node
                    .children()
                    .into_iter()
                    .map(|child| (child.id().clone(), child))
                    .collect();
                let parent = Rc::downgrade(&node);
                let next: Vec<_> = raw
                    .children
                    .iter()
                    .map(|raw_child| {
                        let child = match existing.remove(&raw_child.id) {
                            Some(child) => {
                                child.set_parent(Weak::clone(&parent));
                                child
                            }
                            None => Node::from_raw(raw_child, Weak::clone(&parent), level + 1),
                        };
                        (child, Some(raw_child))
                    })
                    .collect();
                node.replace_children(next.iter().map(|(child, _)| Rc::clone(child)).collect());
                next
            }
            None => {
                node.retain_children(|child| !removed.contains(child.id()));
                node.children().into_iter().map(|child| (child, None)).collect()
            }
        };

        for (child, nested) in next.into_iter().rev() {
            stack.push((child, nested, level + 1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw::NodeType;
    use pretty_assertions::assert_eq;

    fn ids(nodes: &[Rc<Node>]) -> Vec<String> {
        nodes.iter().map(|n| n.id().to_string()).collect()
    }

    fn owner(id: &str, children: Vec<RawOwner>) -> RawOwner {
        RawOwner::new(id, NodeType::Computation).with_children(children)
    }

    #[test]
    fn fresh_forest_is_flattened_in_pre_order() {
        let update = StructureUpdates::full([
            owner("r1", vec![owner("a", vec![owner("a1", vec![])]), owner("b", vec![])]),
            owner("r2", vec![]),
        ]);
        let out = reconcile(&[], &update);
        assert_eq!(ids(&out.nodes), ["r1", "a", "a1", "b", "r2"]);
        let levels: Vec<usize> = out.nodes.iter().map(|n| n.level()).collect();
        assert_eq!(levels, [0, 1, 2, 1, 0]);
        assert_eq!(ids(&out.roots), ["r1", "r2"]);
    }

    #[test]
    fn unchanged_nodes_keep_identity() {
        let first = reconcile(
            &[],
            &StructureUpdates::full([owner("r", vec![owner("a", vec![])])]),
        );
        let a_before = Rc::clone(&first.nodes[1]);
        let second = reconcile(
            &first.roots,
            &StructureUpdates::full([owner("r", vec![owner("a", vec![]), owner("b", vec![])])]),
        );
        assert!(Rc::ptr_eq(&first.roots[0], &second.roots[0]));
        assert!(Rc::ptr_eq(&a_before, &second.nodes[1]));
        assert_eq!(ids(&second.nodes), ["r", "a", "b"]);
    }

    #[test]
    fn full_update_drops_omitted_roots_with_descendants() {
        let first = reconcile(
            &[],
            &StructureUpdates::full([owner("r", vec![owner("c", vec![])]), owner("s", vec![])]),
        );
        let second = reconcile(&first.roots, &StructureUpdates::full([owner("s", vec![])]));
        assert_eq!(ids(&second.nodes), ["s"]);
    }

    #[test]
    fn partial_update_only_drops_listed_roots() {
        let first = reconcile(
            &[],
            &StructureUpdates::full([owner("r", vec![]), owner("s", vec![])]),
        );
        let second = reconcile(&first.roots, &StructureUpdates::removal([NodeId::new("s")]));
        assert_eq!(ids(&second.nodes), ["r"]);
    }

    #[test]
    fn partial_update_reaches_deep_subtree() {
        let first = reconcile(
            &[],
            &StructureUpdates::full([owner("r", vec![owner("a", vec![owner("leaf", vec![])])])]),
        );
        let update = StructureUpdates {
            partial: true,
            ..StructureUpdates::default()
        }
        .with_subtree("r", owner("a", vec![owner("leaf", vec![]), owner("new", vec![])]));
        let second = reconcile(&first.roots, &update);
        assert_eq!(ids(&second.nodes), ["r", "a", "leaf", "new"]);
        assert!(Rc::ptr_eq(&first.nodes[2], &second.nodes[2]));
        assert_eq!(second.nodes[3].parent().map(|p| p.id().to_string()), Some("a".into()));
    }

    #[test]
    fn removed_child_is_pruned_without_parent_data() {
        let first = reconcile(
            &[],
            &StructureUpdates::full([owner("r", vec![owner("c", vec![])])]),
        );
        let second = reconcile(&first.roots, &StructureUpdates::removal([NodeId::new("c")]));
        assert_eq!(ids(&second.nodes), ["r"]);
        assert_eq!(second.roots[0].child_count(), 0);
    }

    #[test]
    fn frozen_is_sticky_and_hmr_only_on_fresh_components() {
        let component = RawOwner::new("c", NodeType::Component).with_hmr(true).with_frozen(true);
        let memo = RawOwner::new("m", NodeType::Memo).with_hmr(true);
        let first = reconcile(&[], &StructureUpdates::full([owner("r", vec![component, memo])]));
        assert!(first.nodes[1].hmr());
        assert!(first.nodes[1].frozen());
        assert!(!first.nodes[2].hmr());

        let thawed = RawOwner::new("c", NodeType::Component);
        let second = reconcile(&first.roots, &StructureUpdates::full([owner("r", vec![thawed])]));
        assert!(second.nodes[1].frozen());
        assert!(second.nodes[1].hmr());
    }

    #[test]
    fn moved_subtree_gets_new_levels() {
        let first = reconcile(
            &[],
            &StructureUpdates::full([owner("r", vec![owner("a", vec![owner("b", vec![])])])]),
        );
        let b = Rc::clone(&first.nodes[2]);
        assert_eq!(b.level(), 2);
        let second = reconcile(
            &first.roots,
            &StructureUpdates::full([owner("r", vec![owner("b", vec![])])]),
        );
        assert_eq!(ids(&second.nodes), ["r", "b"]);
        assert_eq!(second.nodes[1].level(), 1);
    }

    #[test]
    fn new_root_without_own_subtree_is_skipped() {
        let update = StructureUpdates::default().with_subtree("ghost", owner("child", vec![]));
        let out = reconcile(&[], &update);
        assert!(out.roots.is_empty());
        assert!(out.nodes.is_empty());
    }
}
