#![forbid(unsafe_code)]

//! Reference-counted table of decoded store cells.
//!
//! One map belongs to one observer's decode pipeline. Every encounter of a
//! store record during a decode acquires one reference; releasing a decoded
//! value gives back one reference per store record it holds. Cells whose
//! count reached zero are evicted by [`StoreRefMap::sweep`], which every
//! decode runs after it finishes, so a cell that is released and then
//! re-acquired by the same decode keeps its identity.
//!
//! # Invariants
//!
//! 1. A tracked cell's count equals the number of store references held by
//!    the values decoded through this map and not yet released.
//! 2. Eviction releases the references held by the evicted cell's content.
//! 3. Releasing walks a value once per container (cycles are fine).
//!
//! Stores whose contents reference each other never reach zero on their
//! own; [`StoreRefMap::collect_cycles`] reclaims them.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use rdt_core::NodeId;

use crate::decoded::{DecodedValue, StoreCell, addr, dispose};

#[derive(Debug)]
struct Entry {
    cell: Rc<StoreCell>,
    refs: usize,
}

/// Store id → shared cell plus its reference count.
#[derive(Debug, Default)]
pub struct StoreRefMap {
    entries: HashMap<NodeId, Entry>,
}

impl StoreRefMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tracked cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Live cell for `id`, if tracked.
    #[must_use]
    pub fn get(&self, id: &NodeId) -> Option<Rc<StoreCell>> {
        self.entries.get(id).map(|entry| Rc::clone(&entry.cell))
    }

    /// Current reference count for `id` (0 when untracked).
    #[must_use]
    pub fn ref_count(&self, id: &NodeId) -> usize {
        self.entries.get(id).map_or(0, |entry| entry.refs)
    }

    /// Acquire a reference to an existing cell.
    pub(crate) fn retain(&mut self, id: &NodeId) -> Option<Rc<StoreCell>> {
        let entry = self.entries.get_mut(id)?;
        entry.refs += 1;
        Some(Rc::clone(&entry.cell))
    }

    /// Register a fresh cell holding one reference.
    pub(crate) fn register(&mut self, id: NodeId) -> Rc<StoreCell> {
        let cell = StoreCell::new(id.clone());
        tracing::trace!(store_id = %id, "store cell created");
        self.entries.insert(
            id,
            Entry {
                cell: Rc::clone(&cell),
                refs: 1,
            },
        );
        cell
    }

    /// Give back one reference per store record held by `value`.
    ///
    /// Store content is not entered: the references it holds belong to the
    /// cell and are released when the cell itself is evicted.
    pub fn release(&mut self, value: &DecodedValue) {
        for_each_store_ref(value, |cell| match self.entries.get_mut(cell.id()) {
            Some(entry) if Rc::ptr_eq(&entry.cell, cell) => {
                entry.refs = entry.refs.saturating_sub(1);
            }
            _ => {
                tracing::warn!(store_id = %cell.id(), "released an untracked store cell");
            }
        });
    }

    /// Evict every cell whose count is zero.
    ///
    /// Returns the number of evicted cells. Eviction cascades: the content of
    /// an evicted cell is released, which may bring nested stores to zero.
    pub fn sweep(&mut self) -> usize {
        let mut evicted = 0;
        loop {
            let dead: Vec<NodeId> = self
                .entries
                .iter()
                .filter(|(_, entry)| entry.refs == 0)
                .map(|(id, _)| id.clone())
                .collect();
            if dead.is_empty() {
                break;
            }
            for id in dead {
                let Some(entry) = self.entries.remove(&id) else {
                    continue;
                };
                let content = entry.cell.set(DecodedValue::Undefined);
                self.release(&content);
                dispose(&content);
                tracing::debug!(store_id = %id, "store cell evicted");
                evicted += 1;
            }
        }
        evicted
    }

    /// Release `value` and evict what became unreachable.
    pub fn release_and_sweep(&mut self, value: &DecodedValue) -> usize {
        self.release(value);
        self.sweep()
    }

    /// Evict cells that are only kept alive by each other.
    ///
    /// Counting cannot reclaim stores whose contents reference one another
    /// (or themselves). A cell is live when some of its references come from
    /// outside every tracked store, or when it is reachable from such a cell
    /// through store contents. Everything else is evicted. Returns the number
    /// of evicted cells.
    pub fn collect_cycles(&mut self) -> usize {
        let mut internal: HashMap<NodeId, usize> = HashMap::new();
        for entry in self.entries.values() {
            for_each_store_ref(&entry.cell.value(), |cell| {
                *internal.entry(cell.id().clone()).or_default() += 1;
            });
        }
        let mut live: HashSet<NodeId> = HashSet::new();
        let mut stack: Vec<Rc<StoreCell>> = self
            .entries
            .iter()
            .filter(|(id, entry)| entry.refs > internal.get(*id).copied().unwrap_or(0))
            .map(|(_, entry)| Rc::clone(&entry.cell))
            .collect();
        while let Some(cell) = stack.pop() {
            if !live.insert(cell.id().clone()) {
                continue;
            }
            for_each_store_ref(&cell.value(), |nested| stack.push(Rc::clone(nested)));
        }
        let dead: Vec<NodeId> = self
            .entries
            .keys()
            .filter(|id| !live.contains(*id))
            .cloned()
            .collect();
        let mut contents = Vec::with_capacity(dead.len());
        for id in &dead {
            if let Some(entry) = self.entries.remove(id) {
                contents.push(entry.cell.set(DecodedValue::Undefined));
            }
        }
        for content in &contents {
            for_each_store_ref(content, |cell| {
                if let Some(entry) = self.entries.get_mut(cell.id()) {
                    entry.refs = entry.refs.saturating_sub(1);
                }
            });
            dispose(content);
        }
        if !dead.is_empty() {
            tracing::debug!(evicted = dead.len(), "collected cyclic store cells");
        }
        dead.len()
    }

    /// Drop every cell regardless of counts.
    pub fn clear(&mut self) {
        for (_, entry) in self.entries.drain() {
            dispose(&entry.cell.set(DecodedValue::Undefined));
        }
    }
}

/// Visit every store record held by `value`, once per distinct container.
/// Store contents are not entered.
fn for_each_store_ref(value: &DecodedValue, mut f: impl FnMut(&Rc<StoreCell>)) {
    let mut seen = HashSet::new();
    let mut stack = vec![value.clone()];
    while let Some(next) = stack.pop() {
        match &next {
            DecodedValue::Store(cell) => f(cell),
            DecodedValue::Array(c) | DecodedValue::Object(c) => {
                if !seen.insert(addr(c)) {
                    continue;
                }
                if let Some(children) = c.children() {
                    stack.extend(children.values().cloned());
                }
            }
            _ => {}
        }
    }
}
