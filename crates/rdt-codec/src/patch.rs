#![forbid(unsafe_code)]

//! In-place patching of decoded values.
//!
//! Incremental updates touch one child of an already decoded container
//! instead of re-decoding the whole value. Two entry points:
//!
//! - [`patch_child`]: replace, resize or delete one child of a composite.
//! - [`apply_store_patch`]: locate a store cell by id, walk a literal path of
//!   keys/indices from its content and patch the child found there.
//!
//! When the old and the new child are composites of the same kind and the
//! same expansion state, the old container is kept and only its children
//! (or its length) are swapped. This keeps the identity of a subtree the user
//! expanded while only a sibling changed.
//!
//! # Failure Modes
//!
//! - **Unknown store / bad path**: [`PatchError`] is returned and a warning is
//!   logged; nothing was mutated.
//! - **Undecodable child**: validation runs before any mutation, so the live
//!   value is left as it was.
//! - **Oversized array**: an index or length past [`MAX_ARRAY_LENGTH`], or
//!   more than [`MAX_ARRAY_GROWTH`] slots past the current length, is
//!   rejected before anything is allocated.

use std::rc::Rc;

use rdt_core::NodeId;
use serde::{Deserialize, Serialize};

use crate::decode::{decode, redecode};
use crate::decoded::{Children, Composite, DecodedValue, Key, dispose_unreachable};
use crate::encoded::{EncodedValue, validate};
use crate::error::PatchError;
use crate::store::StoreRefMap;

/// Largest array length the subject can report.
pub const MAX_ARRAY_LENGTH: usize = u32::MAX as usize;

/// Most `undefined` slots one patch may append to an array.
pub const MAX_ARRAY_GROWTH: usize = 1 << 16;

/// New content for one child of a composite.
#[derive(Debug, Clone, Copy)]
pub enum ChildUpdate<'a> {
    /// Replace the child with a freshly encoded value.
    Value(&'a [EncodedValue]),
    /// Set the length of an array (truncating or padding with `undefined`).
    Length(usize),
    /// Remove the child.
    Delete,
}

/// Value carried by a store patch: an encoded child or an array length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StorePatchValue {
    Length(usize),
    Value(Vec<EncodedValue>),
}

/// Nested mutation of one store.
///
/// `path` leads from the store's content to the container that owns
/// `property`. A missing `value` deletes the property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorePatch {
    pub store_id: NodeId,
    #[serde(default)]
    pub path: Vec<Key>,
    pub property: Key,
    #[serde(default)]
    pub value: Option<StorePatchValue>,
}

impl StorePatch {
    #[must_use]
    pub fn update(&self) -> ChildUpdate<'_> {
        match &self.value {
            Some(StorePatchValue::Value(list)) => ChildUpdate::Value(list),
            Some(StorePatchValue::Length(len)) => ChildUpdate::Length(*len),
            None => ChildUpdate::Delete,
        }
    }
}

fn expanded_target(container: &DecodedValue) -> Result<Rc<Composite>, PatchError> {
    let resolved = match container {
        DecodedValue::Store(cell) => cell.value(),
        other => other.clone(),
    };
    match resolved.composite() {
        Some(composite) if composite.is_expanded() => Ok(Rc::clone(composite)),
        _ => Err(PatchError::NotExpanded),
    }
}

/// Slot a key addresses once the container kind is known.
enum Slot {
    Index(usize),
    Name(String),
}

fn slot_for(composite: &Composite, key: &Key) -> Result<Slot, PatchError> {
    let is_array = composite
        .with_children_mut(|children| matches!(children, Children::Array(_)))
        .unwrap_or(false);
    if !is_array {
        return Ok(Slot::Name(key.as_name()));
    }
    key.as_index()
        .map(Slot::Index)
        .ok_or_else(|| PatchError::InvalidPath {
            segment: key.clone(),
            depth: 0,
        })
}

fn check_length(current: usize, requested: usize) -> Result<(), PatchError> {
    let limit = current.saturating_add(MAX_ARRAY_GROWTH).min(MAX_ARRAY_LENGTH);
    if requested > limit {
        return Err(PatchError::LengthOutOfRange {
            requested,
            len: current,
        });
    }
    Ok(())
}

/// Apply `update` to the child of `container` under `key`.
///
/// `key` is ignored by [`ChildUpdate::Length`], which resizes `container`
/// itself. Children dropped by the patch give back their store references
/// but are not disposed, since `container` may be a subtree of a value that
/// still reaches them.
pub fn patch_child(
    container: &DecodedValue,
    key: &Key,
    update: ChildUpdate<'_>,
    stores: &mut StoreRefMap,
) -> Result<(), PatchError> {
    patch_in_place(container, key, update, stores).map(drop)
}

/// [`patch_child`], returning the children the patch dropped.
fn patch_in_place(
    container: &DecodedValue,
    key: &Key,
    update: ChildUpdate<'_>,
    stores: &mut StoreRefMap,
) -> Result<Vec<DecodedValue>, PatchError> {
    let composite = expanded_target(container)?;
    match update {
        ChildUpdate::Value(list) => {
            let slot = slot_for(&composite, key)?;
            if let Slot::Index(i) = &slot {
                check_length(composite.len(), i.saturating_add(1))?;
            }
            validate(list)?;
            let old = composite.get(key);
            let (new, mut dropped) = match &old {
                Some(old) => redecode(list, old, stores)?,
                None => (decode(list, None, stores)?, Vec::new()),
            };
            if old.as_ref().is_some_and(|old| old.same_identity(&new)) {
                return Ok(dropped);
            }
            composite.with_children_mut(|children| match (children, slot) {
                (Children::Array(items), Slot::Index(i)) => {
                    if i >= items.len() {
                        items.resize(i + 1, DecodedValue::Undefined);
                    }
                    items[i] = new;
                }
                (Children::Object(entries), Slot::Name(name)) => {
                    match entries.iter_mut().find(|(k, _)| *k == name) {
                        Some(entry) => entry.1 = new,
                        None => entries.push((name, new)),
                    }
                }
                _ => {}
            });
            dropped.extend(old);
            Ok(dropped)
        }
        ChildUpdate::Length(len) => {
            check_length(composite.len(), len)?;
            let removed = composite
                .with_children_mut(|children| match children {
                    Children::Array(items) if len < items.len() => Ok(items.split_off(len)),
                    Children::Array(items) => {
                        items.resize(len, DecodedValue::Undefined);
                        Ok(Vec::new())
                    }
                    Children::Object(_) => Err(PatchError::LengthOnObject),
                })
                .unwrap_or(Err(PatchError::NotExpanded))?;
            for value in &removed {
                stores.release(value);
            }
            stores.sweep();
            Ok(removed)
        }
        ChildUpdate::Delete => {
            let slot = slot_for(&composite, key)?;
            let removed = composite
                .with_children_mut(|children| match (children, slot) {
                    (Children::Array(items), Slot::Index(i)) => items
                        .get_mut(i)
                        .map(|item| std::mem::replace(item, DecodedValue::Undefined)),
                    (Children::Object(entries), Slot::Name(name)) => {
                        let at = entries.iter().position(|(k, _)| *k == name)?;
                        Some(entries.remove(at).1)
                    }
                    _ => None,
                })
                .flatten();
            if let Some(value) = &removed {
                stores.release_and_sweep(value);
            }
            Ok(removed.into_iter().collect())
        }
    }
}

/// Apply a nested store mutation.
///
/// Children the patch dropped are disposed unless the store content still
/// reaches them.
pub fn apply_store_patch(patch: &StorePatch, stores: &mut StoreRefMap) -> Result<(), PatchError> {
    let result = locate(patch, stores)
        .and_then(|target| patch_in_place(&target, &patch.property, patch.update(), stores));
    let result = result.map(|dropped| {
        if let Some(cell) = stores.get(&patch.store_id) {
            dispose_unreachable(&dropped, &cell.value());
        }
    });
    if let Err(err) = &result {
        tracing::warn!(
            store_id = %patch.store_id,
            path = ?patch.path,
            property = %patch.property,
            error = %err,
            "store patch dropped"
        );
    }
    result
}

fn locate(patch: &StorePatch, stores: &StoreRefMap) -> Result<DecodedValue, PatchError> {
    let cell = stores
        .get(&patch.store_id)
        .ok_or_else(|| PatchError::MissingStore {
            store_id: patch.store_id.clone(),
        })?;
    let mut target = DecodedValue::Store(cell);
    for (depth, segment) in patch.path.iter().enumerate() {
        target = target.get(segment).ok_or_else(|| PatchError::InvalidPath {
            segment: segment.clone(),
            depth,
        })?;
    }
    Ok(target)
}
