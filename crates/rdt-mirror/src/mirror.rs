#![forbid(unsafe_code)]

//! Applies subject messages to the observer's copy of the subject state.
//!
//! # Invariants
//!
//! 1. Every store cell in the decode cache is reachable from a value item
//!    (or from another live cell). Removing or replacing a value item
//!    releases its store references before the batch ends.
//! 2. A failing inspector patch is skipped and logged. Patches before and
//!    after it in the same batch still apply.
//! 3. After [`Mirror::reset`] the decode cache is empty.

use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use rdt_codec::{DecodedValue, StoreRefMap, apply_store_patch, decode, decode_into, dispose};
use rdt_core::NodeId;
use rdt_protocol::{Detected, Envelope, InspectorPatch, Message, PropKeys, ValueItemId, ValueUpdate, Versions};
use rdt_structure::{Node, Structure};

use crate::error::MirrorError;

/// Outcome of one handled message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Updates applied.
    pub applied: usize,
    /// Updates dropped after a failure.
    pub skipped: usize,
}

impl BatchReport {
    const APPLIED: Self = Self {
        applied: 1,
        skipped: 0,
    };
    const IGNORED: Self = Self {
        applied: 0,
        skipped: 0,
    };
}

#[derive(Debug, Default)]
pub struct Mirror {
    structure: Structure,
    stores: StoreRefMap,
    values: IndexMap<ValueItemId, DecodedValue>,
    prop_keys: IndexSet<String>,
    inspected: Option<NodeId>,
    versions: Option<Versions>,
    detected: Option<Detected>,
}

impl Mirror {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ── Accessors ──────────────────────────────────────────────────────

    #[must_use]
    pub fn structure(&self) -> &Structure {
        &self.structure
    }

    /// Flat node list of the mirrored forest.
    #[must_use]
    pub fn nodes(&self) -> &[Rc<Node>] {
        self.structure.nodes()
    }

    #[must_use]
    pub fn value(&self, id: &ValueItemId) -> Option<&DecodedValue> {
        self.values.get(id)
    }

    /// Value items in arrival order.
    pub fn values(&self) -> impl Iterator<Item = (&ValueItemId, &DecodedValue)> {
        self.values.iter()
    }

    /// Prop names of the inspected component, in arrival order.
    pub fn prop_keys(&self) -> impl Iterator<Item = &str> {
        self.prop_keys.iter().map(String::as_str)
    }

    #[must_use]
    pub fn inspected(&self) -> Option<&NodeId> {
        self.inspected.as_ref()
    }

    #[must_use]
    pub fn versions(&self) -> Option<&Versions> {
        self.versions.as_ref()
    }

    #[must_use]
    pub fn detected(&self) -> Option<Detected> {
        self.detected
    }

    #[must_use]
    pub fn stores(&self) -> &StoreRefMap {
        &self.stores
    }

    // ── Handling ───────────────────────────────────────────────────────

    /// Interpret and apply one envelope.
    pub fn handle_envelope(&mut self, envelope: Envelope) -> Result<BatchReport, MirrorError> {
        let message = Message::from_envelope(envelope).inspect_err(|err| {
            tracing::warn!(error = %err, "malformed message dropped");
        })?;
        Ok(self.handle(&message))
    }

    /// Apply one message.
    pub fn handle(&mut self, message: &Message) -> BatchReport {
        match message {
            Message::StructureUpdates(updates) => {
                let len = self.structure.apply(updates).len();
                tracing::debug!(
                    nodes = len,
                    partial = updates.partial,
                    "structure mirrored"
                );
                BatchReport::APPLIED
            }
            Message::InspectorUpdate(patches) => self.apply_batch(patches),
            Message::Versions(versions) => {
                self.versions.clone_from(versions);
                BatchReport::APPLIED
            }
            Message::Detected(detected) => {
                self.detected = *detected;
                BatchReport::APPLIED
            }
            Message::ResetPanel => {
                self.reset();
                BatchReport::APPLIED
            }
            other => {
                tracing::trace!(kind = other.kind_name(), "message not mirrored");
                BatchReport::IGNORED
            }
        }
    }

    /// Switch inspection to `node`, dropping the current value items.
    ///
    /// Returns the message to send to the subject.
    pub fn inspect(&mut self, node: Option<NodeId>) -> Message {
        self.drop_values();
        self.inspected.clone_from(&node);
        Message::InspectNode(node)
    }

    /// Apply one inspector patch.
    pub fn apply_patch(&mut self, patch: &InspectorPatch) -> Result<(), MirrorError> {
        match patch {
            InspectorPatch::Value(update) => self.apply_value(update),
            InspectorPatch::Props(keys) => {
                self.apply_props(keys);
                Ok(())
            }
            InspectorPatch::Store(patch) => Ok(apply_store_patch(patch, &mut self.stores)?),
        }
    }

    /// Drop everything received from the subject.
    pub fn reset(&mut self) {
        self.structure.clear();
        self.inspected = None;
        self.drop_values();
        tracing::debug!("mirror reset");
    }

    fn apply_batch(&mut self, patches: &[InspectorPatch]) -> BatchReport {
        let mut report = BatchReport::default();
        for patch in patches {
            match self.apply_patch(patch) {
                Ok(()) => report.applied += 1,
                Err(err) => {
                    tracing::warn!(tag = patch.tag(), error = %err, "inspector patch skipped");
                    report.skipped += 1;
                }
            }
        }
        self.stores.collect_cycles();
        report
    }

    fn apply_value(&mut self, update: &ValueUpdate) -> Result<(), MirrorError> {
        let next = match self.values.get(&update.id) {
            Some(prev) => {
                let next = decode_into(&update.value, prev, &mut self.stores)?;
                if !next.same_identity(prev) {
                    dispose(prev);
                }
                next
            }
            None => decode(&update.value, None, &mut self.stores)?,
        };
        tracing::trace!(id = %update.id, "value item updated");
        self.values.insert(update.id.clone(), next);
        Ok(())
    }

    fn apply_props(&mut self, keys: &PropKeys) {
        for name in &keys.added {
            self.prop_keys.insert(name.clone());
        }
        for name in &keys.removed {
            self.prop_keys.shift_remove(name);
            if let Some(value) = self.values.shift_remove(&ValueItemId::Prop(name.clone())) {
                self.release(&value);
            }
        }
    }

    fn release(&mut self, value: &DecodedValue) {
        self.stores.release_and_sweep(value);
        dispose(value);
    }

    fn drop_values(&mut self) {
        let values = std::mem::take(&mut self.values);
        for value in values.values() {
            self.release(value);
        }
        self.prop_keys.clear();
        self.stores.collect_cycles();
        if !self.stores.is_empty() {
            tracing::warn!(remaining = self.stores.len(), "store cells outlived their values");
            self.stores.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rdt_codec::Key;
    use serde_json::json;

    fn message(value: serde_json::Value) -> Message {
        Message::from_envelope(serde_json::from_value(value).unwrap()).unwrap()
    }

    fn ids(mirror: &Mirror) -> Vec<String> {
        mirror.nodes().iter().map(|n| n.id().to_string()).collect()
    }

    #[test]
    fn structure_updates_reach_the_node_list() {
        let mut mirror = Mirror::new();
        mirror.handle(&message(json!({
            "kind": "StructureUpdates",
            "data": {
                "removed": [],
                "updated": {"R": {"R": {"id": "R", "type": "ROOT", "children": [
                    {"id": "C", "type": "COMPONENT", "name": "App", "children": []}
                ]}}},
                "partial": false
            }
        })));
        assert_eq!(ids(&mirror), vec!["R", "C"]);
        assert_eq!(mirror.nodes()[1].level(), 1);
    }

    #[test]
    fn value_items_are_decoded_and_replaced_in_place() {
        let mut mirror = Mirror::new();
        let report = mirror.handle(&message(json!({
            "kind": "InspectorUpdate",
            "data": [["value", {"id": "signal:s1", "value": [["array", [1, 2]], ["number", 1], ["number", 2]]}]]
        })));
        assert_eq!(report, BatchReport { applied: 1, skipped: 0 });
        let id = ValueItemId::Signal(NodeId::new("s1"));
        let before = mirror.value(&id).cloned().unwrap();

        mirror.handle(&message(json!({
            "kind": "InspectorUpdate",
            "data": [["value", {"id": "signal:s1", "value": [["array", [1]], ["number", 5]]}]]
        })));
        let after = mirror.value(&id).unwrap();
        assert!(after.same_identity(&before));
        assert_eq!(after.to_json().unwrap(), json!([5.0]));
    }

    #[test]
    fn replacing_a_value_leaves_a_store_held_elsewhere_intact() {
        let mut mirror = Mirror::new();
        mirror.handle(&message(json!({
            "kind": "InspectorUpdate",
            "data": [
                ["value", {"id": "signal:a", "value": [
                    ["array", [1, 2]], ["store", "s:2"], ["object", {"x": 3}], ["number", 1]
                ]}],
                ["value", {"id": "signal:b", "value": [["store", "s:1"], ["object", {}]]}]
            ]
        })));
        mirror.handle(&message(json!({
            "kind": "InspectorUpdate",
            "data": [["value", {"id": "signal:a", "value": [["number", 0]]}]]
        })));

        let b = mirror.value(&ValueItemId::Signal(NodeId::new("b"))).unwrap();
        let content = b.store().unwrap().value();
        assert!(content.composite().unwrap().is_expanded());
        assert_eq!(content.to_json().unwrap(), json!({"x": 1.0}));
        assert_eq!(mirror.stores().ref_count(&NodeId::new("s")), 1);
    }

    #[test]
    fn failing_patch_does_not_stop_the_batch() {
        let mut mirror = Mirror::new();
        let report = mirror.handle(&message(json!({
            "kind": "InspectorUpdate",
            "data": [
                ["store", {"storeId": "ghost", "path": [], "property": "x", "value": [["number", 1]]}],
                ["value", {"id": "value", "value": [["string", "ok"]]}]
            ]
        })));
        assert_eq!(report, BatchReport { applied: 1, skipped: 1 });
        assert!(mirror.value(&ValueItemId::Value).is_some());
    }

    #[test]
    fn store_patches_update_shared_cells() {
        let mut mirror = Mirror::new();
        mirror.handle(&message(json!({
            "kind": "InspectorUpdate",
            "data": [["value", {"id": "signal:s1", "value": [
                ["store", "st:1"],
                ["object", {"done": 2}],
                ["boolean", false]
            ]}]]
        })));
        assert_eq!(mirror.stores().ref_count(&NodeId::new("st")), 1);

        mirror.handle(&message(json!({
            "kind": "InspectorUpdate",
            "data": [["store", {"storeId": "st", "path": [], "property": "done", "value": [["boolean", true]]}]]
        })));
        let value = mirror.value(&ValueItemId::Signal(NodeId::new("s1"))).unwrap();
        let done = value.get(&Key::from("done")).unwrap();
        assert!(matches!(done, DecodedValue::Boolean(true)));
    }

    #[test]
    fn removed_props_release_their_stores() {
        let mut mirror = Mirror::new();
        mirror.handle(&message(json!({
            "kind": "InspectorUpdate",
            "data": [
                ["props", {"added": ["items", "title"], "removed": []}],
                ["value", {"id": "prop:items", "value": [["store", "st:1"], ["array", []]]}]
            ]
        })));
        assert_eq!(mirror.prop_keys().collect::<Vec<_>>(), vec!["items", "title"]);
        assert_eq!(mirror.stores().len(), 1);

        mirror.handle(&message(json!({
            "kind": "InspectorUpdate",
            "data": [["props", {"added": [], "removed": ["items"]}]]
        })));
        assert_eq!(mirror.prop_keys().collect::<Vec<_>>(), vec!["title"]);
        assert!(mirror.value(&ValueItemId::Prop("items".into())).is_none());
        assert!(mirror.stores().is_empty());
    }

    #[test]
    fn reset_panel_drops_everything_from_the_subject() {
        let mut mirror = Mirror::new();
        mirror.handle(&message(json!({
            "kind": "StructureUpdates",
            "data": {"removed": [], "updated": {"R": {"R": {"id": "R", "type": "ROOT"}}}, "partial": false}
        })));
        mirror.inspect(Some(NodeId::new("R")));
        mirror.handle(&message(json!({
            "kind": "InspectorUpdate",
            "data": [["value", {"id": "value", "value": [["store", "st:1"], ["null", null]]}]]
        })));
        assert_eq!(mirror.stores().len(), 1);

        mirror.handle(&Message::ResetPanel);
        assert!(mirror.nodes().is_empty());
        assert!(mirror.values().next().is_none());
        assert!(mirror.stores().is_empty());
        assert_eq!(mirror.inspected(), None);
    }

    #[test]
    fn inspect_switches_selection() {
        let mut mirror = Mirror::new();
        mirror.handle(&message(json!({
            "kind": "InspectorUpdate",
            "data": [["value", {"id": "value", "value": [["number", 1]]}]]
        })));
        let outgoing = mirror.inspect(Some(NodeId::new("n2")));
        assert_eq!(outgoing, Message::InspectNode(Some(NodeId::new("n2"))));
        assert_eq!(mirror.inspected(), Some(&NodeId::new("n2")));
        assert!(mirror.values().next().is_none());
    }

    #[test]
    fn versions_and_detection_are_kept() {
        let mut mirror = Mirror::new();
        mirror.handle(&message(json!({"kind": "Detected", "data": {"solid": true}})));
        mirror.handle(&message(json!({"kind": "Versions", "data": {"client": "0.1.0"}})));
        assert_eq!(mirror.detected().map(|d| d.solid), Some(true));
        assert_eq!(mirror.versions().and_then(|v| v.client.as_deref()), Some("0.1.0"));

        mirror.handle(&message(json!({"kind": "Versions", "data": null})));
        assert_eq!(mirror.versions(), None);
    }

    #[test]
    fn malformed_envelope_is_an_error() {
        let mut mirror = Mirror::new();
        let envelope = Envelope::new("InspectorUpdate", json!({"not": "a list"}));
        assert!(matches!(
            mirror.handle_envelope(envelope),
            Err(MirrorError::Protocol(_))
        ));
    }
}
