#![forbid(unsafe_code)]

//! Typed view of an [`Envelope`].
//!
//! [`Message`] is a closed union over every kind the core interprets, with
//! [`Message::Forward`] as the declared case for kinds it only passes
//! along. Converting never loses an envelope: anything unknown is kept
//! verbatim in `Forward`.

use rdt_core::NodeId;
use rdt_structure::StructureUpdates;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::{Envelope, MessageKind};
use crate::error::ProtocolError;
use crate::inspector::{InspectorPatch, ValueItemId};

/// Versions reported by the subject.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Versions {
    #[serde(default)]
    pub client: Option<String>,
    /// Version of the observed reactive framework.
    #[serde(default, rename = "solid", alias = "framework")]
    pub framework: Option<String>,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default, alias = "client_expected")]
    pub expected_client: Option<String>,
}

/// What the subject found on its page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detected {
    /// The framework is present.
    #[serde(default)]
    pub solid: bool,
    /// The framework runs a development build.
    #[serde(default)]
    pub solid_dev: bool,
    /// The debugger client is installed.
    #[serde(default)]
    pub devtools: bool,
}

impl Detected {
    /// Whether anything worth showing an active icon for was found.
    #[must_use]
    pub fn any(&self) -> bool {
        self.solid || self.solid_dev || self.devtools
    }
}

/// Selection of one value item in the inspector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectValue {
    pub id: ValueItemId,
    pub selected: bool,
}

/// Enable or disable one debugger module on the subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleModule {
    pub module: String,
    pub enabled: bool,
}

/// Typed message.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// `None` clears a previously reported version set.
    Versions(Option<Versions>),
    /// `None` means no subject is attached.
    Detected(Option<Detected>),
    DevtoolsOpened(bool),
    ResetPanel,
    ResetState,
    StructureUpdates(StructureUpdates),
    InspectorUpdate(Vec<InspectorPatch>),
    /// Select an owner for inspection; `None` clears the selection.
    InspectNode(Option<NodeId>),
    InspectValue(InspectValue),
    /// Highlight the element of a node; `None` clears the highlight.
    HighlightElement(Option<NodeId>),
    ToggleModule(ToggleModule),
    /// A kind the core does not interpret, passed along unchanged.
    Forward(Envelope),
}

fn data<T: DeserializeOwned>(kind: MessageKind, value: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(value).map_err(|source| ProtocolError::payload(kind.as_str(), source))
}

fn to_data<T: Serialize>(kind: MessageKind, value: &T) -> Result<Value, ProtocolError> {
    serde_json::to_value(value).map_err(|source| ProtocolError::payload(kind.as_str(), source))
}

impl Message {
    /// Interpret an envelope.
    pub fn from_envelope(envelope: Envelope) -> Result<Self, ProtocolError> {
        let Some(kind) = envelope.known_kind() else {
            return Ok(Self::Forward(envelope));
        };
        let value = envelope.data;
        Ok(match kind {
            MessageKind::Versions => Self::Versions(data(kind, value)?),
            MessageKind::Detected => Self::Detected(data(kind, value)?),
            MessageKind::DevtoolsOpened => Self::DevtoolsOpened(data(kind, value)?),
            MessageKind::ResetPanel => Self::ResetPanel,
            MessageKind::ResetState => Self::ResetState,
            MessageKind::StructureUpdates => Self::StructureUpdates(data(kind, value)?),
            MessageKind::InspectorUpdate => Self::InspectorUpdate(data(kind, value)?),
            MessageKind::InspectNode => Self::InspectNode(data(kind, value)?),
            MessageKind::InspectValue => Self::InspectValue(data(kind, value)?),
            MessageKind::HighlightElement => Self::HighlightElement(data(kind, value)?),
            MessageKind::ToggleModule => Self::ToggleModule(data(kind, value)?),
        })
    }

    /// Wire form of this message.
    pub fn to_envelope(&self) -> Result<Envelope, ProtocolError> {
        use MessageKind as K;
        let (kind, value) = match self {
            Self::Forward(envelope) => return Ok(envelope.clone()),
            Self::Versions(v) => (K::Versions, to_data(K::Versions, v)?),
            Self::Detected(d) => (K::Detected, to_data(K::Detected, d)?),
            Self::DevtoolsOpened(opened) => (K::DevtoolsOpened, Value::Bool(*opened)),
            Self::ResetPanel => (K::ResetPanel, Value::Null),
            Self::ResetState => (K::ResetState, Value::Null),
            Self::StructureUpdates(u) => (K::StructureUpdates, to_data(K::StructureUpdates, u)?),
            Self::InspectorUpdate(p) => (K::InspectorUpdate, to_data(K::InspectorUpdate, p)?),
            Self::InspectNode(id) => (K::InspectNode, to_data(K::InspectNode, id)?),
            Self::InspectValue(t) => (K::InspectValue, to_data(K::InspectValue, t)?),
            Self::HighlightElement(id) => (K::HighlightElement, to_data(K::HighlightElement, id)?),
            Self::ToggleModule(t) => (K::ToggleModule, to_data(K::ToggleModule, t)?),
        };
        Ok(Envelope::new(kind.as_str(), value))
    }

    /// Known kind, `None` for [`Message::Forward`].
    #[must_use]
    pub fn kind(&self) -> Option<MessageKind> {
        Some(match self {
            Self::Versions(_) => MessageKind::Versions,
            Self::Detected(_) => MessageKind::Detected,
            Self::DevtoolsOpened(_) => MessageKind::DevtoolsOpened,
            Self::ResetPanel => MessageKind::ResetPanel,
            Self::ResetState => MessageKind::ResetState,
            Self::StructureUpdates(_) => MessageKind::StructureUpdates,
            Self::InspectorUpdate(_) => MessageKind::InspectorUpdate,
            Self::InspectNode(_) => MessageKind::InspectNode,
            Self::InspectValue(_) => MessageKind::InspectValue,
            Self::HighlightElement(_) => MessageKind::HighlightElement,
            Self::ToggleModule(_) => MessageKind::ToggleModule,
            Self::Forward(_) => return None,
        })
    }

    /// Wire name of the kind.
    #[must_use]
    pub fn kind_name(&self) -> &str {
        match self {
            Self::Forward(envelope) => &envelope.kind,
            other => other.kind().map_or("", MessageKind::as_str),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn envelope(value: Value) -> Envelope {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn detected_accepts_partial_flags() {
        let message =
            Message::from_envelope(envelope(json!({"kind": "Detected", "data": {"solid": true}})))
                .unwrap();
        assert_eq!(
            message,
            Message::Detected(Some(Detected {
                solid: true,
                ..Detected::default()
            }))
        );
        let cleared =
            Message::from_envelope(envelope(json!({"kind": "Detected", "data": null}))).unwrap();
        assert_eq!(cleared, Message::Detected(None));
    }

    #[test]
    fn versions_read_framework_aliases() {
        let message = Message::from_envelope(envelope(json!({
            "kind": "Versions",
            "data": {"client": "0.1", "solid": "1.8", "extension": "0.3", "client_expected": "0.1"}
        })))
        .unwrap();
        let Message::Versions(Some(versions)) = message else {
            panic!("expected versions");
        };
        assert_eq!(versions.framework.as_deref(), Some("1.8"));
        assert_eq!(versions.expected_client.as_deref(), Some("0.1"));
    }

    #[test]
    fn unknown_kind_is_forwarded_verbatim() {
        let raw = envelope(json!({"kind": "ConsoleInspectValue", "data": {"id": 3}}));
        let message = Message::from_envelope(raw.clone()).unwrap();
        assert_eq!(message, Message::Forward(raw.clone()));
        assert_eq!(message.kind_name(), "ConsoleInspectValue");
        assert_eq!(message.to_envelope().unwrap(), raw);
    }

    #[test]
    fn mismatched_payload_is_an_error() {
        let err = Message::from_envelope(envelope(json!({"kind": "DevtoolsOpened", "data": "yes"})))
            .unwrap_err();
        assert!(err.to_string().contains("DevtoolsOpened"));
    }

    #[test]
    fn typed_messages_write_their_envelope() {
        assert_eq!(
            Message::DevtoolsOpened(false).to_envelope().unwrap(),
            Envelope::devtools_opened(false)
        );
        assert_eq!(
            Message::InspectNode(Some(NodeId::new("o4"))).to_envelope().unwrap(),
            Envelope::new("InspectNode", json!("o4"))
        );
        assert_eq!(
            Message::ResetState.to_envelope().unwrap(),
            Envelope::void(MessageKind::ResetState)
        );
    }
}
