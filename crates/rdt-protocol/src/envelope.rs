#![forbid(unsafe_code)]

//! The `{kind, data}` envelope every channel carries.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kinds the core routes or interprets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Versions,
    Detected,
    DevtoolsOpened,
    ResetPanel,
    ResetState,
    StructureUpdates,
    InspectorUpdate,
    InspectNode,
    InspectValue,
    HighlightElement,
    ToggleModule,
}

impl MessageKind {
    pub const ALL: [Self; 11] = [
        Self::Versions,
        Self::Detected,
        Self::DevtoolsOpened,
        Self::ResetPanel,
        Self::ResetState,
        Self::StructureUpdates,
        Self::InspectorUpdate,
        Self::InspectNode,
        Self::InspectValue,
        Self::HighlightElement,
        Self::ToggleModule,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Versions => "Versions",
            Self::Detected => "Detected",
            Self::DevtoolsOpened => "DevtoolsOpened",
            Self::ResetPanel => "ResetPanel",
            Self::ResetState => "ResetState",
            Self::StructureUpdates => "StructureUpdates",
            Self::InspectorUpdate => "InspectorUpdate",
            Self::InspectNode => "InspectNode",
            Self::InspectValue => "InspectValue",
            Self::HighlightElement => "HighlightElement",
            Self::ToggleModule => "ToggleModule",
        }
    }

    #[must_use]
    pub fn parse(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == kind)
    }

    /// Subject messages of this kind reach every observer kind, not only
    /// the live panel.
    #[must_use]
    pub const fn is_broadcast(self) -> bool {
        matches!(self, Self::Versions | Self::Detected)
    }
}

/// Wire envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    #[must_use]
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Envelope of a kind without payload.
    #[must_use]
    pub fn void(kind: MessageKind) -> Self {
        Self::new(kind.as_str(), Value::Null)
    }

    #[must_use]
    pub fn devtools_opened(opened: bool) -> Self {
        Self::new(MessageKind::DevtoolsOpened.as_str(), Value::Bool(opened))
    }

    /// The known kind of this envelope, if any.
    #[must_use]
    pub fn known_kind(&self) -> Option<MessageKind> {
        MessageKind::parse(&self.kind)
    }

    #[must_use]
    pub fn is(&self, kind: MessageKind) -> bool {
        self.kind == kind.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kinds_parse_back() {
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(MessageKind::parse("Nope"), None);
    }

    #[test]
    fn envelope_wire_shape() {
        let envelope = Envelope::devtools_opened(true);
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({"kind": "DevtoolsOpened", "data": true})
        );
        let void: Envelope = serde_json::from_value(json!({"kind": "ResetPanel"})).unwrap();
        assert!(void.is(MessageKind::ResetPanel));
        assert_eq!(void.data, Value::Null);
    }
}
