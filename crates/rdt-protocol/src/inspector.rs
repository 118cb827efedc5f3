#![forbid(unsafe_code)]

//! Inspector payloads: value item ids and the tagged patches of an
//! `InspectorUpdate`.
//!
//! A patch travels as the two-element array `[tag, data]`:
//!
//! ```text
//! ["value", {"id": "signal:s3", "value": [["number", 1]]}]
//! ["props", {"added": ["title"], "removed": []}]
//! ["store", {"storeId": "s1", "path": ["todos", 0], "property": "done", "value": [["boolean", true]]}]
//! ```

use std::fmt;
use std::str::FromStr;

use rdt_codec::{EncodedValue, StorePatch};
use rdt_core::NodeId;
use serde::de::Error as _;
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::ProtocolError;

/// Identifies one inspected value of the selected owner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ValueItemId {
    /// A signal, memo or store owned by the inspected node.
    Signal(NodeId),
    /// A component prop.
    Prop(String),
    /// The owner's own value (memo result, computation value).
    Value,
}

const SIGNAL_PREFIX: &str = "signal:";
const PROP_PREFIX: &str = "prop:";
const OWN_VALUE: &str = "value";

impl fmt::Display for ValueItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(id) => write!(f, "{SIGNAL_PREFIX}{id}"),
            Self::Prop(name) => write!(f, "{PROP_PREFIX}{name}"),
            Self::Value => f.write_str(OWN_VALUE),
        }
    }
}

impl FromStr for ValueItemId {
    type Err = ProtocolError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw == OWN_VALUE {
            return Ok(Self::Value);
        }
        if let Some(id) = raw.strip_prefix(SIGNAL_PREFIX).filter(|id| !id.is_empty()) {
            return Ok(Self::Signal(NodeId::new(id)));
        }
        if let Some(name) = raw.strip_prefix(PROP_PREFIX) {
            return Ok(Self::Prop(name.to_string()));
        }
        Err(ProtocolError::ValueItemId {
            raw: raw.to_string(),
        })
    }
}

impl Serialize for ValueItemId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ValueItemId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

/// New content of one value item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueUpdate {
    pub id: ValueItemId,
    pub value: Vec<EncodedValue>,
}

/// Prop keys that appeared or disappeared on the inspected component.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropKeys {
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
}

/// One entry of an `InspectorUpdate` batch.
#[derive(Debug, Clone, PartialEq)]
pub enum InspectorPatch {
    Value(ValueUpdate),
    Props(PropKeys),
    Store(StorePatch),
}

impl InspectorPatch {
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Value(_) => "value",
            Self::Props(_) => "props",
            Self::Store(_) => "store",
        }
    }

    /// Build a patch from its wire parts.
    pub fn from_parts(tag: &str, data: Value) -> Result<Self, ProtocolError> {
        let wrap = |source| ProtocolError::payload(format!("InspectorUpdate/{tag}"), source);
        Ok(match tag {
            "value" => Self::Value(serde_json::from_value(data).map_err(wrap)?),
            "props" => Self::Props(serde_json::from_value(data).map_err(wrap)?),
            "store" => Self::Store(serde_json::from_value(data).map_err(wrap)?),
            other => {
                return Err(ProtocolError::UnknownPatch {
                    tag: other.to_string(),
                });
            }
        })
    }
}

impl Serialize for InspectorPatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(self.tag())?;
        match self {
            Self::Value(update) => tuple.serialize_element(update)?,
            Self::Props(keys) => tuple.serialize_element(keys)?,
            Self::Store(patch) => tuple.serialize_element(patch)?,
        }
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for InspectorPatch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (tag, data) = <(String, Value)>::deserialize(deserializer)?;
        Self::from_parts(&tag, data).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rdt_codec::StorePatchValue;
    use serde_json::json;

    #[test]
    fn value_item_ids_parse() {
        assert_eq!("value".parse::<ValueItemId>().unwrap(), ValueItemId::Value);
        assert_eq!(
            "signal:s12".parse::<ValueItemId>().unwrap(),
            ValueItemId::Signal(NodeId::new("s12"))
        );
        assert_eq!(
            "prop:on:click".parse::<ValueItemId>().unwrap(),
            ValueItemId::Prop("on:click".into())
        );
        assert!("signal:".parse::<ValueItemId>().is_err());
        assert!("memo:1".parse::<ValueItemId>().is_err());
        assert_eq!(ValueItemId::Prop("title".into()).to_string(), "prop:title");
    }

    #[test]
    fn patches_read_tagged_tuples() {
        let batch: Vec<InspectorPatch> = serde_json::from_value(json!([
            ["value", {"id": "signal:s1", "value": [["number", 1]]}],
            ["props", {"added": ["title"], "removed": ["old"]}],
            ["store", {"storeId": "st", "path": ["a"], "property": 0, "value": 3}]
        ]))
        .unwrap();
        assert_eq!(
            batch[0],
            InspectorPatch::Value(ValueUpdate {
                id: ValueItemId::Signal(NodeId::new("s1")),
                value: vec![EncodedValue::Number(1.0)],
            })
        );
        assert_eq!(
            batch[1],
            InspectorPatch::Props(PropKeys {
                added: vec!["title".into()],
                removed: vec!["old".into()],
            })
        );
        let InspectorPatch::Store(store) = &batch[2] else {
            panic!("expected store patch");
        };
        assert_eq!(store.value, Some(StorePatchValue::Length(3)));
    }

    #[test]
    fn patches_write_tagged_tuples() {
        let patch = InspectorPatch::Props(PropKeys {
            added: vec!["a".into()],
            removed: vec![],
        });
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!(["props", {"added": ["a"], "removed": []}])
        );
    }

    #[test]
    fn unknown_patch_tag_is_rejected() {
        let parsed = serde_json::from_value::<InspectorPatch>(json!(["bogus", {}]));
        assert!(parsed.is_err());
    }
}
