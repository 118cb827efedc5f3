#![forbid(unsafe_code)]

//! Wire records of the value codec.
//!
//! An encoded value is a flat list of [`EncodedValue`] records. Position 0 is
//! the root. Composite records either carry a length (preview) or map each
//! key/index to another position of the same list (deep), which is how one
//! flat list expresses shared sub-objects and cycles.
//!
//! On the wire every record is the two-element array `[kind, payload]`:
//!
//! ```text
//! ["number", 1]            ["number", "NaN"]       ["null", "undefined"]
//! ["array", 3]             ["array", [1, 2, 0]]    ["object", {"self": 0}]
//! ["element", "e4:div"]    ["store", "s1:2"]       ["getter", "count"]
//! ```
//!
//! The payload forms are JSON-safe: `NaN` and the infinities travel as the
//! string tokens below, `undefined` as the [`UNDEFINED`] token.

use rdt_core::NodeId;
use serde::de::Error as _;
use serde::ser::SerializeTuple;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::CodecError;

pub const INFINITY: &str = "Infinity";
pub const NEGATIVE_INFINITY: &str = "-Infinity";
pub const NAN: &str = "NaN";
pub const UNDEFINED: &str = "undefined";

/// Kind tag of one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Number,
    Boolean,
    String,
    Null,
    Symbol,
    Function,
    Getter,
    Element,
    Instance,
    Array,
    Object,
    Store,
    Unknown,
}

impl ValueKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::String => "string",
            Self::Null => "null",
            Self::Symbol => "symbol",
            Self::Function => "function",
            Self::Getter => "getter",
            Self::Element => "element",
            Self::Instance => "instance",
            Self::Array => "array",
            Self::Object => "object",
            Self::Store => "store",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a wire tag.
    pub fn parse(tag: &str) -> Result<Self, CodecError> {
        Ok(match tag {
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "string" => Self::String,
            "null" => Self::Null,
            "symbol" => Self::Symbol,
            "function" => Self::Function,
            "getter" => Self::Getter,
            "element" => Self::Element,
            "instance" => Self::Instance,
            "array" => Self::Array,
            "object" => Self::Object,
            "store" => Self::Store,
            "unknown" => Self::Unknown,
            other => {
                return Err(CodecError::UnknownKind {
                    kind: other.to_string(),
                });
            }
        })
    }
}

/// Payload of a composite record.
#[derive(Debug, Clone, PartialEq)]
pub enum Entries<T> {
    /// Shallow form: only the number of items/keys is known.
    Preview(usize),
    /// Deep form: every item/key points at another position.
    Deep(T),
}

impl<T> Entries<T> {
    #[must_use]
    pub fn is_deep(&self) -> bool {
        matches!(self, Self::Deep(_))
    }
}

pub type ArrayEntries = Entries<Vec<usize>>;
pub type ObjectEntries = Entries<Vec<(String, usize)>>;

/// One position of an encoded list.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodedValue {
    Number(f64),
    Boolean(bool),
    String(String),
    Null,
    Undefined,
    Symbol(String),
    Function(String),
    Getter(String),
    Element { id: NodeId, name: String },
    Instance(String),
    Array(ArrayEntries),
    Object(ObjectEntries),
    Store { store_id: NodeId, position: usize },
    Unknown,
}

impl EncodedValue {
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Number(_) => ValueKind::Number,
            Self::Boolean(_) => ValueKind::Boolean,
            Self::String(_) => ValueKind::String,
            Self::Null | Self::Undefined => ValueKind::Null,
            Self::Symbol(_) => ValueKind::Symbol,
            Self::Function(_) => ValueKind::Function,
            Self::Getter(_) => ValueKind::Getter,
            Self::Element { .. } => ValueKind::Element,
            Self::Instance(_) => ValueKind::Instance,
            Self::Array(_) => ValueKind::Array,
            Self::Object(_) => ValueKind::Object,
            Self::Store { .. } => ValueKind::Store,
            Self::Unknown => ValueKind::Unknown,
        }
    }

    /// Positions this record points at, in key order.
    pub fn references(&self) -> Box<dyn Iterator<Item = usize> + '_> {
        match self {
            Self::Array(Entries::Deep(items)) => Box::new(items.iter().copied()),
            Self::Object(Entries::Deep(entries)) => Box::new(entries.iter().map(|(_, p)| *p)),
            Self::Store { position, .. } => Box::new(std::iter::once(*position)),
            _ => Box::new(std::iter::empty()),
        }
    }

    /// Build a record from its wire parts.
    pub fn from_parts(tag: &str, payload: Value) -> Result<Self, CodecError> {
        let kind = ValueKind::parse(tag)?;
        let name = kind.as_str();
        Ok(match kind {
            ValueKind::Number => Self::Number(decode_number(&payload)?),
            ValueKind::Boolean => match payload {
                Value::Bool(b) => Self::Boolean(b),
                other => return Err(CodecError::malformed(name, format!("expected bool, got {other}"))),
            },
            ValueKind::Null => match payload {
                Value::Null => Self::Null,
                Value::String(s) if s == UNDEFINED => Self::Undefined,
                other => return Err(CodecError::malformed(name, format!("unexpected {other}"))),
            },
            ValueKind::String => Self::String(expect_string(name, payload)?),
            ValueKind::Symbol => Self::Symbol(expect_string(name, payload)?),
            ValueKind::Function => Self::Function(expect_string(name, payload)?),
            ValueKind::Getter => Self::Getter(expect_string(name, payload)?),
            ValueKind::Instance => Self::Instance(expect_string(name, payload)?),
            ValueKind::Element => {
                let raw = expect_string(name, payload)?;
                let (id, tag) = raw
                    .split_once(':')
                    .ok_or_else(|| CodecError::malformed(name, format!("`{raw}` is not `id:name`")))?;
                Self::Element {
                    id: NodeId::new(id),
                    name: tag.to_string(),
                }
            }
            ValueKind::Store => {
                let raw = expect_string(name, payload)?;
                let (id, position) = raw
                    .rsplit_once(':')
                    .ok_or_else(|| CodecError::malformed(name, format!("`{raw}` is not `id:position`")))?;
                let position = position
                    .parse()
                    .map_err(|err| CodecError::malformed(name, format!("bad position in `{raw}`: {err}")))?;
                Self::Store {
                    store_id: NodeId::new(id),
                    position,
                }
            }
            ValueKind::Array => Self::Array(match payload {
                Value::Array(items) => Entries::Deep(
                    items
                        .iter()
                        .map(|item| expect_position(name, item))
                        .collect::<Result<_, _>>()?,
                ),
                other => Entries::Preview(expect_position(name, &other)?),
            }),
            ValueKind::Object => Self::Object(match payload {
                Value::Object(map) => Entries::Deep(
                    map.iter()
                        .map(|(key, item)| Ok((key.clone(), expect_position(name, item)?)))
                        .collect::<Result<_, CodecError>>()?,
                ),
                other => Entries::Preview(expect_position(name, &other)?),
            }),
            ValueKind::Unknown => Self::Unknown,
        })
    }

    /// Wire payload of this record.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::Number(n) => encode_number(*n),
            Self::Boolean(b) => Value::Bool(*b),
            Self::String(s)
            | Self::Symbol(s)
            | Self::Function(s)
            | Self::Getter(s)
            | Self::Instance(s) => Value::String(s.clone()),
            Self::Null | Self::Unknown => Value::Null,
            Self::Undefined => Value::String(UNDEFINED.to_string()),
            Self::Element { id, name } => Value::String(format!("{id}:{name}")),
            Self::Store { store_id, position } => Value::String(format!("{store_id}:{position}")),
            Self::Array(Entries::Preview(len)) | Self::Object(Entries::Preview(len)) => {
                Value::from(*len)
            }
            Self::Array(Entries::Deep(items)) => {
                Value::Array(items.iter().map(|p| Value::from(*p)).collect())
            }
            Self::Object(Entries::Deep(entries)) => {
                let mut map = Map::with_capacity(entries.len());
                for (key, p) in entries {
                    map.insert(key.clone(), Value::from(*p));
                }
                Value::Object(map)
            }
        }
    }
}

fn encode_number(n: f64) -> Value {
    if n.is_nan() {
        Value::String(NAN.to_string())
    } else if n == f64::INFINITY {
        Value::String(INFINITY.to_string())
    } else if n == f64::NEG_INFINITY {
        Value::String(NEGATIVE_INFINITY.to_string())
    } else {
        serde_json::Number::from_f64(n).map_or(Value::Null, Value::Number)
    }
}

fn decode_number(payload: &Value) -> Result<f64, CodecError> {
    match payload {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| CodecError::malformed("number", format!("{n} is not representable"))),
        Value::String(s) => match s.as_str() {
            NAN => Ok(f64::NAN),
            INFINITY => Ok(f64::INFINITY),
            NEGATIVE_INFINITY => Ok(f64::NEG_INFINITY),
            other => Err(CodecError::malformed("number", format!("unknown sentinel `{other}`"))),
        },
        other => Err(CodecError::malformed("number", format!("unexpected {other}"))),
    }
}

fn expect_string(kind: &'static str, payload: Value) -> Result<String, CodecError> {
    match payload {
        Value::String(s) => Ok(s),
        other => Err(CodecError::malformed(kind, format!("expected string, got {other}"))),
    }
}

fn expect_position(kind: &'static str, payload: &Value) -> Result<usize, CodecError> {
    payload
        .as_u64()
        .and_then(|p| usize::try_from(p).ok())
        .ok_or_else(|| CodecError::malformed(kind, format!("expected position, got {payload}")))
}

impl Serialize for EncodedValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(self.kind().as_str())?;
        tuple.serialize_element(&self.payload())?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for EncodedValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (tag, payload) = <(String, Value)>::deserialize(deserializer)?;
        Self::from_parts(&tag, payload).map_err(D::Error::custom)
    }
}

/// Check that every position referenced by `list` exists.
///
/// Decoding only starts after this passes, so a decode never fails half-way
/// through and never leaves the store map partially updated.
pub fn validate(list: &[EncodedValue]) -> Result<(), CodecError> {
    if list.is_empty() {
        return Err(CodecError::EmptyList);
    }
    for (at, record) in list.iter().enumerate() {
        if let Some(target) = record.references().find(|&p| p >= list.len()) {
            return Err(CodecError::DanglingPosition {
                at,
                target,
                len: list.len(),
            });
        }
    }
    Ok(())
}
