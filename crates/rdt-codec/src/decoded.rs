#![forbid(unsafe_code)]

//! Live, patchable counterpart of an encoded list.
//!
//! Composites are shared containers (`Rc<Composite>`): every reference to the
//! same encoded position within one decode yields the same container, so
//! cycles decode into identity cycles. A store decodes into one
//! [`StoreCell`] shared by every reference to its store id, across decodes.
//!
//! # Invariants
//!
//! 1. A composite's `length` always equals its child count when expanded.
//! 2. An unexpanded (preview) composite has no children, only a length.
//! 3. Store cells are only created and evicted by
//!    [`StoreRefMap`](crate::store::StoreRefMap).
//!
//! `Debug` on these types is shallow, so printing a cyclic value terminates.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use rdt_core::NodeId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::encoded::{INFINITY, NAN, NEGATIVE_INFINITY, UNDEFINED};
use crate::error::CodecError;

/// Key of one child inside a composite: an array index or an object key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Index(usize),
    Name(String),
}

impl Key {
    /// Interpret the key as an array index (numeric strings included).
    #[must_use]
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(i) => Some(*i),
            Self::Name(name) => name.parse().ok(),
        }
    }

    /// Interpret the key as an object key.
    #[must_use]
    pub fn as_name(&self) -> String {
        match self {
            Self::Index(i) => i.to_string(),
            Self::Name(name) => name.clone(),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "[{i}]"),
            Self::Name(name) => write!(f, "`{name}`"),
        }
    }
}

impl From<usize> for Key {
    fn from(value: usize) -> Self {
        Self::Index(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Self::Name(value.to_string())
    }
}

/// Children of an expanded composite.
#[derive(Clone, Debug)]
pub enum Children {
    Array(Vec<DecodedValue>),
    Object(Vec<(String, DecodedValue)>),
}

impl Children {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Array(items) => items.len(),
            Self::Object(entries) => entries.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn get(&self, key: &Key) -> Option<&DecodedValue> {
        match self {
            Self::Array(items) => key.as_index().and_then(|i| items.get(i)),
            Self::Object(entries) => {
                let name = key.as_name();
                entries.iter().find(|(k, _)| *k == name).map(|(_, v)| v)
            }
        }
    }

    /// Iterate children in key order.
    pub fn values(&self) -> Box<dyn Iterator<Item = &DecodedValue> + '_> {
        match self {
            Self::Array(items) => Box::new(items.iter()),
            Self::Object(entries) => Box::new(entries.iter().map(|(_, v)| v)),
        }
    }
}

/// Shared container behind [`DecodedValue::Array`] and [`DecodedValue::Object`].
pub struct Composite {
    length: Cell<usize>,
    children: RefCell<Option<Children>>,
}

impl Composite {
    /// An unexpanded container that only knows its length.
    #[must_use]
    pub fn preview(length: usize) -> Rc<Self> {
        Rc::new(Self {
            length: Cell::new(length),
            children: RefCell::new(None),
        })
    }

    /// An expanded container.
    #[must_use]
    pub fn expanded(children: Children) -> Rc<Self> {
        Rc::new(Self {
            length: Cell::new(children.len()),
            children: RefCell::new(Some(children)),
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.length.get()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_expanded(&self) -> bool {
        self.children.borrow().is_some()
    }

    /// Child under `key`, if expanded and present.
    #[must_use]
    pub fn get(&self, key: &Key) -> Option<DecodedValue> {
        self.children.borrow().as_ref()?.get(key).cloned()
    }

    /// Snapshot of the children (cheap: composites are shared, not copied).
    #[must_use]
    pub fn children(&self) -> Option<Children> {
        self.children.borrow().clone()
    }

    /// Replace the children wholesale, keeping this container's identity.
    pub fn set_children(&self, children: Children) -> Option<Children> {
        self.length.set(children.len());
        self.children.replace(Some(children))
    }

    /// Collapse to preview form with the given length.
    pub fn set_preview(&self, length: usize) -> Option<Children> {
        self.length.set(length);
        self.children.replace(None)
    }

    pub(crate) fn with_children_mut<R>(&self, f: impl FnOnce(&mut Children) -> R) -> Option<R> {
        let mut slot = self.children.borrow_mut();
        let children = slot.as_mut()?;
        let out = f(children);
        self.length.set(children.len());
        Some(out)
    }

    pub(crate) fn take_children(&self) -> Option<Children> {
        self.children.borrow_mut().take()
    }
}

impl fmt::Debug for Composite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composite")
            .field("length", &self.len())
            .field("expanded", &self.is_expanded())
            .finish()
    }
}

/// Mutable cell shared by every reference to one store id.
pub struct StoreCell {
    id: NodeId,
    value: RefCell<DecodedValue>,
}

impl StoreCell {
    pub(crate) fn new(id: NodeId) -> Rc<Self> {
        Rc::new(Self {
            id,
            value: RefCell::new(DecodedValue::Undefined),
        })
    }

    #[must_use]
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Current content of the store.
    #[must_use]
    pub fn value(&self) -> DecodedValue {
        self.value.borrow().clone()
    }

    pub(crate) fn set(&self, value: DecodedValue) -> DecodedValue {
        self.value.replace(value)
    }
}

/// Address of a shared container, used as a visited-set key.
pub(crate) fn addr<T>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc) as *const () as usize
}

impl fmt::Debug for StoreCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreCell").field("id", &self.id).finish()
    }
}

/// One decoded value.
///
/// Cloning shares composite and store identity.
#[derive(Clone, Debug)]
pub enum DecodedValue {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Symbol(String),
    Function(String),
    Getter(String),
    Element { id: NodeId, name: String },
    Instance(String),
    Array(Rc<Composite>),
    Object(Rc<Composite>),
    Store(Rc<StoreCell>),
    Unknown,
}

impl DecodedValue {
    /// The composite container, for arrays and objects.
    #[must_use]
    pub fn composite(&self) -> Option<&Rc<Composite>> {
        match self {
            Self::Array(c) | Self::Object(c) => Some(c),
            _ => None,
        }
    }

    #[must_use]
    pub fn store(&self) -> Option<&Rc<StoreCell>> {
        match self {
            Self::Store(cell) => Some(cell),
            _ => None,
        }
    }

    /// Whether both values are the same shared container (or store cell).
    #[must_use]
    pub fn same_identity(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Array(a), Self::Array(b)) | (Self::Object(a), Self::Object(b)) => {
                Rc::ptr_eq(a, b)
            }
            (Self::Store(a), Self::Store(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Child under `key`, looking through a store to its content.
    #[must_use]
    pub fn get(&self, key: &Key) -> Option<DecodedValue> {
        match self {
            Self::Store(cell) => cell.value().get(key),
            other => other.composite()?.get(key),
        }
    }

    /// Cycle-safe structural comparison.
    ///
    /// Two cyclic values compare equal when their graphs are bisimilar; store
    /// cells compare by id.
    #[must_use]
    pub fn structurally_eq(&self, other: &Self) -> bool {
        let mut assumed = HashSet::new();
        structurally_eq_inner(self, other, &mut assumed)
    }

    /// Plain JSON view of an acyclic value.
    ///
    /// Numeric specials and `undefined` use the wire sentinels; previews show
    /// as `{"$length": n}`; stores as `{"$store": id, "value": ...}`.
    pub fn to_json(&self) -> Result<Value, CodecError> {
        let mut path = HashSet::new();
        to_json_inner(self, &mut path)
    }
}

fn structurally_eq_inner(
    a: &DecodedValue,
    b: &DecodedValue,
    assumed: &mut HashSet<(usize, usize)>,
) -> bool {
    use DecodedValue as V;
    match (a, b) {
        (V::Undefined, V::Undefined) | (V::Null, V::Null) | (V::Unknown, V::Unknown) => true,
        (V::Boolean(x), V::Boolean(y)) => x == y,
        (V::Number(x), V::Number(y)) => x == y || (x.is_nan() && y.is_nan()),
        (V::String(x), V::String(y))
        | (V::Symbol(x), V::Symbol(y))
        | (V::Function(x), V::Function(y))
        | (V::Getter(x), V::Getter(y))
        | (V::Instance(x), V::Instance(y)) => x == y,
        (V::Element { id: ia, name: na }, V::Element { id: ib, name: nb }) => {
            ia == ib && na == nb
        }
        (V::Store(x), V::Store(y)) => x.id == y.id,
        (V::Array(x), V::Array(y)) | (V::Object(x), V::Object(y)) => {
            if !assumed.insert((addr(x), addr(y))) {
                return true;
            }
            if x.len() != y.len() {
                return false;
            }
            match (x.children(), y.children()) {
                (None, None) => true,
                (Some(Children::Array(xs)), Some(Children::Array(ys))) => xs
                    .iter()
                    .zip(&ys)
                    .all(|(p, q)| structurally_eq_inner(p, q, assumed)),
                (Some(Children::Object(xs)), Some(Children::Object(ys))) => {
                    xs.iter().zip(&ys).all(|((kp, p), (kq, q))| {
                        kp == kq && structurally_eq_inner(p, q, assumed)
                    })
                }
                _ => false,
            }
        }
        _ => false,
    }
}

fn to_json_inner(value: &DecodedValue, path: &mut HashSet<usize>) -> Result<Value, CodecError> {
    use DecodedValue as V;
    Ok(match value {
        V::Undefined => Value::String(UNDEFINED.to_string()),
        V::Null | V::Unknown => Value::Null,
        V::Boolean(b) => Value::Bool(*b),
        V::Number(n) if n.is_nan() => Value::String(NAN.to_string()),
        V::Number(n) if *n == f64::INFINITY => Value::String(INFINITY.to_string()),
        V::Number(n) if *n == f64::NEG_INFINITY => Value::String(NEGATIVE_INFINITY.to_string()),
        V::Number(n) => serde_json::Number::from_f64(*n).map_or(Value::Null, Value::Number),
        V::String(s) => Value::String(s.clone()),
        V::Symbol(s) => Value::String(format!("Symbol({s})")),
        V::Function(s) => Value::String(format!("f {s}()")),
        V::Getter(s) => Value::String(format!("get {s}")),
        V::Instance(s) => Value::String(format!("{s} {{}}")),
        V::Element { id, name } => Value::String(format!("<{name} #{id}>")),
        V::Store(cell) => {
            if !path.insert(addr(cell)) {
                return Err(CodecError::Cycle);
            }
            let mut map = Map::new();
            map.insert("$store".into(), Value::String(cell.id.to_string()));
            map.insert("value".into(), to_json_inner(&cell.value(), path)?);
            path.remove(&addr(cell));
            Value::Object(map)
        }
        V::Array(c) | V::Object(c) => {
            if !path.insert(addr(c)) {
                return Err(CodecError::Cycle);
            }
            let out = match c.children() {
                None => {
                    let mut map = Map::new();
                    map.insert("$length".into(), Value::from(c.len()));
                    Value::Object(map)
                }
                Some(Children::Array(items)) => Value::Array(
                    items
                        .iter()
                        .map(|item| to_json_inner(item, path))
                        .collect::<Result<_, _>>()?,
                ),
                Some(Children::Object(entries)) => {
                    let mut map = Map::with_capacity(entries.len());
                    for (key, item) in &entries {
                        map.insert(key.clone(), to_json_inner(item, path)?);
                    }
                    Value::Object(map)
                }
            };
            path.remove(&addr(c));
            out
        }
    })
}

/// Break the reference graph of a value that is being discarded.
///
/// Clears the children of every composite reachable from `value` so that
/// cycles inside the discarded tree are freed. Store cells are shared with
/// other live values and are never entered.
pub fn dispose(value: &DecodedValue) {
    dispose_from(vec![value.clone()], HashSet::new());
}

/// Dispose `discarded` while sparing every composite `live` still reaches.
pub(crate) fn dispose_unreachable(discarded: &[DecodedValue], live: &DecodedValue) {
    if discarded.iter().all(|value| value.composite().is_none()) {
        return;
    }
    let mut seen = HashSet::new();
    let mut stack = vec![live.clone()];
    while let Some(next) = stack.pop() {
        let Some(composite) = next.composite() else {
            continue;
        };
        if !seen.insert(addr(composite)) {
            continue;
        }
        if let Some(children) = composite.children() {
            stack.extend(children.values().cloned());
        }
    }
    dispose_from(discarded.to_vec(), seen);
}

fn dispose_from(mut stack: Vec<DecodedValue>, mut seen: HashSet<usize>) {
    while let Some(next) = stack.pop() {
        let Some(composite) = next.composite() else {
            continue;
        };
        if !seen.insert(addr(composite)) {
            continue;
        }
        if let Some(children) = composite.take_children() {
            stack.extend(children.values().cloned());
        }
    }
}
