#![forbid(unsafe_code)]

//! Encoding a runtime value into a flat list.
//!
//! [`RuntimeValue`] models the values the subject side inspects: scalars,
//! shared mutable containers (`Rc<RefCell<..>>`, so sharing and cycles can be
//! expressed) and stores. [`encode`] flattens one value into the position
//! addressed list read by [`decode`](crate::decode::decode).
//!
//! # Invariants
//!
//! 1. Position 0 is the root.
//! 2. Every distinct container (by pointer) occupies exactly one position;
//!    further references to it, including cyclic ones, reuse that position.
//! 3. `NaN`, the infinities and `undefined` are written as sentinel tokens,
//!    so the list is always valid JSON.
//! 4. Only containers within the expansion depth carry key → position maps;
//!    the others are written as previews holding their length.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use rdt_core::NodeId;

use crate::encoded::{EncodedValue, Entries};

/// Shared, mutable array of the runtime model.
pub type RuntimeArray = Rc<RefCell<Vec<RuntimeValue>>>;
/// Shared, mutable object of the runtime model (insertion ordered).
pub type RuntimeObject = Rc<RefCell<Vec<(String, RuntimeValue)>>>;

/// Deeply observable container with a stable id.
#[derive(Debug)]
pub struct StoreSource {
    id: NodeId,
    value: RefCell<RuntimeValue>,
}

impl StoreSource {
    #[must_use]
    pub fn new(id: impl Into<NodeId>, value: RuntimeValue) -> Rc<Self> {
        Rc::new(Self {
            id: id.into(),
            value: RefCell::new(value),
        })
    }

    #[must_use]
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    #[must_use]
    pub fn value(&self) -> RuntimeValue {
        self.value.borrow().clone()
    }

    /// Replace the store's content, returning the previous one.
    pub fn set(&self, value: RuntimeValue) -> RuntimeValue {
        self.value.replace(value)
    }
}

/// A value as it exists on the subject side.
#[derive(Debug, Clone)]
pub enum RuntimeValue {
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
    Array(RuntimeArray),
    Object(RuntimeObject),
    Store(Rc<StoreSource>),
}

impl RuntimeValue {
    #[must_use]
    pub fn array(items: Vec<RuntimeValue>) -> Self {
        Self::Array(Rc::new(RefCell::new(items)))
    }

    #[must_use]
    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, RuntimeValue)>) -> Self {
        Self::Object(Rc::new(RefCell::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        )))
    }

    #[must_use]
    pub fn store(id: impl Into<NodeId>, value: RuntimeValue) -> Self {
        Self::Store(StoreSource::new(id, value))
    }

    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    /// Clear every container reachable from this value.
    ///
    /// Breaks `Rc` cycles of a value graph that is being thrown away.
    pub fn clear(&self) {
        let mut stack = vec![self.clone()];
        while let Some(next) = stack.pop() {
            match next {
                Self::Array(items) => stack.extend(items.take()),
                Self::Object(entries) => stack.extend(entries.take().into_iter().map(|(_, v)| v)),
                Self::Store(source) => stack.push(source.set(Self::Undefined)),
                _ => {}
            }
        }
    }
}

/// How far to expand nested containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Expand containers below the root. When false only the root container
    /// lists its children.
    pub deep: bool,
    /// Deepest nesting level that is still expanded (root is level 0).
    /// `None` means unbounded. Ignored unless `deep` is set.
    pub max_depth: Option<usize>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            deep: true,
            max_depth: None,
        }
    }
}

impl EncodeOptions {
    /// Root expanded, nested containers as previews.
    #[must_use]
    pub fn preview() -> Self {
        Self {
            deep: false,
            max_depth: None,
        }
    }

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.deep = true;
        self.max_depth = Some(max_depth);
        self
    }

    fn expands(&self, depth: usize) -> bool {
        if !self.deep {
            return depth == 0;
        }
        self.max_depth.is_none_or(|max| depth <= max)
    }
}

/// Result of [`encode`].
#[derive(Debug, Clone, PartialEq)]
pub struct Encoded {
    pub list: Vec<EncodedValue>,
    /// Every store the value referenced, in first-seen order.
    pub stores: Vec<NodeId>,
}

/// Flatten `value` into an encoded list.
#[must_use]
pub fn encode(value: &RuntimeValue, options: &EncodeOptions) -> Encoded {
    let mut encoder = Encoder {
        options,
        list: Vec::new(),
        seen: HashMap::new(),
        stores: Vec::new(),
        work: Vec::new(),
    };
    encoder.visit(value, 0);
    while let Some(pending) = encoder.work.pop() {
        encoder.fill(pending);
    }
    tracing::trace!(
        len = encoder.list.len(),
        stores = encoder.stores.len(),
        "encoded value"
    );
    Encoded {
        list: encoder.list,
        stores: encoder.stores,
    }
}

enum Pending {
    Array(usize, RuntimeArray, usize),
    Object(usize, RuntimeObject, usize),
    Store(usize, Rc<StoreSource>, usize),
}

struct Encoder<'o> {
    options: &'o EncodeOptions,
    list: Vec<EncodedValue>,
    seen: HashMap<usize, usize>,
    stores: Vec<NodeId>,
    work: Vec<Pending>,
}

fn addr<T>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc) as *const () as usize
}

impl Encoder<'_> {
    fn push(&mut self, record: EncodedValue) -> usize {
        self.list.push(record);
        self.list.len() - 1
    }

    /// Position of `value`, allocating it (and scheduling its contents).
    fn visit(&mut self, value: &RuntimeValue, depth: usize) -> usize {
        let shared = match value {
            RuntimeValue::Array(rc) => Some(addr(rc)),
            RuntimeValue::Object(rc) => Some(addr(rc)),
            RuntimeValue::Store(rc) => Some(addr(rc)),
            _ => None,
        };
        if let Some(pos) = shared.and_then(|key| self.seen.get(&key)) {
            return *pos;
        }
        let expand = self.options.expands(depth);
        let record = match value {
            RuntimeValue::Undefined => EncodedValue::Undefined,
            RuntimeValue::Null => EncodedValue::Null,
            RuntimeValue::Boolean(b) => EncodedValue::Boolean(*b),
            RuntimeValue::Number(n) => EncodedValue::Number(*n),
            RuntimeValue::String(s) => EncodedValue::String(s.clone()),
            RuntimeValue::Symbol(s) => EncodedValue::Symbol(s.clone()),
            RuntimeValue::Function(s) => EncodedValue::Function(s.clone()),
            RuntimeValue::Getter(s) => EncodedValue::Getter(s.clone()),
            RuntimeValue::Instance(s) => EncodedValue::Instance(s.clone()),
            RuntimeValue::Element { id, name } => EncodedValue::Element {
                id: id.clone(),
                name: name.clone(),
            },
            RuntimeValue::Array(items) if expand => {
                let pos = self.push(EncodedValue::Array(Entries::Deep(Vec::new())));
                self.work.push(Pending::Array(pos, Rc::clone(items), depth));
                return self.remember(shared, pos);
            }
            RuntimeValue::Array(items) => EncodedValue::Array(Entries::Preview(items.borrow().len())),
            RuntimeValue::Object(entries) if expand => {
                let pos = self.push(EncodedValue::Object(Entries::Deep(Vec::new())));
                self.work.push(Pending::Object(pos, Rc::clone(entries), depth));
                return self.remember(shared, pos);
            }
            RuntimeValue::Object(entries) => {
                EncodedValue::Object(Entries::Preview(entries.borrow().len()))
            }
            RuntimeValue::Store(source) => {
                let pos = self.push(EncodedValue::Store {
                    store_id: source.id.clone(),
                    position: 0,
                });
                self.stores.push(source.id.clone());
                self.work.push(Pending::Store(pos, Rc::clone(source), depth));
                return self.remember(shared, pos);
            }
        };
        let pos = self.push(record);
        self.remember(shared, pos)
    }

    fn remember(&mut self, shared: Option<usize>, pos: usize) -> usize {
        if let Some(key) = shared {
            self.seen.insert(key, pos);
        }
        pos
    }

    fn fill(&mut self, pending: Pending) {
        match pending {
            Pending::Array(pos, items, depth) => {
                let items = items.borrow().clone();
                let positions = items.iter().map(|item| self.visit(item, depth + 1)).collect();
                self.list[pos] = EncodedValue::Array(Entries::Deep(positions));
            }
            Pending::Object(pos, entries, depth) => {
                let entries = entries.borrow().clone();
                let positions = entries
                    .iter()
                    .map(|(key, item)| (key.clone(), self.visit(item, depth + 1)))
                    .collect();
                self.list[pos] = EncodedValue::Object(Entries::Deep(positions));
            }
            Pending::Store(pos, source, depth) => {
                let content = source.value();
                let position = self.visit(&content, depth);
                self.list[pos] = EncodedValue::Store {
                    store_id: source.id.clone(),
                    position,
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoded::validate;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn wire(encoded: &Encoded) -> serde_json::Value {
        serde_json::to_value(&encoded.list).unwrap()
    }

    #[test]
    fn scalars_use_sentinels() {
        let value = RuntimeValue::array(vec![
            RuntimeValue::Number(f64::NAN),
            RuntimeValue::Number(f64::INFINITY),
            RuntimeValue::Undefined,
            RuntimeValue::Null,
        ]);
        let encoded = encode(&value, &EncodeOptions::default());
        assert_eq!(
            wire(&encoded),
            json!([
                ["array", [1, 2, 3, 4]],
                ["number", "NaN"],
                ["number", "Infinity"],
                ["null", "undefined"],
                ["null", null]
            ])
        );
    }

    #[test]
    fn shared_container_is_written_once() {
        let shared = RuntimeValue::object([("x", RuntimeValue::Number(1.0))]);
        let value = RuntimeValue::array(vec![shared.clone(), shared]);
        let encoded = encode(&value, &EncodeOptions::default());
        assert_eq!(
            wire(&encoded),
            json!([["array", [1, 1]], ["object", {"x": 2}], ["number", 1.0]])
        );
    }

    #[test]
    fn cycle_points_back_to_root() {
        let value = RuntimeValue::object(Vec::<(String, RuntimeValue)>::new());
        if let RuntimeValue::Object(entries) = &value {
            entries.borrow_mut().push(("self".into(), value.clone()));
        }
        let encoded = encode(&value, &EncodeOptions::default());
        assert_eq!(wire(&encoded), json!([["object", {"self": 0}]]));
        value.clear();
    }

    #[test]
    fn preview_mode_expands_only_the_root() {
        let value = RuntimeValue::object([
            ("list", RuntimeValue::array(vec![RuntimeValue::Null; 3])),
            ("name", RuntimeValue::string("a")),
        ]);
        let encoded = encode(&value, &EncodeOptions::preview());
        assert_eq!(
            wire(&encoded),
            json!([["object", {"list": 1, "name": 2}], ["array", 3], ["string", "a"]])
        );
    }

    #[test]
    fn max_depth_bounds_expansion() {
        let inner = RuntimeValue::array(vec![RuntimeValue::Boolean(true)]);
        let value = RuntimeValue::array(vec![RuntimeValue::array(vec![inner])]);
        let encoded = encode(&value, &EncodeOptions::default().with_max_depth(1));
        assert_eq!(
            wire(&encoded),
            json!([["array", [1]], ["array", [2]], ["array", 1]])
        );
    }

    #[test]
    fn stores_are_reported_and_addressed() {
        let store = RuntimeValue::store("s1", RuntimeValue::object([("n", RuntimeValue::Number(2.0))]));
        let value = RuntimeValue::array(vec![store.clone(), store]);
        let encoded = encode(&value, &EncodeOptions::default());
        assert_eq!(encoded.stores, vec![NodeId::new("s1")]);
        assert_eq!(
            wire(&encoded),
            json!([
                ["array", [1, 1]],
                ["store", "s1:2"],
                ["object", {"n": 3}],
                ["number", 2.0]
            ])
        );
        assert!(validate(&encoded.list).is_ok());
    }
}
