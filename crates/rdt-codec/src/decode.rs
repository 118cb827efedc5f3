#![forbid(unsafe_code)]

//! Decoding an encoded list into a [`DecodedValue`].
//!
//! # Algorithm
//!
//! 1. Validate the list (every referenced position exists).
//! 2. Release the store references held by the previous value.
//! 3. Walk the list from position 0 with an explicit work stack. Each
//!    position is materialized once per memo scope, so repeated references
//!    to a position share one container and cycles close on themselves.
//!    Store records skip the memo: every encounter acquires a reference, and
//!    only a store seen for the first time has its payload position decoded.
//!    That payload opens a fresh scope, so a store's content never shares a
//!    container with the value that reached it.
//! 4. Sweep store cells whose count dropped to zero.
//!
//! The walk is iterative, so nesting depth is bounded by the list length and
//! not by the call stack.

use std::collections::HashMap;
use std::rc::Rc;

use crate::decoded::{Children, Composite, DecodedValue, StoreCell, dispose_unreachable};
use crate::encoded::{Entries, EncodedValue, validate};
use crate::error::CodecError;
use crate::store::StoreRefMap;

/// Decode `list`, replacing `prev`.
///
/// `prev` is the value this decode supersedes (if any); its store references
/// are released. The result never shares composites with `prev`.
pub fn decode(
    list: &[EncodedValue],
    prev: Option<&DecodedValue>,
    stores: &mut StoreRefMap,
) -> Result<DecodedValue, CodecError> {
    validate(list)?;
    if let Some(prev) = prev {
        stores.release(prev);
    }
    let (value, _) = Decoder::new(list, stores).run(None);
    let evicted = stores.sweep();
    tracing::trace!(len = list.len(), evicted, "decoded value");
    Ok(value)
}

/// Decode `list` over `prev`, keeping `prev`'s container where it can.
///
/// When `prev` and the new root are composites of the same kind and both are
/// expanded (or both previews), the root container of `prev` is reused: its
/// children (or length) are replaced in place and references to position 0
/// inside the list resolve to it. The replaced children are disposed unless
/// the new value still reaches them, so `prev` must be a whole value and not
/// a subtree of a live one. Otherwise this behaves like [`decode`].
pub fn decode_into(
    list: &[EncodedValue],
    prev: &DecodedValue,
    stores: &mut StoreRefMap,
) -> Result<DecodedValue, CodecError> {
    let (value, discarded) = redecode(list, prev, stores)?;
    dispose_unreachable(&discarded, &value);
    Ok(value)
}

/// [`decode_into`] that hands back what the reused root let go of instead
/// of disposing it.
pub(crate) fn redecode(
    list: &[EncodedValue],
    prev: &DecodedValue,
    stores: &mut StoreRefMap,
) -> Result<(DecodedValue, Vec<DecodedValue>), CodecError> {
    validate(list)?;
    let Some(reuse) = reusable_root(&list[0], prev) else {
        return Ok((decode(list, Some(prev), stores)?, Vec::new()));
    };
    stores.release(prev);
    let (value, discarded) = Decoder::new(list, stores).run(Some(reuse));
    stores.sweep();
    Ok((value, discarded))
}

fn reusable_root(root: &EncodedValue, prev: &DecodedValue) -> Option<DecodedValue> {
    let (expanded, composite) = match (root, prev) {
        (EncodedValue::Array(entries), DecodedValue::Array(c)) => (entries.is_deep(), c),
        (EncodedValue::Object(entries), DecodedValue::Object(c)) => (entries.is_deep(), c),
        _ => return None,
    };
    (expanded == composite.is_expanded()).then(|| prev.clone())
}

/// Memo scope of the value being decoded. Store payloads get their own.
const ROOT_SCOPE: usize = 0;

enum Work {
    Fill {
        pos: usize,
        scope: usize,
        composite: Rc<Composite>,
    },
    Store(usize, Rc<StoreCell>),
}

struct Decoder<'a> {
    list: &'a [EncodedValue],
    stores: &'a mut StoreRefMap,
    memo: HashMap<(usize, usize), DecodedValue>,
    scopes: usize,
    work: Vec<Work>,
    discarded: Vec<DecodedValue>,
}

impl<'a> Decoder<'a> {
    fn new(list: &'a [EncodedValue], stores: &'a mut StoreRefMap) -> Self {
        Self {
            list,
            stores,
            memo: HashMap::new(),
            scopes: ROOT_SCOPE + 1,
            work: Vec::new(),
            discarded: Vec::new(),
        }
    }

    /// Decode from position 0. Also returns the old children of a reused
    /// root.
    fn run(mut self, reuse_root: Option<DecodedValue>) -> (DecodedValue, Vec<DecodedValue>) {
        let list = self.list;
        let root = match reuse_root {
            Some(root) => {
                if let Some(composite) = root.composite() {
                    match &list[0] {
                        EncodedValue::Array(Entries::Preview(len))
                        | EncodedValue::Object(Entries::Preview(len)) => {
                            let old = composite.set_preview(*len);
                            self.discard(old);
                        }
                        _ => self.work.push(Work::Fill {
                            pos: 0,
                            scope: ROOT_SCOPE,
                            composite: Rc::clone(composite),
                        }),
                    }
                }
                self.memo.insert((ROOT_SCOPE, 0), root.clone());
                root
            }
            None => self.visit(0, ROOT_SCOPE),
        };
        while let Some(work) = self.work.pop() {
            match work {
                Work::Fill {
                    pos,
                    scope,
                    composite,
                } => {
                    let children = match &list[pos] {
                        EncodedValue::Array(Entries::Deep(items)) => Children::Array(
                            items.iter().map(|&p| self.visit(p, scope)).collect(),
                        ),
                        EncodedValue::Object(Entries::Deep(entries)) => Children::Object(
                            entries
                                .iter()
                                .map(|(key, p)| (key.clone(), self.visit(*p, scope)))
                                .collect(),
                        ),
                        _ => continue,
                    };
                    let old = composite.set_children(children);
                    self.discard(old);
                }
                Work::Store(payload, cell) => {
                    let scope = self.scopes;
                    self.scopes += 1;
                    let content = self.visit(payload, scope);
                    cell.set(content);
                }
            }
        }
        (root, self.discarded)
    }

    fn discard(&mut self, old: Option<Children>) {
        if let Some(old) = old {
            self.discarded.extend(old.values().cloned());
        }
    }

    /// Materialize position `pos` (one reference to it) within `scope`.
    fn visit(&mut self, pos: usize, scope: usize) -> DecodedValue {
        let list = self.list;
        let record = &list[pos];
        if let EncodedValue::Store { store_id, position } = record {
            if let Some(cell) = self.stores.retain(store_id) {
                return DecodedValue::Store(cell);
            }
            let cell = self.stores.register(store_id.clone());
            self.work.push(Work::Store(*position, Rc::clone(&cell)));
            return DecodedValue::Store(cell);
        }
        if let Some(value) = self.memo.get(&(scope, pos)) {
            return value.clone();
        }
        let value = match record {
            EncodedValue::Number(n) => DecodedValue::Number(*n),
            EncodedValue::Boolean(b) => DecodedValue::Boolean(*b),
            EncodedValue::String(s) => DecodedValue::String(s.clone()),
            EncodedValue::Null => DecodedValue::Null,
            EncodedValue::Undefined => DecodedValue::Undefined,
            EncodedValue::Symbol(s) => DecodedValue::Symbol(s.clone()),
            EncodedValue::Function(s) => DecodedValue::Function(s.clone()),
            EncodedValue::Getter(s) => DecodedValue::Getter(s.clone()),
            EncodedValue::Instance(s) => DecodedValue::Instance(s.clone()),
            EncodedValue::Element { id, name } => DecodedValue::Element {
                id: id.clone(),
                name: name.clone(),
            },
            EncodedValue::Array(entries) => DecodedValue::Array(self.shell(
                pos,
                scope,
                entries,
                Children::Array(Vec::new()),
            )),
            EncodedValue::Object(entries) => DecodedValue::Object(self.shell(
                pos,
                scope,
                entries,
                Children::Object(Vec::new()),
            )),
            EncodedValue::Unknown | EncodedValue::Store { .. } => DecodedValue::Unknown,
        };
        self.memo.insert((scope, pos), value.clone());
        value
    }

    fn shell<T>(
        &mut self,
        pos: usize,
        scope: usize,
        entries: &Entries<T>,
        empty: Children,
    ) -> Rc<Composite> {
        match entries {
            Entries::Preview(len) => Composite::preview(*len),
            Entries::Deep(_) => {
                let composite = Composite::expanded(empty);
                self.work.push(Work::Fill {
                    pos,
                    scope,
                    composite: Rc::clone(&composite),
                });
                composite
            }
        }
    }
}
