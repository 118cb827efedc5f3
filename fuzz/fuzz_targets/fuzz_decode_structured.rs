#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use rdt_codec::{ChildUpdate, EncodedValue, Entries, Key, StoreRefMap, decode, decode_into, patch_child};
use rdt_core::NodeId;

#[derive(Arbitrary, Debug)]
enum FuzzRecord {
    Number(f64),
    Boolean(bool),
    String(String),
    Null,
    Undefined,
    ArrayPreview(u8),
    Array(Vec<u8>),
    Object(Vec<(String, u8)>),
    Store { id: u8, position: u8 },
}

impl FuzzRecord {
    /// Record with every position folded into `0..len`.
    fn to_encoded(&self, len: usize) -> EncodedValue {
        let at = |p: &u8| usize::from(*p) % len;
        match self {
            Self::Number(n) => EncodedValue::Number(*n),
            Self::Boolean(b) => EncodedValue::Boolean(*b),
            Self::String(s) => EncodedValue::String(s.clone()),
            Self::Null => EncodedValue::Null,
            Self::Undefined => EncodedValue::Undefined,
            Self::ArrayPreview(n) => EncodedValue::Array(Entries::Preview(usize::from(*n))),
            Self::Array(items) => EncodedValue::Array(Entries::Deep(items.iter().map(at).collect())),
            Self::Object(entries) => EncodedValue::Object(Entries::Deep(
                entries.iter().map(|(k, p)| (k.clone(), at(p))).collect(),
            )),
            Self::Store { id, position } => EncodedValue::Store {
                store_id: NodeId::new(format!("s{}", id % 4)),
                position: at(position),
            },
        }
    }
}

#[derive(Arbitrary, Debug)]
struct Input {
    first: Vec<FuzzRecord>,
    second: Vec<FuzzRecord>,
    patch_key: u8,
    patch: Vec<FuzzRecord>,
}

fn build(records: &[FuzzRecord]) -> Option<Vec<EncodedValue>> {
    if records.is_empty() || records.len() > 256 {
        return None;
    }
    Some(records.iter().map(|r| r.to_encoded(records.len())).collect())
}

fuzz_target!(|input: Input| {
    let (Some(first), Some(second)) = (build(&input.first), build(&input.second)) else {
        return;
    };
    let mut stores = StoreRefMap::new();
    let Ok(value) = decode(&first, None, &mut stores) else {
        return;
    };
    let Ok(value) = decode_into(&second, &value, &mut stores) else {
        return;
    };
    if let Some(patch) = build(&input.patch) {
        let key = Key::Index(usize::from(input.patch_key % 8));
        let _ = patch_child(&value, &key, ChildUpdate::Value(&patch), &mut stores);
    }
    stores.release_and_sweep(&value);
    stores.collect_cycles();
    assert!(stores.is_empty());
});
