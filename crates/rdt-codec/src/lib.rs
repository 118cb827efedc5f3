#![forbid(unsafe_code)]

//! Value codec: a flat, JSON-safe wire form for arbitrary (possibly cyclic)
//! values, and a live decoded form that can be patched in place.
//!
//! - [`encode`] turns a [`RuntimeValue`] into a list of [`EncodedValue`]s.
//! - [`decode`] / [`decode_into`] turn such a list back into a
//!   [`DecodedValue`], sharing store cells through a [`StoreRefMap`].
//! - [`patch_child`] / [`apply_store_patch`] update a decoded value without
//!   re-decoding it.
//!
//! # Example
//!
//! ```
//! use rdt_codec::{EncodeOptions, RuntimeValue, StoreRefMap, decode, encode};
//!
//! let value = RuntimeValue::object([("count", RuntimeValue::Number(3.0))]);
//! let encoded = encode(&value, &EncodeOptions::default());
//!
//! let mut stores = StoreRefMap::new();
//! let decoded = decode(&encoded.list, None, &mut stores).unwrap();
//! assert_eq!(decoded.to_json().unwrap(), serde_json::json!({"count": 3.0}));
//! ```

pub mod decode;
pub mod decoded;
pub mod encode;
pub mod encoded;
pub mod error;
pub mod patch;
pub mod store;

pub use decode::{decode, decode_into};
pub use decoded::{Children, Composite, DecodedValue, Key, StoreCell, dispose};
pub use encode::{EncodeOptions, Encoded, RuntimeValue, StoreSource, encode};
pub use encoded::{EncodedValue, Entries, ValueKind, validate};
pub use error::{CodecError, PatchError};
pub use patch::{
    ChildUpdate, MAX_ARRAY_GROWTH, MAX_ARRAY_LENGTH, StorePatch, StorePatchValue, apply_store_patch,
    patch_child,
};
pub use store::StoreRefMap;
