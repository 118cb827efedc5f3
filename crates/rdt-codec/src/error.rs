#![forbid(unsafe_code)]

//! Codec and patch errors.
//!
//! Every variant is local to one decode or one patch: the caller logs it
//! and drops that single update.

use rdt_core::NodeId;
use thiserror::Error;

use crate::decoded::Key;

/// Failure to read or decode an encoded list.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("encoded list is empty")]
    EmptyList,

    #[error("record {at} references position {target} outside a list of {len}")]
    DanglingPosition { at: usize, target: usize, len: usize },

    #[error("unknown value kind `{kind}`")]
    UnknownKind { kind: String },

    #[error("malformed `{kind}` payload: {message}")]
    MalformedPayload { kind: &'static str, message: String },

    #[error("value contains a cycle and has no plain representation")]
    Cycle,
}

impl CodecError {
    #[must_use]
    pub fn malformed(kind: &'static str, message: impl Into<String>) -> Self {
        Self::MalformedPayload {
            kind,
            message: message.into(),
        }
    }
}

/// Failure to apply an in-place patch to a decoded value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("store {store_id} is not tracked")]
    MissingStore { store_id: NodeId },

    #[error("path segment {segment} (depth {depth}) not found")]
    InvalidPath { segment: Key, depth: usize },

    #[error("patch target is not an expanded container")]
    NotExpanded,

    #[error("length update applied to a non-array target")]
    LengthOnObject,

    #[error("array of length {len} cannot grow to {requested}")]
    LengthOutOfRange { requested: usize, len: usize },

    #[error(transparent)]
    Codec(#[from] CodecError),
}
