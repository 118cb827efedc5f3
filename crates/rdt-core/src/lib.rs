#![forbid(unsafe_code)]

//! Core: identifiers shared by the codec, the structure reconciler and the
//! connection router.

pub mod id;

pub use id::{EndpointId, NodeId, SubjectKey};
