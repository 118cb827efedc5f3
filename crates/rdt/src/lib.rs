#![forbid(unsafe_code)]

//! Reactive devtools core public facade crate.
//!
//! This crate provides the stable surface area for embedders: the value
//! codec, the structure reconciler, the connection router, and the
//! observer-side mirror.

pub use rdt_codec as codec;
pub use rdt_core as core;
#[cfg(feature = "harness")]
pub use rdt_harness as harness;
pub use rdt_mirror as mirror;
pub use rdt_protocol as protocol;
pub use rdt_router as router;
pub use rdt_structure as structure;

pub mod prelude {
    pub use rdt_codec::{DecodedValue, EncodeOptions, EncodedValue, RuntimeValue, StoreRefMap, decode, encode};
    pub use rdt_core::{EndpointId, NodeId, SubjectKey};
    pub use rdt_mirror::Mirror;
    pub use rdt_protocol::{Envelope, Message, MessageKind};
    pub use rdt_router::{Endpoint, ObserverKind, Router, RouterConfig, Transport};
    pub use rdt_structure::{Node, Structure, StructureUpdates};
}
