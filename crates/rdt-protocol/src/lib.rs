#![forbid(unsafe_code)]

//! Messages exchanged between a subject and its observers.
//!
//! Every channel carries an [`Envelope`] (`{kind, data}`). [`Message`] is
//! the typed view the router and the mirror work with.

pub mod envelope;
pub mod error;
pub mod inspector;
pub mod message;

pub use envelope::{Envelope, MessageKind};
pub use error::ProtocolError;
pub use inspector::{InspectorPatch, PropKeys, ValueItemId, ValueUpdate};
pub use message::{Detected, InspectValue, Message, ToggleModule, Versions};
