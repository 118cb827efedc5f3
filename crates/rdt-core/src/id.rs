#![forbid(unsafe_code)]

//! Identifier newtypes.
//!
//! - [`NodeId`]: opaque, session-unique id of one node of the observed graph
//!   (owner, computation, signal, memo, store or element). Never reused.
//! - [`SubjectKey`]: external addressing key of one observed subject (for a
//!   browser host this is the tab id).
//! - [`EndpointId`]: transport-assigned id of one connected endpoint.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// Opaque node identifier.
///
/// Cloning is cheap: the string is shared.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Rc<str>);

impl NodeId {
    /// Create a node id from any string-like value.
    #[must_use]
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Rc::from(id.as_ref()))
    }

    /// Borrow the raw id.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for NodeId {
    fn from(value: String) -> Self {
        Self(Rc::from(value))
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Addressing key of one subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectKey(pub u32);

impl SubjectKey {
    #[must_use]
    pub const fn new(key: u32) -> Self {
        Self(key)
    }

    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subject:{}", self.0)
    }
}

/// Transport-assigned endpoint id.
///
/// A reconnecting endpoint always gets a fresh id, which is what lets the
/// router tell a superseded connection from the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointId(pub u64);

impl EndpointId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "endpoint:{}", self.0)
    }
}
