#![forbid(unsafe_code)]

//! Connected endpoints and their roles.

use std::fmt;

use rdt_core::{EndpointId, SubjectKey};

/// Kind of an observing endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ObserverKind {
    /// The live debugger panel: receives every subject message.
    Panel,
    /// Transient popup: only broadcast kinds.
    Popup,
    /// Passive monitor page: only broadcast kinds.
    DevtoolsPage,
}

impl ObserverKind {
    pub const ALL: [Self; 3] = [Self::Panel, Self::Popup, Self::DevtoolsPage];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Panel => "panel",
            Self::Popup => "popup",
            Self::DevtoolsPage => "devtools-page",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Subject,
    Observer(ObserverKind),
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Subject => f.write_str("subject"),
            Self::Observer(kind) => f.write_str(kind.as_str()),
        }
    }
}

/// One connection as the transport reports it.
///
/// `subject_key` is the addressing metadata; it may be missing when the
/// transport could not attribute the connection to a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub id: EndpointId,
    pub role: Role,
    pub subject_key: Option<SubjectKey>,
}

impl Endpoint {
    #[must_use]
    pub fn subject(id: u64, key: u32) -> Self {
        Self {
            id: EndpointId(id),
            role: Role::Subject,
            subject_key: Some(SubjectKey(key)),
        }
    }

    #[must_use]
    pub fn observer(id: u64, kind: ObserverKind, key: u32) -> Self {
        Self {
            id: EndpointId(id),
            role: Role::Observer(kind),
            subject_key: Some(SubjectKey(key)),
        }
    }
}
