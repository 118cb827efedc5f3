#![forbid(unsafe_code)]

use thiserror::Error;

/// A message whose payload does not match its kind.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed `{kind}` payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown inspector patch tag `{tag}`")]
    UnknownPatch { tag: String },

    #[error("invalid value item id `{raw}`")]
    ValueItemId { raw: String },
}

impl ProtocolError {
    pub(crate) fn payload(kind: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Payload {
            kind: kind.into(),
            source,
        }
    }
}
