#![forbid(unsafe_code)]

use rdt_core::EndpointId;
use rdt_protocol::ProtocolError;
use thiserror::Error;

/// Failure to handle one router event. Other events are unaffected.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("{endpoint} has no subject key ({event})")]
    MissingSubjectKey {
        endpoint: EndpointId,
        event: &'static str,
    },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
