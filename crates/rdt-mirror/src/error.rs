#![forbid(unsafe_code)]

use rdt_codec::{CodecError, PatchError};
use rdt_protocol::ProtocolError;
use thiserror::Error;

/// Failure to apply one message or one inspector patch.
#[derive(Debug, Error)]
pub enum MirrorError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Patch(#[from] PatchError),
}
