#![forbid(unsafe_code)]

use rdt_core::{EndpointId, SubjectKey};
use rdt_protocol::Envelope;

/// Outbound side of the router.
///
/// `send` is fire-and-forget: it never blocks and reports nothing back.
pub trait Transport {
    fn send(&mut self, to: EndpointId, envelope: Envelope);

    /// Whether the subject behind `key` should be shown as detected (for
    /// a browser host: the toolbar icon state).
    fn detection_changed(&mut self, key: SubjectKey, detected: bool) {
        let _ = (key, detected);
    }
}
