#![forbid(unsafe_code)]

use std::collections::{HashMap, VecDeque};

use rdt_core::{EndpointId, SubjectKey};
use rdt_protocol::Envelope;
use rdt_router::Transport;

/// In-process transport: queues outbound envelopes until they are drained.
///
/// Per-recipient order is send order.
#[derive(Debug, Default)]
pub struct Loopback {
    outbox: VecDeque<(EndpointId, Envelope)>,
    detection: HashMap<SubjectKey, bool>,
    detection_log: Vec<(SubjectKey, bool)>,
}

impl Loopback {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take every queued envelope, oldest first.
    pub fn drain(&mut self) -> Vec<(EndpointId, Envelope)> {
        self.outbox.drain(..).collect()
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.outbox.len()
    }

    /// Last detection state reported for `key`.
    #[must_use]
    pub fn detection(&self, key: SubjectKey) -> Option<bool> {
        self.detection.get(&key).copied()
    }

    /// Every detection report, in order.
    #[must_use]
    pub fn detection_log(&self) -> &[(SubjectKey, bool)] {
        &self.detection_log
    }
}

impl Transport for Loopback {
    fn send(&mut self, to: EndpointId, envelope: Envelope) {
        tracing::trace!(to = %to, kind = %envelope.kind, "queued");
        self.outbox.push_back((to, envelope));
    }

    fn detection_changed(&mut self, key: SubjectKey, detected: bool) {
        self.detection.insert(key, detected);
        self.detection_log.push((key, detected));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdt_protocol::MessageKind;

    #[test]
    fn drain_preserves_send_order() {
        let mut loopback = Loopback::new();
        loopback.send(EndpointId(1), Envelope::devtools_opened(true));
        loopback.send(EndpointId(1), Envelope::void(MessageKind::ResetState));
        assert_eq!(loopback.pending(), 2);
        let kinds: Vec<String> = loopback.drain().into_iter().map(|(_, e)| e.kind).collect();
        assert_eq!(kinds, vec!["DevtoolsOpened", "ResetState"]);
        assert_eq!(loopback.pending(), 0);
    }

    #[test]
    fn detection_keeps_latest_and_history() {
        let mut loopback = Loopback::new();
        loopback.detection_changed(SubjectKey(1), true);
        loopback.detection_changed(SubjectKey(1), false);
        assert_eq!(loopback.detection(SubjectKey(1)), Some(false));
        assert_eq!(loopback.detection_log().len(), 2);
        assert_eq!(loopback.detection(SubjectKey(2)), None);
    }
}
