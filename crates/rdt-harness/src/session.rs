#![forbid(unsafe_code)]

//! A scripted session: one router over a [`Loopback`], a manual clock, and
//! a [`Mirror`] per connected observer.
//!
//! Every call pumps the loopback, so envelopes addressed to observers are
//! applied to their mirrors and envelopes addressed to subjects land in
//! per-subject inboxes the script can read.

use std::collections::HashMap;

use rdt_core::{EndpointId, SubjectKey};
use rdt_mirror::Mirror;
use rdt_protocol::{Envelope, Message, ProtocolError};
use rdt_router::{Endpoint, ManualClock, Role, Router, RouterConfig, RouterError};
use thiserror::Error;
use web_time::Duration;

use crate::loopback::Loopback;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

pub struct Session {
    router: Router<Loopback, ManualClock>,
    clock: ManualClock,
    mirrors: HashMap<EndpointId, Mirror>,
    inboxes: HashMap<EndpointId, Vec<Envelope>>,
}

impl Session {
    #[must_use]
    pub fn new(config: RouterConfig) -> Self {
        let clock = ManualClock::new();
        Self {
            router: Router::with_clock(Loopback::new(), clock.clone(), config),
            clock,
            mirrors: HashMap::new(),
            inboxes: HashMap::new(),
        }
    }

    #[must_use]
    pub fn router(&self) -> &Router<Loopback, ManualClock> {
        &self.router
    }

    pub fn connect(&mut self, endpoint: &Endpoint) -> Result<(), SessionError> {
        self.router.connect(endpoint)?;
        if matches!(endpoint.role, Role::Observer(_)) {
            self.mirrors.entry(endpoint.id).or_default();
        }
        self.pump();
        Ok(())
    }

    pub fn disconnect(&mut self, endpoint: &Endpoint) -> Result<(), SessionError> {
        self.router.disconnect(endpoint)?;
        if matches!(endpoint.role, Role::Observer(_)) {
            self.mirrors.remove(&endpoint.id);
        }
        self.pump();
        Ok(())
    }

    /// Send `message` from `from` through the router. Returns the number of
    /// recipients.
    pub fn send(&mut self, from: &Endpoint, message: &Message) -> Result<usize, SessionError> {
        let delivered = self.router.receive(from, message.to_envelope()?)?;
        self.pump();
        Ok(delivered)
    }

    /// Move time forward and fire due re-checks.
    pub fn advance(&mut self, by: Duration) -> usize {
        self.clock.advance(by);
        let fired = self.router.advance();
        self.pump();
        fired
    }

    #[must_use]
    pub fn mirror(&self, observer: EndpointId) -> Option<&Mirror> {
        self.mirrors.get(&observer)
    }

    /// Take what was delivered to a subject endpoint so far.
    pub fn take_inbox(&mut self, subject: EndpointId) -> Vec<Envelope> {
        self.inboxes.remove(&subject).unwrap_or_default()
    }

    #[must_use]
    pub fn detection(&self, key: SubjectKey) -> Option<bool> {
        self.router.transport().detection(key)
    }

    fn pump(&mut self) {
        for (to, envelope) in self.router.transport_mut().drain() {
            match self.mirrors.get_mut(&to) {
                Some(mirror) => {
                    if let Err(err) = mirror.handle_envelope(envelope) {
                        tracing::warn!(endpoint = %to, error = %err, "observer could not apply message");
                    }
                }
                None => self.inboxes.entry(to).or_default().push(envelope),
            }
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}
