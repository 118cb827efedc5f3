#![forbid(unsafe_code)]

//! Per-subject connection router.
//!
//! For every subject key the router tracks at most one subject endpoint and
//! at most one endpoint per [`ObserverKind`], plus the last detection and
//! version state the subject reported.
//!
//! # State transitions (per subject key)
//!
//! ```text
//!              subject connect
//!  ┌───────────┐ ────────────────▶ ┌─────────────────┐
//!  │ NoSubject │                   │ SubjectAttached │
//!  └───────────┘ ◀──────────────── └─────────────────┘
//!              subject disconnect
//!              (current endpoint only)
//! ```
//!
//! Observers attach and detach independently of the subject state.
//!
//! # Routing
//!
//! | From     | Kind                    | To                             |
//! |----------|-------------------------|--------------------------------|
//! | subject  | `Versions`, `Detected`  | cached, then every observer    |
//! | subject  | anything else           | the panel only                 |
//! | observer | anything                | the subject                    |
//!
//! # Invariants
//!
//! 1. A disconnect for an endpoint that is not the one on record for its
//!    key and role is ignored.
//! 2. The cache is updated synchronously on every subject message and read
//!    synchronously on every observer connect, so a late joiner always gets
//!    the latest state.
//! 3. A failure handling one event (missing subject key, malformed payload)
//!    leaves all router state untouched.
//!
//! # Failure Modes
//!
//! - **Missing subject key**: logged at error level and returned as
//!   [`RouterError::MissingSubjectKey`].
//! - **Observer message without subject**: logged at warn level and dropped.
//! - **Subject message without panel**: logged at debug level and dropped.

use std::collections::HashMap;

use rdt_core::{EndpointId, SubjectKey};
use rdt_protocol::{Detected, Envelope, Message, MessageKind, Versions};
use web_time::Instant;

use crate::clock::{Clock, SystemClock};
use crate::config::RouterConfig;
use crate::endpoint::{Endpoint, ObserverKind, Role};
use crate::error::RouterError;
use crate::transport::Transport;

/// Cached subject state together with the envelope it arrived in.
#[derive(Debug, Clone)]
struct Cached<T> {
    value: T,
    envelope: Envelope,
}

#[derive(Debug, Default)]
struct SubjectSlot {
    subject: Option<EndpointId>,
    observers: HashMap<ObserverKind, EndpointId>,
    versions: Option<Cached<Versions>>,
    detected: Option<Cached<Detected>>,
}

impl SubjectSlot {
    fn is_idle(&self) -> bool {
        self.subject.is_none()
            && self.observers.is_empty()
            && self.versions.is_none()
            && self.detected.is_none()
    }

    fn observers(&self) -> impl Iterator<Item = EndpointId> + '_ {
        ObserverKind::ALL
            .into_iter()
            .filter_map(|kind| self.observers.get(&kind).copied())
    }

    fn detected_now(&self) -> bool {
        self.subject.is_some() && self.detected.as_ref().is_some_and(|d| d.value.any())
    }
}

#[derive(Debug, Clone, Copy)]
struct Recheck {
    key: SubjectKey,
    due: Instant,
}

/// Where a subject message goes.
enum SubjectRoute {
    CacheAndBroadcast,
    Panel,
}

fn subject_route(kind: Option<MessageKind>) -> SubjectRoute {
    if kind.is_some_and(MessageKind::is_broadcast) {
        SubjectRoute::CacheAndBroadcast
    } else {
        SubjectRoute::Panel
    }
}

/// Connection router.
///
/// Owns its tables; several routers may coexist.
pub struct Router<T: Transport, C: Clock = SystemClock> {
    transport: T,
    clock: C,
    config: RouterConfig,
    slots: HashMap<SubjectKey, SubjectSlot>,
    rechecks: Vec<Recheck>,
}

impl<T: Transport> Router<T, SystemClock> {
    #[must_use]
    pub fn new(transport: T, config: RouterConfig) -> Self {
        Self::with_clock(transport, SystemClock, config)
    }
}

impl<T: Transport, C: Clock> Router<T, C> {
    #[must_use]
    pub fn with_clock(transport: T, clock: C, config: RouterConfig) -> Self {
        Self {
            transport,
            clock,
            config,
            slots: HashMap::new(),
            rechecks: Vec::new(),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    // ── Introspection ──────────────────────────────────────────────────

    #[must_use]
    pub fn subject_attached(&self, key: SubjectKey) -> bool {
        self.slots.get(&key).is_some_and(|slot| slot.subject.is_some())
    }

    #[must_use]
    pub fn subject(&self, key: SubjectKey) -> Option<EndpointId> {
        self.slots.get(&key).and_then(|slot| slot.subject)
    }

    #[must_use]
    pub fn observer(&self, key: SubjectKey, kind: ObserverKind) -> Option<EndpointId> {
        self.slots
            .get(&key)
            .and_then(|slot| slot.observers.get(&kind).copied())
    }

    #[must_use]
    pub fn cached_versions(&self, key: SubjectKey) -> Option<&Versions> {
        self.slots
            .get(&key)
            .and_then(|slot| slot.versions.as_ref())
            .map(|cached| &cached.value)
    }

    #[must_use]
    pub fn cached_detected(&self, key: SubjectKey) -> Option<Detected> {
        self.slots
            .get(&key)
            .and_then(|slot| slot.detected.as_ref())
            .map(|cached| cached.value)
    }

    /// Number of detection re-checks not yet fired.
    #[must_use]
    pub fn pending_rechecks(&self) -> usize {
        self.rechecks.len()
    }

    // ── Events ─────────────────────────────────────────────────────────

    /// Register a newly connected endpoint.
    pub fn connect(&mut self, endpoint: &Endpoint) -> Result<(), RouterError> {
        let key = require_key(endpoint, "connect")?;
        tracing::info!(
            subject_key = %key,
            endpoint = %endpoint.id,
            role = %endpoint.role,
            "endpoint connected"
        );
        let slot = self.slots.entry(key).or_default();
        match endpoint.role {
            Role::Subject => {
                if let Some(previous) = slot.subject.replace(endpoint.id) {
                    tracing::debug!(subject_key = %key, previous = %previous, "subject superseded");
                    slot.versions = None;
                    slot.detected = None;
                }
                if let Some(panel) = slot.observers.get(&ObserverKind::Panel).copied() {
                    self.transport.send(endpoint.id, Envelope::devtools_opened(true));
                    self.transport
                        .send(endpoint.id, Envelope::void(MessageKind::ResetState));
                    self.transport.send(panel, Envelope::void(MessageKind::ResetPanel));
                }
            }
            Role::Observer(kind) => {
                if let Some(previous) = slot.observers.insert(kind, endpoint.id) {
                    tracing::debug!(
                        subject_key = %key,
                        kind = kind.as_str(),
                        previous = %previous,
                        "observer superseded"
                    );
                }
                if self.config.replay_on_connect {
                    let replay = slot
                        .versions
                        .iter()
                        .map(|cached| cached.envelope.clone())
                        .chain(slot.detected.iter().map(|cached| cached.envelope.clone()));
                    for envelope in replay {
                        tracing::debug!(
                            subject_key = %key,
                            endpoint = %endpoint.id,
                            kind = %envelope.kind,
                            "replaying cached state"
                        );
                        self.transport.send(endpoint.id, envelope);
                    }
                }
                if kind == ObserverKind::Panel
                    && let Some(subject) = slot.subject
                {
                    self.transport.send(subject, Envelope::devtools_opened(true));
                }
            }
        }
        Ok(())
    }

    /// Forget a disconnected endpoint. Stale and repeated disconnects are
    /// no-ops.
    pub fn disconnect(&mut self, endpoint: &Endpoint) -> Result<(), RouterError> {
        let key = require_key(endpoint, "disconnect")?;
        let Some(slot) = self.slots.get_mut(&key) else {
            tracing::debug!(subject_key = %key, endpoint = %endpoint.id, "disconnect for unknown key");
            return Ok(());
        };
        match endpoint.role {
            Role::Subject => {
                if slot.subject != Some(endpoint.id) {
                    tracing::debug!(
                        subject_key = %key,
                        endpoint = %endpoint.id,
                        "stale subject disconnect ignored"
                    );
                    return Ok(());
                }
                slot.subject = None;
                slot.versions = None;
                slot.detected = None;
                let observers: Vec<EndpointId> = slot.observers().collect();
                for observer in observers {
                    self.transport
                        .send(observer, Envelope::void(MessageKind::Versions));
                    self.transport
                        .send(observer, Envelope::void(MessageKind::Detected));
                }
                self.transport.detection_changed(key, false);
                let due = self.clock.now() + self.config.recheck_delay;
                self.rechecks.push(Recheck { key, due });
                tracing::info!(subject_key = %key, endpoint = %endpoint.id, "subject disconnected");
            }
            Role::Observer(kind) => {
                if slot.observers.get(&kind) != Some(&endpoint.id) {
                    tracing::debug!(
                        subject_key = %key,
                        endpoint = %endpoint.id,
                        kind = kind.as_str(),
                        "stale observer disconnect ignored"
                    );
                    return Ok(());
                }
                slot.observers.remove(&kind);
                if kind == ObserverKind::Panel
                    && let Some(subject) = slot.subject
                {
                    self.transport.send(subject, Envelope::devtools_opened(false));
                }
                tracing::info!(
                    subject_key = %key,
                    endpoint = %endpoint.id,
                    kind = kind.as_str(),
                    "observer disconnected"
                );
            }
        }
        if slot.is_idle() {
            self.slots.remove(&key);
        }
        Ok(())
    }

    /// Route one message received from `from`.
    ///
    /// Returns the number of endpoints the message was delivered to.
    pub fn receive(&mut self, from: &Endpoint, envelope: Envelope) -> Result<usize, RouterError> {
        let key = require_key(from, "receive")?;
        match from.role {
            Role::Subject => self.from_subject(key, from.id, envelope),
            Role::Observer(kind) => Ok(self.from_observer(key, kind, envelope)),
        }
    }

    /// Fire every deferred re-check that is due.
    ///
    /// Each re-check reads the subject's state as it is now, not as it was
    /// when the re-check was scheduled. Returns the number fired.
    pub fn advance(&mut self) -> usize {
        let now = self.clock.now();
        let (due, pending): (Vec<Recheck>, Vec<Recheck>) =
            self.rechecks.drain(..).partition(|recheck| recheck.due <= now);
        self.rechecks = pending;
        for recheck in &due {
            let detected = self
                .slots
                .get(&recheck.key)
                .is_some_and(SubjectSlot::detected_now);
            tracing::debug!(subject_key = %recheck.key, detected, "detection re-check");
            self.transport.detection_changed(recheck.key, detected);
        }
        due.len()
    }

    fn from_subject(
        &mut self,
        key: SubjectKey,
        from: EndpointId,
        envelope: Envelope,
    ) -> Result<usize, RouterError> {
        let Some(slot) = self
            .slots
            .get_mut(&key)
            .filter(|slot| slot.subject == Some(from))
        else {
            tracing::debug!(
                subject_key = %key,
                endpoint = %from,
                kind = %envelope.kind,
                "message from a subject that is not on record dropped"
            );
            return Ok(0);
        };
        match subject_route(envelope.known_kind()) {
            SubjectRoute::CacheAndBroadcast => {
                match Message::from_envelope(envelope.clone()) {
                    Ok(Message::Versions(versions)) => {
                        slot.versions = versions.map(|value| Cached {
                            value,
                            envelope: envelope.clone(),
                        });
                    }
                    Ok(Message::Detected(detected)) => {
                        let any = detected.is_some_and(|d| d.any());
                        slot.detected = detected.map(|value| Cached {
                            value,
                            envelope: envelope.clone(),
                        });
                        self.transport.detection_changed(key, any);
                    }
                    Ok(other) => {
                        tracing::debug!(subject_key = %key, kind = other.kind_name(), "broadcast message not cached");
                    }
                    Err(err) => {
                        tracing::warn!(subject_key = %key, kind = %envelope.kind, error = %err, "malformed subject message dropped");
                        return Err(err.into());
                    }
                }
                let observers: Vec<EndpointId> = slot.observers().collect();
                for observer in &observers {
                    self.transport.send(*observer, envelope.clone());
                }
                Ok(observers.len())
            }
            SubjectRoute::Panel => match slot.observers.get(&ObserverKind::Panel).copied() {
                Some(panel) => {
                    self.transport.send(panel, envelope);
                    Ok(1)
                }
                None => {
                    tracing::debug!(subject_key = %key, kind = %envelope.kind, "no panel attached, message dropped");
                    Ok(0)
                }
            },
        }
    }

    fn from_observer(&mut self, key: SubjectKey, kind: ObserverKind, envelope: Envelope) -> usize {
        match self.slots.get(&key).and_then(|slot| slot.subject) {
            Some(subject) => {
                tracing::trace!(subject_key = %key, from = kind.as_str(), kind = %envelope.kind, "forwarding to subject");
                self.transport.send(subject, envelope);
                1
            }
            None => {
                tracing::warn!(
                    subject_key = %key,
                    from = kind.as_str(),
                    kind = %envelope.kind,
                    "no subject attached, observer message dropped"
                );
                0
            }
        }
    }
}

fn require_key(endpoint: &Endpoint, event: &'static str) -> Result<SubjectKey, RouterError> {
    endpoint.subject_key.ok_or_else(|| {
        tracing::error!(endpoint = %endpoint.id, role = %endpoint.role, event, "endpoint has no subject key");
        RouterError::MissingSubjectKey {
            endpoint: endpoint.id,
            event,
        }
    })
}
