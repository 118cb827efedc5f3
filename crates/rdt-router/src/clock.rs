#![forbid(unsafe_code)]

//! Time source for deferred router actions.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use web_time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A manually advanced clock for deterministic tests.
///
/// Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    epoch: Instant,
    offset_us: Arc<AtomicU64>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            offset_us: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn advance(&self, delta: Duration) {
        let us = u64::try_from(delta.as_micros()).unwrap_or(u64::MAX);
        self.offset_us.fetch_add(us, Ordering::Release);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.epoch + Duration::from_micros(self.offset_us.load(Ordering::Acquire))
    }
}
