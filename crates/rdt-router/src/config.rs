#![forbid(unsafe_code)]

use std::env;

use web_time::Duration;

/// Environment variable overriding [`RouterConfig::recheck_delay`], in
/// milliseconds.
pub const RECHECK_DELAY_ENV: &str = "RDT_RECHECK_DELAY_MS";

/// Router configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Delay between a subject disconnect and the second detection check.
    pub recheck_delay: Duration,
    /// Send cached subject state to observers as they connect.
    pub replay_on_connect: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            recheck_delay: Duration::from_millis(500),
            replay_on_connect: true,
        }
    }
}

impl RouterConfig {
    /// Defaults, with [`RECHECK_DELAY_ENV`] applied when set to a number.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(val) = env::var(RECHECK_DELAY_ENV)
            && let Ok(ms) = val.trim().parse()
        {
            config.recheck_delay = Duration::from_millis(ms);
        }
        config
    }

    #[must_use]
    pub fn with_recheck_delay(mut self, delay: Duration) -> Self {
        self.recheck_delay = delay;
        self
    }

    #[must_use]
    pub fn with_replay_on_connect(mut self, replay: bool) -> Self {
        self.replay_on_connect = replay;
        self
    }
}
