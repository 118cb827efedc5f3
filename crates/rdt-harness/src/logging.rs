#![forbid(unsafe_code)]

//! Process-wide tracing setup.
//!
//! The filter comes from `RDT_LOG` (fallback `info`), the output format
//! from `RDT_LOG_FORMAT` (`pretty` or `json`).

use std::env;

use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

pub const LOG_FILTER_ENV: &str = "RDT_LOG";
pub const LOG_FORMAT_ENV: &str = "RDT_LOG_FORMAT";

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// `EnvFilter` directives, e.g. `rdt_router=debug,info`.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            format: LogFormat::Pretty,
        }
    }
}

impl LogConfig {
    /// Read [`LOG_FILTER_ENV`] and [`LOG_FORMAT_ENV`].
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_vars(env::var(LOG_FILTER_ENV).ok(), env::var(LOG_FORMAT_ENV).ok())
    }

    /// Build from raw variable values. Blank or unknown values keep the
    /// defaults.
    #[must_use]
    pub fn from_vars(filter: Option<String>, format: Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(filter) = filter.filter(|f| !f.trim().is_empty()) {
            config.filter = filter;
        }
        if let Some(format) = format.as_deref().and_then(LogFormat::parse) {
            config.format = format;
        }
        config
    }

    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }
}

#[derive(Debug, Error)]
pub enum LogInitError {
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),

    #[error("a global subscriber is already installed: {0}")]
    Install(#[from] TryInitError),
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(config: &LogConfig) -> Result<(), LogInitError> {
    let filter = EnvFilter::try_new(&config.filter)?;
    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?,
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .try_init()?,
    }
    Ok(())
}
