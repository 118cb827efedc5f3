#![forbid(unsafe_code)]

//! Connection router between one subject and its observers, per subject
//! key.
//!
//! The router owns its endpoint tables and talks to the outside world only
//! through an injected [`Transport`] and [`Clock`], so independent routers
//! can coexist and tests stay deterministic.

pub mod clock;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod router;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{RECHECK_DELAY_ENV, RouterConfig};
pub use endpoint::{Endpoint, ObserverKind, Role};
pub use error::RouterError;
pub use router::Router;
pub use transport::Transport;
