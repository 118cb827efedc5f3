#![forbid(unsafe_code)]

//! Test and embedding support: an in-process [`Loopback`] transport, a
//! scripted [`Session`] wiring a router to observer mirrors, and
//! [`logging::init`].

pub mod logging;
pub mod loopback;
pub mod session;

pub use logging::{LogConfig, LogFormat, LogInitError};
pub use loopback::Loopback;
pub use session::{Session, SessionError};
