#![forbid(unsafe_code)]

//! Observer-side mirror of one subject.
//!
//! A [`Mirror`] owns exactly one decode cache (store ref-count map plus the
//! inspected value items) and one structure forest. Nothing in it is shared
//! with other observers.

pub mod error;
pub mod mirror;

pub use error::MirrorError;
pub use mirror::{BatchReport, Mirror};
