//! Ambient utilities shared across keel crates: logging, metrics and retry.

pub mod logging;
pub mod metrics;
pub mod retry;
