//! Error types for initialization.

use std::io;

use keel_common::logging::LoggingError;
use keel_config::ConfigError;
use keel_driver::DriverError;
use keel_rpc::RpcError;
use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum InitError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("rpc: {0}")]
    Rpc(#[from] RpcError),

    #[error("driver: {0}")]
    Driver(#[from] DriverError),

    #[error("failed to build runtime: {0}")]
    RuntimeBuild(#[source] io::Error),

    #[error("logging: {0}")]
    Logging(#[from] LoggingError),

    #[error("metrics registration: {0}")]
    Metrics(#[from] prometheus::Error),
}
