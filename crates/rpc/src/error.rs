use std::time::Duration;

use alloy::transports::TransportError;
use thiserror::Error;

/// Errors returned by the remote clients.
///
/// All variants are transient from the driver's point of view: the sync pass fails and is
/// retried.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport: {0}")]
    Transport(#[from] TransportError),

    #[error("engine api: {0}")]
    Engine(#[from] jsonrpsee::core::ClientError),

    #[error("beacon api: {0}")]
    Beacon(#[from] reqwest::Error),

    #[error("abi decode: {0}")]
    Abi(#[from] alloy_sol_types::Error),

    #[error("{method} timed out after {timeout:?}")]
    Timeout {
        method: &'static str,
        timeout: Duration,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}

pub type RpcResult<T> = Result<T, RpcError>;
