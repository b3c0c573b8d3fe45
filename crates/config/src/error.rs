use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] io::Error),

    #[error("malformed config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Missing key in table.
    #[error("missing key: {0}")]
    MissingKey(String),

    /// Tried to traverse into a primitive.
    #[error("can't traverse into non-table key '{key}' at '{path}'")]
    TraverseNonTableAt { key: String, path: String },

    /// Invalid override string.
    #[error("invalid override: '{0}'")]
    InvalidOverride(String),

    #[error("p2p sync is enabled but no checkpoint url is configured")]
    P2pSyncWithoutCheckpoint,

    #[error("beacon endpoint is required")]
    MissingBeaconEndpoint,

    #[error("invalid jwt secret: {0}")]
    InvalidJwtSecret(String),

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid_value(key: &str, reason: &str) -> Self {
        Self::InvalidValue {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}
