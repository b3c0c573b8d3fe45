//! Configuration for the keel driver.

mod config;
mod error;
mod overrides;

pub use config::{
    validate_config, Config, ContractsConfig, L1Config, L2Config, LoggingConfig, SyncConfig,
};
pub use error::ConfigError;
pub use overrides::{apply_override, load_config, parse_override};
