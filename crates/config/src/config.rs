use std::{path::PathBuf, time::Duration};

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Default value for `p2p_sync_timeout_secs` in [`SyncConfig`].
const DEFAULT_P2P_SYNC_TIMEOUT_SECS: u64 = 600;

/// Default value for `retry_interval_ms` in [`SyncConfig`].
const DEFAULT_RETRY_INTERVAL_MS: u64 = 12_000;

/// Default value for `rpc_timeout_secs` in [`SyncConfig`].
const DEFAULT_RPC_TIMEOUT_SECS: u64 = 60;

/// Default value for `max_reorg_search_depth` in [`SyncConfig`].
const DEFAULT_MAX_REORG_SEARCH_DEPTH: u64 = 64;

/// Default value for `status_report_interval_secs` in [`SyncConfig`].
const DEFAULT_STATUS_REPORT_INTERVAL_SECS: u64 = 30;

/// Default value for `transition_config_interval_secs` in [`SyncConfig`].
const DEFAULT_TRANSITION_CONFIG_INTERVAL_SECS: u64 = 60;

/// Default value for `progress_check_interval_secs` in [`SyncConfig`].
const DEFAULT_PROGRESS_CHECK_INTERVAL_SECS: u64 = 10;

/// Default value for `max_txs_per_block` in [`SyncConfig`].
const DEFAULT_MAX_TXS_PER_BLOCK: u64 = 1_500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct L1Config {
    /// Websocket endpoint, used for head subscriptions and all L1 reads.
    pub ws_endpoint: String,

    /// Beacon node endpoint, used to fetch blob sidecars.
    pub beacon_endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct L2Config {
    /// Execution engine websocket endpoint for the `eth`/`taiko` namespaces.
    pub ws_endpoint: String,

    /// Authenticated engine API endpoint.
    pub engine_endpoint: String,

    /// File holding the hex encoded JWT secret shared with the engine.
    pub jwt_secret_path: PathBuf,

    /// Trusted L2 node that serves verified blocks for beacon sync.
    /// Required when P2P sync is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractsConfig {
    /// L1 inbox contract that emits block proposals.
    pub inbox_address: Address,

    /// L2 contract that receives the anchor transaction of every block.
    pub anchor_address: Address,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Let the execution engine catch up over P2P when far behind the verified head.
    #[serde(default)]
    pub p2p_sync_enabled: bool,

    /// How long a triggered P2P sync may go without progress before it is given up.
    #[serde(default = "default_p2p_sync_timeout_secs")]
    pub p2p_sync_timeout_secs: u64,

    /// Constant delay between failed sync attempts.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,

    /// Per-call timeout applied to every RPC request.
    #[serde(default = "default_rpc_timeout_secs")]
    pub rpc_timeout_secs: u64,

    /// How many L2 blocks reorg handling may walk back before giving up.
    #[serde(default = "default_max_reorg_search_depth")]
    pub max_reorg_search_depth: u64,

    #[serde(default = "default_status_report_interval_secs")]
    pub status_report_interval_secs: u64,

    #[serde(default = "default_transition_config_interval_secs")]
    pub transition_config_interval_secs: u64,

    /// Tick of the P2P sync progress watchdog.
    #[serde(default = "default_progress_check_interval_secs")]
    pub progress_check_interval_secs: u64,

    /// Tx lists with more transactions than this are treated as empty.
    #[serde(default = "default_max_txs_per_block")]
    pub max_txs_per_block: u64,
}

impl SyncConfig {
    pub fn p2p_sync_timeout(&self) -> Duration {
        Duration::from_secs(self.p2p_sync_timeout_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    pub fn status_report_interval(&self) -> Duration {
        Duration::from_secs(self.status_report_interval_secs)
    }

    pub fn transition_config_interval(&self) -> Duration {
        Duration::from_secs(self.transition_config_interval_secs)
    }

    pub fn progress_check_interval(&self) -> Duration {
        Duration::from_secs(self.progress_check_interval_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            p2p_sync_enabled: false,
            p2p_sync_timeout_secs: DEFAULT_P2P_SYNC_TIMEOUT_SECS,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            rpc_timeout_secs: DEFAULT_RPC_TIMEOUT_SECS,
            max_reorg_search_depth: DEFAULT_MAX_REORG_SEARCH_DEPTH,
            status_report_interval_secs: DEFAULT_STATUS_REPORT_INTERVAL_SECS,
            transition_config_interval_secs: DEFAULT_TRANSITION_CONFIG_INTERVAL_SECS,
            progress_check_interval_secs: DEFAULT_PROGRESS_CHECK_INTERVAL_SECS,
            max_txs_per_block: DEFAULT_MAX_TXS_PER_BLOCK,
        }
    }
}

fn default_p2p_sync_timeout_secs() -> u64 {
    DEFAULT_P2P_SYNC_TIMEOUT_SECS
}

fn default_retry_interval_ms() -> u64 {
    DEFAULT_RETRY_INTERVAL_MS
}

fn default_rpc_timeout_secs() -> u64 {
    DEFAULT_RPC_TIMEOUT_SECS
}

fn default_max_reorg_search_depth() -> u64 {
    DEFAULT_MAX_REORG_SEARCH_DEPTH
}

fn default_status_report_interval_secs() -> u64 {
    DEFAULT_STATUS_REPORT_INTERVAL_SECS
}

fn default_transition_config_interval_secs() -> u64 {
    DEFAULT_TRANSITION_CONFIG_INTERVAL_SECS
}

fn default_progress_check_interval_secs() -> u64 {
    DEFAULT_PROGRESS_CHECK_INTERVAL_SECS
}

fn default_max_txs_per_block() -> u64 {
    DEFAULT_MAX_TXS_PER_BLOCK
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Service label to append to the service name (e.g., "prod", "dev").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_label: Option<String>,

    /// OpenTelemetry OTLP endpoint URL for distributed tracing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otlp_url: Option<String>,

    /// Directory path for file-based logging.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Prefix for log file names.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file_prefix: Option<String>,

    /// Use JSON format for logs instead of compact format.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_format: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub l1: L1Config,
    pub l2: L2Config,
    pub contracts: ContractsConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Checks cross-field rules that serde cannot express.
///
/// Must run before any client is constructed.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let sync = &config.sync;

    if sync.p2p_sync_enabled
        && config
            .l2
            .checkpoint_url
            .as_deref()
            .is_none_or(|url| url.trim().is_empty())
    {
        return Err(ConfigError::P2pSyncWithoutCheckpoint);
    }

    if config.l1.beacon_endpoint.trim().is_empty() {
        return Err(ConfigError::MissingBeaconEndpoint);
    }

    if sync.p2p_sync_enabled && sync.p2p_sync_timeout_secs == 0 {
        return Err(ConfigError::invalid_value(
            "sync.p2p_sync_timeout_secs",
            "must be positive when p2p sync is enabled",
        ));
    }

    for (key, value) in [
        ("sync.retry_interval_ms", sync.retry_interval_ms),
        ("sync.rpc_timeout_secs", sync.rpc_timeout_secs),
        ("sync.max_reorg_search_depth", sync.max_reorg_search_depth),
        ("sync.status_report_interval_secs", sync.status_report_interval_secs),
        (
            "sync.transition_config_interval_secs",
            sync.transition_config_interval_secs,
        ),
        ("sync.progress_check_interval_secs", sync.progress_check_interval_secs),
    ] {
        if value == 0 {
            return Err(ConfigError::invalid_value(key, "must be positive"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    const CONFIG_TOML: &str = r#"
        [l1]
        ws_endpoint = "ws://localhost:8546"
        beacon_endpoint = "http://localhost:5052"

        [l2]
        ws_endpoint = "ws://localhost:28546"
        engine_endpoint = "http://localhost:28551"
        jwt_secret_path = "/path/to/jwt.hex"

        [contracts]
        inbox_address = "0x79fcdef22feed20eddacbb2587640e45491b757f"
        anchor_address = "0x1670000000000000000000000000000000010001"
    "#;

    #[test]
    fn test_config_load_with_defaults() {
        let config = toml::from_str::<Config>(CONFIG_TOML).expect("config parses");

        assert!(!config.sync.p2p_sync_enabled);
        assert_eq!(config.sync.retry_interval(), Duration::from_secs(12));
        assert_eq!(config.sync.max_reorg_search_depth, 64);
        assert!(config.l2.checkpoint_url.is_none());
        assert!(config.logging.otlp_url.is_none());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_config_load_full() {
        let config_string = format!(
            r#"{CONFIG_TOML}
            [sync]
            p2p_sync_enabled = true
            p2p_sync_timeout_secs = 120
            retry_interval_ms = 500
            max_reorg_search_depth = 16

            [logging]
            service_label = "dev"
            json_format = true
            "#
        );
        let mut config = toml::from_str::<Config>(&config_string).expect("config parses");

        assert!(config.sync.p2p_sync_enabled);
        assert_eq!(config.sync.p2p_sync_timeout(), Duration::from_secs(120));
        assert_eq!(config.sync.retry_interval(), Duration::from_millis(500));
        assert_eq!(config.logging.json_format, Some(true));

        config.l2.checkpoint_url = Some("http://checkpoint:8545".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_p2p_without_checkpoint_is_rejected() {
        let mut config = toml::from_str::<Config>(CONFIG_TOML).expect("config parses");
        config.sync.p2p_sync_enabled = true;

        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::P2pSyncWithoutCheckpoint)
        ));

        config.l2.checkpoint_url = Some("  ".to_string());
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::P2pSyncWithoutCheckpoint)
        ));
    }

    #[test]
    fn test_missing_beacon_endpoint_is_rejected() {
        let mut config = toml::from_str::<Config>(CONFIG_TOML).expect("config parses");
        config.l1.beacon_endpoint = String::new();

        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::MissingBeaconEndpoint)
        ));
    }

    #[test]
    fn test_zero_values_are_rejected() {
        let mut config = toml::from_str::<Config>(CONFIG_TOML).expect("config parses");
        config.sync.max_reorg_search_depth = 0;

        match validate_config(&config) {
            Err(ConfigError::InvalidValue { key, .. }) => {
                assert_eq!(key, "sync.max_reorg_search_depth")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
