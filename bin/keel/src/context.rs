//! Config loading and remote client construction.

use std::{fs, path::Path, sync::Arc};

use alloy_rpc_types_engine::JwtSecret;
use keel_config::{load_config, Config, ConfigError};
use keel_driver::DriverClients;
use keel_rpc::{
    BeaconBlobClient, CheckpointClient, CheckpointRpcClient, EngineRpcClient, L1RpcClient,
    L2RpcClient,
};
use tracing::info;

use crate::{
    args::{Args, EnvArgs},
    errors::InitError,
};

/// Loads and validates the config with env and CLI overrides applied.
pub(crate) fn load_config_early(args: &Args) -> Result<Config, InitError> {
    let overrides = args.get_all_overrides(&EnvArgs::from_env());
    Ok(load_config(&args.config, &overrides)?)
}

pub(crate) fn read_jwt_secret(path: &Path) -> Result<JwtSecret, InitError> {
    let raw = fs::read_to_string(path)?;
    JwtSecret::from_hex(raw.trim())
        .map_err(|err| ConfigError::InvalidJwtSecret(err.to_string()).into())
}

/// Connects to every remote named in the config.
pub(crate) async fn init_clients(config: &Config) -> Result<DriverClients, InitError> {
    let timeout = config.sync.rpc_timeout();

    let l1 = L1RpcClient::connect(&config.l1.ws_endpoint, config.contracts.inbox_address, timeout)
        .await?;

    let secret = read_jwt_secret(&config.l2.jwt_secret_path)?;
    let engine = EngineRpcClient::from_url_secret(&config.l2.engine_endpoint, secret, timeout)?;
    let l2 = L2RpcClient::connect(
        &config.l2.ws_endpoint,
        engine,
        config.contracts.anchor_address,
        timeout,
    )
    .await?;

    let checkpoint = match &config.l2.checkpoint_url {
        Some(url) => {
            let client = CheckpointRpcClient::connect(url, timeout).await?;
            Some(Arc::new(client) as Arc<dyn CheckpointClient>)
        }
        None => None,
    };

    let blobs = BeaconBlobClient::new(&config.l1.beacon_endpoint, timeout)?;

    info!(
        l1 = %config.l1.ws_endpoint,
        l2 = %config.l2.ws_endpoint,
        engine = %config.l2.engine_endpoint,
        checkpoint = checkpoint.is_some(),
        "connected to remotes"
    );

    Ok(DriverClients {
        l1: Arc::new(l1),
        l2: Arc::new(l2),
        checkpoint,
        blobs: Arc::new(blobs),
    })
}
