//! keel driver binary entrypoint.

use anyhow::{anyhow, Result};
use argh::from_env;
use keel_common::{logging, metrics};
use keel_config::Config;
use keel_driver::{Driver, DriverConfig};
use tokio::{runtime, signal};
use tracing::info;

use crate::{args::Args, errors::InitError};

mod args;
mod context;
mod errors;

fn main() -> Result<()> {
    let args: Args = from_env();

    let config = context::load_config_early(&args)
        .map_err(|e| anyhow!("Failed to load configuration: {e}"))?;

    let rt = runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("keel-rt")
        .build()
        .map_err(InitError::RuntimeBuild)?;

    let res = rt.block_on(run(config));

    // Flushing the OTLP exporter needs the runtime.
    let _g = rt.enter();
    logging::finalize();

    Ok(res?)
}

async fn run(config: Config) -> Result<(), InitError> {
    init_logging(&config)?;
    metrics::register_metrics()?;

    let clients = context::init_clients(&config).await?;
    let driver = Driver::new(DriverConfig::from_config(&config), clients).await?;
    driver.start().await?;

    signal::ctrl_c().await?;
    info!("received shutdown signal");
    driver.close().await;

    info!("Exiting keel");
    Ok(())
}

fn init_logging(config: &Config) -> Result<(), InitError> {
    logging::init_logging_from_config(logging::LoggingInitConfig {
        service_base_name: "keel",
        service_label: config.logging.service_label.as_deref(),
        otlp_url: config.logging.otlp_url.as_deref(),
        log_dir: config.logging.log_dir.as_ref(),
        log_file_prefix: config.logging.log_file_prefix.as_deref(),
        json_format: config.logging.json_format,
        service_version: env!("CARGO_PKG_VERSION"),
    })?;
    Ok(())
}
