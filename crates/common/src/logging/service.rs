//! Logging setup shared by binaries.

use std::path::PathBuf;

use tracing::info;

use super::{format_service_name, init, FileLoggingConfig, LoggerConfig, LoggingError};

/// Logging parameters as found in a binary's config file.
#[derive(Debug)]
pub struct LoggingInitConfig<'a> {
    pub service_base_name: &'a str,
    /// Optional service label appended to the name, like prod or dev
    pub service_label: Option<&'a str>,
    pub otlp_url: Option<&'a str>,
    pub log_dir: Option<&'a PathBuf>,
    pub log_file_prefix: Option<&'a str>,
    pub json_format: Option<bool>,
    pub service_version: &'a str,
}

/// Builds a [`LoggerConfig`] from config-file values without installing it.
pub(crate) fn build_logger_config(config: &LoggingInitConfig<'_>) -> LoggerConfig {
    let service_name = format_service_name(config.service_base_name, config.service_label);

    let mut lconfig = LoggerConfig::new(service_name)
        .with_service_version(config.service_version.to_string());

    if let Some(url) = config.otlp_url {
        lconfig.set_otlp_url(url.to_string());
    }

    if let Some(dir) = config.log_dir {
        let prefix = config
            .log_file_prefix
            .unwrap_or(config.service_base_name)
            .to_string();
        lconfig = lconfig.with_file_logging(FileLoggingConfig::new(dir.clone(), prefix));
    }

    if let Some(json_format) = config.json_format {
        lconfig = lconfig.with_json_logging(json_format);
    }

    lconfig
}

/// Initializes logging from config-file values.
pub fn init_logging_from_config(config: LoggingInitConfig<'_>) -> Result<(), LoggingError> {
    let lconfig = build_logger_config(&config);
    let file_logging = lconfig.file.clone();

    init(lconfig)?;

    if let Some(url) = config.otlp_url {
        info!(%url, "using OpenTelemetry tracing output");
    }
    if let Some(file_config) = file_logging {
        info!(
            log_dir = %file_config.directory.display(),
            log_prefix = %file_config.file_name_prefix,
            "file logging enabled"
        );
    }
    Ok(())
}
