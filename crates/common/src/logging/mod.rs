//! Logging subsystem with OpenTelemetry support.

mod manager;
mod service;
mod types;

#[cfg(test)]
mod tests;

pub use manager::{finalize, init, LoggingError};
pub use service::{init_logging_from_config, LoggingInitConfig};
pub use types::{FileLoggingConfig, LoggerConfig, OtlpConfig};

/// Formats a service name with an optional label suffix.
pub fn format_service_name(base: &str, label: Option<&str>) -> String {
    match label {
        Some(label) => format!("{base}%{label}"),
        None => base.to_owned(),
    }
}
