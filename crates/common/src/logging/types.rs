//! Logger settings.

use std::{path::PathBuf, time::Duration};

use opentelemetry::KeyValue;
use opentelemetry_sdk::Resource;

const DEFAULT_OTLP_TIMEOUT: Duration = Duration::from_secs(10);

/// Resource namespace shared by every keel process.
const SERVICE_NAMESPACE: &str = "keel";

/// Where spans are exported to.
#[derive(Debug, Clone)]
pub struct OtlpConfig {
    pub url: String,
    pub timeout: Duration,
}

/// Daily-rotated log files, written in the same format as stdout.
#[derive(Debug, Clone)]
pub struct FileLoggingConfig {
    pub directory: PathBuf,
    /// Files are named `<prefix>.<date>`.
    pub file_name_prefix: String,
}

impl FileLoggingConfig {
    pub fn new(directory: PathBuf, file_name_prefix: String) -> Self {
        Self {
            directory,
            file_name_prefix,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggerConfig {
    pub service_name: String,
    pub service_version: Option<String>,
    /// JSON lines instead of the compact text format.
    pub json_format: bool,
    pub otlp: Option<OtlpConfig>,
    pub file: Option<FileLoggingConfig>,
}

impl LoggerConfig {
    pub fn new(service_name: String) -> Self {
        Self {
            service_name,
            service_version: None,
            json_format: false,
            otlp: None,
            file: None,
        }
    }

    pub fn set_otlp_url(&mut self, url: String) {
        self.otlp = Some(OtlpConfig {
            url,
            timeout: DEFAULT_OTLP_TIMEOUT,
        });
    }

    pub fn with_service_version(mut self, version: String) -> Self {
        self.service_version = Some(version);
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.json_format = enabled;
        self
    }

    pub fn with_file_logging(mut self, config: FileLoggingConfig) -> Self {
        self.file = Some(config);
        self
    }

    /// Resource attached to exported spans.
    pub fn resource(&self) -> Resource {
        let mut attributes = vec![
            KeyValue::new("service.name", self.service_name.clone()),
            KeyValue::new("service.namespace", SERVICE_NAMESPACE),
        ];
        if let Some(version) = &self.service_version {
            attributes.push(KeyValue::new("service.version", version.clone()));
        }
        Resource::new(attributes)
    }
}
