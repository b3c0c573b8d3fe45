//! Logging initialization and shutdown.

use std::sync::OnceLock;

use opentelemetry::{
    global::{self, set_text_map_propagator},
    trace::{TraceError, TracerProvider},
};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    propagation::TraceContextPropagator,
    runtime::Tokio,
    trace::{Config, TracerProvider as SdkTracerProvider},
};
use thiserror::Error;
use tracing::*;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    filter::ParseError,
    fmt::layer,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter, Layer,
};

use super::types::LoggerConfig;

/// Tracer provider kept around so spans can be flushed on shutdown.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Noisy dependencies capped below the global level.
const QUIET_TARGETS: &[&str] = &["hyper=warn", "jsonrpsee=warn", "alloy_transport_ws=warn"];

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log directive: {0}")]
    Directive(#[from] ParseError),

    #[error("otlp pipeline: {0}")]
    Otlp(#[from] TraceError),

    #[error("subscriber already installed: {0}")]
    AlreadyInitialized(#[from] TryInitError),
}

fn build_filter() -> Result<EnvFilter, LoggingError> {
    let mut filt = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    for directive in QUIET_TARGETS {
        filt = filt.add_directive(directive.parse()?);
    }
    Ok(filt)
}

/// Installs the global tracing subscriber.
///
/// The stdout layer is always present; file and OTLP layers are added when configured.
/// `RUST_LOG` overrides the default INFO level.
pub fn init(config: LoggerConfig) -> Result<(), LoggingError> {
    set_text_map_propagator(TraceContextPropagator::new());

    let filt = build_filter()?;

    let stdout_layer = if config.json_format {
        layer().json().with_filter(filt.clone()).boxed()
    } else {
        layer().compact().with_filter(filt.clone()).boxed()
    };

    let file_layer = config.file.as_ref().map(|file| {
        let appender = RollingFileAppender::new(
            Rotation::DAILY,
            &file.directory,
            &file.file_name_prefix,
        );
        let base = layer().with_writer(appender).with_ansi(false);
        if config.json_format {
            base.json().with_filter(filt.clone()).boxed()
        } else {
            base.compact().with_filter(filt.clone()).boxed()
        }
    });

    let otel_layer = match config.otlp.as_ref() {
        Some(otlp) => {
            let exporter = opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(&otlp.url)
                .with_timeout(otlp.timeout);

            let tp = opentelemetry_otlp::new_pipeline()
                .tracing()
                .with_exporter(exporter)
                .with_trace_config(Config::default().with_resource(config.resource()))
                .install_batch(Tokio)?;

            if TRACER_PROVIDER.set(tp.clone()).is_err() {
                warn!("tracer provider already set");
            }

            let tracer = tp.tracer("keel-tracer");
            Some(tracing_opentelemetry::layer().with_tracer(tracer))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .with(otel_layer)
        .try_init()?;

    info!(
        service_name = %config.service_name,
        service_version = ?config.service_version,
        json = config.json_format,
        "logging initialized"
    );
    Ok(())
}

/// Flushes pending spans and tears down the OTLP pipeline, if any.
pub fn finalize() {
    info!("shutting down logging");

    match TRACER_PROVIDER.get() {
        Some(provider) => {
            if let Err(e) = provider.shutdown() {
                error!(?e, "failed to shut down tracer provider");
            }
        }
        None => debug!("no tracer provider to shut down"),
    }

    global::shutdown_tracer_provider();
}
