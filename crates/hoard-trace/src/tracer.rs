//! Subscriber initialization and configuration.

use opentelemetry::trace::TracerProvider;
use opentelemetry::{KeyValue, global};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, runtime, trace::RandomIdGenerator};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Crates whose debug output is enabled by verbose logging.
const HOARD_TARGETS: [&str; 4] = ["hoard_core", "hoard_remote", "hoard_db", "hoard_cache"];

#[derive(Debug, Error)]
pub enum TracerError {
    #[error("Failed to initialize tracer: {0}")]
    Init(String),
}

/// OTLP exporter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtlpConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_timeout() -> u64 {
    10
}

impl Default for OtlpConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            timeout_seconds: default_timeout(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracingConfig {
    /// Debug-level output for the hoard crates.
    #[serde(default)]
    pub verbose: bool,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default)]
    pub otlp: Option<OtlpConfig>,
}

fn default_service_name() -> String {
    "hoard".to_string()
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            json: false,
            service_name: default_service_name(),
            otlp: None,
        }
    }
}

impl TracingConfig {
    /// The filter used when `RUST_LOG` is not set.
    pub fn default_directives(&self) -> String {
        if self.verbose {
            let mut directives = vec!["info".to_string()];
            directives.extend(HOARD_TARGETS.iter().map(|t| format!("{}=debug", t)));
            directives.join(",")
        } else {
            "info".to_string()
        }
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.default_directives()))
    }
}

/// Install the global subscriber.
///
/// Fails when a subscriber is already installed or the OTLP exporter cannot
/// be built.
pub fn init_tracing(config: &TracingConfig) -> Result<(), TracerError> {
    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .boxed()
    };

    match &config.otlp {
        Some(otlp) => {
            let provider = build_provider(config, otlp)?;
            let tracer = provider.tracer("hoard");
            global::set_tracer_provider(provider);

            tracing_subscriber::registry()
                .with(config.env_filter())
                .with(fmt_layer)
                .with(tracing_opentelemetry::layer().with_tracer(tracer))
                .try_init()
                .map_err(|e| TracerError::Init(e.to_string()))
        }
        None => tracing_subscriber::registry()
            .with(config.env_filter())
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TracerError::Init(e.to_string())),
    }
}

fn build_provider(
    config: &TracingConfig,
    otlp: &OtlpConfig,
) -> Result<opentelemetry_sdk::trace::TracerProvider, TracerError> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(&otlp.endpoint)
        .with_timeout(std::time::Duration::from_secs(otlp.timeout_seconds))
        .build()
        .map_err(|e| TracerError::Init(e.to_string()))?;

    let resource = Resource::new(vec![
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ]);

    Ok(opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource)
        .build())
}

/// Flush remaining spans and shut the exporter down.
pub fn shutdown_tracer() {
    global::shutdown_tracer_provider();
}
