//! Logging and tracing for hoard.
//!
//! Installs the `tracing` subscriber (with an optional OTLP exporter) and
//! provides span helpers for cache operations.

pub mod spans;
pub mod tracer;

pub use spans::{cache_span, housekeeping_span, remote_span};
pub use tracer::{OtlpConfig, TracerError, TracingConfig, init_tracing, shutdown_tracer};
