//! Span creation for cache operations.

use tracing::{Level, Span, span};

/// Create a span for a store operation on one record.
pub fn cache_span(operation: &str, hash: &str) -> Span {
    span!(
        Level::DEBUG,
        "cache.operation",
        operation = operation,
        cache.hash = hash,
    )
}

/// Create a span for a remote backend transfer.
pub fn remote_span(backend: &str, operation: &str, hash: &str) -> Span {
    span!(
        Level::DEBUG,
        "cache.remote",
        cache.backend = backend,
        operation = operation,
        cache.hash = hash,
    )
}

/// Create a span for an eviction sweep.
pub fn housekeeping_span(store: &str) -> Span {
    span!(Level::DEBUG, "cache.housekeeping", cache.store = store)
}
