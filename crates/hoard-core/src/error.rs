//! Error types for hoard.

use std::path::PathBuf;
use thiserror::Error;

/// Where to read about records produced on another machine.
pub const UNKNOWN_LOCAL_CACHE_DOCS: &str = "https://hoard.dev/troubleshooting/unknown-local-cache";

#[derive(Debug, Error)]
pub enum Error {
    // Record errors
    #[error("Invalid task hash {hash:?}: {reason}")]
    InvalidTaskHash { hash: String, reason: String },

    #[error(
        "Invalid cache directory for task \"{task}\"\n\
         The local cache artifact in \"{}\" was not generated on this machine.\n\
         As a result, the cache's content integrity cannot be confirmed, which may make cache restoration potentially unsafe.\n\
         If your machine ID has changed since the artifact was cached, run \"hoard reset\" to fix this issue.\n\
         Read about the error and how to address it here: {docs}",
        .path.display(),
        docs = UNKNOWN_LOCAL_CACHE_DOCS
    )]
    TrustViolation { task: String, path: PathBuf },

    // Configuration errors
    #[error(
        "Invalid max cache size specified: {value} ({reason}). Must be a number followed by an optional unit (KB, MB, GB)"
    )]
    InvalidCacheSize { value: String, reason: String },

    #[error("Cache configuration error: {0}")]
    Configuration(String),

    // Remote cache errors
    #[error("Remote cache {backend} failed: {message}")]
    RemoteCache { backend: String, message: String },

    // Infrastructure errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a remote cache error for a named backend.
    pub fn remote(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Error::RemoteCache {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Whether this error must reach the caller instead of being treated as a miss.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::TrustViolation { .. } | Error::InvalidCacheSize { .. } | Error::Configuration(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
