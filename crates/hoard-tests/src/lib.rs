//! Integration test infrastructure for hoard.
//!
//! Fixtures for building stores over throwaway workspaces, in-memory remote
//! backends and a MinIO container for the S3 backend.
//!
//! # Usage
//!
//! ```ignore
//! use hoard_tests::TestWorkspace;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let ws = TestWorkspace::new();
//!     let store = ws.store(false).await;
//!     // store.put(..), store.get(..)
//! }
//! ```

pub mod containers;
pub mod fixtures;

pub use fixtures::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,hoard_cache=debug,hoard_remote=debug")),
        )
        .with_test_writer()
        .try_init();
}
