//! Collaborators shared by both store implementations.

use crate::retry::RetryExecutor;
use crate::trust::TrustValidator;
use hoard_core::ports::RemoteCacheBackend;
use std::path::PathBuf;
use std::sync::Arc;

pub struct StoreContext {
    /// Root directory of the store.
    pub cache_directory: PathBuf,
    /// Directory output declarations are relative to.
    pub workspace_root: PathBuf,
    /// The resolved remote backend, if any.
    pub remote: Option<Arc<dyn RemoteCacheBackend>>,
    pub trust: Arc<TrustValidator>,
    pub retry: RetryExecutor,
    /// `None` when the cache size is unlimited.
    pub max_cache_size: Option<u64>,
    pub ci: bool,
}
