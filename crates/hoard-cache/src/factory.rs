//! Store selection.

use crate::config::CacheConfig;
use crate::context::StoreContext;
use crate::indexed::IndexedCacheStore;
use crate::local::LocalCacheStore;
use crate::machine::HostMachineId;
use crate::retry::RetryExecutor;
use crate::size::resolve_max_cache_size;
use crate::trust::TrustValidator;
use hoard_core::ports::{CacheIndex, CacheStore, MachineIdProvider, ManagedCacheClient};
use hoard_core::{RecordLayout, Result};
use hoard_db::{Database, SqliteCacheIndex};
use hoard_remote::{RemoteCacheConfig, RemoteCacheResolver, ResolverOptions};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// File name of the index inside the cache root.
pub const INDEX_FILE: &str = "index.db";

/// Runtime collaborators that are not part of the persisted configuration.
#[derive(Clone, Default)]
pub struct StoreOptions {
    pub skip_remote_cache: bool,
    pub remote: RemoteCacheConfig,
    pub managed_client: Option<Arc<dyn ManagedCacheClient>>,
    /// Defaults to [`HostMachineId`].
    pub machine_id: Option<Arc<dyn MachineIdProvider>>,
}

impl StoreOptions {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            skip_remote_cache: config.skip_remote_cache,
            remote: config.remote.clone(),
            ..Default::default()
        }
    }

    pub fn with_managed_client(mut self, client: Arc<dyn ManagedCacheClient>) -> Self {
        self.managed_client = Some(client);
        self
    }

    pub fn with_machine_id(mut self, provider: Arc<dyn MachineIdProvider>) -> Self {
        self.machine_id = Some(provider);
        self
    }
}

async fn open_index(cache_directory: &Path) -> Result<Arc<dyn CacheIndex>> {
    let db = Database::connect(&cache_directory.join(INDEX_FILE)).await?;
    db.migrate().await?;
    Ok(Arc::new(SqliteCacheIndex::new(db.pool().clone())))
}

/// Build the active store for a configuration.
///
/// The indexed store is used when enabled and its index opens; otherwise the
/// legacy directory store. The indexed store always rejects records from
/// other machines, the legacy store honors `reject_unknown_local_cache`.
pub async fn create_cache_store(config: &CacheConfig, options: StoreOptions) -> Result<Arc<dyn CacheStore>> {
    let max_cache_size = resolve_max_cache_size(config)?;
    let machine_id: Arc<dyn MachineIdProvider> = match options.machine_id {
        Some(provider) => provider,
        None => Arc::new(HostMachineId::new()),
    };

    let index = if config.use_indexed_store {
        match open_index(&config.cache_directory).await {
            Ok(index) => Some(index),
            Err(e) => {
                warn!(
                    path = %config.cache_directory.display(),
                    error = %e,
                    "Failed to open the cache index; falling back to the legacy store"
                );
                None
            }
        }
    } else {
        None
    };

    let layout = if index.is_some() {
        RecordLayout::Flat
    } else {
        RecordLayout::Nested
    };
    let resolver = RemoteCacheResolver::new(ResolverOptions {
        skip_remote_cache: options.skip_remote_cache,
        config: options.remote,
        managed_client: options.managed_client,
        layout,
    });
    let remote = resolver.resolve();
    let reject_unknown = index.is_some() || config.reject_unknown_local_cache;

    let ctx = StoreContext {
        cache_directory: config.cache_directory.clone(),
        workspace_root: config.workspace_root.clone(),
        remote,
        trust: Arc::new(TrustValidator::new(machine_id, reject_unknown)),
        retry: RetryExecutor::default(),
        max_cache_size,
        ci: config.ci,
    };

    let store: Arc<dyn CacheStore> = match index {
        Some(index) => Arc::new(IndexedCacheStore::open(ctx, index).await?),
        None => Arc::new(LocalCacheStore::new(ctx)),
    };
    info!(
        store = store.name(),
        path = %config.cache_directory.display(),
        max_cache_size = ?max_cache_size,
        "Cache store ready"
    );
    Ok(store)
}
