//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the caching engine and its
//! adapters: the active store, remote backends, the machine identity provider
//! and the persistent index.

use crate::Result;
use crate::cache::{CachedResult, IndexedRecord, RemoteCacheResult};
use crate::ids::{CacheTask, TaskHash};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The active task-output store.
///
/// Callers must not race a `get` against a `put` for the same hash; the store
/// does not lock individual records.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Look up a record. Misses and partial writes are `Ok(None)`.
    async fn get(&self, task: &CacheTask) -> Result<Option<CachedResult>>;

    /// Persist a task's terminal output, outputs and exit code, replacing any
    /// previous record for the same hash.
    async fn put(
        &self,
        task: &CacheTask,
        terminal_output: Option<&str>,
        outputs: &[String],
        code: i32,
    ) -> Result<()>;

    /// Restore the cached outputs matching `outputs` into the workspace.
    async fn copy_files_from_cache(
        &self,
        task: &CacheTask,
        cached: &CachedResult,
        outputs: &[String],
    ) -> Result<()>;

    /// Path of the flat terminal output copy for a task.
    fn temporary_output_path(&self, task: &CacheTask) -> PathBuf;

    /// Evict records beyond the configured maximum cache size.
    async fn remove_old_cache_records(&self) -> Result<()>;

    /// Bytes currently occupied by valid records.
    async fn used_cache_space(&self) -> Result<u64>;

    /// Root directory of the store.
    fn cache_directory(&self) -> &Path;

    /// Store name for logging.
    fn name(&self) -> &str;
}

/// A remote cache mirrored to and from the local store.
#[async_trait]
pub trait RemoteCacheBackend: Send + Sync {
    /// Materialize the record for `hash` under `cache_directory/<hash>`.
    /// Returns `None` when the backend does not have it.
    async fn retrieve(
        &self,
        hash: &TaskHash,
        cache_directory: &Path,
    ) -> Result<Option<RemoteCacheResult>>;

    /// Upload the record found under `cache_directory/<hash>`.
    /// Returns `false` when the backend did not accept it.
    async fn store(
        &self,
        hash: &TaskHash,
        cache_directory: &Path,
        terminal_output: &str,
        code: i32,
    ) -> Result<bool>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// The older remote cache contract: a plain retrieve/store pair over a
/// record directory that already contains `terminalOutput` and `code`.
#[async_trait]
pub trait LegacyRemoteCache: Send + Sync {
    async fn retrieve(&self, hash: &TaskHash, cache_directory: &Path) -> Result<bool>;

    async fn store(&self, hash: &TaskHash, cache_directory: &Path) -> Result<bool>;
}

/// A managed remote-orchestration client that may provide its own cache.
pub trait ManagedCacheClient: Send + Sync {
    /// The client's current cache implementation, if it has one.
    fn remote_cache(&self) -> Option<Arc<dyn RemoteCacheBackend>>;

    /// The cache implementation of older client versions.
    fn legacy_cache(&self) -> Option<Arc<dyn LegacyRemoteCache>>;
}

/// Provides a stable identity for the current machine.
#[async_trait]
pub trait MachineIdProvider: Send + Sync {
    async fn machine_id(&self) -> Result<String>;
}

/// Persistent record metadata keyed by hash.
#[async_trait]
pub trait CacheIndex: Send + Sync {
    /// Fetch a record and mark it as accessed now.
    async fn touch(&self, hash: &TaskHash) -> Result<Option<IndexedRecord>>;

    /// Insert or replace a record.
    async fn upsert(&self, record: &IndexedRecord) -> Result<()>;

    /// Forget a record. Missing records are not an error.
    async fn remove(&self, hash: &TaskHash) -> Result<()>;

    /// Sum of the sizes of all tracked records.
    async fn total_size(&self) -> Result<u64>;

    /// All records, least recently accessed first.
    async fn list_least_recently_used(&self) -> Result<Vec<IndexedRecord>>;

    /// Remove records not accessed since `cutoff`, returning their hashes.
    async fn remove_not_accessed_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<TaskHash>>;

    /// Whether the index tracks `hash`.
    async fn contains(&self, hash: &TaskHash) -> Result<bool>;
}
