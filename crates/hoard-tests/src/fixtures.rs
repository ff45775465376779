//! Test fixtures: workspaces, machine identities and in-memory remotes.

use async_trait::async_trait;
use hoard_cache::config::CacheConfig;
use hoard_cache::fsutil::{copy_path, remove_path};
use hoard_cache::{StoreOptions, create_cache_store};
use hoard_core::ports::{CacheStore, LegacyRemoteCache, MachineIdProvider, ManagedCacheClient, RemoteCacheBackend};
use hoard_core::size::CacheSizeSetting;
use hoard_core::{CacheTask, Error, Result, TaskHash};
use hoard_remote::{ArchiveBackend, BlobTransport};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// Machine id used by [`TestWorkspace::store`].
pub const MACHINE_A: &str = "machine-a";

/// A task with a fixed id and the given hash.
pub fn task(hash: &str) -> CacheTask {
    CacheTask::new("app:build", TaskHash::new(hash).expect("valid hash"))
}

/// A throwaway workspace with its cache under `.hoard/cache`.
pub struct TestWorkspace {
    dir: TempDir,
}

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

impl TestWorkspace {
    pub fn new() -> Self {
        crate::init_test_logging();
        Self {
            dir: tempfile::tempdir().expect("Failed to create workspace"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root().join(".hoard/cache")
    }

    pub fn write(&self, relative: &str, contents: &str) {
        let path = self.root().join(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent");
        }
        fs::write(path, contents).expect("Failed to write file");
    }

    pub fn read(&self, relative: &str) -> Option<String> {
        fs::read_to_string(self.root().join(relative)).ok()
    }

    pub fn remove(&self, relative: &str) {
        remove_path(&self.root().join(relative)).expect("Failed to remove path");
    }

    /// Configuration for this workspace without a size limit.
    pub fn config(&self, indexed: bool) -> CacheConfig {
        CacheConfig {
            use_indexed_store: indexed,
            max_cache_size: Some(CacheSizeSetting::Bytes(0)),
            ..Default::default()
        }
        .for_workspace(self.root())
    }

    /// Options with a fixed machine identity and no remote.
    pub fn options(&self, machine_id: &str) -> StoreOptions {
        StoreOptions::default().with_machine_id(Arc::new(FixedMachineId::new(machine_id)))
    }

    /// A store produced on [`MACHINE_A`].
    pub async fn store(&self, indexed: bool) -> Arc<dyn CacheStore> {
        self.store_with(self.config(indexed), self.options(MACHINE_A)).await
    }

    pub async fn store_with(&self, config: CacheConfig, options: StoreOptions) -> Arc<dyn CacheStore> {
        create_cache_store(&config, options)
            .await
            .expect("Failed to create cache store")
    }
}

/// Always reports the same machine id.
pub struct FixedMachineId(String);

impl FixedMachineId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

#[async_trait]
impl MachineIdProvider for FixedMachineId {
    async fn machine_id(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// A machine whose identity cannot be determined.
pub struct FailingMachineId;

#[async_trait]
impl MachineIdProvider for FailingMachineId {
    async fn machine_id(&self) -> Result<String> {
        Err(Error::Internal("machine id unavailable".to_string()))
    }
}

/// Blob storage held in memory. Clones share the same blobs and counters.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    blobs: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    failures_left: Arc<AtomicUsize>,
    uploads: Arc<AtomicUsize>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` transport calls with a network error.
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.blobs.lock().expect("poisoned").keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Successful uploads so far.
    pub fn uploads(&self) -> usize {
        self.uploads.load(Ordering::SeqCst)
    }

    /// A remote backend over this storage.
    pub fn backend(&self) -> Arc<dyn RemoteCacheBackend> {
        Arc::new(ArchiveBackend::new(self.clone(), None))
    }

    fn check_failure(&self) -> Result<()> {
        let injected = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(Error::Network("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BlobTransport for MemoryTransport {
    async fn download(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.check_failure()?;
        Ok(self.blobs.lock().expect("poisoned").get(key).cloned())
    }

    async fn upload(&self, key: &str, body: Vec<u8>) -> Result<()> {
        self.check_failure()?;
        self.blobs.lock().expect("poisoned").insert(key.to_string(), body);
        self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// An older-style remote keeping plain record directories under `root`.
pub struct DirectoryLegacyCache {
    root: PathBuf,
}

impl DirectoryLegacyCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn record_dir(&self, hash: &str) -> PathBuf {
        self.root.join(hash)
    }
}

#[async_trait]
impl LegacyRemoteCache for DirectoryLegacyCache {
    async fn retrieve(&self, hash: &TaskHash, cache_directory: &Path) -> Result<bool> {
        let source = self.root.join(hash.as_str());
        if !source.is_dir() {
            return Ok(false);
        }
        let target = cache_directory.join(hash.as_str());
        remove_path(&target)?;
        copy_path(&source, &target)?;
        Ok(true)
    }

    async fn store(&self, hash: &TaskHash, cache_directory: &Path) -> Result<bool> {
        let target = self.root.join(hash.as_str());
        remove_path(&target)?;
        copy_path(&cache_directory.join(hash.as_str()), &target)?;
        Ok(true)
    }
}

/// A managed client handing out fixed cache implementations.
#[derive(Default)]
pub struct StaticManagedClient {
    pub remote: Option<Arc<dyn RemoteCacheBackend>>,
    pub legacy: Option<Arc<dyn LegacyRemoteCache>>,
}

impl ManagedCacheClient for StaticManagedClient {
    fn remote_cache(&self) -> Option<Arc<dyn RemoteCacheBackend>> {
        self.remote.clone()
    }

    fn legacy_cache(&self) -> Option<Arc<dyn LegacyRemoteCache>> {
        self.legacy.clone()
    }
}

/// Options whose remote is `remote`, injected through a managed client.
pub fn options_with_remote(machine_id: &str, remote: Arc<dyn RemoteCacheBackend>) -> StoreOptions {
    StoreOptions::default()
        .with_machine_id(Arc::new(FixedMachineId::new(machine_id)))
        .with_managed_client(Arc::new(StaticManagedClient {
            remote: Some(remote),
            legacy: None,
        }))
}
