//! The SQLite-indexed store.
//!
//! Outputs live directly under `<root>/<hash>/`, terminal output under
//! `<root>/terminalOutputs/<hash>` and everything else in the index. A
//! record exists once its row does.

use crate::context::StoreContext;
use crate::fsutil::{blocking, capture_outputs, dir_size, read_optional, remove_path, restore_outputs};
use crate::trust::scan_unrecognized_artifacts;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use hoard_core::cache::{CacheEvictionReason, IndexedRecord, NO_TERMINAL_OUTPUT, TERMINAL_OUTPUTS_DIR};
use hoard_core::ports::{CacheIndex, CacheStore};
use hoard_core::{CacheTask, CachedResult, RemoteCacheResult, Result, TaskHash};
use hoard_trace::{cache_span, housekeeping_span, remote_span};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Instrument, debug, info, warn};

/// Records not read for this many days are dropped by housekeeping.
pub const RECORD_TTL_DAYS: i64 = 7;

pub struct IndexedCacheStore {
    ctx: StoreContext,
    index: Arc<dyn CacheIndex>,
}

impl IndexedCacheStore {
    /// Open the store over an already migrated index.
    pub async fn open(ctx: StoreContext, index: Arc<dyn CacheIndex>) -> Result<Self> {
        tokio::fs::create_dir_all(&ctx.cache_directory).await?;
        if ctx.remote.is_none() {
            let unrecognized = scan_unrecognized_artifacts(&ctx.cache_directory, index.as_ref(), ctx.ci).await?;
            if !unrecognized.is_empty() {
                debug!(entries = unrecognized.len(), "Cache directory holds untracked entries");
            }
        }
        Ok(Self { ctx, index })
    }

    fn record_dir(&self, hash: &TaskHash) -> PathBuf {
        self.ctx.cache_directory.join(hash.as_str())
    }

    fn terminal_output_path(&self, hash: &TaskHash) -> PathBuf {
        self.ctx.cache_directory.join(TERMINAL_OUTPUTS_DIR).join(hash.as_str())
    }

    async fn read_terminal_output(&self, hash: &TaskHash) -> Result<String> {
        let path = self.terminal_output_path(hash);
        Ok(blocking(move || read_optional(&path)).await?.unwrap_or_default())
    }

    async fn retrieve_remote(&self, task: &CacheTask) -> Option<RemoteCacheResult> {
        let remote = self.ctx.remote.as_ref()?;
        let span = remote_span(remote.name(), "retrieve", task.hash.as_str());
        match remote
            .retrieve(&task.hash, &self.ctx.cache_directory)
            .instrument(span)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!(task = %task.id, hash = %task.hash, error = %e, "Remote cache retrieve failed; treating as a miss");
                None
            }
        }
    }

    /// Write the terminal output copy of a pulled record and index it.
    async fn adopt_remote_record(&self, hash: &TaskHash, result: &RemoteCacheResult) -> Result<()> {
        let dir = self.record_dir(hash);
        let terminal_path = self.terminal_output_path(hash);
        let terminal_output = result.terminal_output.clone();
        let size = self
            .ctx
            .retry
            .run("adopt remote record", || {
                let (dir, terminal_path, terminal_output) = (dir.clone(), terminal_path.clone(), terminal_output.clone());
                blocking(move || {
                    fs::create_dir_all(&dir)?;
                    write_terminal_output(&terminal_path, &terminal_output)?;
                    Ok(dir_size(&dir))
                })
            })
            .await?;

        let now = Utc::now();
        self.index
            .upsert(&IndexedRecord {
                hash: hash.clone(),
                code: result.code,
                size_bytes: size,
                source_machine_id: self.ctx.trust.current_machine_id().await,
                created_at: now,
                accessed_at: now,
            })
            .await
    }

    /// Delete a record's files. The row must already be gone.
    async fn delete_record_files(&self, hash: &TaskHash, reason: CacheEvictionReason) -> Result<()> {
        let dir = self.record_dir(hash);
        let terminal_path = self.terminal_output_path(hash);
        blocking(move || {
            remove_path(&dir)?;
            remove_path(&terminal_path)
        })
        .await?;
        debug!(hash = %hash, reason = ?reason, "Evicted cache record");
        Ok(())
    }

    async fn evict(&self, hash: &TaskHash, reason: CacheEvictionReason) -> Result<()> {
        self.index.remove(hash).await?;
        self.delete_record_files(hash, reason).await
    }

    /// Drop least recently accessed records until the index is within bound.
    async fn trim_to_max_size(&self) -> Result<usize> {
        let Some(max_bytes) = self.ctx.max_cache_size else {
            return Ok(0);
        };
        let mut total = self.index.total_size().await?;
        if total <= max_bytes {
            return Ok(0);
        }

        let mut evicted = 0;
        for record in self.index.list_least_recently_used().await? {
            if total <= max_bytes {
                break;
            }
            self.evict(&record.hash, CacheEvictionReason::Capacity).await?;
            total = total.saturating_sub(record.size_bytes);
            evicted += 1;
        }
        Ok(evicted)
    }
}

fn write_terminal_output(path: &Path, terminal_output: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, terminal_output)?;
    Ok(())
}

#[async_trait]
impl CacheStore for IndexedCacheStore {
    async fn get(&self, task: &CacheTask) -> Result<Option<CachedResult>> {
        async {
            let dir = self.record_dir(&task.hash);
            if let Some(record) = self.index.touch(&task.hash).await? {
                if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
                    self.ctx
                        .trust
                        .validate(task, &dir, record.source_machine_id.as_deref())
                        .await?;
                    return Ok(Some(CachedResult {
                        terminal_output: self.read_terminal_output(&task.hash).await?,
                        outputs_path: dir,
                        code: record.code,
                        remote: false,
                    }));
                }
                self.evict(&task.hash, CacheEvictionReason::Missing).await?;
            }

            let Some(result) = self.retrieve_remote(task).await else {
                return Ok(None);
            };
            self.adopt_remote_record(&task.hash, &result).await?;
            self.trim_to_max_size().await?;
            debug!(hash = %task.hash, "Adopted remote cache record");
            Ok(Some(CachedResult {
                terminal_output: result.terminal_output,
                outputs_path: dir,
                code: result.code,
                remote: true,
            }))
        }
        .instrument(cache_span("get", task.hash.as_str()))
        .await
    }

    async fn put(
        &self,
        task: &CacheTask,
        terminal_output: Option<&str>,
        outputs: &[String],
        code: i32,
    ) -> Result<()> {
        let terminal_output = terminal_output.unwrap_or(NO_TERMINAL_OUTPUT).to_string();
        async {
            self.index.remove(&task.hash).await?;

            let dir = self.record_dir(&task.hash);
            let terminal_path = self.terminal_output_path(&task.hash);
            let workspace_root = self.ctx.workspace_root.clone();
            let outputs = outputs.to_vec();
            let size = self
                .ctx
                .retry
                .run("write cache record", || {
                    let (dir, terminal_path, workspace_root) =
                        (dir.clone(), terminal_path.clone(), workspace_root.clone());
                    let (outputs, terminal_output) = (outputs.clone(), terminal_output.clone());
                    blocking(move || {
                        remove_path(&dir)?;
                        fs::create_dir_all(&dir)?;
                        capture_outputs(&workspace_root, &outputs, &dir)?;
                        write_terminal_output(&terminal_path, &terminal_output)?;
                        Ok(dir_size(&dir))
                    })
                })
                .await?;

            let now = Utc::now();
            self.index
                .upsert(&IndexedRecord {
                    hash: task.hash.clone(),
                    code,
                    size_bytes: size,
                    source_machine_id: self.ctx.trust.current_machine_id().await,
                    created_at: now,
                    accessed_at: now,
                })
                .await?;

            if let Some(remote) = &self.ctx.remote {
                let root = self.ctx.cache_directory.as_path();
                let terminal = terminal_output.as_str();
                let stored = self
                    .ctx
                    .retry
                    .run("remote store", || remote.store(&task.hash, root, terminal, code))
                    .instrument(remote_span(remote.name(), "store", task.hash.as_str()))
                    .await?;
                if !stored {
                    warn!(task = %task.id, hash = %task.hash, backend = remote.name(), "Remote cache did not store the record");
                }
            }

            self.trim_to_max_size().await?;
            Ok(())
        }
        .instrument(cache_span("put", task.hash.as_str()))
        .await
    }

    async fn copy_files_from_cache(
        &self,
        task: &CacheTask,
        cached: &CachedResult,
        outputs: &[String],
    ) -> Result<()> {
        let cached_outputs = cached.outputs_path.clone();
        let workspace_root = self.ctx.workspace_root.clone();
        let outputs = outputs.to_vec();
        self.ctx
            .retry
            .run("restore outputs", || {
                let (cached_outputs, workspace_root, outputs) =
                    (cached_outputs.clone(), workspace_root.clone(), outputs.clone());
                blocking(move || restore_outputs(&cached_outputs, &outputs, &workspace_root))
            })
            .instrument(cache_span("restore", task.hash.as_str()))
            .await
    }

    fn temporary_output_path(&self, task: &CacheTask) -> PathBuf {
        self.terminal_output_path(&task.hash)
    }

    async fn remove_old_cache_records(&self) -> Result<()> {
        async {
            let cutoff = Utc::now() - Duration::days(RECORD_TTL_DAYS);
            let expired = self.index.remove_not_accessed_since(cutoff).await?;
            for hash in &expired {
                self.delete_record_files(hash, CacheEvictionReason::Expired).await?;
            }

            let mut missing = 0;
            for record in self.index.list_least_recently_used().await? {
                if !tokio::fs::try_exists(self.record_dir(&record.hash)).await.unwrap_or(false) {
                    self.evict(&record.hash, CacheEvictionReason::Missing).await?;
                    missing += 1;
                }
            }

            let trimmed = self.trim_to_max_size().await?;
            if !expired.is_empty() || missing > 0 || trimmed > 0 {
                info!(
                    expired = expired.len(),
                    missing = missing,
                    trimmed = trimmed,
                    "Removed old cache records"
                );
            }
            Ok(())
        }
        .instrument(housekeeping_span("indexed"))
        .await
    }

    async fn used_cache_space(&self) -> Result<u64> {
        self.index.total_size().await
    }

    fn cache_directory(&self) -> &Path {
        &self.ctx.cache_directory
    }

    fn name(&self) -> &str {
        "indexed"
    }
}
