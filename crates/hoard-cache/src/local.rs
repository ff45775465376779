//! The legacy directory-backed store.
//!
//! Each record lives in `<root>/<hash>/` with `terminalOutput`, `code`,
//! `source` and an `outputs/` subtree. A sibling `<hash>.commit` marker,
//! written last, makes the record visible.

use crate::context::StoreContext;
use crate::fsutil::{blocking, capture_outputs, dir_size, read_optional, remove_path, restore_outputs};
use crate::housekeeping::{SWEEP_ONE_IN, should_sweep, spawn_legacy_sweep};
use async_trait::async_trait;
use hoard_core::cache::{
    CODE_FILE, NO_TERMINAL_OUTPUT, OUTPUTS_DIR, SOURCE_FILE, TERMINAL_OUTPUT_FILE, TERMINAL_OUTPUTS_DIR,
};
use hoard_core::ports::CacheStore;
use hoard_core::{CacheTask, CachedResult, RemoteCacheResult, Result, TaskHash};
use hoard_trace::{cache_span, remote_span};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{Instrument, debug, warn};

pub struct LocalCacheStore {
    ctx: StoreContext,
    sweep_one_in: u32,
}

impl LocalCacheStore {
    pub fn new(ctx: StoreContext) -> Self {
        Self {
            ctx,
            sweep_one_in: SWEEP_ONE_IN,
        }
    }

    /// Run housekeeping on one in `n` calls instead of the default.
    pub fn with_sweep_one_in(mut self, n: u32) -> Self {
        self.sweep_one_in = n;
        self
    }

    fn record_dir(&self, hash: &TaskHash) -> PathBuf {
        self.ctx.cache_directory.join(hash.as_str())
    }

    async fn is_committed(&self, hash: &TaskHash) -> bool {
        let marker = self.ctx.cache_directory.join(hash.commit_marker_name());
        tokio::fs::try_exists(marker).await.unwrap_or(false)
    }

    async fn read_committed(&self, task: &CacheTask, remote: bool) -> Result<CachedResult> {
        let dir = self.record_dir(&task.hash);
        let read_dir = dir.clone();
        let (terminal_output, code, source) = blocking(move || {
            let terminal_output = read_optional(&read_dir.join(TERMINAL_OUTPUT_FILE))?.unwrap_or_default();
            let code = read_optional(&read_dir.join(CODE_FILE))?
                .and_then(|c| c.trim().parse::<i32>().ok())
                .unwrap_or(0);
            let source = read_optional(&read_dir.join(SOURCE_FILE))?;
            Ok((terminal_output, code, source))
        })
        .await?;

        self.ctx.trust.validate(task, &dir, source.as_deref()).await?;

        Ok(CachedResult {
            terminal_output,
            outputs_path: dir.join(OUTPUTS_DIR),
            code,
            remote,
        })
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

    /// Fill in whatever metadata the backend did not write and commit the record.
    async fn adopt_remote_record(&self, hash: &TaskHash, result: RemoteCacheResult) -> Result<()> {
        let machine_id = self.ctx.trust.current_machine_id().await;
        let root = self.ctx.cache_directory.clone();
        self.ctx
            .retry
            .run("adopt remote record", || {
                let (root, hash, result, machine_id) = (root.clone(), hash.clone(), result.clone(), machine_id.clone());
                blocking(move || write_adopted_record(&root, &hash, &result, machine_id.as_deref()))
            })
            .await
    }
}

fn write_record(
    root: &Path,
    workspace_root: &Path,
    hash: &TaskHash,
    terminal_output: &str,
    outputs: &[String],
    code: i32,
    machine_id: Option<&str>,
) -> Result<()> {
    let marker = root.join(hash.commit_marker_name());
    remove_path(&marker)?;
    let dir = root.join(hash.as_str());
    remove_path(&dir)?;

    fs::create_dir_all(&dir)?;
    fs::write(dir.join(TERMINAL_OUTPUT_FILE), terminal_output)?;
    let outputs_dir = dir.join(OUTPUTS_DIR);
    fs::create_dir_all(&outputs_dir)?;
    capture_outputs(workspace_root, outputs, &outputs_dir)?;
    fs::write(dir.join(CODE_FILE), code.to_string())?;
    if let Some(id) = machine_id {
        fs::write(dir.join(SOURCE_FILE), id)?;
    }

    fs::write(marker, "true")?;
    Ok(())
}

fn write_adopted_record(
    root: &Path,
    hash: &TaskHash,
    result: &RemoteCacheResult,
    machine_id: Option<&str>,
) -> Result<()> {
    let dir = root.join(hash.as_str());
    fs::create_dir_all(dir.join(OUTPUTS_DIR))?;
    if !dir.join(TERMINAL_OUTPUT_FILE).exists() {
        fs::write(dir.join(TERMINAL_OUTPUT_FILE), &result.terminal_output)?;
    }
    if !dir.join(CODE_FILE).exists() {
        fs::write(dir.join(CODE_FILE), result.code.to_string())?;
    }
    // pulled records belong to whoever pulled them
    match machine_id {
        Some(id) => fs::write(dir.join(SOURCE_FILE), id)?,
        None => remove_path(&dir.join(SOURCE_FILE))?,
    }
    fs::write(root.join(hash.commit_marker_name()), "true")?;
    Ok(())
}

fn committed_records_size(root: &Path) -> Result<u64> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let mut total = 0;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name == TERMINAL_OUTPUTS_DIR || name.starts_with('.') || !entry.file_type()?.is_dir() {
            continue;
        }
        if root.join(format!("{}.commit", name)).exists() {
            total += dir_size(&entry.path());
        }
    }
    Ok(total)
}

#[async_trait]
impl CacheStore for LocalCacheStore {
    async fn get(&self, task: &CacheTask) -> Result<Option<CachedResult>> {
        async {
            if self.is_committed(&task.hash).await {
                return self.read_committed(task, false).await.map(Some);
            }
            let Some(result) = self.retrieve_remote(task).await else {
                return Ok(None);
            };
            self.adopt_remote_record(&task.hash, result).await?;
            debug!(hash = %task.hash, "Adopted remote cache record");
            self.read_committed(task, true).await.map(Some)
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
            let machine_id = self.ctx.trust.current_machine_id().await;
            let root = self.ctx.cache_directory.clone();
            let workspace_root = self.ctx.workspace_root.clone();
            let outputs = outputs.to_vec();
            self.ctx
                .retry
                .run("write cache record", || {
                    let (root, workspace_root, hash) = (root.clone(), workspace_root.clone(), task.hash.clone());
                    let (terminal_output, outputs, machine_id) =
                        (terminal_output.clone(), outputs.clone(), machine_id.clone());
                    blocking(move || {
                        write_record(
                            &root,
                            &workspace_root,
                            &hash,
                            &terminal_output,
                            &outputs,
                            code,
                            machine_id.as_deref(),
                        )
                    })
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

            let flat = self.temporary_output_path(task);
            self.ctx
                .retry
                .run("write terminal output", || {
                    let (flat, terminal_output) = (flat.clone(), terminal_output.clone());
                    async move {
                        if let Some(parent) = flat.parent() {
                            tokio::fs::create_dir_all(parent).await?;
                        }
                        tokio::fs::write(&flat, terminal_output).await?;
                        Ok(())
                    }
                })
                .await
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
        self.ctx
            .cache_directory
            .join(TERMINAL_OUTPUTS_DIR)
            .join(task.hash.as_str())
    }

    async fn remove_old_cache_records(&self) -> Result<()> {
        let Some(max_bytes) = self.ctx.max_cache_size else {
            return Ok(());
        };
        if should_sweep(self.sweep_one_in) {
            spawn_legacy_sweep(self.ctx.cache_directory.clone(), max_bytes);
        }
        Ok(())
    }

    async fn used_cache_space(&self) -> Result<u64> {
        let root = self.ctx.cache_directory.clone();
        blocking(move || committed_records_size(&root)).await
    }

    fn cache_directory(&self) -> &Path {
        &self.ctx.cache_directory
    }

    fn name(&self) -> &str {
        "local"
    }
}
