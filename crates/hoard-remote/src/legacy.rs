//! Adapter exposing an older retrieve/store remote cache as a
//! [`RemoteCacheBackend`].
//!
//! Older caches exchange whole record directories in the nested layout
//! (`terminalOutput`, `code`, `outputs/`). When the active store uses the
//! flat layout the adapter converts records through a staging directory so
//! the local record is never rewritten in place.

use async_trait::async_trait;
use hoard_core::cache::{CODE_FILE, OUTPUTS_DIR, TERMINAL_OUTPUT_FILE, TERMINAL_OUTPUTS_DIR};
use hoard_core::ports::{LegacyRemoteCache, RemoteCacheBackend};
use hoard_core::{Error, RecordLayout, RemoteCacheResult, Result, TaskHash};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use walkdir::WalkDir;

const STAGING_PREFIX: &str = ".hoard-legacy-";

pub struct LegacyCacheAdapter {
    inner: Arc<dyn LegacyRemoteCache>,
    layout: RecordLayout,
}

impl LegacyCacheAdapter {
    pub fn new(inner: Arc<dyn LegacyRemoteCache>, layout: RecordLayout) -> Self {
        Self { inner, layout }
    }

    fn staging_dir(cache_directory: &Path) -> PathBuf {
        cache_directory.join(format!(
            "{}{}",
            STAGING_PREFIX,
            uuid::Uuid::new_v4().simple()
        ))
    }

    async fn retrieve_into(
        &self,
        hash: &TaskHash,
        target_root: &Path,
    ) -> Result<Option<RemoteCacheResult>> {
        if !self.inner.retrieve(hash, target_root).await? {
            return Ok(None);
        }
        let root = target_root.to_path_buf();
        let hash = hash.clone();
        let result = tokio::task::spawn_blocking(move || read_metadata(&root, &hash))
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;
        Ok(Some(result))
    }
}

#[async_trait]
impl RemoteCacheBackend for LegacyCacheAdapter {
    async fn retrieve(
        &self,
        hash: &TaskHash,
        cache_directory: &Path,
    ) -> Result<Option<RemoteCacheResult>> {
        if self.layout == RecordLayout::Nested {
            return self.retrieve_into(hash, cache_directory).await;
        }

        let staging = Self::staging_dir(cache_directory);
        tokio::fs::create_dir_all(&staging).await?;
        let result = match self.retrieve_into(hash, &staging).await {
            Ok(Some(result)) => {
                let staged = staging.join(hash.as_str()).join(OUTPUTS_DIR);
                let target = cache_directory.join(hash.as_str());
                tokio::task::spawn_blocking(move || replace_dir(&staged, &target))
                    .await
                    .map_err(|e| Error::Internal(e.to_string()))??;
                Ok(Some(result))
            }
            other => other,
        };
        let _ = tokio::fs::remove_dir_all(&staging).await;
        result
    }

    async fn store(
        &self,
        hash: &TaskHash,
        cache_directory: &Path,
        terminal_output: &str,
        code: i32,
    ) -> Result<bool> {
        if self.layout == RecordLayout::Nested {
            return self.inner.store(hash, cache_directory).await;
        }

        let staging = Self::staging_dir(cache_directory);
        let source = cache_directory.join(hash.as_str());
        let record = staging.join(hash.as_str());
        let terminal_output = terminal_output.to_string();
        let prepared = {
            let record = record.clone();
            tokio::task::spawn_blocking(move || {
                stage_nested_record(&source, &record, &terminal_output, code)
            })
            .await
            .map_err(|e| Error::Internal(e.to_string()))?
        };

        let result = match prepared {
            Ok(()) => {
                debug!(hash = %hash, staging = %staging.display(), "Staged record for legacy remote cache");
                self.inner.store(hash, &staging).await
            }
            Err(e) => Err(e),
        };
        let _ = tokio::fs::remove_dir_all(&staging).await;
        result
    }

    fn name(&self) -> &str {
        "legacy"
    }
}

/// Read terminal output and exit code of a nested record, falling back to
/// the flat terminal output copy, then to empty output and code 0.
fn read_metadata(root: &Path, hash: &TaskHash) -> RemoteCacheResult {
    let record = root.join(hash.as_str());
    let terminal_output = fs::read_to_string(record.join(TERMINAL_OUTPUT_FILE))
        .or_else(|_| fs::read_to_string(root.join(TERMINAL_OUTPUTS_DIR).join(hash.as_str())))
        .unwrap_or_default();
    let code = fs::read_to_string(record.join(CODE_FILE))
        .ok()
        .and_then(|c| c.trim().parse().ok())
        .unwrap_or(0);
    RemoteCacheResult {
        terminal_output,
        code,
    }
}

fn stage_nested_record(
    source: &Path,
    record: &Path,
    terminal_output: &str,
    code: i32,
) -> Result<()> {
    let outputs = record.join(OUTPUTS_DIR);
    fs::create_dir_all(&outputs)?;
    if source.is_dir() {
        copy_tree(source, &outputs)?;
    }
    fs::write(record.join(TERMINAL_OUTPUT_FILE), terminal_output)?;
    fs::write(record.join(CODE_FILE), code.to_string())?;
    Ok(())
}

fn replace_dir(staged: &Path, target: &Path) -> Result<()> {
    if target.exists() {
        fs::remove_dir_all(target)?;
    }
    if staged.is_dir() {
        fs::rename(staged, target)?;
    } else {
        fs::create_dir_all(target)?;
    }
    Ok(())
}

fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry.map_err(|e| Error::Internal(format!("Failed to walk record: {}", e)))?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| Error::Internal(e.to_string()))?;
        let dest = to.join(relative);
        if entry.file_type().is_symlink() {
            copy_symlink(entry.path(), &dest)?;
        } else if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
        } else {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

/// Links are recreated, not followed; dangling links survive the copy.
fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    let target = fs::read_link(from)?;
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    #[cfg(unix)]
    std::os::unix::fs::symlink(&target, to)?;
    #[cfg(windows)]
    {
        if fs::metadata(from).map(|m| m.is_dir()).unwrap_or(false) {
            std::os::windows::fs::symlink_dir(&target, to)?;
        } else {
            std::os::windows::fs::symlink_file(&target, to)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Keeps nested records in a directory, like an older client would.
    struct DirectoryLegacyCache {
        root: PathBuf,
        stored: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LegacyRemoteCache for DirectoryLegacyCache {
        async fn retrieve(&self, hash: &TaskHash, cache_directory: &Path) -> Result<bool> {
            let source = self.root.join(hash.as_str());
            if !source.exists() {
                return Ok(false);
            }
            copy_tree(&source, &cache_directory.join(hash.as_str()))?;
            Ok(true)
        }

        async fn store(&self, hash: &TaskHash, cache_directory: &Path) -> Result<bool> {
            copy_tree(
                &cache_directory.join(hash.as_str()),
                &self.root.join(hash.as_str()),
            )?;
            self.stored.lock().unwrap().push(hash.to_string());
            Ok(true)
        }
    }

    fn adapter(root: &Path, layout: RecordLayout) -> (Arc<DirectoryLegacyCache>, LegacyCacheAdapter) {
        let inner = Arc::new(DirectoryLegacyCache {
            root: root.to_path_buf(),
            stored: Mutex::new(Vec::new()),
        });
        (inner.clone(), LegacyCacheAdapter::new(inner, layout))
    }

    #[tokio::test]
    async fn test_flat_store_stages_nested_layout() {
        let remote = tempfile::tempdir().unwrap();
        let local = tempfile::tempdir().unwrap();
        let hash = TaskHash::new("f1").unwrap();
        fs::create_dir_all(local.path().join("f1/dist")).unwrap();
        fs::write(local.path().join("f1/dist/app.js"), "app").unwrap();

        let (inner, adapter) = adapter(remote.path(), RecordLayout::Flat);
        assert!(adapter.store(&hash, local.path(), "built", 2).await.unwrap());

        assert_eq!(*inner.stored.lock().unwrap(), vec!["f1".to_string()]);
        let stored = remote.path().join("f1");
        assert_eq!(fs::read_to_string(stored.join("outputs/dist/app.js")).unwrap(), "app");
        assert_eq!(fs::read_to_string(stored.join("code")).unwrap(), "2");
        assert_eq!(fs::read_to_string(stored.join("terminalOutput")).unwrap(), "built");

        // the local record keeps its flat shape and no staging is left behind
        assert!(local.path().join("f1/dist/app.js").exists());
        assert!(!local.path().join("f1/outputs").exists());
        assert_eq!(fs::read_dir(local.path()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_flat_store_keeps_symlinks() {
        let remote = tempfile::tempdir().unwrap();
        let local = tempfile::tempdir().unwrap();
        let hash = TaskHash::new("f3").unwrap();
        fs::create_dir_all(local.path().join("f3/bin/real")).unwrap();
        std::os::unix::fs::symlink("real", local.path().join("f3/bin/linked")).unwrap();
        std::os::unix::fs::symlink("gone", local.path().join("f3/bin/dangling")).unwrap();

        let (_, adapter) = adapter(remote.path(), RecordLayout::Flat);
        assert!(adapter.store(&hash, local.path(), "", 0).await.unwrap());

        let outputs = remote.path().join("f3/outputs/bin");
        assert_eq!(fs::read_link(outputs.join("linked")).unwrap(), Path::new("real"));
        assert_eq!(fs::read_link(outputs.join("dangling")).unwrap(), Path::new("gone"));
    }

    #[tokio::test]
    async fn test_flat_retrieve_materializes_outputs_only() {
        let remote = tempfile::tempdir().unwrap();
        let local = tempfile::tempdir().unwrap();
        let hash = TaskHash::new("f2").unwrap();
        fs::create_dir_all(remote.path().join("f2/outputs/lib")).unwrap();
        fs::write(remote.path().join("f2/outputs/lib/a.txt"), "a").unwrap();
        fs::write(remote.path().join("f2/code"), "1").unwrap();
        fs::write(remote.path().join("f2/terminalOutput"), "log").unwrap();

        let (_, adapter) = adapter(remote.path(), RecordLayout::Flat);
        let result = adapter.retrieve(&hash, local.path()).await.unwrap().unwrap();

        assert_eq!(result.code, 1);
        assert_eq!(result.terminal_output, "log");
        assert_eq!(fs::read_to_string(local.path().join("f2/lib/a.txt")).unwrap(), "a");
        assert!(!local.path().join("f2/code").exists());
    }

    #[tokio::test]
    async fn test_nested_retrieve_defaults_missing_metadata() {
        let remote = tempfile::tempdir().unwrap();
        let local = tempfile::tempdir().unwrap();
        let hash = TaskHash::new("n1").unwrap();
        fs::create_dir_all(remote.path().join("n1/outputs")).unwrap();

        let (_, adapter) = adapter(remote.path(), RecordLayout::Nested);
        let result = adapter.retrieve(&hash, local.path()).await.unwrap().unwrap();
        assert_eq!(
            result,
            RemoteCacheResult {
                terminal_output: String::new(),
                code: 0
            }
        );

        let missing = TaskHash::new("n2").unwrap();
        assert_eq!(adapter.retrieve(&missing, local.path()).await.unwrap(), None);
    }
}
