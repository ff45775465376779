//! Validation that local records were produced on this machine.

use hoard_core::cache::TERMINAL_OUTPUTS_DIR;
use hoard_core::ports::{CacheIndex, MachineIdProvider};
use hoard_core::{CacheTask, Error, Result, TaskHash};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Prefix of the index database and its `-wal`/`-shm` companions.
const INDEX_FILE_PREFIX: &str = "index.db";

pub struct TrustValidator {
    provider: Arc<dyn MachineIdProvider>,
    reject_unknown: bool,
    current: OnceCell<Option<String>>,
}

impl TrustValidator {
    pub fn new(provider: Arc<dyn MachineIdProvider>, reject_unknown: bool) -> Self {
        Self {
            provider,
            reject_unknown,
            current: OnceCell::new(),
        }
    }

    pub fn rejects_unknown(&self) -> bool {
        self.reject_unknown
    }

    /// The id of this machine, computed once. `None` when the provider fails.
    pub async fn current_machine_id(&self) -> Option<String> {
        self.current
            .get_or_init(|| async {
                match self.provider.machine_id().await {
                    Ok(id) => Some(id),
                    Err(e) => {
                        debug!(error = %e, "Machine id unavailable; records will not be attributed");
                        None
                    }
                }
            })
            .await
            .clone()
    }

    /// Check a local record produced by `stored_id`.
    pub async fn validate(
        &self,
        task: &CacheTask,
        record_path: &Path,
        stored_id: Option<&str>,
    ) -> Result<()> {
        if !self.reject_unknown {
            return Ok(());
        }
        let Some(stored_id) = stored_id.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(());
        };
        let Some(current) = self.current_machine_id().await else {
            return Ok(());
        };
        if stored_id == current {
            return Ok(());
        }

        warn!(
            task = %task.id,
            hash = %task.hash,
            path = %record_path.display(),
            "Local cache record was produced on another machine"
        );
        Err(Error::TrustViolation {
            task: task.id.clone(),
            path: record_path.to_path_buf(),
        })
    }
}

/// List entries of an indexed cache root that the index does not track.
///
/// With `ci` set a warning names them; records copied in from elsewhere
/// (for example a CI cache restore) bypass trust validation.
pub async fn scan_unrecognized_artifacts(
    cache_directory: &Path,
    index: &dyn CacheIndex,
    ci: bool,
) -> Result<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(cache_directory).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut unrecognized = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if name == TERMINAL_OUTPUTS_DIR || name.starts_with('.') || name.starts_with(INDEX_FILE_PREFIX) {
            continue;
        }
        let known = match TaskHash::new(name.as_str()) {
            Ok(hash) => index.contains(&hash).await?,
            Err(_) => false,
        };
        if !known {
            unrecognized.push(name);
        }
    }
    unrecognized.sort();

    if ci && !unrecognized.is_empty() {
        warn!(
            path = %cache_directory.display(),
            entries = ?unrecognized,
            "The cache directory contains artifacts that were not created by this machine. \
             Restoring a cache directory from another machine is unsafe; cache the task outputs through a remote cache instead"
        );
    }
    Ok(unrecognized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingId {
        id: Option<&'static str>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MachineIdProvider for CountingId {
        async fn machine_id(&self) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.id
                .map(str::to_string)
                .ok_or_else(|| Error::Internal("no id".to_string()))
        }
    }

    fn make_validator(id: Option<&'static str>, reject: bool) -> (Arc<CountingId>, TrustValidator) {
        let provider = Arc::new(CountingId {
            id,
            calls: AtomicUsize::new(0),
        });
        (provider.clone(), TrustValidator::new(provider, reject))
    }

    fn task() -> CacheTask {
        CacheTask::new("app:build", TaskHash::new("h").unwrap())
    }

    #[tokio::test]
    async fn test_foreign_record_is_rejected() {
        let (_, validator) = make_validator(Some("machine-a"), true);
        let path = PathBuf::from("/cache/h");

        let err = validator
            .validate(&task(), &path, Some("machine-b"))
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("app:build"));
        assert!(message.contains("/cache/h"));
        assert!(message.contains("hoard reset"));
        assert!(matches!(err, Error::TrustViolation { .. }));
    }

    #[tokio::test]
    async fn test_accepts_own_missing_or_unverifiable_records() {
        let (provider, validator) = make_validator(Some("machine-a"), true);
        let path = PathBuf::from("/cache/h");
        validator.validate(&task(), &path, Some("machine-a\n")).await.unwrap();
        validator.validate(&task(), &path, None).await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

        let (_, failing) = make_validator(None, true);
        failing.validate(&task(), &path, Some("machine-b")).await.unwrap();
    }

    #[tokio::test]
    async fn test_override_disables_rejection() {
        let (_, validator) = make_validator(Some("machine-a"), false);
        validator
            .validate(&task(), Path::new("/cache/h"), Some("machine-b"))
            .await
            .unwrap();
    }
}
