//! Size-bounded eviction for the legacy store.

use crate::fsutil::{dir_size, remove_path};
use hoard_core::cache::TERMINAL_OUTPUTS_DIR;
use hoard_core::{Result, TaskHash};
use hoard_trace::housekeeping_span;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{Instrument, debug, info, warn};

/// One in this many calls to `remove_old_cache_records` runs a sweep.
pub const SWEEP_ONE_IN: u32 = 50;

struct SweepCandidate {
    hash: TaskHash,
    dir: PathBuf,
    size: u64,
    modified: SystemTime,
}

/// Roll the dice for a sweep.
pub fn should_sweep(one_in: u32) -> bool {
    one_in <= 1 || rand::thread_rng().gen_ratio(1, one_in)
}

/// Delete committed records oldest-first (by modification time) until the
/// records under `root` occupy at most `max_bytes`. Returns the evicted
/// hashes.
pub fn sweep_legacy_cache(root: &Path, max_bytes: u64) -> Result<Vec<TaskHash>> {
    let mut candidates = Vec::new();
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name == TERMINAL_OUTPUTS_DIR || name.starts_with('.') {
            continue;
        }
        let Ok(hash) = TaskHash::new(name.as_str()) else {
            continue;
        };
        let metadata = entry.metadata()?;
        if !metadata.is_dir() {
            continue;
        }
        candidates.push(SweepCandidate {
            size: dir_size(&entry.path()),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            dir: entry.path(),
            hash,
        });
    }

    let mut total: u64 = candidates.iter().map(|c| c.size).sum();
    if total <= max_bytes {
        return Ok(Vec::new());
    }

    candidates.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.hash.cmp(&b.hash)));
    let mut evicted = Vec::new();
    for candidate in candidates {
        if total <= max_bytes {
            break;
        }
        // a record reads as absent once its marker is gone
        remove_path(&root.join(candidate.hash.commit_marker_name()))?;
        remove_path(&candidate.dir)?;
        remove_path(&root.join(TERMINAL_OUTPUTS_DIR).join(candidate.hash.as_str()))?;
        total = total.saturating_sub(candidate.size);
        debug!(hash = %candidate.hash, bytes = candidate.size, "Evicted cache record");
        evicted.push(candidate.hash);
    }
    Ok(evicted)
}

/// Run a sweep in the background. The task is not joined and its failures are
/// only logged.
pub fn spawn_legacy_sweep(root: PathBuf, max_bytes: u64) {
    let span = housekeeping_span("legacy");
    tokio::spawn(
        async move {
            match tokio::task::spawn_blocking(move || sweep_legacy_cache(&root, max_bytes)).await {
                Ok(Ok(evicted)) if !evicted.is_empty() => {
                    info!(records = evicted.len(), "Removed old cache records");
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => warn!(error = %e, "Cache housekeeping failed"),
                Err(e) => warn!(error = %e, "Cache housekeeping task panicked"),
            }
        }
        .instrument(span),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn write_record(root: &Path, hash: &str, bytes: usize, age: Duration) {
        let dir = root.join(hash);
        fs::create_dir_all(dir.join("outputs")).unwrap();
        fs::write(dir.join("outputs/blob"), vec![0u8; bytes]).unwrap();
        fs::write(root.join(format!("{}.commit", hash)), "").unwrap();
        fs::create_dir_all(root.join(TERMINAL_OUTPUTS_DIR)).unwrap();
        fs::write(root.join(TERMINAL_OUTPUTS_DIR).join(hash), "").unwrap();
        let modified = SystemTime::now() - age;
        fs::File::open(&dir).unwrap().set_modified(modified).unwrap();
    }

    #[test]
    fn test_sweep_evicts_oldest_until_within_bound() {
        let root = tempfile::tempdir().unwrap();
        write_record(root.path(), "oldest", 400, Duration::from_secs(300));
        write_record(root.path(), "middle", 400, Duration::from_secs(200));
        write_record(root.path(), "newest", 400, Duration::from_secs(100));

        let evicted = sweep_legacy_cache(root.path(), 800).unwrap();

        assert_eq!(evicted, vec![TaskHash::new("oldest").unwrap()]);
        assert!(!root.path().join("oldest").exists());
        assert!(!root.path().join("oldest.commit").exists());
        assert!(!root.path().join("terminalOutputs/oldest").exists());
        assert!(root.path().join("middle.commit").exists());
        assert!(root.path().join("newest").exists());
    }

    #[test]
    fn test_sweep_within_bound_is_a_noop() {
        let root = tempfile::tempdir().unwrap();
        write_record(root.path(), "only", 10, Duration::from_secs(1));
        assert!(sweep_legacy_cache(root.path(), 1024).unwrap().is_empty());
        assert!(sweep_legacy_cache(&root.path().join("missing"), 0).unwrap().is_empty());
    }

    #[test]
    fn test_should_sweep_always_for_one() {
        assert!(should_sweep(1));
    }
}
