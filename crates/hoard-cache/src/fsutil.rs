//! Blocking filesystem helpers shared by the stores.
//!
//! Everything except [`blocking`] is synchronous and meant to run inside it.

use crate::expand::expand_outputs;
use hoard_core::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use walkdir::WalkDir;

/// Run blocking filesystem work off the async runtime.
pub async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Internal(e.to_string()))?
}

/// Recreate the link at `from` as `to`, pointing at the same target. The
/// target is neither followed nor required to exist.
pub fn copy_symlink(from: &Path, to: &Path) -> Result<()> {
    let target = fs::read_link(from)?;
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    remove_path(to)?;
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

/// Copy a file or a directory tree to `to`, creating parents as needed.
/// Symlinks are copied as links.
pub fn copy_path(from: &Path, to: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(from)?;
    if metadata.file_type().is_symlink() {
        return copy_symlink(from, to);
    }
    if !metadata.is_dir() {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(from, to)?;
        return Ok(());
    }

    fs::create_dir_all(to)?;
    for entry in WalkDir::new(from).min_depth(1) {
        let entry = entry.map_err(|e| Error::Internal(format!("Failed to walk {}: {}", from.display(), e)))?;
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

/// Remove a file or directory tree. A missing path is not an error.
pub fn remove_path(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    let result = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match result {
        Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
        _ => Ok(()),
    }
}

/// Total size in bytes of the files under `path` (or of `path` itself).
pub fn dir_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .sum()
}

/// Read a UTF-8 file, `None` when it does not exist.
pub fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Copy the workspace paths matching `outputs` into `destination`, keeping
/// their workspace-relative layout. Paths that do not exist are skipped.
pub fn capture_outputs(workspace_root: &Path, outputs: &[String], destination: &Path) -> Result<()> {
    for relative in expand_outputs(workspace_root, outputs)? {
        let source = workspace_root.join(&relative);
        if fs::symlink_metadata(&source).is_err() {
            continue;
        }
        copy_path(&source, &destination.join(&relative))?;
    }
    Ok(())
}

/// Copy the cached paths matching `outputs` back into the workspace,
/// replacing whatever is there. Declared paths absent from the cache are
/// skipped.
pub fn restore_outputs(cached_outputs: &Path, outputs: &[String], workspace_root: &Path) -> Result<()> {
    for relative in expand_outputs(cached_outputs, outputs)? {
        let cached = cached_outputs.join(&relative);
        if fs::symlink_metadata(&cached).is_err() {
            continue;
        }
        let target = workspace_root.join(&relative);
        remove_path(&target)?;
        copy_path(&cached, &target)?;
    }
    Ok(())
}
