//! Resolution of the effective maximum cache size.

use crate::config::CacheConfig;
use hoard_core::Result;
use std::path::{Path, PathBuf};
use sysinfo::Disks;
use tracing::debug;

/// Upper bound of the disk-derived default.
pub const DEFAULT_MAX_CACHE_SIZE_CAP: u64 = 10 * 1024 * 1024 * 1024;

/// The maximum cache size in bytes, `None` when unlimited.
///
/// An explicit setting (the environment override has already been folded
/// into `config`) wins; otherwise 10% of the free space on the disk holding
/// the cache, capped at 10 GB.
pub fn resolve_max_cache_size(config: &CacheConfig) -> Result<Option<u64>> {
    let bytes = match &config.max_cache_size {
        Some(setting) => setting.to_bytes()?,
        None => default_max_cache_size(&config.cache_directory),
    };
    Ok((bytes > 0).then_some(bytes))
}

/// 10% of the free space available to `cache_directory`, capped at 10 GB.
pub fn default_max_cache_size(cache_directory: &Path) -> u64 {
    match available_space(cache_directory) {
        Some(available) => (available / 10).min(DEFAULT_MAX_CACHE_SIZE_CAP),
        None => {
            debug!(path = %cache_directory.display(), "Disk of the cache directory not found");
            DEFAULT_MAX_CACHE_SIZE_CAP
        }
    }
}

fn available_space(path: &Path) -> Option<u64> {
    let target = existing_ancestor(path)?;
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| target.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space())
}

fn existing_ancestor(path: &Path) -> Option<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };
    absolute
        .ancestors()
        .find_map(|candidate| std::fs::canonicalize(candidate).ok())
}
