//! Expansion of declared output patterns into concrete relative paths.

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use hoard_core::{Error, Result};
use std::path::Path;
use walkdir::WalkDir;

fn is_glob(pattern: &str) -> bool {
    pattern.starts_with('!')
        || pattern.contains('*')
        || pattern.contains('?')
        || pattern.contains('[')
        || pattern.contains('{')
}

/// The part of a pattern before its first glob metacharacter.
fn literal_prefix(pattern: &str) -> &str {
    let end = pattern.find(['*', '?', '[', '{']).unwrap_or(pattern.len());
    &pattern[..end]
}

fn build_set<'a>(patterns: impl Iterator<Item = &'a str>) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let pattern = pattern.trim_start_matches("./").trim_end_matches('/');
        let glob: Glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| Error::Configuration(format!("Invalid output glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| Error::Configuration(format!("Failed to build output globset: {}", e)))
}

/// Resolve output declarations against `root`.
///
/// Plain paths are returned unchanged without touching the filesystem. When
/// any declaration is a glob (or a `!` exclusion) the tree under `root` is
/// walked and every file or directory matching a positive pattern and no
/// exclusion is returned, relative to `root` with `/` separators. A matched
/// directory stands for its whole subtree, so its descendants are not listed
/// separately, unless an exclusion could match beneath it: then its
/// remaining descendants are listed instead. An excluded directory excludes
/// its subtree. The result is sorted.
pub fn expand_outputs(root: &Path, patterns: &[String]) -> Result<Vec<String>> {
    if !patterns.iter().any(|p| is_glob(p)) {
        return Ok(patterns.to_vec());
    }

    let include = build_set(patterns.iter().filter(|p| !p.starts_with('!')).map(|p| p.as_str()))?;
    let excluded: Vec<&str> = patterns
        .iter()
        .filter_map(|p| p.strip_prefix('!'))
        .map(|p| p.trim_start_matches("./").trim_end_matches('/'))
        .filter(|p| !p.is_empty())
        .collect();
    let exclude = build_set(excluded.iter().copied())?;
    let excludes_beneath = |dir: &str| {
        let depth = dir.split('/').count();
        let dir = format!("{}/", dir);
        excluded.iter().any(|p| {
            let prefix = literal_prefix(p);
            let deep_enough = p.contains("**") || p.contains('{') || p.split('/').count() > depth;
            deep_enough && (dir.starts_with(prefix) || prefix.starts_with(&dir))
        })
    };

    let mut matches = Vec::new();
    let mut included_dirs: Vec<String> = Vec::new();
    let mut walker = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter();
    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.io_error().map(|io| io.kind()) == Some(std::io::ErrorKind::NotFound) => {
                continue;
            }
            Err(e) => {
                return Err(Error::Internal(format!(
                    "Failed to walk {}: {}",
                    root.display(),
                    e
                )));
            }
        };
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let relative = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let is_dir = entry.file_type().is_dir();
        if exclude.is_match(&relative) {
            if is_dir {
                walker.skip_current_dir();
            }
            continue;
        }
        let included = include.is_match(&relative)
            || included_dirs
                .iter()
                .any(|dir| relative.strip_prefix(dir.as_str()).is_some_and(|rest| rest.starts_with('/')));
        if !included {
            continue;
        }
        if is_dir && excludes_beneath(&relative) {
            included_dirs.push(relative);
            continue;
        }
        if is_dir {
            walker.skip_current_dir();
        }
        matches.push(relative);
    }

    matches.sort();
    Ok(matches)
}
