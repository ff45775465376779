//! Object naming for remote records.

use hoard_core::TaskHash;

/// Extension of packed record archives.
pub const ARCHIVE_EXTENSION: &str = "tar.zst";

/// Object key for a record, optionally under a prefix.
pub fn object_key(prefix: Option<&str>, hash: &TaskHash) -> String {
    let file = format!("{}.{}", hash, ARCHIVE_EXTENSION);
    match prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(p) => format!("{}/{}", p, file),
        None => file,
    }
}
