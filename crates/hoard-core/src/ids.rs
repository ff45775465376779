//! Identifiers for cacheable work.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque content-derived key identifying a unit of cacheable work.
///
/// Hashes name directories and objects directly, so a hash must be a single
/// non-empty path component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TaskHash(String);

impl TaskHash {
    pub fn new(hash: impl Into<String>) -> Result<Self> {
        let hash = hash.into();
        let reason = if hash.is_empty() {
            Some("hash is empty")
        } else if hash == "." || hash == ".." {
            Some("hash is a relative path component")
        } else if hash.contains(['/', '\\', ':', '\0']) {
            Some("hash contains a path separator")
        } else if hash.ends_with(".commit") {
            Some("hash collides with the commit marker suffix")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(Error::InvalidTaskHash {
                hash,
                reason: reason.to_string(),
            }),
            None => Ok(Self(hash)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the commit marker for this hash.
    pub fn commit_marker_name(&self) -> String {
        format!("{}.commit", self.0)
    }
}

impl fmt::Display for TaskHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TaskHash {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for TaskHash {
    type Error = Error;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TaskHash> for String {
    fn from(hash: TaskHash) -> Self {
        hash.0
    }
}

impl AsRef<str> for TaskHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A task as seen by the cache: its hash plus a human-readable id for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheTask {
    pub id: String,
    pub hash: TaskHash,
}

impl CacheTask {
    pub fn new(id: impl Into<String>, hash: TaskHash) -> Self {
        Self {
            id: id.into(),
            hash,
        }
    }
}
