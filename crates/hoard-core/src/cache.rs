//! Cache types.

use crate::ids::TaskHash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Record file holding the task's terminal output.
pub const TERMINAL_OUTPUT_FILE: &str = "terminalOutput";
/// Record file holding the task's exit code.
pub const CODE_FILE: &str = "code";
/// Record file holding the id of the machine that produced the record.
pub const SOURCE_FILE: &str = "source";
/// Record subdirectory mirroring workspace-relative output paths.
pub const OUTPUTS_DIR: &str = "outputs";
/// Flat per-hash copies of terminal output, independent of record directories.
pub const TERMINAL_OUTPUTS_DIR: &str = "terminalOutputs";
/// Terminal output written when a task produced none.
pub const NO_TERMINAL_OUTPUT: &str = "no terminal output";

/// A cache hit handed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedResult {
    pub terminal_output: String,
    /// Directory holding the materialized outputs of the record.
    pub outputs_path: PathBuf,
    pub code: i32,
    /// Whether the record was just pulled from a remote backend.
    pub remote: bool,
}

/// What a remote backend reports after materializing a record locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCacheResult {
    pub terminal_output: String,
    pub code: i32,
}

/// A record as tracked by a persistent index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedRecord {
    pub hash: TaskHash,
    pub code: i32,
    pub size_bytes: u64,
    pub source_machine_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub accessed_at: DateTime<Utc>,
}

/// How a store shapes the files inside `<root>/<hash>`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordLayout {
    /// Metadata files next to an `outputs/` subtree (legacy store).
    #[default]
    Nested,
    /// Outputs directly in the record directory, metadata kept elsewhere
    /// (indexed store).
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheEvictionReason {
    Expired,
    Capacity,
    Missing,
}
