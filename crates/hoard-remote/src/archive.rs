//! Record archive codec shared by the reference backends.
//!
//! An archive is a zstd-compressed tar holding `meta.json` (hash, terminal
//! output, exit code) and the record directory under `record/`. The codec is
//! independent of the store layout: whatever lives in `<root>/<hash>` travels.

use hoard_core::{Error, RemoteCacheResult, Result, TaskHash};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const META_ENTRY: &str = "meta.json";
const RECORD_PREFIX: &str = "record";
/// Prefix of the staging directories used while unpacking.
pub const STAGING_PREFIX: &str = ".hoard-unpack-";

#[derive(Debug, Serialize, Deserialize)]
struct ArchiveMeta {
    hash: String,
    terminal_output: String,
    code: i32,
}

/// Pack the record directory `<cache_directory>/<hash>` into an archive.
pub fn pack_record(
    cache_directory: &Path,
    hash: &TaskHash,
    terminal_output: &str,
    code: i32,
) -> Result<Vec<u8>> {
    let record_dir = cache_directory.join(hash.as_str());
    if !record_dir.is_dir() {
        return Err(Error::Internal(format!(
            "Record directory {} does not exist",
            record_dir.display()
        )));
    }

    let meta = serde_json::to_vec(&ArchiveMeta {
        hash: hash.to_string(),
        terminal_output: terminal_output.to_string(),
        code,
    })?;

    let encoder = zstd::stream::write::Encoder::new(Vec::new(), 3)
        .map_err(|e| Error::Internal(format!("Zstd init failed: {}", e)))?;
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    let mut header = tar::Header::new_gnu();
    header.set_size(meta.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, META_ENTRY, meta.as_slice())
        .map_err(|e| Error::Internal(format!("Failed to pack metadata: {}", e)))?;

    builder
        .append_dir_all(RECORD_PREFIX, &record_dir)
        .map_err(|e| Error::Internal(format!("Failed to pack record: {}", e)))?;

    let encoder = builder
        .into_inner()
        .map_err(|e| Error::Internal(format!("Failed to finish tar: {}", e)))?;
    encoder
        .finish()
        .map_err(|e| Error::Internal(format!("Zstd finish failed: {}", e)))
}

/// Unpack an archive into `<cache_directory>/<hash>`, replacing whatever was there.
///
/// The archive is extracted into a staging directory first and renamed into
/// place, so a failed unpack never leaves a half-extracted record behind.
pub fn unpack_record(
    bytes: &[u8],
    cache_directory: &Path,
    hash: &TaskHash,
) -> Result<RemoteCacheResult> {
    fs::create_dir_all(cache_directory)?;
    let staging = cache_directory.join(format!(
        "{}{}-{}",
        STAGING_PREFIX,
        hash,
        uuid::Uuid::new_v4().simple()
    ));

    let result = unpack_into(bytes, &staging, cache_directory, hash);
    if staging.exists() {
        let _ = fs::remove_dir_all(&staging);
    }
    result
}

fn unpack_into(
    bytes: &[u8],
    staging: &Path,
    cache_directory: &Path,
    hash: &TaskHash,
) -> Result<RemoteCacheResult> {
    let decoder = zstd::stream::read::Decoder::new(bytes)
        .map_err(|e| Error::Internal(format!("Failed to create decoder: {}", e)))?;
    let mut archive = tar::Archive::new(decoder);
    archive
        .unpack(staging)
        .map_err(|e| Error::Internal(format!("Failed to unpack archive: {}", e)))?;

    let meta: ArchiveMeta = serde_json::from_slice(&fs::read(staging.join(META_ENTRY))?)?;
    if meta.hash != hash.as_str() {
        return Err(Error::Internal(format!(
            "Archive for {} contains record {}",
            hash, meta.hash
        )));
    }

    let target: PathBuf = cache_directory.join(hash.as_str());
    if target.exists() {
        fs::remove_dir_all(&target)?;
    }
    let staged_record = staging.join(RECORD_PREFIX);
    if staged_record.is_dir() {
        fs::rename(&staged_record, &target)?;
    } else {
        fs::create_dir_all(&target)?;
    }

    Ok(RemoteCacheResult {
        terminal_output: meta.terminal_output,
        code: meta.code,
    })
}
