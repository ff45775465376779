//! Reference remote cache backends.
//!
//! Every reference backend is an [`ArchiveBackend`]: it packs records with the
//! shared archive codec and moves the bytes through a [`BlobTransport`].

mod filesystem;
mod http;

#[cfg(feature = "azure")]
mod azure;
#[cfg(feature = "gcs")]
mod gcs;
#[cfg(feature = "s3")]
mod s3;

pub use filesystem::FilesystemTransport;
pub use http::HttpTransport;

#[cfg(feature = "azure")]
pub use azure::AzureBlobTransport;
#[cfg(feature = "gcs")]
pub use gcs::GcsTransport;
#[cfg(feature = "s3")]
pub use s3::S3Transport;

use crate::archive::{pack_record, unpack_record};
use crate::keys::object_key;
use async_trait::async_trait;
use hoard_core::ports::RemoteCacheBackend;
use hoard_core::{Error, RemoteCacheResult, Result, TaskHash};
use std::path::Path;
use tracing::{debug, info};

/// Moves opaque blobs to and from a storage service.
#[async_trait]
pub trait BlobTransport: Send + Sync {
    /// Download a blob. `None` when it does not exist.
    async fn download(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Upload a blob, overwriting any previous value.
    async fn upload(&self, key: &str, body: Vec<u8>) -> Result<()>;

    /// Transport name for logging.
    fn name(&self) -> &str;
}

/// A remote cache storing one packed archive per record.
pub struct ArchiveBackend<T> {
    transport: T,
    prefix: Option<String>,
}

impl<T: BlobTransport> ArchiveBackend<T> {
    pub fn new(transport: T, prefix: Option<String>) -> Self {
        Self { transport, prefix }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn key(&self, hash: &TaskHash) -> String {
        object_key(self.prefix.as_deref(), hash)
    }
}

#[async_trait]
impl<T: BlobTransport> RemoteCacheBackend for ArchiveBackend<T> {
    async fn retrieve(
        &self,
        hash: &TaskHash,
        cache_directory: &Path,
    ) -> Result<Option<RemoteCacheResult>> {
        let key = self.key(hash);
        let Some(bytes) = self.transport.download(&key).await? else {
            debug!(backend = self.transport.name(), hash = %hash, "Remote cache miss");
            return Ok(None);
        };

        let size = bytes.len();
        let cache_directory = cache_directory.to_path_buf();
        let hash_owned = hash.clone();
        let result = tokio::task::spawn_blocking(move || {
            unpack_record(&bytes, &cache_directory, &hash_owned)
        })
        .await
        .map_err(|e| Error::Internal(e.to_string()))??;

        info!(
            backend = self.transport.name(),
            hash = %hash,
            bytes = size,
            "Retrieved record from remote cache"
        );
        Ok(Some(result))
    }

    async fn store(
        &self,
        hash: &TaskHash,
        cache_directory: &Path,
        terminal_output: &str,
        code: i32,
    ) -> Result<bool> {
        let cache_directory = cache_directory.to_path_buf();
        let hash_owned = hash.clone();
        let terminal_output = terminal_output.to_string();
        let bytes = tokio::task::spawn_blocking(move || {
            pack_record(&cache_directory, &hash_owned, &terminal_output, code)
        })
        .await
        .map_err(|e| Error::Internal(e.to_string()))??;

        let size = bytes.len();
        self.transport.upload(&self.key(hash), bytes).await?;
        info!(
            backend = self.transport.name(),
            hash = %hash,
            bytes = size,
            "Stored record in remote cache"
        );
        Ok(true)
    }

    fn name(&self) -> &str {
        self.transport.name()
    }
}
