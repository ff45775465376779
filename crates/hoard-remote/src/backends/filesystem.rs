//! Shared-filesystem transport.

use super::BlobTransport;
use async_trait::async_trait;
use hoard_core::{Error, Result};
use std::path::{Path, PathBuf};

/// Stores blobs as files under a directory shared between machines.
pub struct FilesystemTransport {
    root_dir: PathBuf,
}

impl FilesystemTransport {
    pub fn new(root_dir: PathBuf) -> Self {
        Self { root_dir }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }
}

#[async_trait]
impl BlobTransport for FilesystemTransport {
    async fn download(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.root_dir.join(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::remote(
                "shared-fs",
                format!("Failed to read {}: {}", path.display(), e),
            )),
        }
    }

    async fn upload(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let path = self.root_dir.join(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                Error::remote("shared-fs", format!("Failed to create cache dir: {}", e))
            })?;
        }

        // Readers on other machines must never see a partially written archive.
        let tmp = path.with_extension(format!("tmp-{}", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| Error::remote("shared-fs", format!("Failed to write cache: {}", e)))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(Error::remote(
                "shared-fs",
                format!("Failed to publish {}: {}", path.display(), e),
            ));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "shared-fs"
    }
}
