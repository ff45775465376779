//! Machine identity of the current host.

use async_trait::async_trait;
use hoard_core::ports::MachineIdProvider;
use hoard_core::{Error, Result};
use sha2::{Digest, Sha256};
use std::path::PathBuf;

const MACHINE_ID_FILES: [&str; 2] = ["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Derives a stable id from the OS machine id, falling back to the hostname.
///
/// The reported id is a SHA-256 of the raw value, never the raw value itself.
#[derive(Debug, Clone)]
pub struct HostMachineId {
    id_files: Vec<PathBuf>,
}

impl Default for HostMachineId {
    fn default() -> Self {
        Self {
            id_files: MACHINE_ID_FILES.iter().map(PathBuf::from).collect(),
        }
    }
}

impl HostMachineId {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the raw id from `id_files` instead of the system locations.
    pub fn with_id_files(id_files: Vec<PathBuf>) -> Self {
        Self { id_files }
    }

    fn raw_id(&self) -> Result<String> {
        for path in &self.id_files {
            if let Ok(contents) = std::fs::read_to_string(path) {
                let id = contents.trim();
                if !id.is_empty() {
                    return Ok(id.to_string());
                }
            }
        }

        let host = hostname::get()
            .map_err(|e| Error::Internal(format!("Failed to read hostname: {}", e)))?;
        let host = host.to_string_lossy().trim().to_string();
        if host.is_empty() {
            return Err(Error::Internal("Machine has no id and no hostname".to_string()));
        }
        Ok(host)
    }
}

#[async_trait]
impl MachineIdProvider for HostMachineId {
    async fn machine_id(&self) -> Result<String> {
        let provider = self.clone();
        let raw = tokio::task::spawn_blocking(move || provider.raw_id())
            .await
            .map_err(|e| Error::Internal(e.to_string()))??;

        let mut hasher = Sha256::new();
        hasher.update(b"hoard-machine:");
        hasher.update(raw.as_bytes());
        Ok(hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_id_file_is_hashed_and_stable() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("machine-id");
        std::fs::write(&file, "4c4c4544004a\n").unwrap();

        let provider = HostMachineId::with_id_files(vec![file]);
        let first = provider.machine_id().await.unwrap();
        assert_eq!(first.len(), 64);
        assert_eq!(first, provider.machine_id().await.unwrap());
        assert!(!first.contains("4c4c4544004a"));
    }

    #[tokio::test]
    async fn test_different_ids_differ() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        std::fs::write(&a, "machine-a").unwrap();
        std::fs::write(&b, "machine-b").unwrap();

        let id_a = HostMachineId::with_id_files(vec![a]).machine_id().await.unwrap();
        let id_b = HostMachineId::with_id_files(vec![b]).machine_id().await.unwrap();
        assert_ne!(id_a, id_b);
    }
}
