//! Configuration for remote cache backends.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Remote cache settings. Each section, when present, makes its backend a
/// candidate during resolution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteCacheConfig {
    /// S3-compatible object storage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3: Option<S3Config>,
    /// A directory on a shared filesystem.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shared_fs: Option<SharedFsConfig>,
    /// Google Cloud Storage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gcs: Option<GcsConfig>,
    /// Azure Blob Storage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure: Option<AzureConfig>,
    /// Self-hosted HTTP cache server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpCacheConfig>,
}

impl RemoteCacheConfig {
    /// Whether any backend section is configured.
    pub fn is_empty(&self) -> bool {
        self.s3.is_none()
            && self.shared_fs.is_none()
            && self.gcs.is_none()
            && self.azure.is_none()
            && self.http.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services such as MinIO or R2.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Key prefix for cache objects.
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub force_path_style: bool,
    pub access_key_id: String,
    pub secret_access_key: String,
    #[serde(default)]
    pub session_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SharedFsConfig {
    /// Directory shared between machines (NFS, SMB, mounted volume).
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcsConfig {
    pub bucket: String,
    #[serde(default)]
    pub prefix: Option<String>,
    /// OAuth2 access token with read/write access to the bucket.
    pub access_token: String,
    #[serde(default = "default_gcs_endpoint")]
    pub endpoint: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AzureConfig {
    /// Account URL, e.g. `https://myaccount.blob.core.windows.net`.
    pub account_url: String,
    pub container: String,
    /// Shared access signature granting read/write on the container.
    pub sas_token: String,
    #[serde(default)]
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpCacheConfig {
    pub url: String,
    #[serde(default)]
    pub access_token: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_gcs_endpoint() -> String {
    "https://storage.googleapis.com".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_empty() {
        assert!(RemoteCacheConfig::default().is_empty());
    }

    #[test]
    fn test_sections_deserialize_with_defaults() {
        let json = r#"{
            "s3": { "bucket": "cache", "access_key_id": "a", "secret_access_key": "b" },
            "gcs": { "bucket": "cache", "access_token": "t" }
        }"#;
        let config: RemoteCacheConfig = serde_json::from_str(json).unwrap();
        let s3 = config.s3.as_ref().unwrap();
        assert_eq!(s3.region, "us-east-1");
        assert!(!s3.force_path_style);
        assert_eq!(
            config.gcs.as_ref().unwrap().endpoint,
            "https://storage.googleapis.com"
        );
        assert!(!config.is_empty());
    }
}
