//! Testcontainer configurations for integration tests.

use hoard_remote::S3Config;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::minio::MinIO;

/// MinIO container standing in for S3-compatible object storage.
pub struct MinioContainer {
    #[allow(dead_code)] // Kept to maintain container lifetime
    container: ContainerAsync<MinIO>,
    endpoint: String,
}

impl MinioContainer {
    pub const ACCESS_KEY: &'static str = "minioadmin";
    pub const SECRET_KEY: &'static str = "minioadmin";

    pub async fn start() -> anyhow::Result<Self> {
        let container = MinIO::default().with_tag("latest").start().await?;

        let host = container.get_host().await?;
        let port = container.get_host_port_ipv4(9000).await?;

        Ok(Self {
            container,
            endpoint: format!("http://{}:{}", host, port),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Backend settings for `bucket` on this container.
    pub fn s3_config(&self, bucket: &str) -> S3Config {
        S3Config {
            bucket: bucket.to_string(),
            region: "us-east-1".to_string(),
            endpoint: Some(self.endpoint.clone()),
            prefix: Some("ci".to_string()),
            force_path_style: true,
            access_key_id: Self::ACCESS_KEY.to_string(),
            secret_access_key: Self::SECRET_KEY.to_string(),
            session_token: None,
        }
    }

    /// Create `bucket` so the backend can write into it.
    pub async fn create_bucket(&self, bucket: &str) -> anyhow::Result<()> {
        let credentials =
            aws_sdk_s3::config::Credentials::new(Self::ACCESS_KEY, Self::SECRET_KEY, None, None, "hoard-tests");
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
            .region(aws_sdk_s3::config::Region::new("us-east-1"))
            .credentials_provider(credentials)
            .endpoint_url(&self.endpoint)
            .force_path_style(true)
            .build();
        aws_sdk_s3::Client::from_conf(config)
            .create_bucket()
            .bucket(bucket)
            .send()
            .await?;
        Ok(())
    }
}
