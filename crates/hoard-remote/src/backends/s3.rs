//! S3-compatible object storage transport.

use super::BlobTransport;
use crate::config::S3Config;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use hoard_core::{Error, Result};

pub struct S3Transport {
    client: Client,
    bucket: String,
}

impl S3Transport {
    pub fn new(config: &S3Config) -> Result<Self> {
        if config.bucket.is_empty() {
            return Err(Error::Configuration("S3 bucket must not be empty".to_string()));
        }

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            config.session_token.clone(),
            None,
            "hoard",
        );
        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials)
            .force_path_style(config.force_path_style);
        if let Some(endpoint) = &config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        })
    }
}

#[async_trait]
impl BlobTransport for S3Transport {
    async fn download(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) if e.as_service_error().is_some_and(|s| s.is_no_such_key()) => {
                return Ok(None);
            }
            Err(e) => {
                return Err(Error::remote(
                    "s3",
                    format!("GetObject {} failed: {}", key, DisplayErrorContext(&e)),
                ));
            }
        };

        let body = output
            .body
            .collect()
            .await
            .map_err(|e| Error::Network(format!("Failed to read object {}: {}", key, e)))?;
        Ok(Some(body.into_bytes().to_vec()))
    }

    async fn upload(&self, key: &str, body: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/zstd")
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| {
                Error::remote(
                    "s3",
                    format!("PutObject {} failed: {}", key, DisplayErrorContext(&e)),
                )
            })?;
        Ok(())
    }

    fn name(&self) -> &str {
        "s3"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(bucket: &str) -> S3Config {
        S3Config {
            bucket: bucket.to_string(),
            region: "us-east-1".to_string(),
            endpoint: Some("http://localhost:9000".to_string()),
            prefix: None,
            force_path_style: true,
            access_key_id: "minioadmin".to_string(),
            secret_access_key: "minioadmin".to_string(),
            session_token: None,
        }
    }

    #[test]
    fn test_new_requires_bucket() {
        assert!(matches!(
            S3Transport::new(&config("")),
            Err(Error::Configuration(_))
        ));
        assert!(S3Transport::new(&config("cache")).is_ok());
    }
}
