//! Google Cloud Storage transport over the JSON API.

use super::BlobTransport;
use crate::config::GcsConfig;
use async_trait::async_trait;
use hoard_core::{Error, Result};
use reqwest::{StatusCode, Url};

pub struct GcsTransport {
    client: reqwest::Client,
    endpoint: Url,
    bucket: String,
    access_token: String,
}

impl GcsTransport {
    pub fn new(config: &GcsConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            Error::Configuration(format!("Invalid GCS endpoint {}: {}", config.endpoint, e))
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(Error::Configuration(format!(
                "Invalid GCS endpoint {}",
                config.endpoint
            )));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            endpoint,
            bucket: config.bucket.clone(),
            access_token: config.access_token.clone(),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Internal("GCS endpoint cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn object_url(&self, key: &str) -> Result<Url> {
        let mut url = self.url(&["storage", "v1", "b", &self.bucket, "o", key])?;
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }

    fn upload_url(&self, key: &str) -> Result<Url> {
        let mut url = self.url(&["upload", "storage", "v1", "b", &self.bucket, "o"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", key);
        Ok(url)
    }
}

#[async_trait]
impl BlobTransport for GcsTransport {
    async fn download(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let response = self
            .client
            .get(self.object_url(key)?)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| Error::Network(format!("GCS download failed: {}", e)))?;

        match response.status() {
            status if status.is_success() => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| Error::Network(format!("Failed to read GCS object: {}", e)))?;
                Ok(Some(bytes.to_vec()))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(Error::remote(
                "gcs",
                format!("Download of {} returned {}", key, status),
            )),
        }
    }

    async fn upload(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let response = self
            .client
            .post(self.upload_url(key)?)
            .bearer_auth(&self.access_token)
            .header(reqwest::header::CONTENT_TYPE, "application/zstd")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Network(format!("GCS upload failed: {}", e)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::remote(
                "gcs",
                format!("Upload of {} returned {}", key, response.status()),
            ))
        }
    }

    fn name(&self) -> &str {
        "gcs"
    }
}
