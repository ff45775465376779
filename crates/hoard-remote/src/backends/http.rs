//! Self-hosted HTTP cache server transport.
//!
//! The server exposes `GET` and `PUT` on `{url}/v1/cache/{hash}`.

use super::BlobTransport;
use crate::config::HttpCacheConfig;
use crate::keys::ARCHIVE_EXTENSION;
use async_trait::async_trait;
use hoard_core::{Error, Result};
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

const ACCESS_DENIED: &str = "Access to the self-hosted remote cache was denied. \
     Check HOARD_SELF_HOSTED_REMOTE_CACHE_ACCESS_TOKEN";

pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    access_token: Option<String>,
}

impl HttpTransport {
    pub fn new(config: &HttpCacheConfig) -> Result<Self> {
        reqwest::Url::parse(&config.url).map_err(|e| {
            Error::Configuration(format!(
                "Invalid self-hosted remote cache url {}: {}",
                config.url, e
            ))
        })?;

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
        })
    }

    fn url(&self, key: &str) -> String {
        let hash = key
            .strip_suffix(&format!(".{}", ARCHIVE_EXTENSION))
            .unwrap_or(key);
        format!("{}/v1/cache/{}", self.base_url, hash)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl BlobTransport for HttpTransport {
    async fn download(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let url = self.url(key);
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| Error::Network(format!("GET {} failed: {}", url, e)))?;

        match response.status() {
            status if status.is_success() => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| Error::Network(format!("Failed to read cache body: {}", e)))?;
                Ok(Some(bytes.to_vec()))
            }
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(Error::remote("http", ACCESS_DENIED))
            }
            status => Err(Error::remote(
                "http",
                format!("Server returned {} for {}", status, url),
            )),
        }
    }

    async fn upload(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let url = self.url(key);
        let response = self
            .authorize(self.client.put(&url))
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Network(format!("PUT {} failed: {}", url, e)))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => {
                debug!(url = %url, "Record already present on self-hosted remote cache");
                Ok(())
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(Error::remote("http", ACCESS_DENIED))
            }
            status => Err(Error::remote(
                "http",
                format!("Server returned {} for {}", status, url),
            )),
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}
