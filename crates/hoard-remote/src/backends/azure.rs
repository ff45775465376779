//! Azure Blob Storage transport using a shared access signature.

use super::BlobTransport;
use crate::config::AzureConfig;
use async_trait::async_trait;
use hoard_core::{Error, Result};
use reqwest::{StatusCode, Url};

pub struct AzureBlobTransport {
    client: reqwest::Client,
    account_url: Url,
    container: String,
    sas_token: String,
}

impl AzureBlobTransport {
    pub fn new(config: &AzureConfig) -> Result<Self> {
        let account_url = Url::parse(&config.account_url).map_err(|e| {
            Error::Configuration(format!(
                "Invalid Azure account url {}: {}",
                config.account_url, e
            ))
        })?;
        if account_url.cannot_be_a_base() {
            return Err(Error::Configuration(format!(
                "Invalid Azure account url {}",
                config.account_url
            )));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            account_url,
            container: config.container.clone(),
            sas_token: config.sas_token.trim_start_matches('?').to_string(),
        })
    }

    fn blob_url(&self, key: &str) -> Result<Url> {
        let mut url = self.account_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Internal("Azure account url cannot be a base".to_string()))?
            .pop_if_empty()
            .push(&self.container)
            .extend(key.split('/'));
        if !self.sas_token.is_empty() {
            url.set_query(Some(&self.sas_token));
        }
        Ok(url)
    }
}

#[async_trait]
impl BlobTransport for AzureBlobTransport {
    async fn download(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let response = self
            .client
            .get(self.blob_url(key)?)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Azure download failed: {}", e)))?;

        match response.status() {
            status if status.is_success() => {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| Error::Network(format!("Failed to read Azure blob: {}", e)))?;
                Ok(Some(bytes.to_vec()))
            }
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(Error::remote(
                "azure",
                format!("Download of {} returned {}", key, status),
            )),
        }
    }

    async fn upload(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let response = self
            .client
            .put(self.blob_url(key)?)
            .header("x-ms-blob-type", "BlockBlob")
            .header(reqwest::header::CONTENT_TYPE, "application/zstd")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Azure upload failed: {}", e)))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(Error::remote(
                "azure",
                format!("Upload of {} returned {}", key, response.status()),
            ))
        }
    }

    fn name(&self) -> &str {
        "azure"
    }
}
