//! Paste-service fetcher
//!
//! Pastes are read from the raw endpoint: `{base}/raw/{key}`.

use async_trait::async_trait;
use tracing::debug;

use super::PasteFetcher;
use crate::error::{Error, Result};

/// HTTP client for raw paste downloads
pub struct PasteClient {
    http: reqwest::Client,
    base_url: String,
}

impl PasteClient {
    /// Create a client for the given paste service
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client reusing an existing HTTP client
    pub fn with_client(http: reqwest::Client, base_url: impl AsRef<str>) -> Self {
        PasteClient {
            http,
            base_url: base_url.as_ref().trim_end_matches('/').to_string(),
        }
    }

    /// Raw URL of a paste
    pub fn raw_url(&self, key: &str) -> String {
        format!("{}/raw/{}", self.base_url, key)
    }
}

#[async_trait]
impl PasteFetcher for PasteClient {
    async fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        let url = self.raw_url(key);
        debug!("Fetching paste from {}", url);

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::RemoteFetch(format!(
                "paste service returned {} for key '{}'",
                status, key
            )));
        }

        let body = response.bytes().await?;
        if body.is_empty() {
            return Err(Error::RemoteFetch(format!("paste '{}' is empty", key)));
        }
        Ok(body.to_vec())
    }
}
