//! Remote encrypted-blob fetcher (MEGA public file links)
//!
//! A public file is addressed by its handle and a 256-bit key (base64url,
//! unpadded). Download works in two steps: ask the API for a temporary
//! download URL, then fetch the ciphertext and decrypt it with AES-128-CTR.

use aes::cipher::{KeyIvInit, StreamCipher};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use super::BlobFetcher;
use crate::error::{Error, Result};

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

/// AES key and counter IV derived from a file key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileKey {
    aes_key: [u8; 16],
    iv: [u8; 16],
}

impl FileKey {
    /// Parse the key part of a public link
    pub fn parse(encoded: &str) -> Result<Self> {
        let raw = URL_SAFE_NO_PAD
            .decode(encoded.trim_end_matches('='))
            .map_err(|e| Error::RemoteFetch(format!("invalid decryption key: {}", e)))?;
        let raw: [u8; 32] = raw.try_into().map_err(|raw: Vec<u8>| {
            Error::RemoteFetch(format!(
                "invalid decryption key: expected 32 bytes, got {}",
                raw.len()
            ))
        })?;
        Ok(Self::from_raw(&raw))
    }

    /// Derive the AES key (halves XORed) and the IV (nonce, zero counter)
    pub fn from_raw(raw: &[u8; 32]) -> Self {
        let mut aes_key = [0u8; 16];
        for (i, byte) in aes_key.iter_mut().enumerate() {
            *byte = raw[i] ^ raw[i + 16];
        }
        let mut iv = [0u8; 16];
        iv[..8].copy_from_slice(&raw[16..24]);
        FileKey { aes_key, iv }
    }

    /// Decrypt (or encrypt, CTR is symmetric) in place
    pub fn apply(&self, data: &mut [u8]) {
        let mut cipher = Aes128Ctr::new(&self.aes_key.into(), &self.iv.into());
        cipher.apply_keystream(data);
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiReply {
    File {
        g: String,
        #[serde(default)]
        s: Option<u64>,
    },
    Code(i64),
}

/// HTTP client for public file downloads
pub struct MegaClient {
    http: reqwest::Client,
    api_url: String,
    seq: AtomicU64,
}

impl MegaClient {
    /// Create a client for the given API base URL
    pub fn new(api_url: impl AsRef<str>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create a client reusing an existing HTTP client
    pub fn with_client(http: reqwest::Client, api_url: impl AsRef<str>) -> Self {
        MegaClient {
            http,
            api_url: api_url.as_ref().trim_end_matches('/').to_string(),
            seq: AtomicU64::new(rand::random::<u32>() as u64),
        }
    }

    /// Resolve a temporary download URL for a file handle
    async fn download_url(&self, id: &str) -> Result<(String, Option<u64>)> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let url = format!("{}/cs?id={}", self.api_url, seq);
        let body = serde_json::json!([{ "a": "g", "g": 1, "p": id }]);

        let response = self.http.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(Error::RemoteFetch(format!(
                "object store API returned {}",
                response.status()
            )));
        }

        let value: serde_json::Value = response.json().await?;
        let reply = match value {
            serde_json::Value::Array(mut items) if !items.is_empty() => items.swap_remove(0),
            // A bare number is a request-level error code
            other => other,
        };

        match serde_json::from_value::<ApiReply>(reply)? {
            ApiReply::File { g, s } => Ok((g, s)),
            ApiReply::Code(code) => Err(Error::RemoteFetch(format!(
                "object store API error code {}",
                code
            ))),
        }
    }
}

#[async_trait]
impl BlobFetcher for MegaClient {
    async fn fetch(&self, id: &str, key: &str) -> Result<Vec<u8>> {
        let file_key = FileKey::parse(key)?;
        let (url, size) = self.download_url(id).await?;
        debug!("Resolved download URL for {} ({:?} bytes)", id, size);

        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Error::RemoteFetch(format!(
                "blob download returned {}",
                response.status()
            )));
        }

        let mut data = response.bytes().await?.to_vec();
        if let Some(size) = size {
            if data.len() as u64 != size {
                return Err(Error::RemoteFetch(format!(
                    "truncated download: expected {} bytes, got {}",
                    size,
                    data.len()
                )));
            }
        }

        file_key.apply(&mut data);
        Ok(data)
    }
}
