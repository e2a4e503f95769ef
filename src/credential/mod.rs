//! Session credential decoding
//!
//! A session credential arrives as one opaque configuration string. Its prefix
//! selects the encoding scheme:
//!
//! | Prefix        | Scheme          | Remainder                          |
//! |---------------|-----------------|------------------------------------|
//! | `XEON-XTECH~` | remote blob     | `<object id>#<decryption key>`     |
//! | `POPKID$`     | paste service   | `<paste key>`                      |
//! | (none)        | inline encoded  | the whole string, base64           |
//!
//! Classification is pure ([`CredentialReference::parse`]); fetching remote
//! material goes through the [`BlobFetcher`] and [`PasteFetcher`] collaborators.

pub mod paste;
pub mod remote;

pub use paste::PasteClient;
pub use remote::MegaClient;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use std::sync::Arc;
use tracing::info;

use crate::config::SessionConfig;
use crate::error::{Error, Result};

/// Marker for a remote encrypted-blob reference
pub const REMOTE_BLOB_MARKER: &str = "XEON-XTECH~";

/// Marker for a paste-service reference
pub const PASTE_MARKER: &str = "POPKID$";

/// Separator between the object id and the key of a remote reference
pub const REMOTE_KEY_DELIMITER: char = '#';

/// How a credential was encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionScheme {
    /// Encrypted blob in a remote object store
    RemoteBlob,
    /// Plaintext on a public paste endpoint
    PasteService,
    /// Self-contained base64 text
    InlineEncoded,
}

impl std::fmt::Display for SessionScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionScheme::RemoteBlob => write!(f, "remote-blob"),
            SessionScheme::PasteService => write!(f, "paste-service"),
            SessionScheme::InlineEncoded => write!(f, "inline"),
        }
    }
}

/// Decoded credential bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredential {
    /// Source scheme
    pub scheme: SessionScheme,
    /// Raw credential bytes
    pub payload: Vec<u8>,
}

/// A classified credential string, before any fetching
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialReference {
    /// Remote encrypted blob
    RemoteBlob { id: String, key: String },
    /// Paste-service entry
    PasteService { key: String },
    /// Inline base64 text
    InlineEncoded { text: String },
}

impl CredentialReference {
    /// Classify a configuration string by its prefix marker
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(Error::MissingCredential);
        }

        if let Some(rest) = input.strip_prefix(REMOTE_BLOB_MARKER) {
            let mut parts = rest.split(REMOTE_KEY_DELIMITER);
            return match (parts.next(), parts.next(), parts.next()) {
                (Some(id), Some(key), None) if !id.is_empty() && !key.is_empty() => {
                    Ok(CredentialReference::RemoteBlob {
                        id: id.to_string(),
                        key: key.to_string(),
                    })
                }
                _ => Err(Error::MalformedRemoteReference(format!(
                    "expected {}<file id>{}<decryption key>",
                    REMOTE_BLOB_MARKER, REMOTE_KEY_DELIMITER
                ))),
            };
        }

        if let Some(rest) = input.strip_prefix(PASTE_MARKER) {
            if rest.is_empty() {
                return Err(Error::MalformedRemoteReference(format!(
                    "expected {}<paste key>",
                    PASTE_MARKER
                )));
            }
            return Ok(CredentialReference::PasteService {
                key: rest.to_string(),
            });
        }

        Ok(CredentialReference::InlineEncoded {
            text: input.to_string(),
        })
    }

    /// Scheme of this reference
    pub fn scheme(&self) -> SessionScheme {
        match self {
            CredentialReference::RemoteBlob { .. } => SessionScheme::RemoteBlob,
            CredentialReference::PasteService { .. } => SessionScheme::PasteService,
            CredentialReference::InlineEncoded { .. } => SessionScheme::InlineEncoded,
        }
    }
}

/// Fetch and decrypt a blob from a remote object store
#[async_trait]
pub trait BlobFetcher: Send + Sync {
    /// Download object `id` and decrypt it with `key`
    async fn fetch(&self, id: &str, key: &str) -> Result<Vec<u8>>;
}

/// Fetch plaintext from a paste service
#[async_trait]
pub trait PasteFetcher: Send + Sync {
    /// Retrieve the paste stored under `key`
    async fn fetch(&self, key: &str) -> Result<Vec<u8>>;
}

/// Decode inline base64 text (padding optional)
pub fn decode_inline(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    general_purpose::STANDARD
        .decode(&compact)
        .or_else(|_| general_purpose::STANDARD_NO_PAD.decode(&compact))
        .map_err(|e| Error::InvalidEncoding(format!("not valid base64: {}", e)))
}

/// Turns a configuration string into credential bytes
#[derive(Clone)]
pub struct CredentialDecoder {
    blobs: Arc<dyn BlobFetcher>,
    pastes: Arc<dyn PasteFetcher>,
}

impl CredentialDecoder {
    /// Create a decoder with explicit collaborators
    pub fn new(blobs: Arc<dyn BlobFetcher>, pastes: Arc<dyn PasteFetcher>) -> Self {
        CredentialDecoder { blobs, pastes }
    }

    /// Create a decoder backed by the HTTP clients configured in `config`
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.fetch_timeout)
            .build()?;

        Ok(CredentialDecoder {
            blobs: Arc::new(MegaClient::with_client(http.clone(), &config.remote_api_url)),
            pastes: Arc::new(PasteClient::with_client(http, &config.paste_base_url)),
        })
    }

    /// Decode a configuration string into credential bytes
    pub async fn decode(&self, input: &str) -> Result<SessionCredential> {
        let reference = CredentialReference::parse(input)?;
        let scheme = reference.scheme();

        let payload = match reference {
            CredentialReference::RemoteBlob { id, key } => {
                info!("Downloading session from remote object store...");
                self.blobs.fetch(&id, &key).await?
            }
            CredentialReference::PasteService { key } => {
                info!("Downloading session from paste service...");
                self.pastes.fetch(&key).await?
            }
            CredentialReference::InlineEncoded { text } => decode_inline(&text)?,
        };

        info!("Session credential decoded ({}, {} bytes)", scheme, payload.len());
        Ok(SessionCredential { scheme, payload })
    }
}
