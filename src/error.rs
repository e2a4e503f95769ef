//! Error types for Chatlink

use thiserror::Error;

/// Result type alias using Chatlink's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Chatlink
#[derive(Error, Debug)]
pub enum Error {
    /// No session credential was provided
    #[error("No session credential provided")]
    MissingCredential,

    /// A remote-blob or paste reference is missing one of its parts
    #[error("Malformed remote session reference: {0}")]
    MalformedRemoteReference(String),

    /// The inline credential could not be decoded
    #[error("Invalid credential encoding: {0}")]
    InvalidEncoding(String),

    /// Fetching credential material from a remote store failed
    #[error("Remote fetch error: {0}")]
    RemoteFetch(String),

    /// Gateway collaborator error
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// The gateway connection dropped for a recoverable reason
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// The remote side revoked the session credentials
    #[error("Logged out by the remote side")]
    LoggedOut,

    /// Initial connection setup failed
    #[error("Startup error: {0}")]
    Startup(String),

    /// The reconnect policy gave up
    #[error("Reconnect attempts exhausted after {0} tries")]
    ReconnectExhausted(u32),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the caller may fall back to interactive pairing
    pub fn is_missing_credential(&self) -> bool {
        matches!(self, Error::MissingCredential)
    }

    /// Errors after which the process must stop
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Error::LoggedOut | Error::Startup(_) | Error::ReconnectExhausted(_)
        )
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::InvalidEncoding(err.to_string())
    }
}
