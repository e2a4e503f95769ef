//! Sidecar protocol schema
//!
//! Defines the wire format for frames exchanged with the gateway sidecar.
//! Each frame is one JSON object terminated by a newline.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Sidecar frame - Top-level message envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GatewayFrame {
    /// Request from the client
    Request(RequestFrame),
    /// Response from the sidecar
    Response(ResponseFrame),
    /// Event pushed by the sidecar
    Event(EventFrame),
    /// Error not tied to a pending request
    Error(ErrorFrame),
    /// Ping
    Ping { id: String },
    /// Pong
    Pong { id: String },
}

impl GatewayFrame {
    /// Encode as a single newline-terminated line
    pub fn encode_line(&self) -> Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }

    /// Decode one line
    pub fn decode_line(line: &str) -> Result<Self> {
        serde_json::from_str(line.trim()).map_err(|e| {
            Error::Gateway(format!("Failed to parse sidecar frame: {} (raw: {})", e, line.trim()))
        })
    }
}

/// Request frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestFrame {
    /// Unique request ID
    pub id: String,
    /// Method name
    pub method: String,
    /// Parameters
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Response frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseFrame {
    /// Request ID this responds to
    pub id: String,
    /// Result (success)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error (failure)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ProtocolError>,
}

/// Event frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventFrame {
    /// Event name
    pub event: String,
    /// Event data
    #[serde(default)]
    pub data: serde_json::Value,
    /// Timestamp
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Error frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorFrame {
    /// Request ID (if applicable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Error details
    pub error: ProtocolError,
}

/// Protocol error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Additional data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ProtocolError {
    /// Create a new protocol error
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        ProtocolError {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

impl RequestFrame {
    /// Create a request
    pub fn new(
        id: impl Into<String>,
        method: impl Into<String>,
        params: serde_json::Value,
    ) -> Self {
        RequestFrame {
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

impl ResponseFrame {
    /// Create a success response
    pub fn success(id: impl Into<String>, result: serde_json::Value) -> Self {
        ResponseFrame {
            id: id.into(),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: impl Into<String>, error: ProtocolError) -> Self {
        ResponseFrame {
            id: id.into(),
            result: None,
            error: Some(error),
        }
    }

    /// Convert into the result value, mapping protocol errors
    pub fn into_result(self) -> Result<serde_json::Value> {
        match self.error {
            Some(err) => Err(Error::Gateway(err.to_string())),
            None => Ok(self.result.unwrap_or(serde_json::Value::Null)),
        }
    }
}

impl EventFrame {
    /// Create a new event
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        EventFrame {
            event: event.into(),
            data,
            timestamp: Some(chrono::Utc::now().timestamp()),
        }
    }
}
