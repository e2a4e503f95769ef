//! Gateway sidecar configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for the gateway sidecar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Sidecar address (host:port)
    #[serde(default = "default_addr")]
    pub addr: String,
    /// Client name announced to the gateway
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Timeout for a single request/response round trip
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            addr: default_addr(),
            client_name: default_client_name(),
            request_timeout: default_request_timeout(),
        }
    }
}

fn default_addr() -> String {
    "127.0.0.1:7450".to_string()
}

fn default_client_name() -> String {
    "chatlink".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}
