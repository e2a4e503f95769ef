//! Session configuration types
//!
//! Credential source, session storage, and reconnect policy settings.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Session credential settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Encoded session credential (SESSION_ID)
    #[serde(default, skip_serializing)]
    pub session_id: Option<SecretString>,
    /// Directory holding the session material (defaults to `<state_dir>/session`)
    pub dir: Option<PathBuf>,
    /// Remote object store API endpoint
    #[serde(default = "default_remote_api_url")]
    pub remote_api_url: String,
    /// Paste service base URL
    #[serde(default = "default_paste_base_url")]
    pub paste_base_url: String,
    /// Timeout for credential downloads
    #[serde(default = "default_fetch_timeout", with = "humantime_serde")]
    pub fetch_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            session_id: None,
            dir: None,
            remote_api_url: default_remote_api_url(),
            paste_base_url: default_paste_base_url(),
            fetch_timeout: default_fetch_timeout(),
        }
    }
}

impl SessionConfig {
    /// Resolve the session directory
    pub fn resolve_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(crate::config::session_dir)
    }
}

fn default_remote_api_url() -> String {
    "https://g.api.mega.co.nz".to_string()
}

fn default_paste_base_url() -> String {
    "https://pastebin.com".to_string()
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(60)
}

/// Reconnect backoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt
    #[serde(default = "default_initial_delay", with = "humantime_serde")]
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,
    /// Growth factor between attempts
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Randomization factor (0.0 - 1.0)
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    /// Consecutive failed attempts before giving up (None = never)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ReconnectConfig {
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.25
}

fn default_max_attempts() -> Option<u32> {
    Some(20)
}
