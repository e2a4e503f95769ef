//! Automation configuration types
//!
//! Post-connect announcement, periodic status, and message automation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One-time announcement performed on the first successful connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnounceConfig {
    /// Send the greeting to the bot's own chat
    #[serde(default = "default_true")]
    pub greet_self: bool,
    /// Notify the configured owner as well
    #[serde(default)]
    pub notify_owner: bool,
    /// Channel ids to follow
    #[serde(default)]
    pub channel_ids: Vec<String>,
    /// Group invite links or codes to join
    #[serde(default)]
    pub group_invites: Vec<String>,
    /// Link appended to the greeting
    pub channel_link: Option<String>,
    /// Image sent along with the greeting
    pub greeting_image: Option<String>,
}

impl Default for AnnounceConfig {
    fn default() -> Self {
        AnnounceConfig {
            greet_self: true,
            notify_owner: false,
            channel_ids: Vec::new(),
            group_invites: Vec::new(),
            channel_link: None,
            greeting_image: None,
        }
    }
}

/// Periodic profile status settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusConfig {
    /// Enable the periodic status loop
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Interval between updates
    #[serde(default = "default_status_interval", with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for StatusConfig {
    fn default() -> Self {
        StatusConfig {
            enabled: true,
            interval: default_status_interval(),
        }
    }
}

fn default_status_interval() -> Duration {
    Duration::from_secs(10)
}

/// Built-in message handler settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationConfig {
    /// React to direct messages with a random emoji
    #[serde(default)]
    pub auto_react: bool,
    /// Mark status broadcasts as read
    #[serde(default)]
    pub auto_status_seen: bool,
    /// React to status broadcasts
    #[serde(default)]
    pub auto_status_react: bool,
    /// Reply to status broadcasts
    #[serde(default)]
    pub auto_status_reply: bool,
    /// Reply text for status broadcasts
    #[serde(default = "default_status_reply_text")]
    pub status_reply_text: String,
    /// Emoji pool for reactions
    #[serde(default = "default_react_emojis")]
    pub react_emojis: Vec<String>,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        AutomationConfig {
            auto_react: false,
            auto_status_seen: false,
            auto_status_react: false,
            auto_status_reply: false,
            status_reply_text: default_status_reply_text(),
            react_emojis: default_react_emojis(),
        }
    }
}

fn default_status_reply_text() -> String {
    "✅ Auto Status Seen".to_string()
}

fn default_react_emojis() -> Vec<String> {
    ["❤️", "🔥", "👍", "😂", "✨", "🙌", "💯", "🎉"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_true() -> bool {
    true
}
