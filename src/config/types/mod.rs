//! Configuration types module
//!
//! Re-exports all configuration types.

pub mod automation;
pub mod gateway;
pub mod session;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Bot identity and operating mode
    #[serde(default)]
    pub bot: BotConfig,

    /// Session credential and reconnect settings
    #[serde(default)]
    pub session: session::SessionConfig,

    /// Reconnect policy
    #[serde(default)]
    pub reconnect: session::ReconnectConfig,

    /// Gateway sidecar connection
    #[serde(default)]
    pub gateway: gateway::GatewayConfig,

    /// One-time post-connect announcement
    #[serde(default)]
    pub announce: automation::AnnounceConfig,

    /// Periodic profile status updates
    #[serde(default)]
    pub status: automation::StatusConfig,

    /// Built-in message automation
    #[serde(default)]
    pub automation: automation::AutomationConfig,

    /// Logging settings
    #[serde(default)]
    pub log: LogConfig,
}

impl Config {
    /// Load configuration from defaults, the config file, and environment overrides
    pub fn from_env() -> Result<Self> {
        crate::config::load_config()
    }
}

/// Who the bot accepts messages from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotMode {
    /// Only the owner and the bot itself
    Private,
    /// Anyone
    #[default]
    Public,
}

impl std::str::FromStr for BotMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "0" | "private" | "self" => Ok(BotMode::Private),
            "1" | "public" => Ok(BotMode::Public),
            _ => Err(Error::Config(format!(
                "Invalid mode: {}. Valid options: 0 (private), 1 (public)",
                s
            ))),
        }
    }
}

impl std::fmt::Display for BotMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BotMode::Private => write!(f, "private"),
            BotMode::Public => write!(f, "public"),
        }
    }
}

/// Bot identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Display name used in greetings and status text
    #[serde(default = "default_bot_name")]
    pub name: String,
    /// Owner display name
    #[serde(default = "default_owner_name")]
    pub owner_name: String,
    /// Owner phone number (digits only)
    pub owner_number: Option<String>,
    /// Command prefix shown in the greeting
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Operating mode
    #[serde(default)]
    pub mode: BotMode,
    /// IANA time zone for time-of-day text
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        BotConfig {
            name: default_bot_name(),
            owner_name: default_owner_name(),
            owner_number: None,
            prefix: default_prefix(),
            mode: BotMode::default(),
            time_zone: default_time_zone(),
        }
    }
}

impl BotConfig {
    /// Parse the configured time zone
    pub fn tz(&self) -> Result<chrono_tz::Tz> {
        self.time_zone
            .parse()
            .map_err(|_| Error::Config(format!("Invalid time zone: {}", self.time_zone)))
    }

    /// Owner identity on the gateway, if configured
    pub fn owner_jid(&self) -> Option<String> {
        self.owner_number
            .as_deref()
            .map(|n| n.trim_start_matches('+').trim())
            .filter(|n| !n.is_empty())
            .map(|n| format!("{}@s.whatsapp.net", n))
    }
}

fn default_bot_name() -> String {
    "Chatlink".to_string()
}

fn default_owner_name() -> String {
    "Owner".to_string()
}

fn default_prefix() -> String {
    ".".to_string()
}

fn default_time_zone() -> String {
    "Africa/Nairobi".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Log level filter
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info,chatlink=debug".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.bot.mode, BotMode::Public);
        assert_eq!(config.bot.time_zone, "Africa/Nairobi");
        assert!(config.bot.tz().is_ok());
    }

    #[test]
    fn test_bot_mode_parsing() {
        assert_eq!("0".parse::<BotMode>().unwrap(), BotMode::Private);
        assert_eq!("1".parse::<BotMode>().unwrap(), BotMode::Public);
        assert_eq!("Public".parse::<BotMode>().unwrap(), BotMode::Public);
        assert!("2".parse::<BotMode>().is_err());
    }

    #[test]
    fn test_owner_jid() {
        let mut bot = BotConfig::default();
        assert_eq!(bot.owner_jid(), None);

        bot.owner_number = Some("+254700000000".to_string());
        assert_eq!(bot.owner_jid().as_deref(), Some("254700000000@s.whatsapp.net"));
    }
}
