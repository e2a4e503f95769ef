//! Configuration I/O - Loading and saving configuration
//!
//! Handles reading configuration from files and environment variables.

use std::path::Path;

use super::types::Config;
use crate::error::{Error, Result};

/// Load configuration with layered precedence:
/// 1. Config file (config.json / config.toml) if it exists, otherwise defaults
/// 2. Environment variable overrides (includes .env)
pub fn load_config() -> Result<Config> {
    let config_path = super::paths::config_path();

    let mut config = if config_path.exists() {
        load_config_from_path(&config_path)?
    } else {
        Config::default()
    };

    // Apply environment variable overrides (highest precedence)
    apply_env_overrides(&mut config);

    Ok(config)
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    // Detect format by extension
    let config: Config = if path.extension().map_or(false, |ext| ext == "json") {
        // Parse as JSON5 (more lenient than strict JSON)
        json5::from_str(&content).map_err(|e| Error::Config(format!("Invalid JSON config: {}", e)))?
    } else if path.extension().map_or(false, |ext| ext == "toml") {
        toml::from_str(&content).map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))?
    } else {
        // Try JSON5 first, then TOML
        json5::from_str(&content)
            .or_else(|_| toml::from_str(&content).map_err(|e| Error::Config(e.to_string())))
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?
    };

    Ok(config)
}

/// Apply environment variable overrides to an existing config.
///
/// Loads `.env` first, then overlays every set variable. Env vars have the
/// highest precedence: defaults < file < env.
pub fn apply_env_overrides(config: &mut Config) {
    // Load .env file if it exists
    dotenvy::dotenv().ok();

    apply_overrides_from(config, |key| std::env::var(key).ok());
}

/// Apply overrides from an arbitrary key lookup
pub fn apply_overrides_from<F>(config: &mut Config, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    use secrecy::SecretString;

    // Session
    if let Some(session_id) = lookup("SESSION_ID") {
        if !session_id.trim().is_empty() {
            config.session.session_id = Some(SecretString::from(session_id));
        }
    }
    if let Some(dir) = lookup("CHATLINK_SESSION_DIR") {
        config.session.dir = Some(std::path::PathBuf::from(dir));
    }
    if let Some(url) = lookup("SESSION_REMOTE_API_URL") {
        config.session.remote_api_url = url;
    }
    if let Some(url) = lookup("SESSION_PASTE_URL") {
        config.session.paste_base_url = url;
    }

    // Bot identity
    if let Some(name) = lookup("BOT_NAME") {
        config.bot.name = name;
    }
    if let Some(name) = lookup("OWNER_NAME") {
        config.bot.owner_name = name;
    }
    if let Some(number) = lookup("OWNER_NUMBER") {
        config.bot.owner_number = Some(number).filter(|n| !n.trim().is_empty());
    }
    if let Some(prefix) = lookup("PREFIX") {
        config.bot.prefix = prefix;
    }
    if let Some(mode) = lookup("MODE") {
        match mode.parse() {
            Ok(mode) => config.bot.mode = mode,
            Err(e) => tracing::warn!("Ignoring MODE override: {}", e),
        }
    }
    if let Some(tz) = lookup("TIME_ZONE") {
        config.bot.time_zone = tz;
    }

    // Announcement
    if let Some(ids) = lookup("CHANNEL_IDS") {
        config.announce.channel_ids = split_list(&ids);
    }
    if let Some(invites) = lookup("GROUP_INVITES") {
        config.announce.group_invites = split_list(&invites);
    }
    if let Some(v) = lookup("NOTIFY_OWNER") {
        config.announce.notify_owner = parse_flag(&v);
    }

    // Status loop
    if let Some(v) = lookup("AUTO_BIO") {
        config.status.enabled = parse_flag(&v);
    }
    if let Some(secs) = lookup("STATUS_INTERVAL_SECS") {
        if let Ok(v) = secs.parse() {
            config.status.interval = std::time::Duration::from_secs(v);
        }
    }

    // Automation
    if let Some(v) = lookup("AUTO_REACT") {
        config.automation.auto_react = parse_flag(&v);
    }
    if let Some(v) = lookup("AUTO_STATUS_SEEN") {
        config.automation.auto_status_seen = parse_flag(&v);
    }
    if let Some(v) = lookup("AUTO_STATUS_REACT") {
        config.automation.auto_status_react = parse_flag(&v);
    }
    if let Some(v) = lookup("AUTO_STATUS_REPLY") {
        config.automation.auto_status_reply = parse_flag(&v);
    }
    if let Some(text) = lookup("STATUS_READ_MSG") {
        config.automation.status_reply_text = text;
    }

    // Gateway + reconnect
    if let Some(addr) = lookup("GATEWAY_ADDR") {
        config.gateway.addr = addr;
    }
    if let Some(max) = lookup("RECONNECT_MAX_ATTEMPTS") {
        config.reconnect.max_attempts = match max.trim() {
            "0" | "none" | "unlimited" => None,
            other => other.parse().ok().or(config.reconnect.max_attempts),
        };
    }

    // Logging
    if let Some(level) = lookup("RUST_LOG") {
        config.log.level = level;
    }
    if let Some(format) = lookup("LOG_FORMAT") {
        config.log.format = format;
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Save configuration to a file
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    let content = if path.extension().map_or(false, |ext| ext == "toml") {
        toml::to_string_pretty(config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    } else {
        serde_json::to_string_pretty(config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, content)?;
    Ok(())
}
