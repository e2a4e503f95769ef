//! Configuration paths
//!
//! Utilities for resolving configuration and state paths.

use std::path::PathBuf;

/// Get the configuration directory
pub fn config_dir() -> PathBuf {
    // Check for explicit override
    if let Ok(dir) = std::env::var("CHATLINK_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    // Use XDG config directory or fallback
    dirs::config_dir()
        .map(|d| d.join("chatlink"))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".config").join("chatlink"))
                .unwrap_or_else(|| PathBuf::from(".chatlink"))
        })
}

/// Get the main configuration file path
pub fn config_path() -> PathBuf {
    // Check for explicit override
    if let Ok(path) = std::env::var("CHATLINK_CONFIG") {
        return PathBuf::from(path);
    }

    config_dir().join("config.json")
}

/// Get the state directory (session material, logs)
pub fn state_dir() -> PathBuf {
    // Check for explicit override
    if let Ok(dir) = std::env::var("CHATLINK_STATE_DIR") {
        return PathBuf::from(dir);
    }

    // Use XDG data directory or fallback
    dirs::data_dir()
        .map(|d| d.join("chatlink"))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".local").join("share").join("chatlink"))
                .unwrap_or_else(|| PathBuf::from(".chatlink"))
        })
}

/// Get the session directory
pub fn session_dir() -> PathBuf {
    state_dir().join("session")
}
