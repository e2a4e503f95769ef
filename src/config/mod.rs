//! Configuration module - Modular configuration management
//!
//! - types/mod.rs: Core configuration types (Config, BotConfig, LogConfig)
//! - types/session.rs: Credential source and reconnect policy
//! - types/gateway.rs: Gateway sidecar connection
//! - types/automation.rs: Announcement, status loop, and message automation
//! - io.rs: Configuration loading and saving
//! - validation.rs: Configuration validation
//! - paths.rs: Configuration and state paths

mod io;
mod paths;
mod types;
mod validation;

// Re-export core config types
pub use types::{BotConfig, BotMode, Config, LogConfig};

pub use types::automation::{AnnounceConfig, AutomationConfig, StatusConfig};
pub use types::gateway::GatewayConfig;
pub use types::session::{ReconnectConfig, SessionConfig};

// Re-export IO and utilities
pub use io::{
    apply_env_overrides, apply_overrides_from, load_config, load_config_from_path, save_config,
};
pub use paths::{config_dir, config_path, session_dir, state_dir};
pub use validation::{validate_config, ConfigValidationResult, ValidationIssue};
