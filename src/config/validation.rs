//! Configuration validation
//!
//! Validates configuration and reports issues.

use super::types::Config;
use crate::session::SessionStore;

/// Result of configuration validation
#[derive(Debug, Clone)]
pub struct ConfigValidationResult {
    /// Whether the config is valid
    pub valid: bool,
    /// Validation errors (critical)
    pub errors: Vec<ValidationIssue>,
    /// Validation warnings (non-critical)
    pub warnings: Vec<ValidationIssue>,
}

impl ConfigValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        ConfigValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error
    pub fn with_error(mut self, issue: ValidationIssue) -> Self {
        self.valid = false;
        self.errors.push(issue);
        self
    }

    /// Add a warning
    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }
}

/// A validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the config field
    pub path: String,
    /// Issue message
    pub message: String,
    /// Suggested fix
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Create a new issue
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({})", suggestion)?;
        }
        Ok(())
    }
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::valid();

    result = validate_bot_config(config, result);
    result = validate_session_config(config, result);
    result = validate_reconnect_config(config, result);
    result = validate_automation_config(config, result);

    result
}

fn validate_bot_config(
    config: &Config,
    mut result: ConfigValidationResult,
) -> ConfigValidationResult {
    if config.bot.tz().is_err() {
        result = result.with_error(
            ValidationIssue::new(
                "bot.time_zone",
                format!("Unknown time zone: {}", config.bot.time_zone),
            )
            .with_suggestion("Use an IANA name such as Africa/Nairobi or Europe/Berlin"),
        );
    }

    if config.bot.owner_jid().is_none() {
        let mut issue = ValidationIssue::new(
            "bot.owner_number",
            "No owner configured. Private mode will only accept the bot itself.",
        );
        if config.announce.notify_owner {
            issue = issue.with_suggestion("Set OWNER_NUMBER or disable announce.notify_owner");
        }
        result = result.with_warning(issue);
    }

    result
}

fn validate_session_config(
    config: &Config,
    mut result: ConfigValidationResult,
) -> ConfigValidationResult {
    let stored = SessionStore::new(config.session.resolve_dir()).exists();
    if config.session.session_id.is_none() && !stored {
        result = result.with_warning(
            ValidationIssue::new(
                "session.session_id",
                "No session credential and no stored session. Interactive pairing will be required.",
            )
            .with_suggestion("Set the SESSION_ID environment variable"),
        );
    }

    if config.gateway.addr.trim().is_empty() {
        result = result.with_error(
            ValidationIssue::new("gateway.addr", "Gateway address is empty")
                .with_suggestion("Set GATEWAY_ADDR to host:port of the gateway sidecar"),
        );
    }

    result
}

fn validate_reconnect_config(
    config: &Config,
    mut result: ConfigValidationResult,
) -> ConfigValidationResult {
    let reconnect = &config.reconnect;

    if reconnect.multiplier < 1.0 {
        result = result.with_error(
            ValidationIssue::new("reconnect.multiplier", "Multiplier must be at least 1.0"),
        );
    }

    if !(0.0..=1.0).contains(&reconnect.jitter) {
        result = result.with_error(
            ValidationIssue::new("reconnect.jitter", "Jitter must be between 0.0 and 1.0"),
        );
    }

    if reconnect.max_delay < reconnect.initial_delay {
        result = result.with_warning(
            ValidationIssue::new(
                "reconnect.max_delay",
                "Maximum delay is shorter than the initial delay",
            ),
        );
    }

    if reconnect.max_attempts.is_none() {
        result = result.with_warning(
            ValidationIssue::new("reconnect.max_attempts", "Reconnect attempts are unbounded"),
        );
    }

    result
}

fn validate_automation_config(
    config: &Config,
    mut result: ConfigValidationResult,
) -> ConfigValidationResult {
    if config.status.enabled && config.status.interval.is_zero() {
        result = result.with_error(
            ValidationIssue::new("status.interval", "Status interval must be greater than zero"),
        );
    }

    let reacts = config.automation.auto_react || config.automation.auto_status_react;
    if reacts && config.automation.react_emojis.is_empty() {
        result = result.with_warning(
            ValidationIssue::new(
                "automation.react_emojis",
                "Reactions are enabled but the emoji pool is empty",
            ),
        );
    }

    for invite in &config.announce.group_invites {
        if crate::announce::invite_code(invite).is_none() {
            result = result.with_warning(
                ValidationIssue::new(
                    "announce.group_invites",
                    format!("Not a valid group invite: {}", invite),
                ),
            );
        }
    }

    result
}
