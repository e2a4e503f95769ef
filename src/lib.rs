//! # Chatlink
//!
//! A long-running messaging gateway client: restores a session credential,
//! keeps the gateway connection alive across drops and dispatches inbound
//! events to pluggable handlers.
//!
//! ## Features
//!
//! - **Credential bootstrap:** remote encrypted blob, paste service or inline base64
//! - **Persistent sessions:** rotated auth state is written before the next event
//! - **Supervised reconnects:** bounded exponential backoff, terminal logout purges the session
//! - **Event routing:** per-tag handler lanes with failure isolation
//! - **Periodic status:** one cancellable loop refreshing the profile status

pub mod announce;
pub mod config;
pub mod credential;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod router;
pub mod session;
pub mod status;
pub mod supervisor;

pub use config::Config;
pub use error::{Error, Result};
pub use supervisor::{ConnectionSupervisor, SupervisorOutcome};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
