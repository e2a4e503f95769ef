//! Gateway collaborator
//!
//! The messaging gateway is an external service. This module defines what the
//! rest of the crate needs from it and ships one implementation that talks to
//! a gateway sidecar process.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  newline JSON / TCP   ┌───────────────┐
//! │   chatlink   │ ◄───────────────────► │ gateway       │ ◄──► messaging
//! │ BridgeGateway│   request/response    │ sidecar       │      network
//! └──────────────┘   + pushed events     └───────────────┘
//! ```

pub mod bridge;
pub mod event;
pub mod protocol;

pub use bridge::BridgeGateway;
pub use event::{
    normalize_jid, CallOffer, ConnectionUpdate, DisconnectReason, EventTag,
    GroupParticipantUpdate, InboundEvent, MessageContent, MessageKey, MessageUpsert,
    OutgoingMessage, ParticipantAction, UpsertKind, WireMessage, GROUP_JID_SUFFIX,
    STATUS_BROADCAST_JID,
};
pub use protocol::GatewayFrame;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::Result;
use crate::session::AuthState;

/// Options for opening a gateway session
#[derive(Debug, Clone, Default)]
pub struct ConnectOptions {
    /// Client name announced to the gateway
    pub client_name: String,
    /// No stored credential: ask the gateway for a pairing code.
    /// Recomputed from the loaded session on every connect.
    pub interactive_pairing: bool,
    /// Phone number to pair with, if any
    pub pairing_number: Option<String>,
}

/// A freshly opened gateway session
pub struct GatewaySession {
    /// Operations against this session
    pub connection: Arc<dyn GatewayConnection>,
    /// Events emitted by this session; closed when the session ends
    pub events: mpsc::UnboundedReceiver<InboundEvent>,
}

/// Factory for gateway sessions
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Open a new session. Every call yields a brand-new connection.
    async fn connect(&self, auth: AuthState, options: &ConnectOptions) -> Result<GatewaySession>;
}

/// Operations on one live gateway session
#[async_trait]
pub trait GatewayConnection: Send + Sync {
    /// Send a message to a chat
    async fn send_message(&self, recipient: &str, message: OutgoingMessage) -> Result<()>;

    /// Replace the profile status text
    async fn update_profile_status(&self, text: &str) -> Result<()>;

    /// Mark messages as read
    async fn read_messages(&self, keys: &[MessageKey]) -> Result<()>;

    /// React to a message with an emoji
    async fn react(&self, key: &MessageKey, emoji: &str) -> Result<()>;

    /// Join a group by invite code, returning the group id
    async fn join_group(&self, invite_code: &str) -> Result<String>;

    /// Follow a broadcast channel
    async fn follow_channel(&self, channel_id: &str) -> Result<()>;

    /// Close the session
    async fn close(&self) -> Result<()>;

    /// Canonical form of a user id
    fn decode_identity(&self, jid: &str) -> String {
        normalize_jid(jid)
    }
}
