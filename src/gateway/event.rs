//! Inbound event model
//!
//! Events are emitted by the gateway and consumed by the supervisor and the
//! router. On the sidecar wire each one is an `event` frame whose name selects
//! the variant and whose `data` carries the payload.

use serde::{Deserialize, Serialize};

use crate::session::AuthUpdate;

/// Chat id of the status broadcast pseudo-chat
pub const STATUS_BROADCAST_JID: &str = "status@broadcast";

/// Suffix of group chat ids
pub const GROUP_JID_SUFFIX: &str = "@g.us";

/// Payload-free tag of an [`InboundEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventTag {
    ConnectionUpdate,
    MessageUpsert,
    CallEvent,
    GroupParticipantUpdate,
    CredentialsUpdated,
}

impl EventTag {
    /// Wire name of the tag
    pub fn as_str(&self) -> &'static str {
        match self {
            EventTag::ConnectionUpdate => "connection.update",
            EventTag::MessageUpsert => "messages.upsert",
            EventTag::CallEvent => "call",
            EventTag::GroupParticipantUpdate => "group-participants.update",
            EventTag::CredentialsUpdated => "creds.update",
        }
    }
}

impl std::fmt::Display for EventTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event pushed by the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum InboundEvent {
    #[serde(rename = "connection.update")]
    ConnectionUpdate(ConnectionUpdate),
    #[serde(rename = "messages.upsert")]
    MessageUpsert(MessageUpsert),
    #[serde(rename = "call")]
    CallEvent(Vec<CallOffer>),
    #[serde(rename = "group-participants.update")]
    GroupParticipantUpdate(GroupParticipantUpdate),
    #[serde(rename = "creds.update")]
    CredentialsUpdated(AuthUpdate),
}

impl InboundEvent {
    /// Tag of this event
    pub fn tag(&self) -> EventTag {
        match self {
            InboundEvent::ConnectionUpdate(_) => EventTag::ConnectionUpdate,
            InboundEvent::MessageUpsert(_) => EventTag::MessageUpsert,
            InboundEvent::CallEvent(_) => EventTag::CallEvent,
            InboundEvent::GroupParticipantUpdate(_) => EventTag::GroupParticipantUpdate,
            InboundEvent::CredentialsUpdated(_) => EventTag::CredentialsUpdated,
        }
    }

    /// Build an event from a frame's name and payload
    pub fn from_parts(event: &str, data: serde_json::Value) -> serde_json::Result<Self> {
        serde_json::from_value(serde_json::json!({ "event": event, "data": data }))
    }
}

/// Connection state transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "connection", rename_all = "camelCase")]
pub enum ConnectionUpdate {
    /// Handshake in progress
    Connecting,
    /// Connection established
    #[serde(rename_all = "camelCase")]
    Open {
        #[serde(default)]
        user_id: Option<String>,
    },
    /// Connection dropped
    Close {
        reason: DisconnectReason,
        #[serde(default)]
        detail: Option<String>,
    },
    /// Interactive pairing code to show the operator
    Pairing { code: String },
}

/// Why the gateway closed a connection.
///
/// Carried on the wire as the numeric status code; `0` stands for a stream
/// that ended without a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub enum DisconnectReason {
    /// Credentials revoked remotely
    LoggedOut,
    Forbidden,
    /// Connection lost or timed out
    ConnectionLost,
    MultideviceMismatch,
    ConnectionClosed,
    /// Another client took over the session
    ConnectionReplaced,
    BadSession,
    Unavailable,
    RestartRequired,
    /// Event stream ended without a close event
    StreamEnded,
    Other(u16),
}

impl DisconnectReason {
    /// Map a gateway status code
    pub fn from_status_code(code: u16) -> Self {
        match code {
            0 => DisconnectReason::StreamEnded,
            401 => DisconnectReason::LoggedOut,
            403 => DisconnectReason::Forbidden,
            408 => DisconnectReason::ConnectionLost,
            411 => DisconnectReason::MultideviceMismatch,
            428 => DisconnectReason::ConnectionClosed,
            440 => DisconnectReason::ConnectionReplaced,
            500 => DisconnectReason::BadSession,
            503 => DisconnectReason::Unavailable,
            515 => DisconnectReason::RestartRequired,
            other => DisconnectReason::Other(other),
        }
    }

    /// Numeric status code
    pub fn status_code(&self) -> u16 {
        match self {
            DisconnectReason::StreamEnded => 0,
            DisconnectReason::LoggedOut => 401,
            DisconnectReason::Forbidden => 403,
            DisconnectReason::ConnectionLost => 408,
            DisconnectReason::MultideviceMismatch => 411,
            DisconnectReason::ConnectionClosed => 428,
            DisconnectReason::ConnectionReplaced => 440,
            DisconnectReason::BadSession => 500,
            DisconnectReason::Unavailable => 503,
            DisconnectReason::RestartRequired => 515,
            DisconnectReason::Other(code) => *code,
        }
    }

    /// Only a logout is terminal; everything else is retried
    pub fn is_terminal(&self) -> bool {
        matches!(self, DisconnectReason::LoggedOut)
    }
}

impl From<u16> for DisconnectReason {
    fn from(code: u16) -> Self {
        DisconnectReason::from_status_code(code)
    }
}

impl From<DisconnectReason> for u16 {
    fn from(reason: DisconnectReason) -> Self {
        reason.status_code()
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DisconnectReason::LoggedOut => "logged out",
            DisconnectReason::Forbidden => "forbidden",
            DisconnectReason::ConnectionLost => "connection lost",
            DisconnectReason::MultideviceMismatch => "multi-device mismatch",
            DisconnectReason::ConnectionClosed => "connection closed",
            DisconnectReason::ConnectionReplaced => "connection replaced",
            DisconnectReason::BadSession => "bad session",
            DisconnectReason::Unavailable => "service unavailable",
            DisconnectReason::RestartRequired => "restart required",
            DisconnectReason::StreamEnded => "stream ended",
            DisconnectReason::Other(_) => "unknown",
        };
        write!(f, "{} ({})", name, self.status_code())
    }
}

/// Batch of new or appended messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageUpsert {
    #[serde(rename = "type", default)]
    pub kind: UpsertKind,
    pub messages: Vec<WireMessage>,
}

/// Whether messages are live or history sync
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertKind {
    #[default]
    Notify,
    Append,
    #[serde(other)]
    Other,
}

/// Message as delivered by the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMessage {
    pub key: MessageKey,
    #[serde(default)]
    pub message: Option<MessageContent>,
    #[serde(default)]
    pub push_name: Option<String>,
    #[serde(default)]
    pub message_timestamp: Option<i64>,
}

/// Addressing of one message
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageKey {
    pub remote_jid: String,
    pub id: String,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<String>,
}

/// Message body, possibly wrapped in envelopes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MessageContent {
    Conversation {
        text: String,
    },
    ExtendedText {
        text: String,
    },
    Image {
        #[serde(default)]
        caption: Option<String>,
    },
    Video {
        #[serde(default)]
        caption: Option<String>,
    },
    /// Disappearing-message envelope
    Ephemeral {
        message: Box<MessageContent>,
    },
    /// View-once envelope
    ViewOnce {
        message: Box<MessageContent>,
    },
    Reaction {
        text: String,
        key: MessageKey,
    },
    /// Revocations, ephemeral settings and similar
    Protocol {
        #[serde(default)]
        kind: Option<String>,
    },
    #[serde(other)]
    Unsupported,
}

/// Incoming call signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOffer {
    pub id: String,
    pub from: String,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default = "default_call_status")]
    pub status: String,
}

fn default_call_status() -> String {
    "offer".to_string()
}

/// Group membership change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupParticipantUpdate {
    /// Group id
    pub id: String,
    pub participants: Vec<String>,
    pub action: ParticipantAction,
    #[serde(default)]
    pub author: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantAction {
    Add,
    Remove,
    Promote,
    Demote,
    #[serde(other)]
    Other,
}

impl std::fmt::Display for ParticipantAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ParticipantAction::Add => "add",
            ParticipantAction::Remove => "remove",
            ParticipantAction::Promote => "promote",
            ParticipantAction::Demote => "demote",
            ParticipantAction::Other => "other",
        };
        f.write_str(s)
    }
}

/// Message content sent through the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutgoingMessage {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quoted: Option<MessageKey>,
    },
    Image {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
}

impl OutgoingMessage {
    /// Plain text message
    pub fn text(text: impl Into<String>) -> Self {
        OutgoingMessage::Text {
            text: text.into(),
            quoted: None,
        }
    }

    /// Text message quoting another message
    pub fn reply(text: impl Into<String>, quoted: MessageKey) -> Self {
        OutgoingMessage::Text {
            text: text.into(),
            quoted: Some(quoted),
        }
    }
}

/// Strip the device suffix from a user id: `123:7@s.whatsapp.net` → `123@s.whatsapp.net`
pub fn normalize_jid(jid: &str) -> String {
    match jid.split_once('@') {
        Some((user, server)) => {
            let user = user.split(':').next().unwrap_or(user);
            format!("{}@{}", user, server)
        }
        None => jid.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_close_from_wire() {
        let event = InboundEvent::from_parts(
            "connection.update",
            serde_json::json!({ "connection": "close", "reason": 401 }),
        )
        .unwrap();

        assert_eq!(event.tag(), EventTag::ConnectionUpdate);
        match event {
            InboundEvent::ConnectionUpdate(ConnectionUpdate::Close { reason, detail }) => {
                assert_eq!(reason, DisconnectReason::LoggedOut);
                assert!(reason.is_terminal());
                assert!(detail.is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_disconnect_reason_codes() {
        for code in [0u16, 401, 403, 408, 411, 428, 440, 500, 503, 515, 999] {
            assert_eq!(DisconnectReason::from_status_code(code).status_code(), code);
        }
        assert!(!DisconnectReason::ConnectionLost.is_terminal());
        assert!(!DisconnectReason::StreamEnded.is_terminal());
        assert_eq!(DisconnectReason::Other(999).to_string(), "unknown (999)");
    }

    #[test]
    fn test_message_upsert_from_wire() {
        let event = InboundEvent::from_parts(
            "messages.upsert",
            serde_json::json!({
                "type": "notify",
                "messages": [{
                    "key": { "remoteJid": "123@s.whatsapp.net", "id": "ABC", "fromMe": false },
                    "pushName": "Ann",
                    "message": {
                        "type": "ephemeral",
                        "message": { "type": "extendedText", "text": "hi" }
                    }
                }]
            }),
        )
        .unwrap();

        let InboundEvent::MessageUpsert(upsert) = event else {
            panic!("expected upsert");
        };
        assert_eq!(upsert.kind, UpsertKind::Notify);
        assert_eq!(upsert.messages[0].push_name.as_deref(), Some("Ann"));
        assert!(matches!(
            upsert.messages[0].message,
            Some(MessageContent::Ephemeral { .. })
        ));
    }

    #[test]
    fn test_unknown_content_is_unsupported() {
        let content: MessageContent =
            serde_json::from_value(serde_json::json!({ "type": "pollCreation" })).unwrap();
        assert_eq!(content, MessageContent::Unsupported);
    }

    #[test]
    fn test_unknown_event_name_rejected() {
        assert!(InboundEvent::from_parts("presence.update", serde_json::json!({})).is_err());
    }

    #[test]
    fn test_normalize_jid() {
        assert_eq!(normalize_jid("123:7@s.whatsapp.net"), "123@s.whatsapp.net");
        assert_eq!(normalize_jid("123@s.whatsapp.net"), "123@s.whatsapp.net");
        assert_eq!(normalize_jid("status@broadcast"), "status@broadcast");
        assert_eq!(normalize_jid("plain"), "plain");
    }
}
