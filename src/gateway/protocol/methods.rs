//! Sidecar request methods and their parameters

use serde::{Deserialize, Serialize};

use crate::gateway::event::{MessageKey, OutgoingMessage};
use crate::session::AuthState;

/// Method names
pub mod names {
    /// Open a gateway session with the given auth state
    pub const CONNECT: &str = "connect";
    /// Send a message
    pub const SEND_MESSAGE: &str = "message.send";
    /// Update the profile status text
    pub const UPDATE_STATUS: &str = "profile.status";
    /// Mark messages as read
    pub const READ_MESSAGES: &str = "messages.read";
    /// React to a message
    pub const REACT: &str = "message.react";
    /// Join a group by invite code
    pub const JOIN_GROUP: &str = "group.join";
    /// Follow a broadcast channel
    pub const FOLLOW_CHANNEL: &str = "channel.follow";
    /// Close the gateway session
    pub const CLOSE: &str = "close";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub auth: AuthState,
    pub client_name: String,
    pub client_version: String,
    #[serde(default)]
    pub interactive_pairing: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pairing_number: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageParams {
    pub recipient: String,
    pub content: OutgoingMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateStatusParams {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadMessagesParams {
    pub keys: Vec<MessageKey>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReactParams {
    pub key: MessageKey,
    pub emoji: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGroupParams {
    pub invite_code: String,
}

/// Result of a group join
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGroupResult {
    pub group_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowChannelParams {
    pub channel_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_params_carry_auth_as_base64() {
        let params = ConnectParams {
            auth: AuthState {
                creds: b"hello".to_vec(),
                keys: Default::default(),
            },
            client_name: "chatlink".to_string(),
            client_version: "0.1.0".to_string(),
            interactive_pairing: false,
            pairing_number: None,
        };

        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["auth"]["creds"], "aGVsbG8=");
        assert_eq!(json["clientName"], "chatlink");
        assert!(json.get("pairingNumber").is_none());
    }
}
