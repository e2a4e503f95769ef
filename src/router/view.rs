//! Normalized message view
//!
//! Computed once per message before fan-out so every handler sees the same
//! unwrapped content.

use crate::gateway::event::{
    normalize_jid, MessageContent, MessageKey, WireMessage, GROUP_JID_SUFFIX,
    STATUS_BROADCAST_JID,
};

/// Immutable, normalized view of one upserted message
#[derive(Debug, Clone, PartialEq)]
pub struct MessageView {
    pub key: MessageKey,
    /// Chat the message belongs to
    pub chat: String,
    /// Author (group participant, status poster, or the chat itself)
    pub sender: String,
    pub push_name: Option<String>,
    /// Content with ephemeral and view-once envelopes removed
    pub content: Option<MessageContent>,
    /// Text body or media caption
    pub body: Option<String>,
    pub from_me: bool,
    pub is_group: bool,
    pub is_status: bool,
    pub timestamp: Option<i64>,
}

impl MessageView {
    /// Normalize a wire message
    pub fn from_message(message: &WireMessage) -> Self {
        let chat = message.key.remote_jid.clone();
        let is_group = chat.ends_with(GROUP_JID_SUFFIX);
        let is_status = chat == STATUS_BROADCAST_JID;

        let sender = match message.key.participant {
            Some(ref participant) if is_group || is_status => normalize_jid(participant),
            _ => normalize_jid(&chat),
        };

        let content = message.message.as_ref().map(|c| unwrap_envelopes(c).clone());
        let body = content.as_ref().and_then(body_of);

        MessageView {
            key: message.key.clone(),
            chat,
            sender,
            push_name: message.push_name.clone(),
            content,
            body,
            from_me: message.key.from_me,
            is_group,
            is_status,
            timestamp: message.message_timestamp,
        }
    }

    /// Protocol-level message (revocation, settings change, ...)
    pub fn is_protocol(&self) -> bool {
        matches!(self.content, Some(MessageContent::Protocol { .. }))
    }

    /// Whether automation should look at this message at all
    pub fn is_actionable(&self) -> bool {
        self.content.is_some() && !self.from_me && !self.is_protocol()
    }

    /// Direct chat with a user
    pub fn is_direct(&self) -> bool {
        !self.is_group && !self.is_status
    }
}

/// Strip ephemeral and view-once envelopes, however deeply nested
pub fn unwrap_envelopes(content: &MessageContent) -> &MessageContent {
    let mut current = content;
    loop {
        match current {
            MessageContent::Ephemeral { message } | MessageContent::ViewOnce { message } => {
                current = &**message;
            }
            other => return other,
        }
    }
}

fn body_of(content: &MessageContent) -> Option<String> {
    match content {
        MessageContent::Conversation { text } | MessageContent::ExtendedText { text } => {
            Some(text.clone())
        }
        MessageContent::Image { caption } | MessageContent::Video { caption } => caption.clone(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::text_message;

    #[test]
    fn test_unwraps_nested_envelopes() {
        let mut message = text_message("123@s.whatsapp.net", "m1", "");
        message.message = Some(MessageContent::Ephemeral {
            message: Box::new(MessageContent::ViewOnce {
                message: Box::new(MessageContent::Image {
                    caption: Some("look".to_string()),
                }),
            }),
        });

        let view = MessageView::from_message(&message);
        assert_eq!(
            view.content,
            Some(MessageContent::Image {
                caption: Some("look".to_string())
            })
        );
        assert_eq!(view.body.as_deref(), Some("look"));
        assert!(view.is_direct());
        assert!(view.is_actionable());
    }

    #[test]
    fn test_group_sender_is_participant() {
        let mut message = text_message("555@g.us", "m2", "hi all");
        message.key.participant = Some("777:2@s.whatsapp.net".to_string());

        let view = MessageView::from_message(&message);
        assert!(view.is_group);
        assert!(!view.is_status);
        assert_eq!(view.sender, "777@s.whatsapp.net");
        assert_eq!(view.body.as_deref(), Some("hi all"));
    }

    #[test]
    fn test_status_broadcast_flags() {
        let mut message = text_message(STATUS_BROADCAST_JID, "s1", "my status");
        message.key.participant = Some("888@s.whatsapp.net".to_string());

        let view = MessageView::from_message(&message);
        assert!(view.is_status);
        assert!(!view.is_direct());
        assert_eq!(view.sender, "888@s.whatsapp.net");
    }

    #[test]
    fn test_not_actionable() {
        let mut own = text_message("123@s.whatsapp.net", "m3", "mine");
        own.key.from_me = true;
        assert!(!MessageView::from_message(&own).is_actionable());

        let mut empty = text_message("123@s.whatsapp.net", "m4", "");
        empty.message = None;
        assert!(!MessageView::from_message(&empty).is_actionable());

        let mut protocol = text_message("123@s.whatsapp.net", "m5", "");
        protocol.message = Some(MessageContent::Protocol {
            kind: Some("revoke".to_string()),
        });
        let view = MessageView::from_message(&protocol);
        assert!(view.is_protocol());
        assert!(!view.is_actionable());
    }
}
