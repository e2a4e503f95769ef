//! Built-in event handlers
//!
//! - [`AutoReact`]: react to direct messages with a random emoji
//! - [`StatusWatcher`]: read, react to and reply to status broadcasts
//! - [`ActivityLog`]: log calls, group membership changes and pairing codes
//!
//! Message handlers only look at actionable messages: with content, not sent
//! by the bot itself, and not protocol messages.

use async_trait::async_trait;
use rand::seq::IndexedRandom;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::{AutomationConfig, BotMode, Config};
use crate::error::Result;
use crate::gateway::event::{ConnectionUpdate, EventTag};
use crate::gateway::{normalize_jid, OutgoingMessage};
use crate::router::{EventHandler, EventRouter, HandlerContext, MessageView, RoutedEvent};

/// Who the bot acts for
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    mode: BotMode,
    owner: Option<String>,
}

impl AccessPolicy {
    pub fn new(mode: BotMode, owner_jid: Option<String>) -> Self {
        AccessPolicy {
            mode,
            owner: owner_jid.map(|jid| normalize_jid(&jid)),
        }
    }

    /// Public mode accepts everyone; private mode only the owner and the bot itself
    pub fn allows(&self, sender: &str, self_id: Option<&str>) -> bool {
        match self.mode {
            BotMode::Public => true,
            BotMode::Private => {
                let sender = normalize_jid(sender);
                self.owner.as_deref() == Some(sender.as_str())
                    || self_id.map(normalize_jid).as_deref() == Some(sender.as_str())
            }
        }
    }
}

fn actionable(event: &RoutedEvent) -> impl Iterator<Item = &MessageView> {
    let messages: &[MessageView] = match event {
        RoutedEvent::Messages { messages, .. } => messages,
        _ => &[],
    };
    messages.iter().filter(|m| m.is_actionable())
}

fn pick(emojis: &[String]) -> Option<&str> {
    emojis.choose(&mut rand::rng()).map(String::as_str)
}

/// Reacts to direct messages. Groups and status broadcasts are left alone.
pub struct AutoReact {
    emojis: Vec<String>,
    policy: AccessPolicy,
}

impl AutoReact {
    pub fn new(emojis: Vec<String>, policy: AccessPolicy) -> Self {
        AutoReact { emojis, policy }
    }
}

#[async_trait]
impl EventHandler for AutoReact {
    fn name(&self) -> &str {
        "auto-react"
    }

    async fn handle(&self, ctx: &HandlerContext, event: &RoutedEvent) -> Result<()> {
        for message in actionable(event).filter(|m| m.is_direct()) {
            if !self.policy.allows(&message.sender, ctx.self_id.as_deref()) {
                debug!("Not reacting to {}: not allowed in current mode", message.sender);
                continue;
            }
            let Some(emoji) = pick(&self.emojis) else {
                return Ok(());
            };
            ctx.connection.react(&message.key, emoji).await?;
        }
        Ok(())
    }
}

/// Acts on status broadcasts
pub struct StatusWatcher {
    mark_seen: bool,
    react: bool,
    reply: Option<String>,
    emojis: Vec<String>,
}

impl StatusWatcher {
    pub fn from_config(config: &AutomationConfig) -> Self {
        StatusWatcher {
            mark_seen: config.auto_status_seen,
            react: config.auto_status_react,
            reply: config
                .auto_status_reply
                .then(|| config.status_reply_text.clone()),
            emojis: config.react_emojis.clone(),
        }
    }

    /// Whether any status automation is on
    pub fn is_enabled(&self) -> bool {
        self.mark_seen || self.react || self.reply.is_some()
    }
}

#[async_trait]
impl EventHandler for StatusWatcher {
    fn name(&self) -> &str {
        "status-watcher"
    }

    async fn handle(&self, ctx: &HandlerContext, event: &RoutedEvent) -> Result<()> {
        for status in actionable(event).filter(|m| m.is_status) {
            if self.mark_seen {
                ctx.connection.read_messages(std::slice::from_ref(&status.key)).await?;
                debug!("Viewed status from {}", status.sender);
            }
            if self.react {
                if let Some(emoji) = pick(&self.emojis) {
                    ctx.connection.react(&status.key, emoji).await?;
                }
            }
            if let Some(ref text) = self.reply {
                let reply = OutgoingMessage::reply(text.clone(), status.key.clone());
                ctx.connection.send_message(&status.chat, reply).await?;
            }
        }
        Ok(())
    }
}

/// Logs calls, membership changes and pairing codes
pub struct ActivityLog;

#[async_trait]
impl EventHandler for ActivityLog {
    fn name(&self) -> &str {
        "activity-log"
    }

    async fn handle(&self, _ctx: &HandlerContext, event: &RoutedEvent) -> Result<()> {
        match event {
            RoutedEvent::Calls(calls) => {
                for call in calls {
                    info!(
                        "Call {} from {} ({}, {})",
                        call.status,
                        call.from,
                        if call.is_video { "video" } else { "voice" },
                        if call.is_group { "group" } else { "direct" }
                    );
                }
            }
            RoutedEvent::GroupParticipants(update) => {
                info!(
                    "Group {}: {} {}",
                    update.id,
                    update.action,
                    update.participants.join(", ")
                );
            }
            RoutedEvent::Connection(ConnectionUpdate::Pairing { code }) => {
                info!("Pairing code: {}", code);
            }
            _ => {}
        }
        Ok(())
    }
}

/// Subscribe the built-in handlers enabled in `config`
pub fn register_builtin(router: &mut EventRouter, config: &Config) {
    let activity: Arc<dyn EventHandler> = Arc::new(ActivityLog);
    router.subscribe_shared(EventTag::ConnectionUpdate, activity.clone());
    router.subscribe_shared(EventTag::CallEvent, activity.clone());
    router.subscribe_shared(EventTag::GroupParticipantUpdate, activity);

    if config.automation.auto_react {
        let policy = AccessPolicy::new(config.bot.mode, config.bot.owner_jid());
        router.subscribe(
            EventTag::MessageUpsert,
            AutoReact::new(config.automation.react_emojis.clone(), policy),
        );
    }

    let watcher = StatusWatcher::from_config(&config.automation);
    if watcher.is_enabled() {
        router.subscribe(EventTag::MessageUpsert, watcher);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::event::{InboundEvent, MessageUpsert, UpsertKind, STATUS_BROADCAST_JID};
    use crate::gateway::testing::{text_message, FakeConnection};
    use crate::gateway::WireMessage;

    fn batch(messages: Vec<WireMessage>) -> RoutedEvent {
        RoutedEvent::from(InboundEvent::MessageUpsert(MessageUpsert {
            kind: UpsertKind::Notify,
            messages,
        }))
    }

    fn ctx(connection: &Arc<FakeConnection>) -> HandlerContext {
        HandlerContext::new(connection.clone(), Some("100@s.whatsapp.net".to_string()))
    }

    const OWNER: &str = "254700000000@s.whatsapp.net";

    fn one_emoji() -> Vec<String> {
        vec!["🔥".to_string()]
    }

    #[test]
    fn test_access_policy() {
        let public = AccessPolicy::new(BotMode::Public, None);
        assert!(public.allows("555@s.whatsapp.net", None));

        let private = AccessPolicy::new(BotMode::Private, Some(OWNER.to_string()));
        assert!(private.allows("254700000000:4@s.whatsapp.net", None));
        assert!(private.allows("100@s.whatsapp.net", Some("100:2@s.whatsapp.net")));
        assert!(!private.allows("555@s.whatsapp.net", Some("100@s.whatsapp.net")));
    }

    #[tokio::test]
    async fn test_auto_react_only_direct_actionable() {
        let connection = Arc::new(FakeConnection::default());
        let handler = AutoReact::new(one_emoji(), AccessPolicy::new(BotMode::Public, None));

        let mut own = text_message("555@s.whatsapp.net", "own", "mine");
        own.key.from_me = true;
        let event = batch(vec![
            text_message("555@s.whatsapp.net", "dm", "hi"),
            text_message("777@g.us", "grp", "hi all"),
            text_message(STATUS_BROADCAST_JID, "st", "status"),
            own,
        ]);

        handler.handle(&ctx(&connection), &event).await.unwrap();
        assert_eq!(connection.calls(), vec!["react:dm:🔥".to_string()]);
    }

    #[tokio::test]
    async fn test_auto_react_private_mode() {
        let connection = Arc::new(FakeConnection::default());
        let policy = AccessPolicy::new(BotMode::Private, Some(OWNER.to_string()));
        let handler = AutoReact::new(one_emoji(), policy);

        let event = batch(vec![
            text_message("555@s.whatsapp.net", "stranger", "hi"),
            text_message("254700000000@s.whatsapp.net", "owner", "hi"),
        ]);

        handler.handle(&ctx(&connection), &event).await.unwrap();
        assert_eq!(connection.calls(), vec!["react:owner:🔥".to_string()]);
    }

    #[tokio::test]
    async fn test_status_watcher_reads_reacts_and_replies() {
        let connection = Arc::new(FakeConnection::default());
        let config = AutomationConfig {
            auto_status_seen: true,
            auto_status_react: true,
            auto_status_reply: true,
            status_reply_text: "seen".to_string(),
            react_emojis: one_emoji(),
            ..Default::default()
        };
        let watcher = StatusWatcher::from_config(&config);
        assert!(watcher.is_enabled());

        let mut status = text_message(STATUS_BROADCAST_JID, "st1", "my day");
        status.key.participant = Some("555@s.whatsapp.net".to_string());
        let event = batch(vec![status, text_message("555@s.whatsapp.net", "dm", "hi")]);

        watcher.handle(&ctx(&connection), &event).await.unwrap();
        assert_eq!(
            connection.calls(),
            vec![
                "read:st1".to_string(),
                "react:st1:🔥".to_string(),
                format!("send:{}:seen", STATUS_BROADCAST_JID),
            ]
        );
    }

    #[test]
    fn test_register_builtin_respects_flags() {
        let mut router = EventRouter::new();
        register_builtin(&mut router, &Config::default());
        assert_eq!(router.handler_count(EventTag::MessageUpsert), 0);
        assert_eq!(router.handler_count(EventTag::CallEvent), 1);

        let mut config = Config::default();
        config.automation.auto_react = true;
        config.automation.auto_status_seen = true;
        let mut router = EventRouter::new();
        register_builtin(&mut router, &config);
        assert_eq!(router.handler_count(EventTag::MessageUpsert), 2);
    }
}
