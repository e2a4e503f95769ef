//! Event router - fans gateway events out to registered handlers
//!
//! Handlers subscribe per [`EventTag`]. For one event, the handlers of its tag
//! run in registration order; a handler that fails or panics is logged and
//! skipped, and the rest still run. Message batches are normalized into
//! [`MessageView`]s once, before any handler sees them.

mod lanes;
mod view;

pub use lanes::RouterLanes;
pub use view::{unwrap_envelopes, MessageView};

use async_trait::async_trait;
use futures::FutureExt;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, warn};

use crate::error::Result;
use crate::gateway::event::{
    CallOffer, ConnectionUpdate, EventTag, GroupParticipantUpdate, InboundEvent, UpsertKind,
};
use crate::gateway::GatewayConnection;
use crate::session::AuthUpdate;

/// What a handler gets besides the event
#[derive(Clone)]
pub struct HandlerContext {
    /// Connection the event arrived on
    pub connection: Arc<dyn GatewayConnection>,
    /// The bot's own user id, once known
    pub self_id: Option<String>,
}

impl HandlerContext {
    pub fn new(connection: Arc<dyn GatewayConnection>, self_id: Option<String>) -> Self {
        HandlerContext {
            connection,
            self_id,
        }
    }
}

/// Event as presented to handlers
#[derive(Debug, Clone, PartialEq)]
pub enum RoutedEvent {
    Connection(ConnectionUpdate),
    Messages {
        kind: UpsertKind,
        messages: Vec<MessageView>,
    },
    Calls(Vec<CallOffer>),
    GroupParticipants(GroupParticipantUpdate),
    CredentialsUpdated(AuthUpdate),
}

impl RoutedEvent {
    /// Tag of the underlying event
    pub fn tag(&self) -> EventTag {
        match self {
            RoutedEvent::Connection(_) => EventTag::ConnectionUpdate,
            RoutedEvent::Messages { .. } => EventTag::MessageUpsert,
            RoutedEvent::Calls(_) => EventTag::CallEvent,
            RoutedEvent::GroupParticipants(_) => EventTag::GroupParticipantUpdate,
            RoutedEvent::CredentialsUpdated(_) => EventTag::CredentialsUpdated,
        }
    }
}

impl From<InboundEvent> for RoutedEvent {
    fn from(event: InboundEvent) -> Self {
        match event {
            InboundEvent::ConnectionUpdate(update) => RoutedEvent::Connection(update),
            InboundEvent::MessageUpsert(upsert) => RoutedEvent::Messages {
                kind: upsert.kind,
                messages: upsert.messages.iter().map(MessageView::from_message).collect(),
            },
            InboundEvent::CallEvent(calls) => RoutedEvent::Calls(calls),
            InboundEvent::GroupParticipantUpdate(update) => RoutedEvent::GroupParticipants(update),
            InboundEvent::CredentialsUpdated(update) => RoutedEvent::CredentialsUpdated(update),
        }
    }
}

/// Subscriber to routed events
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs and failure reports
    fn name(&self) -> &str;

    /// Handle one event
    async fn handle(&self, ctx: &HandlerContext, event: &RoutedEvent) -> Result<()>;
}

/// Handler built from a synchronous closure
pub struct FnHandler<F> {
    name: String,
    f: F,
}

/// Wrap a closure as an [`EventHandler`]
pub fn handler_fn<F>(name: impl Into<String>, f: F) -> FnHandler<F>
where
    F: Fn(&HandlerContext, &RoutedEvent) -> Result<()> + Send + Sync,
{
    FnHandler {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&HandlerContext, &RoutedEvent) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, ctx: &HandlerContext, event: &RoutedEvent) -> Result<()> {
        (self.f)(ctx, event)
    }
}

/// A handler that did not complete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerFailure {
    pub handler: String,
    pub message: String,
    pub panicked: bool,
}

/// Outcome of dispatching one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub tag: EventTag,
    pub delivered: usize,
    pub failed: Vec<HandlerFailure>,
}

/// Registry of handlers keyed by event tag
#[derive(Default)]
pub struct EventRouter {
    handlers: BTreeMap<EventTag, Vec<Arc<dyn EventHandler>>>,
}

impl EventRouter {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a tag
    pub fn subscribe<H: EventHandler + 'static>(&mut self, tag: EventTag, handler: H) {
        self.subscribe_shared(tag, Arc::new(handler));
    }

    /// Register a shared handler for a tag
    pub fn subscribe_shared(&mut self, tag: EventTag, handler: Arc<dyn EventHandler>) {
        self.handlers.entry(tag).or_default().push(handler);
    }

    /// Number of handlers for a tag
    pub fn handler_count(&self, tag: EventTag) -> usize {
        self.handlers.get(&tag).map_or(0, Vec::len)
    }

    /// Tags that have at least one handler
    pub fn tags(&self) -> Vec<EventTag> {
        self.handlers
            .iter()
            .filter(|(_, handlers)| !handlers.is_empty())
            .map(|(tag, _)| *tag)
            .collect()
    }

    /// Run every handler of the event's tag, in registration order
    pub async fn dispatch(&self, ctx: &HandlerContext, event: &RoutedEvent) -> DispatchReport {
        let tag = event.tag();
        let mut report = DispatchReport {
            tag,
            delivered: 0,
            failed: Vec::new(),
        };

        let Some(handlers) = self.handlers.get(&tag) else {
            return report;
        };

        for handler in handlers {
            let outcome = AssertUnwindSafe(handler.handle(ctx, event))
                .catch_unwind()
                .await;

            match outcome {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(e)) => {
                    warn!(handler = handler.name(), tag = %tag, "Handler failed: {}", e);
                    report.failed.push(HandlerFailure {
                        handler: handler.name().to_string(),
                        message: e.to_string(),
                        panicked: false,
                    });
                }
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(handler = handler.name(), tag = %tag, "Handler panicked: {}", message);
                    report.failed.push(HandlerFailure {
                        handler: handler.name().to_string(),
                        message,
                        panicked: true,
                    });
                }
            }
        }

        report
    }

    /// Spawn one worker per tag
    pub fn into_lanes(self) -> RouterLanes {
        RouterLanes::spawn(Arc::new(self))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
