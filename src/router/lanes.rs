//! Per-tag delivery lanes
//!
//! Each tag gets its own queue and worker: events of one tag are handled in
//! arrival order, different tags make progress independently.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{EventRouter, HandlerContext, RoutedEvent};
use crate::gateway::event::EventTag;

type Delivery = (HandlerContext, Arc<RoutedEvent>);

/// Running lane workers of an [`EventRouter`]
pub struct RouterLanes {
    senders: HashMap<EventTag, mpsc::UnboundedSender<Delivery>>,
    workers: Vec<JoinHandle<()>>,
}

impl RouterLanes {
    pub(super) fn spawn(router: Arc<EventRouter>) -> Self {
        let mut senders = HashMap::new();
        let mut workers = Vec::new();

        for tag in router.tags() {
            let (tx, mut rx) = mpsc::unbounded_channel::<Delivery>();
            let lane_router = router.clone();

            workers.push(tokio::spawn(async move {
                while let Some((ctx, event)) = rx.recv().await {
                    let report = lane_router.dispatch(&ctx, &event).await;
                    debug!(
                        tag = %report.tag,
                        delivered = report.delivered,
                        failed = report.failed.len(),
                        "Event dispatched"
                    );
                }
            }));
            senders.insert(tag, tx);
        }

        RouterLanes { senders, workers }
    }

    /// Queue an event on its tag's lane. Returns false if nobody listens.
    pub fn deliver(&self, ctx: HandlerContext, event: RoutedEvent) -> bool {
        match self.senders.get(&event.tag()) {
            Some(tx) => tx.send((ctx, Arc::new(event))).is_ok(),
            None => false,
        }
    }

    /// Stop accepting events and wait for queued ones to drain
    pub async fn shutdown(self) {
        drop(self.senders);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::gateway::event::{CallOffer, GroupParticipantUpdate, ParticipantAction};
    use crate::gateway::testing::FakeConnection;
    use crate::router::EventHandler;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    struct Gate {
        release: Arc<Notify>,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventHandler for Gate {
        fn name(&self) -> &str {
            "gate"
        }

        async fn handle(&self, _ctx: &HandlerContext, event: &RoutedEvent) -> Result<()> {
            if let RoutedEvent::GroupParticipants(update) = event {
                self.release.notified().await;
                self.log.lock().unwrap().push(format!("group:{}", update.id));
            }
            Ok(())
        }
    }

    struct Recorder {
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn handle(&self, _ctx: &HandlerContext, event: &RoutedEvent) -> Result<()> {
            if let RoutedEvent::Calls(calls) = event {
                self.log.lock().unwrap().push(format!("call:{}", calls[0].id));
            }
            Ok(())
        }
    }

    fn call(id: &str) -> RoutedEvent {
        RoutedEvent::Calls(vec![CallOffer {
            id: id.to_string(),
            from: "1@s.whatsapp.net".to_string(),
            is_video: false,
            is_group: false,
            status: "offer".to_string(),
        }])
    }

    fn group(id: &str) -> RoutedEvent {
        RoutedEvent::GroupParticipants(GroupParticipantUpdate {
            id: id.to_string(),
            participants: vec!["2@s.whatsapp.net".to_string()],
            action: ParticipantAction::Add,
            author: None,
        })
    }

    #[tokio::test]
    async fn test_blocked_lane_does_not_stall_other_tags() {
        let release = Arc::new(Notify::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let mut router = EventRouter::new();
        router.subscribe(
            EventTag::GroupParticipantUpdate,
            Gate {
                release: release.clone(),
                log: log.clone(),
            },
        );
        router.subscribe(EventTag::CallEvent, Recorder { log: log.clone() });
        let lanes = router.into_lanes();

        let ctx = HandlerContext::new(Arc::new(FakeConnection::default()), None);
        assert!(lanes.deliver(ctx.clone(), group("g1")));
        assert!(lanes.deliver(ctx.clone(), call("c1")));
        assert!(lanes.deliver(ctx.clone(), call("c2")));

        // Calls are processed while the group lane waits
        for _ in 0..50 {
            if log.lock().unwrap().len() == 2 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(*log.lock().unwrap(), vec!["call:c1", "call:c2"]);

        release.notify_one();
        lanes.shutdown().await;
        assert_eq!(*log.lock().unwrap(), vec!["call:c1", "call:c2", "group:g1"]);
    }

    #[tokio::test]
    async fn test_deliver_without_lane() {
        let lanes = EventRouter::new().into_lanes();
        let ctx = HandlerContext::new(Arc::new(FakeConnection::default()), None);
        assert!(!lanes.deliver(ctx, call("c1")));
        lanes.shutdown().await;
    }
}
