//! Connection supervisor
//!
//! Owns the gateway connection and decides what happens when it closes:
//!
//! ```text
//! Connecting ──open──► Open ──close(recoverable)──► ClosedRecoverable ──backoff──► Connecting
//!                        │
//!                        └──close(logged out)──► ClosedTerminal ──purge──► Terminated
//! ```
//!
//! Events of the live connection are handled one at a time: credential
//! rotations are persisted before the next event is read, everything else is
//! queued on the router lanes.

mod policy;

pub use policy::ReconnectBackoff;

use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::announce::PostConnectSetup;
use crate::config::ReconnectConfig;
use crate::error::{Error, Result};
use crate::gateway::event::{ConnectionUpdate, DisconnectReason, InboundEvent};
use crate::gateway::{ConnectOptions, Gateway, GatewayConnection, GatewaySession};
use crate::router::{HandlerContext, RoutedEvent, RouterLanes};
use crate::session::SessionStore;
use crate::status::{ConnectionSource, StatusTask};

/// Lifecycle state of the supervised connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    ClosedRecoverable,
    ClosedTerminal,
    Terminated,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::ClosedRecoverable => "closed (recoverable)",
            ConnectionState::ClosedTerminal => "closed (terminal)",
            ConnectionState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// Observable supervisor state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorStatus {
    pub state: ConnectionState,
    /// Reconnect attempts since the last successful open
    pub attempt: u32,
    /// Successful opens since start
    pub opens: u32,
    pub last_close: Option<DisconnectReason>,
}

impl Default for SupervisorStatus {
    fn default() -> Self {
        SupervisorStatus {
            state: ConnectionState::Connecting,
            attempt: 0,
            opens: 0,
            last_close: None,
        }
    }
}

/// How the supervisor stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorOutcome {
    /// Credentials were revoked; the session has been deleted
    LoggedOut,
    /// Shutdown was requested
    Shutdown,
}

enum SessionEnd {
    Closed(DisconnectReason),
    LoggedOut,
    Shutdown,
}

/// Supervises one gateway connection at a time
pub struct ConnectionSupervisor {
    gateway: Arc<dyn Gateway>,
    store: SessionStore,
    lanes: RouterLanes,
    options: ConnectOptions,
    reconnect: ReconnectConfig,
    setup: Option<Arc<PostConnectSetup>>,
    status_task: Option<Arc<StatusTask>>,
    status_tx: watch::Sender<SupervisorStatus>,
    connection_tx: watch::Sender<Option<Arc<dyn GatewayConnection>>>,
    announced: bool,
    self_id: Option<String>,
}

impl ConnectionSupervisor {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        store: SessionStore,
        lanes: RouterLanes,
        options: ConnectOptions,
        reconnect: ReconnectConfig,
    ) -> Self {
        let (status_tx, _) = watch::channel(SupervisorStatus::default());
        let (connection_tx, _) = watch::channel(None);

        ConnectionSupervisor {
            gateway,
            store,
            lanes,
            options,
            reconnect,
            setup: None,
            status_task: None,
            status_tx,
            connection_tx,
            announced: false,
            self_id: None,
        }
    }

    /// Run this setup after the first open
    pub fn with_setup(mut self, setup: PostConnectSetup) -> Self {
        self.setup = Some(Arc::new(setup));
        self
    }

    /// Start this task on open
    pub fn with_status_task(mut self, task: Arc<StatusTask>) -> Self {
        self.status_task = Some(task);
        self
    }

    /// Watch the supervisor state
    pub fn subscribe_status(&self) -> watch::Receiver<SupervisorStatus> {
        self.status_tx.subscribe()
    }

    /// Watch the current connection
    pub fn connection_source(&self) -> ConnectionSource {
        self.connection_tx.subscribe()
    }

    /// Connect and stay connected until logout, shutdown or a fatal error
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<SupervisorOutcome> {
        let result = self.supervise(&shutdown).await;

        if let Some(ref task) = self.status_task {
            task.stop().await;
        }
        self.connection_tx.send_replace(None);
        self.set_state(ConnectionState::Terminated);
        self.lanes.shutdown().await;

        match result {
            Ok(outcome) => info!("Supervisor stopped: {:?}", outcome),
            Err(ref e) => error!("Supervisor failed: {}", e),
        }
        result
    }

    async fn supervise(&mut self, shutdown: &CancellationToken) -> Result<SupervisorOutcome> {
        let mut backoff = ReconnectBackoff::new(&self.reconnect);
        let mut ever_connected = false;

        loop {
            self.set_state(ConnectionState::Connecting);

            let attempt = tokio::select! {
                _ = shutdown.cancelled() => return Ok(SupervisorOutcome::Shutdown),
                attempt = self.connect() => attempt,
            };

            let reason = match attempt {
                Ok(session) => {
                    ever_connected = true;
                    self.connection_tx.send_replace(Some(session.connection.clone()));

                    let end = self.drive(session, &mut backoff, shutdown).await;
                    self.connection_tx.send_replace(None);

                    match end {
                        SessionEnd::Closed(reason) => reason.to_string(),
                        SessionEnd::LoggedOut => {
                            self.on_logged_out().await;
                            return Ok(SupervisorOutcome::LoggedOut);
                        }
                        SessionEnd::Shutdown => return Ok(SupervisorOutcome::Shutdown),
                    }
                }
                Err(e) if !ever_connected => {
                    error!("Failed to start gateway connection: {}", e);
                    return Err(Error::Startup(e.to_string()));
                }
                Err(e) => e.to_string(),
            };

            self.set_state(ConnectionState::ClosedRecoverable);
            let Some(delay) = backoff.next_delay() else {
                let attempts = backoff.attempts();
                error!("Giving up after {} reconnect attempts", attempts);
                return Err(Error::ReconnectExhausted(attempts));
            };

            let attempt = backoff.attempts();
            self.status_tx.send_modify(|s| s.attempt = attempt);
            warn!(
                "🔴 Connection closed ({}). Reconnecting in {:?} (attempt {}/{})",
                reason,
                delay,
                attempt,
                backoff
                    .max_attempts()
                    .map_or_else(|| "∞".to_string(), |m| m.to_string())
            );

            tokio::select! {
                _ = shutdown.cancelled() => return Ok(SupervisorOutcome::Shutdown),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn connect(&self) -> Result<GatewaySession> {
        let auth = self.store.load().await?;
        let options = ConnectOptions {
            interactive_pairing: !auth.has_credentials(),
            ..self.options.clone()
        };
        if options.interactive_pairing {
            info!("No stored credential, requesting a pairing code");
        } else {
            debug!(
                "Connecting with stored session ({} bytes of creds, {} keys)",
                auth.creds.len(),
                auth.keys.len()
            );
        }
        self.gateway.connect(auth, &options).await
    }

    async fn drive(
        &mut self,
        mut session: GatewaySession,
        backoff: &mut ReconnectBackoff,
        shutdown: &CancellationToken,
    ) -> SessionEnd {
        let connection = session.connection.clone();

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => {
                    if let Err(e) = connection.close().await {
                        debug!("Failed to close gateway connection: {}", e);
                    }
                    return SessionEnd::Shutdown;
                }
                event = session.events.recv() => event,
            };

            let Some(event) = event else {
                return SessionEnd::Closed(DisconnectReason::StreamEnded);
            };

            match event {
                InboundEvent::CredentialsUpdated(update) => {
                    if let Err(e) = self.store.on_credentials_updated(&update).await {
                        error!("Failed to persist rotated credentials: {}", e);
                    }
                    self.forward(&connection, RoutedEvent::CredentialsUpdated(update));
                }
                InboundEvent::ConnectionUpdate(update) => {
                    let end = self.on_connection_update(&update, &connection, backoff).await;
                    self.forward(&connection, RoutedEvent::Connection(update));
                    if let Some(end) = end {
                        return end;
                    }
                }
                other => self.forward(&connection, RoutedEvent::from(other)),
            }
        }
    }

    async fn on_connection_update(
        &mut self,
        update: &ConnectionUpdate,
        connection: &Arc<dyn GatewayConnection>,
        backoff: &mut ReconnectBackoff,
    ) -> Option<SessionEnd> {
        match update {
            ConnectionUpdate::Connecting => {
                debug!("Gateway handshake in progress");
                None
            }
            ConnectionUpdate::Pairing { .. } => {
                info!("Waiting for device pairing");
                None
            }
            ConnectionUpdate::Open { user_id } => {
                if user_id.is_some() {
                    self.self_id = user_id.clone();
                }
                backoff.reset();
                self.status_tx.send_modify(|s| {
                    s.state = ConnectionState::Open;
                    s.attempt = 0;
                    s.opens += 1;
                });

                if !self.announced {
                    self.announced = true;
                    info!("✔️ Connected to gateway");
                    if let Some(ref setup) = self.setup {
                        let setup = setup.clone();
                        let connection = connection.clone();
                        let self_id = self.self_id.clone();
                        tokio::spawn(async move {
                            setup.run(connection, self_id).await;
                        });
                    }
                } else {
                    info!("♻️ Connection reestablished");
                }

                if let Some(ref task) = self.status_task {
                    task.start_once(self.connection_tx.subscribe()).await;
                }
                None
            }
            ConnectionUpdate::Close { reason, detail } => {
                self.status_tx.send_modify(|s| s.last_close = Some(*reason));
                if let Some(detail) = detail {
                    debug!("Close detail: {}", detail);
                }
                if reason.is_terminal() {
                    Some(SessionEnd::LoggedOut)
                } else {
                    Some(SessionEnd::Closed(*reason))
                }
            }
        }
    }

    async fn on_logged_out(&mut self) {
        self.set_state(ConnectionState::ClosedTerminal);
        error!("🔴 Logged out. Generate a new session and update SESSION_ID.");

        if let Err(e) = self.store.purge().await {
            error!(
                "Failed to delete session directory {}: {}",
                self.store.dir().display(),
                e
            );
        }
        if let Some(ref task) = self.status_task {
            task.stop().await;
        }
    }

    fn forward(&self, connection: &Arc<dyn GatewayConnection>, event: RoutedEvent) {
        let ctx = HandlerContext::new(connection.clone(), self.self_id.clone());
        if !self.lanes.deliver(ctx, event) {
            debug!("No handler registered for event");
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.status_tx.send_if_modified(|s| {
            if s.state == state {
                return false;
            }
            debug!("Connection state: {} -> {}", s.state, state);
            s.state = state;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AnnounceConfig, BotConfig};
    use crate::gateway::event::{EventTag, MessageUpsert, UpsertKind};
    use crate::gateway::testing::{close, open, text_message, FakeConnection, FakeGateway, Script};
    use crate::router::{handler_fn, EventRouter};
    use crate::session::AuthUpdate;
    use crate::status::StatusComposer;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        _dir: TempDir,
        store: SessionStore,
        gateway: Arc<FakeGateway>,
        status_task: Arc<StatusTask>,
        shutdown: CancellationToken,
    }

    async fn harness(scripts: Vec<Script>) -> Harness {
        harness_with(scripts, Some(b"creds")).await
    }

    async fn harness_with(scripts: Vec<Script>, stored: Option<&[u8]>) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(dir.path().join("session"));
        if let Some(creds) = stored {
            store.persist(creds).await.unwrap();
        }

        let shutdown = CancellationToken::new();
        let status_task = Arc::new(StatusTask::new(
            StatusComposer::new("Chatlink", chrono_tz::Africa::Nairobi),
            Duration::from_secs(10),
            shutdown.clone(),
        ));

        Harness {
            _dir: dir,
            store,
            gateway: Arc::new(FakeGateway::new(scripts)),
            status_task,
            shutdown,
        }
    }

    fn reconnect(max_attempts: Option<u32>) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            multiplier: 2.0,
            jitter: 0.0,
            max_attempts,
        }
    }

    impl Harness {
        fn supervisor(
            &self,
            router: EventRouter,
            reconnect: ReconnectConfig,
        ) -> ConnectionSupervisor {
            ConnectionSupervisor::new(
                self.gateway.clone(),
                self.store.clone(),
                router.into_lanes(),
                ConnectOptions::default(),
                reconnect,
            )
            .with_setup(PostConnectSetup::new(BotConfig::default(), AnnounceConfig::default()))
            .with_status_task(self.status_task.clone())
        }
    }

    async fn eventually<F: Fn() -> bool>(check: F) {
        for _ in 0..500 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    fn greetings(connection: &FakeConnection) -> usize {
        connection.calls_starting_with("send:100@s.whatsapp.net:").len()
    }

    #[tokio::test]
    async fn test_logged_out_purges_session_and_stops() {
        let h = harness(vec![Script::held(vec![open(), close(DisconnectReason::LoggedOut)])]).await;
        let supervisor = h.supervisor(EventRouter::new(), reconnect(None));
        let status = supervisor.subscribe_status();

        let outcome = supervisor.run(h.shutdown.clone()).await.unwrap();

        assert_eq!(outcome, SupervisorOutcome::LoggedOut);
        assert!(!h.store.exists());
        assert!(!h.store.dir().exists());
        assert_eq!(h.gateway.connect_count(), 1);
        assert!(!h.status_task.is_running().await);
        assert_eq!(status.borrow().state, ConnectionState::Terminated);
        assert_eq!(status.borrow().last_close, Some(DisconnectReason::LoggedOut));
    }

    #[tokio::test]
    async fn test_recoverable_close_reconnects_once_without_deleting() {
        let h = harness(vec![
            Script::events(vec![open(), close(DisconnectReason::ConnectionLost)]),
            Script::held(vec![open()]),
        ])
        .await;
        let supervisor = h.supervisor(EventRouter::new(), reconnect(None));
        let mut status = supervisor.subscribe_status();
        let run = tokio::spawn(supervisor.run(h.shutdown.clone()));

        status.wait_for(|s| s.opens == 2).await.unwrap();
        assert_eq!(h.gateway.connect_count(), 2);
        assert!(h.store.exists());
        assert_eq!(status.borrow().last_close, Some(DisconnectReason::ConnectionLost));
        assert_eq!(status.borrow().attempt, 0);

        // Announced on the first open only
        let first = h.gateway.connection(0);
        let second = h.gateway.connection(1);
        eventually(|| greetings(&first) == 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(greetings(&second), 0);

        h.shutdown.cancel();
        assert_eq!(run.await.unwrap().unwrap(), SupervisorOutcome::Shutdown);
        assert!(h.store.exists());
    }

    #[tokio::test]
    async fn test_first_open_announces_and_starts_status_task() {
        let h = harness(vec![Script::held(vec![open()])]).await;
        let supervisor = h.supervisor(EventRouter::new(), reconnect(None));
        let mut status = supervisor.subscribe_status();

        assert!(!h.status_task.is_running().await);
        let run = tokio::spawn(supervisor.run(h.shutdown.clone()));
        status.wait_for(|s| s.state == ConnectionState::Open).await.unwrap();

        assert!(h.status_task.is_running().await);
        let connection = h.gateway.connection(0);
        eventually(|| greetings(&connection) == 1).await;
        eventually(|| !connection.calls_starting_with("status:").is_empty()).await;

        h.shutdown.cancel();
        run.await.unwrap().unwrap();
        assert!(!h.status_task.is_running().await);
        assert!(connection.calls().contains(&"close".to_string()));
    }

    #[tokio::test]
    async fn test_initial_connect_failure_is_startup_error() {
        let h = harness(vec![Script::Fail("sidecar down".to_string())]).await;
        let supervisor = h.supervisor(EventRouter::new(), reconnect(None));

        let err = supervisor.run(h.shutdown.clone()).await.unwrap_err();
        assert!(matches!(err, Error::Startup(ref m) if m.contains("sidecar down")));
        assert!(err.is_terminal());
        assert!(h.store.exists());
    }

    #[tokio::test]
    async fn test_reconnect_cap_is_fatal_and_keeps_session() {
        let h = harness(vec![
            Script::events(vec![open(), close(DisconnectReason::Unavailable)]),
            Script::Fail("refused".to_string()),
            Script::Fail("refused".to_string()),
        ])
        .await;
        let supervisor = h.supervisor(EventRouter::new(), reconnect(Some(2)));

        let err = supervisor.run(h.shutdown.clone()).await.unwrap_err();
        assert!(matches!(err, Error::ReconnectExhausted(2)));
        assert_eq!(h.gateway.connect_count(), 3);
        assert!(h.store.exists());
    }

    #[tokio::test]
    async fn test_stream_end_is_recoverable() {
        let h = harness(vec![Script::events(vec![open()]), Script::held(vec![open()])]).await;
        let supervisor = h.supervisor(EventRouter::new(), reconnect(None));
        let mut status = supervisor.subscribe_status();
        let run = tokio::spawn(supervisor.run(h.shutdown.clone()));

        status.wait_for(|s| s.opens == 2).await.unwrap();
        assert_eq!(status.borrow().last_close, None);
        assert_eq!(h.gateway.connect_count(), 2);

        h.shutdown.cancel();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_credentials_persisted_before_next_event() {
        let update = AuthUpdate {
            creds: Some(b"rotated".to_vec()),
            ..Default::default()
        };
        let h = harness(vec![Script::held(vec![
            InboundEvent::CredentialsUpdated(update),
            open(),
        ])])
        .await;
        let supervisor = h.supervisor(EventRouter::new(), reconnect(None));
        let mut status = supervisor.subscribe_status();
        let run = tokio::spawn(supervisor.run(h.shutdown.clone()));

        status.wait_for(|s| s.opens == 1).await.unwrap();
        assert_eq!(h.store.load_credentials().await.unwrap(), Some(b"rotated".to_vec()));
        assert_eq!(h.gateway.auth_seen.lock().unwrap()[0].creds, b"creds");

        h.shutdown.cancel();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_pairing_is_requested_only_without_stored_creds() {
        let paired = AuthUpdate {
            creds: Some(b"paired".to_vec()),
            ..Default::default()
        };
        let h = harness_with(
            vec![
                Script::events(vec![
                    InboundEvent::CredentialsUpdated(paired),
                    open(),
                    close(DisconnectReason::RestartRequired),
                ]),
                Script::held(vec![open()]),
            ],
            None,
        )
        .await;
        let supervisor = h.supervisor(EventRouter::new(), reconnect(None));
        let mut status = supervisor.subscribe_status();
        let run = tokio::spawn(supervisor.run(h.shutdown.clone()));

        status.wait_for(|s| s.opens == 2).await.unwrap();

        let options = h.gateway.options_seen.lock().unwrap().clone();
        let auth = h.gateway.auth_seen.lock().unwrap().clone();
        assert_eq!(options.len(), 2);
        assert!(options[0].interactive_pairing);
        assert!(auth[0].creds.is_empty());
        assert!(!options[1].interactive_pairing);
        assert_eq!(auth[1].creds, b"paired");

        h.shutdown.cancel();
        run.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_messages_reach_handlers() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut router = EventRouter::new();
        router.subscribe(
            EventTag::MessageUpsert,
            handler_fn("collect", move |ctx, event| {
                if let RoutedEvent::Messages { messages, .. } = event {
                    sink.lock()
                        .unwrap()
                        .push((ctx.self_id.clone(), messages[0].body.clone()));
                }
                Ok(())
            }),
        );

        let h = harness(vec![Script::held(vec![
            open(),
            InboundEvent::MessageUpsert(MessageUpsert {
                kind: UpsertKind::Notify,
                messages: vec![text_message("555@s.whatsapp.net", "m1", "ping")],
            }),
        ])])
        .await;
        let supervisor = h.supervisor(router, reconnect(None));
        let run = tokio::spawn(supervisor.run(h.shutdown.clone()));

        eventually(|| !seen.lock().unwrap().is_empty()).await;
        assert_eq!(
            seen.lock().unwrap()[0],
            (
                Some("100:3@s.whatsapp.net".to_string()),
                Some("ping".to_string())
            )
        );

        h.shutdown.cancel();
        run.await.unwrap().unwrap();
    }
}
