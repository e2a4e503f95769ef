//! Sidecar bridge - drives a gateway sidecar over TCP
//!
//! One TCP connection per gateway session. Requests carry a numeric id and
//! are matched to responses by a reader task, which also forwards pushed
//! events to the session's event channel. When the sidecar hangs up the event
//! channel closes and pending requests fail.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::event::{InboundEvent, MessageKey, OutgoingMessage};
use super::protocol::methods::{
    names, ConnectParams, FollowChannelParams, JoinGroupParams, JoinGroupResult,
    ReactParams, ReadMessagesParams, SendMessageParams, UpdateStatusParams,
};
use super::protocol::{GatewayFrame, RequestFrame, ResponseFrame};
use super::{ConnectOptions, Gateway, GatewayConnection, GatewaySession};
use crate::config::GatewayConfig;
use crate::error::{Error, Result};
use crate::session::AuthState;

type PendingMap = Mutex<HashMap<String, oneshot::Sender<ResponseFrame>>>;

/// Gateway backed by a sidecar process
pub struct BridgeGateway {
    config: GatewayConfig,
}

impl BridgeGateway {
    /// Create a bridge for the configured sidecar address
    pub fn new(config: GatewayConfig) -> Self {
        BridgeGateway { config }
    }
}

#[async_trait]
impl Gateway for BridgeGateway {
    async fn connect(&self, auth: AuthState, options: &ConnectOptions) -> Result<GatewaySession> {
        debug!("Connecting to gateway sidecar at {}", self.config.addr);

        let stream = TcpStream::connect(&self.config.addr).await.map_err(|e| {
            Error::Gateway(format!(
                "Failed to reach gateway sidecar at {}: {}",
                self.config.addr, e
            ))
        })?;
        stream.set_nodelay(true)?;
        let (reader, writer) = stream.into_split();

        let inner = Arc::new(BridgeInner {
            writer: Mutex::new(writer),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            request_timeout: self.config.request_timeout,
        });

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(read_loop(reader, inner.clone(), events_tx));
        let connection = BridgeConnection { inner, reader_task };

        let client_name = if options.client_name.is_empty() {
            self.config.client_name.clone()
        } else {
            options.client_name.clone()
        };
        let params = ConnectParams {
            auth,
            client_name,
            client_version: crate::VERSION.to_string(),
            interactive_pairing: options.interactive_pairing,
            pairing_number: options.pairing_number.clone(),
        };
        connection.inner.request(names::CONNECT, params).await?;

        Ok(GatewaySession {
            connection: Arc::new(connection),
            events: events_rx,
        })
    }
}

struct BridgeInner {
    writer: Mutex<OwnedWriteHalf>,
    pending: PendingMap,
    next_id: AtomicU64,
    /// Set by the reader once the sidecar stream is gone
    closed: AtomicBool,
    request_timeout: Duration,
}

impl BridgeInner {
    async fn send_frame(&self, frame: &GatewayFrame) -> Result<()> {
        let line = frame.encode_line()?;
        let mut writer = self.writer.lock().await;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::ConnectionClosed(format!("Failed to write to sidecar: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| {
                Error::ConnectionClosed(format!("Failed to flush sidecar stream: {}", e))
            })?;
        Ok(())
    }

    async fn request<P: Serialize>(&self, method: &str, params: P) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let params = serde_json::to_value(params)?;
        let frame = GatewayFrame::Request(RequestFrame::new(&id, method, params));

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);
        if self.closed.load(Ordering::SeqCst) {
            self.pending.lock().await.remove(&id);
            return Err(Error::ConnectionClosed(format!(
                "sidecar stream ended before {}",
                method
            )));
        }

        debug!("Sidecar request {} -> {}", id, method);
        if let Err(e) = self.send_frame(&frame).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response.into_result(),
            Ok(Err(_)) => Err(Error::ConnectionClosed(format!(
                "sidecar hung up before answering {}",
                method
            ))),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(Error::Timeout(format!(
                    "{} got no answer within {:?}",
                    method, self.request_timeout
                )))
            }
        }
    }
}

async fn read_loop(
    reader: OwnedReadHalf,
    inner: Arc<BridgeInner>,
    events: mpsc::UnboundedSender<InboundEvent>,
) {
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Sidecar closed the stream");
                break;
            }
            Err(e) => {
                warn!("Failed to read from sidecar: {}", e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let frame = match GatewayFrame::decode_line(&line) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("{}", e);
                continue;
            }
        };

        match frame {
            GatewayFrame::Response(response) => {
                match inner.pending.lock().await.remove(&response.id) {
                    Some(waiter) => {
                        let _ = waiter.send(response);
                    }
                    None => debug!("Dropping response for unknown request {}", response.id),
                }
            }
            GatewayFrame::Event(frame) => match InboundEvent::from_parts(&frame.event, frame.data) {
                Ok(event) => {
                    if events.send(event).is_err() {
                        debug!("Event receiver dropped, stopping sidecar reader");
                        break;
                    }
                }
                Err(e) => debug!("Ignoring sidecar event '{}': {}", frame.event, e),
            },
            GatewayFrame::Error(frame) => {
                let waiter = match frame.id {
                    Some(ref id) => inner.pending.lock().await.remove(id),
                    None => None,
                };
                match (waiter, frame.id) {
                    (Some(waiter), Some(id)) => {
                        let _ = waiter.send(ResponseFrame::error(id, frame.error));
                    }
                    _ => warn!("Sidecar error: {}", frame.error),
                }
            }
            GatewayFrame::Ping { id } => {
                if let Err(e) = inner.send_frame(&GatewayFrame::Pong { id }).await {
                    warn!("Failed to answer sidecar ping: {}", e);
                }
            }
            GatewayFrame::Pong { .. } | GatewayFrame::Request(_) => {}
        }
    }

    // Fail whatever is still waiting, and anything sent later
    inner.closed.store(true, Ordering::SeqCst);
    inner.pending.lock().await.clear();
}

/// One live sidecar session
pub struct BridgeConnection {
    inner: Arc<BridgeInner>,
    reader_task: JoinHandle<()>,
}

#[async_trait]
impl GatewayConnection for BridgeConnection {
    async fn send_message(&self, recipient: &str, message: OutgoingMessage) -> Result<()> {
        let params = SendMessageParams {
            recipient: recipient.to_string(),
            content: message,
        };
        self.inner.request(names::SEND_MESSAGE, params).await?;
        Ok(())
    }

    async fn update_profile_status(&self, text: &str) -> Result<()> {
        let params = UpdateStatusParams {
            text: text.to_string(),
        };
        self.inner.request(names::UPDATE_STATUS, params).await?;
        Ok(())
    }

    async fn read_messages(&self, keys: &[MessageKey]) -> Result<()> {
        let params = ReadMessagesParams {
            keys: keys.to_vec(),
        };
        self.inner.request(names::READ_MESSAGES, params).await?;
        Ok(())
    }

    async fn react(&self, key: &MessageKey, emoji: &str) -> Result<()> {
        let params = ReactParams {
            key: key.clone(),
            emoji: emoji.to_string(),
        };
        self.inner.request(names::REACT, params).await?;
        Ok(())
    }

    async fn join_group(&self, invite_code: &str) -> Result<String> {
        let params = JoinGroupParams {
            invite_code: invite_code.to_string(),
        };
        let result = self.inner.request(names::JOIN_GROUP, params).await?;
        let joined: JoinGroupResult = serde_json::from_value(result)?;
        Ok(joined.group_id)
    }

    async fn follow_channel(&self, channel_id: &str) -> Result<()> {
        let params = FollowChannelParams {
            channel_id: channel_id.to_string(),
        };
        self.inner.request(names::FOLLOW_CHANNEL, params).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let result = self.inner.request(names::CLOSE, Value::Null).await;
        let _ = self.inner.writer.lock().await.shutdown().await;
        result.map(|_| ())
    }
}

impl Drop for BridgeConnection {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::event::{ConnectionUpdate, DisconnectReason};
    use crate::gateway::protocol::{EventFrame, ProtocolError};
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    /// Serve one client; `reply` maps each request to frames to write back,
    /// or `None` to hang up.
    async fn spawn_sidecar<F>(reply: F) -> SocketAddr
    where
        F: Fn(RequestFrame) -> Option<Vec<GatewayFrame>> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();

            while let Ok(Some(line)) = lines.next_line().await {
                let frame = GatewayFrame::decode_line(&line).unwrap();
                let GatewayFrame::Request(request) = frame else {
                    continue;
                };
                let Some(frames) = reply(request) else {
                    return;
                };
                for frame in frames {
                    writer
                        .write_all(frame.encode_line().unwrap().as_bytes())
                        .await
                        .unwrap();
                }
            }
        });

        addr
    }

    fn bridge(addr: SocketAddr) -> BridgeGateway {
        BridgeGateway::new(GatewayConfig {
            addr: addr.to_string(),
            request_timeout: Duration::from_secs(5),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_connect_forwards_events_and_answers_requests() {
        let addr = spawn_sidecar(|request| {
            let id = request.id.clone();
            Some(match request.method.as_str() {
                names::CONNECT => {
                    assert_eq!(request.params["auth"]["creds"], "Y3JlZHM=");
                    vec![
                        GatewayFrame::Response(ResponseFrame::success(id, Value::Null)),
                        GatewayFrame::Event(EventFrame::new(
                            "connection.update",
                            serde_json::json!({
                                "connection": "open",
                                "userId": "1@s.whatsapp.net"
                            }),
                        )),
                    ]
                }
                names::JOIN_GROUP => vec![GatewayFrame::Response(ResponseFrame::success(
                    id,
                    serde_json::json!({ "groupId": "42@g.us" }),
                ))],
                _ => vec![GatewayFrame::Response(ResponseFrame::error(
                    id,
                    ProtocolError::new(-32601, format!("Unknown method {}", request.method)),
                ))],
            })
        })
        .await;

        let auth = AuthState {
            creds: b"creds".to_vec(),
            keys: Default::default(),
        };
        let mut session = bridge(addr)
            .connect(auth, &ConnectOptions::default())
            .await
            .unwrap();

        let event = session.events.recv().await.unwrap();
        assert_eq!(
            event,
            InboundEvent::ConnectionUpdate(ConnectionUpdate::Open {
                user_id: Some("1@s.whatsapp.net".to_string())
            })
        );

        let group = session.connection.join_group("AbC123").await.unwrap();
        assert_eq!(group, "42@g.us");

        let err = session.connection.follow_channel("x@newsletter").await.unwrap_err();
        assert!(matches!(err, Error::Gateway(_)));
    }

    #[tokio::test]
    async fn test_sidecar_hangup_ends_event_stream() {
        let addr = spawn_sidecar(|request| match request.method.as_str() {
            names::CONNECT => Some(vec![
                GatewayFrame::Response(ResponseFrame::success(request.id, Value::Null)),
                GatewayFrame::Event(EventFrame::new(
                    "connection.update",
                    serde_json::json!({ "connection": "close", "reason": 428 }),
                )),
            ]),
            _ => None,
        })
        .await;

        let mut session = bridge(addr)
            .connect(AuthState::default(), &ConnectOptions::default())
            .await
            .unwrap();

        match session.events.recv().await.unwrap() {
            InboundEvent::ConnectionUpdate(ConnectionUpdate::Close { reason, .. }) => {
                assert_eq!(reason, DisconnectReason::ConnectionClosed);
            }
            other => panic!("unexpected event: {:?}", other),
        }

        let err = session
            .connection
            .update_profile_status("hello")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed(_)), "{:?}", err);
        assert!(session.events.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_request_after_stream_end_fails_fast() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Answer the connect request, then hang up
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (reader, mut writer) = stream.into_split();
            let mut lines = BufReader::new(reader).lines();
            let line = lines.next_line().await.unwrap().unwrap();
            let GatewayFrame::Request(request) = GatewayFrame::decode_line(&line).unwrap() else {
                panic!("expected a request frame");
            };
            let reply = GatewayFrame::Response(ResponseFrame::success(request.id, Value::Null));
            writer
                .write_all(reply.encode_line().unwrap().as_bytes())
                .await
                .unwrap();
        });

        let gateway = BridgeGateway::new(GatewayConfig {
            addr: addr.to_string(),
            request_timeout: Duration::from_secs(30),
            ..Default::default()
        });
        let mut session = gateway
            .connect(AuthState::default(), &ConnectOptions::default())
            .await
            .unwrap();
        assert!(session.events.recv().await.is_none());

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            session.connection.update_profile_status("hello"),
        )
        .await
        .expect("request should not wait for the timeout");
        assert!(matches!(result, Err(Error::ConnectionClosed(_))), "{:?}", result);
    }

    #[tokio::test]
    async fn test_unreachable_sidecar_is_gateway_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = bridge(addr)
            .connect(AuthState::default(), &ConnectOptions::default())
            .await;
        assert!(matches!(result, Err(Error::Gateway(_))));
    }
}
