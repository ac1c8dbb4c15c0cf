//! Gateway accept loop and per-connection workers.
//!
//! One logical worker per connection: parallel across connections,
//! single-threaded within one, consuming inbound frames strictly in arrival
//! order. Downstream pipeline calls suspend the owning worker only.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use tutora_core::protocol::{InboundEvent, OutboundEvent};

use crate::connection::{ConnectionHandle, ConnectionRegistry};
use crate::outbound::ResponseMultiplexer;
use crate::router::MessageRouter;
use crate::session::SessionRegistry;

type WsSink = SplitSink<WebSocketStream<TcpStream>, Message>;
type WsSource = SplitStream<WebSocketStream<TcpStream>>;

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Bind address (e.g., "127.0.0.1:17600")
    pub bind: String,
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Heartbeat interval in seconds
    pub heartbeat_interval_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:17600".to_string(),
            max_connections: 1000,
            heartbeat_interval_secs: 30,
        }
    }
}

/// The WebSocket server fronting the orchestration core.
///
/// All collaborators are injected at construction; there is no ambient
/// global state.
pub struct TutorGateway {
    config: GatewayConfig,
    connections: Arc<ConnectionRegistry>,
    sessions: Arc<SessionRegistry>,
    router: Arc<MessageRouter>,
    multiplexer: ResponseMultiplexer,
}

impl TutorGateway {
    pub fn new(
        config: GatewayConfig,
        connections: Arc<ConnectionRegistry>,
        sessions: Arc<SessionRegistry>,
        router: Arc<MessageRouter>,
    ) -> Self {
        let multiplexer = ResponseMultiplexer::new(Arc::clone(&connections));
        Self {
            config,
            connections,
            sessions,
            router,
            multiplexer,
        }
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Run the accept loop
    pub async fn run(self: Arc<Self>) -> Result<(), GatewayError> {
        let addr: SocketAddr = self.config.bind.parse()?;
        let listener = TcpListener::bind(&addr).await?;

        info!("gateway listening on ws://{}", addr);

        loop {
            let (stream, peer_addr) = listener.accept().await?;
            debug!("new connection from {}", peer_addr);

            if self.connections.count() >= self.config.max_connections {
                warn!("connection limit reached, rejecting {}", peer_addr);
                let gateway = Arc::clone(&self);
                tokio::spawn(async move {
                    let _ = gateway.reject_connection(stream, "server at capacity").await;
                });
                continue;
            }

            let gateway = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = gateway.handle_connection(stream, peer_addr).await {
                    error!("connection error for {}: {}", peer_addr, e);
                }
            });
        }
    }

    /// Reject a connection with an error event and close
    async fn reject_connection(
        &self,
        stream: TcpStream,
        reason: &str,
    ) -> Result<(), GatewayError> {
        let ws_stream = accept_async(stream).await?;
        let (mut sender, _) = ws_stream.split();
        let event = OutboundEvent::Error {
            code: "CAPACITY_EXCEEDED".to_string(),
            message: reason.to_string(),
        };
        sender.send(Message::Text(serde_json::to_string(&event)?)).await?;
        sender.close().await?;
        Ok(())
    }

    /// Handle one WebSocket connection end to end
    async fn handle_connection(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
    ) -> Result<(), GatewayError> {
        let ws_stream = accept_async(stream).await?;
        let (mut sender, mut receiver) = ws_stream.split();
        let connection_id = Uuid::new_v4().to_string();

        // Handshake: the first meaningful frame must identify the user
        let user_id = match self.await_connect(&mut sender, &mut receiver).await? {
            Some(user_id) => user_id,
            None => {
                debug!("{} closed before identifying", addr);
                return Ok(());
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel::<OutboundEvent>();
        let handle = ConnectionHandle::new(connection_id.clone(), user_id.clone(), tx);
        self.connections.register(handle.clone());

        // Sessions span connections: reuse the active one when present
        let session_id = self.sessions.open_for(&user_id);
        let _ = handle.send(OutboundEvent::Connected {
            session_id: session_id.clone(),
        });
        info!(%user_id, %connection_id, %session_id, "connection attached");

        let mut heartbeat =
            tokio::time::interval(Duration::from_secs(self.config.heartbeat_interval_secs));
        heartbeat.tick().await; // first tick fires immediately

        loop {
            tokio::select! {
                // Outbound delivery, FIFO per connection
                Some(event) = rx.recv() => {
                    match serde_json::to_string(&event) {
                        Ok(json) => {
                            if let Err(e) = sender.send(Message::Text(json)).await {
                                error!("failed to send to {}: {}", addr, e);
                                break;
                            }
                        }
                        Err(e) => error!("failed to serialize event: {}", e),
                    }
                }

                _ = heartbeat.tick() => {
                    if sender.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }

                // Superseded by a newer connection for the same user
                _ = handle.closed() => {
                    debug!(%user_id, %connection_id, "superseded, closing socket");
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }

                // Inbound frames, strictly in arrival order
                frame = receiver.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            handle.touch();
                            match InboundEvent::parse(&text) {
                                Ok(event) => {
                                    let events = self
                                        .router
                                        .route(&user_id, &session_id, event)
                                        .await;
                                    self.multiplexer.deliver_all(&handle, events);
                                }
                                Err(e) => {
                                    warn!("invalid frame from {}: {}", addr, e);
                                    let _ = handle.send(OutboundEvent::error(&e));
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if sender.send(Message::Pong(data)).await.is_err() {
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("connection {} closed", addr);
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            error!("websocket error on {}: {}", addr, e);
                            break;
                        }
                    }
                }
            }
        }

        // Only the authoritative connection finalizes the session; a
        // superseded worker must leave its successor's state alone.
        if self.connections.unregister(&user_id, &connection_id) {
            match self.sessions.end(&session_id, None) {
                Ok(summary) => {
                    debug!(%session_id, turns = summary.turn_count, "session finalized on disconnect")
                }
                Err(e) => debug!(%session_id, "session not finalized: {e}"),
            }
        }
        info!("connection {} disconnected", addr);

        Ok(())
    }

    /// Wait for the `connect` handshake frame. Other frames before it are
    /// answered with an error; returns `None` if the peer goes away first.
    async fn await_connect(
        &self,
        sender: &mut WsSink,
        receiver: &mut WsSource,
    ) -> Result<Option<String>, GatewayError> {
        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => match InboundEvent::parse(&text) {
                    Ok(InboundEvent::Connect { user_id }) => return Ok(Some(user_id)),
                    Ok(_) | Err(_) => {
                        let event = OutboundEvent::Error {
                            code: "NOT_CONNECTED".to_string(),
                            message: "send connect first".to_string(),
                        };
                        sender
                            .send(Message::Text(serde_json::to_string(&event)?))
                            .await?;
                    }
                },
                Ok(Message::Ping(data)) => {
                    sender.send(Message::Pong(data)).await?;
                }
                Ok(Message::Close(_)) => return Ok(None),
                Ok(_) => {}
                Err(e) => {
                    debug!("handshake error: {}", e);
                    return Ok(None);
                }
            }
        }
        Ok(None)
    }
}

/// Gateway-related errors
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
}
