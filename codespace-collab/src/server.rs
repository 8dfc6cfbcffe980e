//! WebSocket coordinator with room-based routing.
//!
//! Architecture:
//! ```text
//! Client A ──┐                                 ┌──► Client B
//!            ├── Connection ── RoomRegistry ───┤
//! Client B ──┘   (one task        │            └──► Client C
//!                 per socket)     ▼
//!                           Room ── BroadcastGroup
//! ```
//!
//! Each accepted socket gets its own task running a [`Connection`]: inbound
//! frames are decoded and dispatched to the registry, and relays from the
//! connection's current room are forwarded back out. However the task ends
//! (close frame, socket error, send failure) the connection is removed from
//! its room before the task returns.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use uuid::Uuid;

use crate::broadcast::RelayReceiver;
use crate::config::{self, ConfigError, BIND_ADDR_VAR, BROADCAST_CAPACITY_VAR};
use crate::document::{DocumentState, Language, ParseError, Theme};
use crate::protocol::{ConnectionId, Message, MessageType, Participant};
use crate::registry::{RegistryError, RoomRegistry};
use crate::room::Room;

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: String,
    /// Relay buffer per room receiver
    pub broadcast_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9090".to_string(),
            broadcast_capacity: 256,
        }
    }
}

impl ServerConfig {
    /// Defaults overridden by `CODESPACE_BIND_ADDR` and
    /// `CODESPACE_BROADCAST_CAPACITY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(config::env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let bind_addr = config::parse_var(&lookup, BIND_ADDR_VAR, defaults.bind_addr)?;
        let broadcast_capacity =
            config::parse_var(&lookup, BROADCAST_CAPACITY_VAR, defaults.broadcast_capacity)?;
        if broadcast_capacity == 0 {
            return Err(ConfigError::Invalid {
                var: BROADCAST_CAPACITY_VAR,
                value: "0".to_string(),
                reason: "must be at least 1",
            });
        }
        Ok(Self {
            bind_addr,
            broadcast_capacity,
        })
    }
}

/// Server statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStats {
    pub total_connections: u64,
    pub active_connections: u64,
    pub total_messages: u64,
    pub total_bytes: u64,
    pub rejected_messages: u64,
    pub lagged_relays: u64,
    pub active_rooms: usize,
}

/// Why an inbound message was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error(transparent)]
    Malformed(#[from] ParseError),
    #[error(transparent)]
    Join(#[from] RegistryError),
    #[error("{} received outside a room", .0.event_name())]
    NotInRoom(MessageType),
    #[error("{} is server-to-client only", .0.event_name())]
    ServerOnly(MessageType),
}

/// What the relay side of a connection produced.
#[derive(Debug)]
pub enum RelayEvent {
    /// Encoded frame to forward to the socket.
    Frame(Arc<Vec<u8>>),
    /// The receiver fell behind and lost this many relays.
    Lagged(u64),
    /// The room's channel closed.
    Closed,
}

struct Membership {
    room: Arc<Room>,
    relays: RelayReceiver,
}

/// Server-side state of one transport connection, independent of the
/// socket itself.
pub struct Connection {
    id: ConnectionId,
    registry: Arc<RoomRegistry>,
    membership: Option<Membership>,
}

impl Connection {
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self::with_id(Uuid::new_v4(), registry)
    }

    pub fn with_id(id: ConnectionId, registry: Arc<RoomRegistry>) -> Self {
        Self {
            id,
            registry,
            membership: None,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn room_id(&self) -> Option<&str> {
        self.membership.as_ref().map(|m| m.room.id())
    }

    /// Dispatch one client message. Returns messages to send straight back
    /// to this client (the document snapshot after a join).
    pub async fn handle(&mut self, message: Message) -> Result<Vec<Message>, Rejection> {
        match message {
            Message::Join { room_id, username } => {
                let outcome = self
                    .registry
                    .join(&room_id, Participant::new(self.id, username))
                    .await?;
                if let Some(relays) = outcome.subscription {
                    self.membership = Some(Membership {
                        room: outcome.room,
                        relays,
                    });
                }
                Ok(snapshot(&outcome.document))
            }
            Message::RoomLeave => {
                match self.membership.take() {
                    Some(membership) => {
                        self.registry.leave(membership.room.id(), self.id).await;
                    }
                    None => log::debug!("ROOM-LEAVE from {} outside a room", self.id),
                }
                Ok(Vec::new())
            }
            Message::CodeChange(content) => {
                let room_id = self.current_room(MessageType::CodeChange)?;
                self.registry.apply_code_change(&room_id, self.id, content).await;
                Ok(Vec::new())
            }
            Message::LanguageChange(value) => {
                let room_id = self.current_room(MessageType::LanguageChange)?;
                let language = value.parse::<Language>()?;
                self.registry.apply_language_change(&room_id, self.id, language).await;
                Ok(Vec::new())
            }
            Message::ThemeChange(value) => {
                let room_id = self.current_room(MessageType::ThemeChange)?;
                let theme = value.parse::<Theme>()?;
                self.registry.apply_theme_change(&room_id, self.id, theme).await;
                Ok(Vec::new())
            }
            other => Err(Rejection::ServerOnly(other.message_type())),
        }
    }

    fn current_room(&self, kind: MessageType) -> Result<String, Rejection> {
        self.room_id()
            .map(str::to_string)
            .ok_or(Rejection::NotInRoom(kind))
    }

    /// Wait for the next relay addressed to this connection.
    ///
    /// Pends forever outside a room. Cancel safe.
    pub async fn next_relay(&mut self) -> RelayEvent {
        let id = self.id;
        let Some(membership) = self.membership.as_mut() else {
            return std::future::pending().await;
        };
        loop {
            match membership.relays.recv().await {
                Ok(relay) => {
                    if relay.is_for(id) {
                        return RelayEvent::Frame(relay.frame);
                    }
                }
                Err(RecvError::Lagged(n)) => {
                    membership.room.record_dropped(n);
                    return RelayEvent::Lagged(n);
                }
                Err(RecvError::Closed) => return RelayEvent::Closed,
            }
        }
    }

    /// Drop the relay subscription without touching the registry.
    fn detach(&mut self) {
        self.membership = None;
    }

    /// Teardown: leave whatever room this connection is in.
    pub async fn close(&mut self) {
        self.membership = None;
        self.registry.disconnect(self.id).await;
    }
}

/// Messages that bring a joiner's document up to date.
fn snapshot(document: &DocumentState) -> Vec<Message> {
    vec![
        Message::code(document.content.as_str()),
        Message::language(document.language),
        Message::theme(document.theme),
    ]
}

/// The coordinator.
pub struct CollabServer {
    config: ServerConfig,
    registry: Arc<RoomRegistry>,
    stats: Arc<RwLock<ServerStats>>,
}

impl CollabServer {
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(RoomRegistry::new(config.broadcast_capacity));
        Self {
            config,
            registry,
            stats: Arc::new(RwLock::new(ServerStats::default())),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Bind and accept connections until the listener fails.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        log::info!("Collab server listening on {}", self.config.bind_addr);

        loop {
            let (stream, addr) = listener.accept().await?;
            log::debug!("New TCP connection from {addr}");

            let registry = self.registry.clone();
            let stats = self.stats.clone();

            tokio::spawn(async move {
                if let Err(e) = Self::handle_connection(stream, addr, registry, stats).await {
                    log::error!("Connection error from {addr}: {e}");
                }
            });
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        addr: SocketAddr,
        registry: Arc<RoomRegistry>,
        stats: Arc<RwLock<ServerStats>>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let ws_stream = tokio_tungstenite::accept_async(stream).await?;

        {
            let mut s = stats.write().await;
            s.total_connections += 1;
            s.active_connections += 1;
        }

        let mut connection = Connection::new(registry);
        log::info!("WebSocket connection {} established from {addr}", connection.id());

        let result = Self::serve(ws_stream, addr, &mut connection, &stats).await;

        // Removal from the room is unconditional, whatever ended the loop.
        connection.close().await;
        stats.write().await.active_connections -= 1;
        result
    }

    async fn serve(
        ws_stream: WebSocketStream<TcpStream>,
        addr: SocketAddr,
        connection: &mut Connection,
        stats: &RwLock<ServerStats>,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let (mut ws_sender, mut ws_receiver) = ws_stream.split();

        loop {
            tokio::select! {
                msg = ws_receiver.next() => {
                    match msg {
                        Some(Ok(WsMessage::Binary(data))) => {
                            {
                                let mut s = stats.write().await;
                                s.total_messages += 1;
                                s.total_bytes += data.len() as u64;
                            }

                            let message = match Message::decode(&data) {
                                Ok(message) => message,
                                Err(e) => {
                                    log::warn!("Failed to decode message from {addr}: {e}");
                                    stats.write().await.rejected_messages += 1;
                                    continue;
                                }
                            };

                            match connection.handle(message).await {
                                Ok(replies) => {
                                    for reply in replies {
                                        ws_sender.send(WsMessage::Binary(reply.encode()?.into())).await?;
                                    }
                                }
                                Err(rejection @ Rejection::NotInRoom(_)) => {
                                    log::debug!("Connection {}: {rejection}", connection.id());
                                    stats.write().await.rejected_messages += 1;
                                }
                                Err(rejection) => {
                                    log::warn!("Rejected message from {addr}: {rejection}");
                                    stats.write().await.rejected_messages += 1;
                                }
                            }
                        }

                        Some(Ok(WsMessage::Close(_))) | None => {
                            log::info!("Connection closed from {addr}");
                            break;
                        }

                        Some(Ok(WsMessage::Ping(data))) => {
                            ws_sender.send(WsMessage::Pong(data)).await?;
                        }

                        Some(Err(e)) => {
                            log::error!("WebSocket error from {addr}: {e}");
                            break;
                        }

                        _ => {}
                    }
                }

                relay = connection.next_relay() => {
                    match relay {
                        RelayEvent::Frame(frame) => {
                            ws_sender.send(WsMessage::Binary(frame.to_vec().into())).await?;
                        }
                        RelayEvent::Lagged(n) => {
                            log::warn!("Connection {} lagged by {n} relays", connection.id());
                            stats.write().await.lagged_relays += n;
                        }
                        RelayEvent::Closed => {
                            log::debug!("Relay channel closed for {}", connection.id());
                            connection.detach();
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Get server statistics.
    pub async fn stats(&self) -> ServerStats {
        let mut stats = self.stats.read().await.clone();
        stats.active_rooms = self.registry.room_count().await;
        stats
    }

    pub fn bind_addr(&self) -> &str {
        &self.config.bind_addr
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }
}
