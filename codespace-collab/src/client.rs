//! WebSocket client that drives a [`Session`] over the network.
//!
//! ```text
//!  UI ── edit_code / set_language / set_theme ──► Session.outbox ──► writer task ──► socket
//!  UI ◄── SessionEvent ◄── Session.handle_inbound ◄── reader task ◄── socket
//! ```
//!
//! The writer task owns the sink half of the socket and is fed through an
//! mpsc channel. The reader task owns the stream half and applies every
//! decoded frame to the shared session before surfacing the resulting event.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};

use crate::config::{self, ConfigError, SERVER_URL_VAR};
use crate::document::{Language, Theme};
use crate::protocol::{Message, Participant, ProtocolError};
use crate::session::{Clipboard, LocalState, Session, SessionError, SessionEvent, SessionState};

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Coordinator endpoint, `ws://` or `wss://`
    pub server_url: String,
    /// Capacity of the event channel handed to the UI
    pub event_buffer: usize,
    /// Capacity of the channel feeding the writer task
    pub outgoing_buffer: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://127.0.0.1:9090".to_string(),
            event_buffer: 256,
            outgoing_buffer: 256,
        }
    }
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            ..Self::default()
        }
    }

    /// Defaults overridden by `CODESPACE_SERVER_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(config::env_lookup)
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let server_url: String = config::parse_var(&lookup, SERVER_URL_VAR, defaults.server_url)?;
        if !(server_url.starts_with("ws://") || server_url.starts_with("wss://")) {
            return Err(ConfigError::Invalid {
                var: SERVER_URL_VAR,
                value: server_url,
                reason: "expected a ws:// or wss:// URL",
            });
        }
        Ok(Self {
            server_url,
            ..defaults
        })
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("not connected")]
    NotConnected,
}

/// One participant's connection to a room.
pub struct SessionClient {
    config: ClientConfig,
    session: Arc<Mutex<Session>>,
    /// Channel to the writer task, present while connected
    outgoing_tx: Option<mpsc::Sender<Vec<u8>>>,
    event_tx: mpsc::Sender<SessionEvent>,
    event_rx: Option<mpsc::Receiver<SessionEvent>>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

impl SessionClient {
    pub fn new(config: ClientConfig, room_id: impl Into<String>, username: impl Into<String>) -> Self {
        let (event_tx, event_rx) = mpsc::channel(config.event_buffer.max(1));
        Self {
            config,
            session: Arc::new(Mutex::new(Session::new(room_id, username))),
            outgoing_tx: None,
            event_tx,
            event_rx: Some(event_rx),
            writer: None,
            reader: None,
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_rx(&mut self) -> Option<mpsc::Receiver<SessionEvent>> {
        self.event_rx.take()
    }

    /// Connect, send JOIN, and start receiving room traffic.
    pub async fn join(&mut self) -> Result<(), ClientError> {
        self.session.lock().await.join()?;

        let ws_stream = match tokio_tungstenite::connect_async(self.config.server_url.as_str()).await {
            Ok((ws_stream, _)) => ws_stream,
            Err(e) => {
                let mut session = self.session.lock().await;
                session.disconnected();
                session.drain_outbox();
                return Err(e.into());
            }
        };
        log::info!("Connected to {}", self.config.server_url);

        let (mut ws_writer, mut ws_reader) = ws_stream.split();

        // Writer task: forward outgoing channel to WebSocket
        let (out_tx, mut out_rx) = mpsc::channel::<Vec<u8>>(self.config.outgoing_buffer.max(1));
        self.outgoing_tx = Some(out_tx);
        self.writer = Some(tokio::spawn(async move {
            while let Some(data) = out_rx.recv().await {
                if let Err(e) = ws_writer.send(WsMessage::Binary(data.into())).await {
                    log::warn!("Send failed: {e}");
                    return;
                }
            }
            // Channel closed by leave(): end the connection cleanly.
            let _ = ws_writer.close().await;
        }));

        self.flush().await?;
        self.session.lock().await.joined()?;

        // Reader task: apply server messages to the session
        let session = self.session.clone();
        let event_tx = self.event_tx.clone();
        self.reader = Some(tokio::spawn(async move {
            while let Some(frame) = ws_reader.next().await {
                match frame {
                    Ok(WsMessage::Binary(data)) => match Message::decode(&data) {
                        Ok(message) => {
                            let event = session.lock().await.handle_inbound(message);
                            if let Some(event) = event {
                                forward(&event_tx, event);
                            }
                        }
                        Err(e) => log::warn!("Dropping undecodable frame: {e}"),
                    },
                    Ok(WsMessage::Close(_)) => break,
                    Err(e) => {
                        log::warn!("Connection lost: {e}");
                        break;
                    }
                    _ => {}
                }
            }

            session.lock().await.disconnected();
            forward(&event_tx, SessionEvent::Disconnected);
        }));

        Ok(())
    }

    /// Send ROOM-LEAVE and close the connection.
    pub async fn leave(&mut self) -> Result<(), ClientError> {
        self.session.lock().await.leave()?;
        let flushed = self.flush().await;

        self.outgoing_tx = None;
        if let Some(writer) = self.writer.take() {
            let _ = writer.await;
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        log::info!("Left room");
        flushed
    }

    /// Replace the shared code. Returns whether an update was sent.
    pub async fn edit_code(&self, content: impl Into<String>) -> Result<bool, ClientError> {
        let queued = self.session.lock().await.edit_code(content);
        self.flush_if(queued).await
    }

    pub async fn set_language(&self, language: Language) -> Result<bool, ClientError> {
        let queued = self.session.lock().await.set_language(language);
        self.flush_if(queued).await
    }

    pub async fn set_theme(&self, theme: Theme) -> Result<bool, ClientError> {
        let queued = self.session.lock().await.set_theme(theme);
        self.flush_if(queued).await
    }

    async fn flush_if(&self, queued: bool) -> Result<bool, ClientError> {
        if queued {
            self.flush().await?;
        }
        Ok(queued)
    }

    /// Hand everything in the session outbox to the writer task.
    async fn flush(&self) -> Result<(), ClientError> {
        let pending = self.session.lock().await.drain_outbox();
        let tx = self.outgoing_tx.as_ref().ok_or(ClientError::NotConnected)?;
        for message in pending {
            tx.send(message.encode()?)
                .await
                .map_err(|_| ClientError::NotConnected)?;
        }
        Ok(())
    }

    pub async fn copy_room_id(&self, clipboard: &mut dyn Clipboard) -> &'static str {
        self.session.lock().await.copy_room_id(clipboard)
    }

    pub async fn copy_code(&self, clipboard: &mut dyn Clipboard) -> &'static str {
        self.session.lock().await.copy_code(clipboard)
    }

    pub async fn state(&self) -> SessionState {
        self.session.lock().await.state()
    }

    pub async fn local_state(&self) -> LocalState {
        self.session.lock().await.local().clone()
    }

    pub async fn users(&self) -> Vec<Participant> {
        self.session.lock().await.users().to_vec()
    }

    pub fn server_url(&self) -> &str {
        &self.config.server_url
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Surface an event without stalling the reader on a slow consumer. Local
/// state is already updated either way.
fn forward(event_tx: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    if let Err(mpsc::error::TrySendError::Full(event)) = event_tx.try_send(event) {
        log::warn!("Event channel full, dropping {event:?}");
    }
}
