//! Wire protocol for room synchronization.
//!
//! Every WebSocket binary frame carries exactly one bincode-encoded
//! [`Message`]:
//! ```text
//! ┌────────────┬───────────────────────────────┐
//! │ variant    │ payload                       │
//! │ varint     │ variable (strings are length- │
//! │            │ prefixed)                     │
//! └────────────┴───────────────────────────────┘
//! ```
//!
//! Language and theme are carried as their wire strings rather than as
//! enums so that a peer sending an unknown value produces a decodable
//! message the receiver can reject explicitly.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::document::{Language, Theme};
use crate::presence::Notification;

/// Server-assigned identity of one transport connection.
pub type ConnectionId = Uuid;

/// Message kinds, named as they appear in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// client → server: admit participant
    Join,
    /// client → server: voluntary departure
    RoomLeave,
    /// both directions: document content
    CodeChange,
    /// both directions: document language
    LanguageChange,
    /// both directions: editor theme
    ThemeChange,
    /// server → client: full membership snapshot
    RoomDataChange,
    /// server → client: presence notification
    ToastNotification,
}

impl MessageType {
    pub fn event_name(&self) -> &'static str {
        match self {
            MessageType::Join => "JOIN",
            MessageType::RoomLeave => "ROOM-LEAVE",
            MessageType::CodeChange => "CODE-CHANGE",
            MessageType::LanguageChange => "LANGUAGE-CHANGE",
            MessageType::ThemeChange => "THEME-CHANGE",
            MessageType::RoomDataChange => "ROOM-DATA-CHANGE",
            MessageType::ToastNotification => "TOAST-NOTIFICATION",
        }
    }

    /// Whether clients may send this kind.
    pub fn client_may_send(&self) -> bool {
        !matches!(self, MessageType::RoomDataChange | MessageType::ToastNotification)
    }
}

/// One member of a room as reported in membership snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Participant {
    pub connection_id: ConnectionId,
    pub username: String,
}

impl Participant {
    pub fn new(connection_id: ConnectionId, username: impl Into<String>) -> Self {
        Self {
            connection_id,
            username: username.into(),
        }
    }
}

/// Top-level protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    Join { room_id: String, username: String },
    RoomLeave,
    CodeChange(String),
    LanguageChange(String),
    ThemeChange(String),
    RoomDataChange { users: Vec<Participant> },
    ToastNotification(Notification),
}

impl Message {
    pub fn join(room_id: impl Into<String>, username: impl Into<String>) -> Self {
        Message::Join {
            room_id: room_id.into(),
            username: username.into(),
        }
    }

    pub fn code(content: impl Into<String>) -> Self {
        Message::CodeChange(content.into())
    }

    pub fn language(language: Language) -> Self {
        Message::LanguageChange(language.as_str().to_string())
    }

    pub fn theme(theme: Theme) -> Self {
        Message::ThemeChange(theme.as_str().to_string())
    }

    pub fn room_data(users: Vec<Participant>) -> Self {
        Message::RoomDataChange { users }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Join { .. } => MessageType::Join,
            Message::RoomLeave => MessageType::RoomLeave,
            Message::CodeChange(_) => MessageType::CodeChange,
            Message::LanguageChange(_) => MessageType::LanguageChange,
            Message::ThemeChange(_) => MessageType::ThemeChange,
            Message::RoomDataChange { .. } => MessageType::RoomDataChange,
            Message::ToastNotification(_) => MessageType::ToastNotification,
        }
    }

    /// Serialize to binary wire format.
    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| ProtocolError::Serialization(e.to_string()))
    }

    /// Deserialize from binary wire format.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let (msg, _) = bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map_err(|e| ProtocolError::Deserialization(e.to_string()))?;
        Ok(msg)
    }
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("deserialization error: {0}")]
    Deserialization(String),
    #[error("connection closed")]
    ConnectionClosed,
}
