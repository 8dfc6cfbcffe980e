//! # codespace-collab: real-time room synchronization for a shared code editor
//!
//! Participants join a room by id and share one document: code, language
//! and editor theme. Every update overwrites its field (last writer wins)
//! and is relayed to everyone else in the room.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐     WebSocket      ┌───────────────┐
//! │ SessionClient │ ◄────────────────► │ CollabServer  │
//! │ (per user)    │    Binary Proto    │ (central)     │
//! └───────┬───────┘                    └───────┬───────┘
//!         │                                    │
//!         ▼                                    ▼
//! ┌───────────────┐                    ┌───────────────┐
//! │ Session       │                    │ RoomRegistry  │
//! │ (local state) │                    │ room id → Room│
//! └───────────────┘                    └───────┬───────┘
//!                                              │
//!                                      ┌───────┴───────┐
//!                                      │ Room          │
//!                                      │ document,     │
//!                                      │ BroadcastGroup│
//!                                      └───────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`]: binary wire protocol (bincode-encoded [`Message`])
//! - [`document`]: shared document fields and their wire names
//! - [`broadcast`]: per-room fan-out with origin exclusion
//! - [`presence`]: membership snapshots and join/leave notifications
//! - [`room`]: authoritative per-room state
//! - [`registry`]: room lifecycle and connection membership
//! - [`server`]: WebSocket coordinator
//! - [`session`]: client-side state machine, transport free
//! - [`client`]: WebSocket adapter around [`Session`]
//! - [`config`]: environment configuration

pub mod protocol;
pub mod document;
pub mod broadcast;
pub mod presence;
pub mod room;
pub mod registry;
pub mod server;
pub mod session;
pub mod client;
pub mod config;

// Re-exports for convenience
pub use protocol::{ConnectionId, Message, MessageType, Participant, ProtocolError};
pub use document::{DocumentState, DocumentUpdate, Language, ParseError, Theme, STARTING_CODE};
pub use broadcast::{BroadcastGroup, BroadcastStats, Relay, RelayReceiver};
pub use presence::{Notification, NotificationKind, Roster};
pub use room::{Admission, Departure, Room};
pub use registry::{JoinOutcome, RegistryError, RoomRegistry};
pub use server::{CollabServer, Connection, RelayEvent, Rejection, ServerConfig, ServerStats};
pub use session::{Clipboard, LocalState, Session, SessionError, SessionEvent, SessionState};
pub use client::{ClientConfig, ClientError, SessionClient};
pub use config::ConfigError;
