//! Per-room authoritative state.
//!
//! ```text
//! Client A ──┐                         ┌──► Client B
//!            ├── Room ── RoomState ────┤
//! Client C ──┘     │   (participants,  └──► Client C
//!                  │    document)
//!                  └── BroadcastGroup
//! ```
//!
//! All mutation happens under the room's mutex, and every relay is sent
//! before the lock is released. Two updates to the same field are therefore
//! relayed in the order they were applied, which is the order they reached
//! the room.

use std::fmt;

use tokio::sync::Mutex;

use crate::broadcast::{BroadcastGroup, BroadcastStats, RelayReceiver};
use crate::document::{DocumentState, DocumentUpdate, Language, Theme};
use crate::presence;
use crate::protocol::{ConnectionId, Message, Participant};

struct RoomState {
    /// Admission order.
    participants: Vec<Participant>,
    document: DocumentState,
}

impl RoomState {
    fn position(&self, connection_id: ConnectionId) -> Option<usize> {
        self.participants
            .iter()
            .position(|p| p.connection_id == connection_id)
    }
}

/// Result of admitting a participant.
#[derive(Debug)]
pub struct Admission {
    /// Document as of admission.
    pub document: DocumentState,
    /// Membership as of admission, newcomer included.
    pub users: Vec<Participant>,
    /// Relay subscription. `None` when the connection was already a member
    /// and keeps its existing subscription.
    pub subscription: Option<RelayReceiver>,
}

impl Admission {
    pub fn is_new(&self) -> bool {
        self.subscription.is_some()
    }
}

/// Result of removing a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    pub participant: Participant,
    pub remaining: usize,
}

/// A collaborative room: members, document, and their relay channel.
pub struct Room {
    id: String,
    state: Mutex<RoomState>,
    group: BroadcastGroup,
}

impl fmt::Debug for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Room")
            .field("id", &self.id)
            .field("broadcast", &self.group.stats())
            .finish_non_exhaustive()
    }
}

impl Room {
    /// Create an empty room with the default document.
    pub fn new(id: impl Into<String>, broadcast_capacity: usize) -> Self {
        Self {
            id: id.into(),
            state: Mutex::new(RoomState {
                participants: Vec::new(),
                document: DocumentState::default(),
            }),
            group: BroadcastGroup::new(broadcast_capacity),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Add `participant` and announce the new membership.
    ///
    /// Admitting a connection that is already a member changes nothing and
    /// relays nothing.
    pub async fn admit(&self, participant: Participant) -> Admission {
        let mut state = self.state.lock().await;

        if state.position(participant.connection_id).is_some() {
            log::debug!(
                "Connection {} already in room {}, ignoring duplicate join",
                participant.connection_id,
                self.id
            );
            return Admission {
                document: state.document.clone(),
                users: state.participants.clone(),
                subscription: None,
            };
        }

        // Subscribe first so the newcomer receives its own membership snapshot.
        let subscription = self.group.subscribe();
        state.participants.push(participant.clone());

        if let Err(e) = presence::announce_join(&self.group, &state.participants, &participant) {
            log::error!("Failed to announce join in room {}: {e}", self.id);
        }

        log::info!(
            "{} ({}) joined room {} [{} present]",
            participant.username,
            participant.connection_id,
            self.id,
            state.participants.len()
        );

        Admission {
            document: state.document.clone(),
            users: state.participants.clone(),
            subscription: Some(subscription),
        }
    }

    /// Remove a participant and announce the new membership to those left.
    ///
    /// Returns `None` if the connection was not a member.
    pub async fn remove(&self, connection_id: ConnectionId) -> Option<Departure> {
        let mut state = self.state.lock().await;
        let index = state.position(connection_id)?;
        let participant = state.participants.remove(index);

        if let Err(e) = presence::announce_leave(&self.group, &state.participants, &participant) {
            log::error!("Failed to announce leave in room {}: {e}", self.id);
        }

        log::info!(
            "{} ({}) left room {} [{} present]",
            participant.username,
            participant.connection_id,
            self.id,
            state.participants.len()
        );

        Some(Departure {
            participant,
            remaining: state.participants.len(),
        })
    }

    /// Overwrite one document field and relay it to everyone but `origin`.
    ///
    /// Updates from connections that are not members are ignored; they can
    /// only come from a connection racing its own teardown.
    pub async fn apply(&self, origin: ConnectionId, update: DocumentUpdate) -> bool {
        let mut state = self.state.lock().await;

        if state.position(origin).is_none() {
            log::debug!(
                "Ignoring {} update from non-member {origin} in room {}",
                update.field(),
                self.id
            );
            return false;
        }

        let message = match &update {
            DocumentUpdate::Code(content) => Message::code(content.as_str()),
            DocumentUpdate::Language(language) => Message::language(*language),
            DocumentUpdate::Theme(theme) => Message::theme(*theme),
        };
        log::trace!("Room {}: {} update from {origin}", self.id, update.field());
        state.document.apply(update);

        if let Err(e) = self.group.relay(&message, Some(origin)) {
            log::error!("Failed to relay update in room {}: {e}", self.id);
        }
        true
    }

    pub async fn apply_code_change(&self, origin: ConnectionId, content: String) -> bool {
        self.apply(origin, DocumentUpdate::Code(content)).await
    }

    pub async fn apply_language_change(&self, origin: ConnectionId, language: Language) -> bool {
        self.apply(origin, DocumentUpdate::Language(language)).await
    }

    pub async fn apply_theme_change(&self, origin: ConnectionId, theme: Theme) -> bool {
        self.apply(origin, DocumentUpdate::Theme(theme)).await
    }

    pub async fn document(&self) -> DocumentState {
        self.state.lock().await.document.clone()
    }

    pub async fn participants(&self) -> Vec<Participant> {
        self.state.lock().await.participants.clone()
    }

    pub async fn participant_count(&self) -> usize {
        self.state.lock().await.participants.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.participants.is_empty()
    }

    pub async fn contains(&self, connection_id: ConnectionId) -> bool {
        self.state.lock().await.position(connection_id).is_some()
    }

    /// Record relays a member's receiver lagged past.
    pub fn record_dropped(&self, count: u64) {
        self.group.record_dropped(count);
    }

    pub fn broadcast_stats(&self) -> BroadcastStats {
        self.group.stats()
    }
}
