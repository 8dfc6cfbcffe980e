//! Process-wide room registry: room id → [`Room`].
//!
//! Rooms are created lazily by the first join and dropped by the last
//! leave, so a room id reused later starts from the default document.
//!
//! The registry also indexes which room each connection is in. A join for
//! a different room moves the connection (leaving the old room first),
//! which keeps every connection in at most one room.
//!
//! Locking: joins and leaves take the registry write lock and then the room
//! lock; updates take the registry read lock only long enough to clone the
//! room handle. Registry before room, never the reverse.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;

use crate::broadcast::RelayReceiver;
use crate::document::{DocumentState, DocumentUpdate, Language, Theme};
use crate::protocol::{ConnectionId, Participant};
use crate::room::{Departure, Room};

/// Rejected join request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("room id must not be empty")]
    EmptyRoomId,
    #[error("username must not be empty")]
    EmptyUsername,
}

/// Check a JOIN's fields. Room ids are opaque and compared exactly, so
/// only blank ones are refused; usernames are trimmed for display.
pub fn validate_join(room_id: &str, username: &str) -> Result<(), RegistryError> {
    if room_id.trim().is_empty() {
        return Err(RegistryError::EmptyRoomId);
    }
    if username.trim().is_empty() {
        return Err(RegistryError::EmptyUsername);
    }
    Ok(())
}

/// Result of a successful join.
#[derive(Debug)]
pub struct JoinOutcome {
    pub room: Arc<Room>,
    pub document: DocumentState,
    pub users: Vec<Participant>,
    /// New relay subscription; `None` for a duplicate join.
    pub subscription: Option<RelayReceiver>,
    /// Room the connection was moved out of, if any.
    pub previous_room: Option<String>,
}

#[derive(Default)]
struct RegistryState {
    rooms: HashMap<String, Arc<Room>>,
    memberships: HashMap<ConnectionId, String>,
}

impl RegistryState {
    /// Remove `connection_id` from `room_id`, dropping the room if it empties.
    async fn remove(&mut self, room_id: &str, connection_id: ConnectionId) -> Option<Departure> {
        let room = self.rooms.get(room_id)?.clone();
        let departure = room.remove(connection_id).await?;

        self.memberships.remove(&connection_id);
        if departure.remaining == 0 {
            self.rooms.remove(room_id);
            log::info!("Room {room_id} removed (empty)");
        }
        Some(departure)
    }
}

pub struct RoomRegistry {
    state: RwLock<RegistryState>,
    broadcast_capacity: usize,
}

impl RoomRegistry {
    /// `broadcast_capacity` sizes each new room's relay buffer.
    pub fn new(broadcast_capacity: usize) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            broadcast_capacity,
        }
    }

    /// Admit `participant` to `room_id`, creating the room if needed.
    ///
    /// Joining the same room twice from one connection yields a single
    /// membership entry.
    pub async fn join(
        &self,
        room_id: &str,
        mut participant: Participant,
    ) -> Result<JoinOutcome, RegistryError> {
        validate_join(room_id, &participant.username)?;
        participant.username = participant.username.trim().to_string();
        let connection_id = participant.connection_id;

        let mut state = self.state.write().await;

        let mut previous_room = None;
        if let Some(current) = state.memberships.get(&connection_id).cloned() {
            if current != room_id {
                state.remove(&current, connection_id).await;
                previous_room = Some(current);
            }
        }

        let room = state
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| {
                log::info!("Room {room_id} created");
                Arc::new(Room::new(room_id, self.broadcast_capacity))
            })
            .clone();

        let admission = room.admit(participant).await;
        state.memberships.insert(connection_id, room_id.to_string());

        Ok(JoinOutcome {
            room,
            document: admission.document,
            users: admission.users,
            subscription: admission.subscription,
            previous_room,
        })
    }

    /// Remove a connection from a room. Unknown rooms and non-members are a
    /// no-op: a disconnect may have raced an explicit leave.
    pub async fn leave(&self, room_id: &str, connection_id: ConnectionId) -> Option<Departure> {
        let mut state = self.state.write().await;
        let departure = state.remove(room_id, connection_id).await;
        if departure.is_none() {
            log::debug!("Leave for {connection_id} from room {room_id} ignored (not a member)");
        }
        departure
    }

    /// Remove a connection from whatever room it is in.
    pub async fn disconnect(&self, connection_id: ConnectionId) -> Option<Departure> {
        let mut state = self.state.write().await;
        let room_id = state.memberships.get(&connection_id).cloned()?;
        state.remove(&room_id, connection_id).await
    }

    /// Apply a single-field update. Unknown rooms are ignored.
    pub async fn apply(&self, room_id: &str, origin: ConnectionId, update: DocumentUpdate) -> bool {
        match self.room(room_id).await {
            Some(room) => room.apply(origin, update).await,
            None => {
                log::debug!("Dropping {} update for unknown room {room_id}", update.field());
                false
            }
        }
    }

    pub async fn apply_code_change(&self, room_id: &str, origin: ConnectionId, content: String) -> bool {
        self.apply(room_id, origin, DocumentUpdate::Code(content)).await
    }

    pub async fn apply_language_change(
        &self,
        room_id: &str,
        origin: ConnectionId,
        language: Language,
    ) -> bool {
        self.apply(room_id, origin, DocumentUpdate::Language(language)).await
    }

    pub async fn apply_theme_change(&self, room_id: &str, origin: ConnectionId, theme: Theme) -> bool {
        self.apply(room_id, origin, DocumentUpdate::Theme(theme)).await
    }

    pub async fn room(&self, room_id: &str) -> Option<Arc<Room>> {
        self.state.read().await.rooms.get(room_id).cloned()
    }

    pub async fn contains(&self, room_id: &str) -> bool {
        self.state.read().await.rooms.contains_key(room_id)
    }

    pub async fn room_count(&self) -> usize {
        self.state.read().await.rooms.len()
    }

    pub async fn room_ids(&self) -> Vec<String> {
        self.state.read().await.rooms.keys().cloned().collect()
    }

    /// Room the connection currently belongs to.
    pub async fn room_of(&self, connection_id: ConnectionId) -> Option<String> {
        self.state.read().await.memberships.get(&connection_id).cloned()
    }

    pub async fn participants(&self, room_id: &str) -> Option<Vec<Participant>> {
        let room = self.room(room_id).await?;
        Some(room.participants().await)
    }

    pub async fn document(&self, room_id: &str) -> Option<DocumentState> {
        let room = self.room(room_id).await?;
        Some(room.document().await)
    }
}
