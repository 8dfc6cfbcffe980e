//! Presence: who is in a room, and the toasts announcing arrivals and
//! departures.
//!
//! ## Data flow
//!
//! ```text
//! Room::admit / Room::remove
//!       │
//!       ▼
//! announce_join / announce_leave
//!       │   ROOM-DATA-CHANGE (full list) + TOAST-NOTIFICATION
//!       ▼
//! BroadcastGroup  ──►  every connection in the room
//!       │
//!       ▼
//! Roster::replace()   (client side, one per session)
//! ```
//!
//! Membership relays always carry the full list, never a delta, so a client
//! that missed an intermediate relay converges on the next one.

use serde::{Deserialize, Serialize};

use crate::broadcast::BroadcastGroup;
use crate::protocol::{ConnectionId, Message, Participant, ProtocolError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    Join,
    Leave,
}

/// User-facing presence notification. Ephemeral: never part of the
/// document state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub text: String,
    pub kind: NotificationKind,
}

impl Notification {
    pub fn joined(username: &str) -> Self {
        Self {
            text: format!("{username} joined the room"),
            kind: NotificationKind::Join,
        }
    }

    pub fn left(username: &str) -> Self {
        Self {
            text: format!("{username} left the room"),
            kind: NotificationKind::Leave,
        }
    }
}

/// Relay the membership after `newcomer` was admitted.
///
/// The snapshot goes to everyone, newcomer included. The toast skips the
/// newcomer.
pub(crate) fn announce_join(
    group: &BroadcastGroup,
    users: &[Participant],
    newcomer: &Participant,
) -> Result<(), ProtocolError> {
    group.relay(&Message::room_data(users.to_vec()), None)?;
    group.relay(
        &Message::ToastNotification(Notification::joined(&newcomer.username)),
        Some(newcomer.connection_id),
    )?;
    Ok(())
}

/// Relay the membership after `departed` was removed.
///
/// `departed` may still hold a subscription (its connection drops it right
/// after), so both relays exclude it.
pub(crate) fn announce_leave(
    group: &BroadcastGroup,
    users: &[Participant],
    departed: &Participant,
) -> Result<(), ProtocolError> {
    group.relay(&Message::room_data(users.to_vec()), Some(departed.connection_id))?;
    group.relay(
        &Message::ToastNotification(Notification::left(&departed.username)),
        Some(departed.connection_id),
    )?;
    Ok(())
}

/// Client-side view of a room's membership.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    users: Vec<Participant>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the view with a fresh snapshot.
    pub fn replace(&mut self, users: Vec<Participant>) {
        self.users = users;
    }

    pub fn users(&self) -> &[Participant] {
        &self.users
    }

    pub fn usernames(&self) -> Vec<&str> {
        self.users.iter().map(|p| p.username.as_str()).collect()
    }

    pub fn contains(&self, connection_id: ConnectionId) -> bool {
        self.users.iter().any(|p| p.connection_id == connection_id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn clear(&mut self) {
        self.users.clear();
    }
}
