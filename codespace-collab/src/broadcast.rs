//! Per-room fan-out of encoded relays.
//!
//! Uses a tokio broadcast channel: one send reaches every subscribed
//! connection. Each relay carries an optional excluded connection; the
//! receiving side drops relays addressed away from it, which is how both
//! anti-echo (updates skip their origin) and the newcomer exclusion on join
//! notifications are expressed.
//!
//! Delivery is at-most-once. A receiver that falls more than `capacity`
//! relays behind loses the oldest ones and stays stale until the next
//! update for the affected field.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::protocol::{ConnectionId, Message, ProtocolError};

/// Statistics for monitoring relay health.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStats {
    pub relays_sent: u64,
    pub relays_dropped: u64,
    pub subscribers: usize,
}

/// One encoded message on its way to the members of a room.
#[derive(Debug, Clone)]
pub struct Relay {
    /// Connection that must not receive this relay.
    pub exclude: Option<ConnectionId>,
    /// Pre-encoded frame, shared by every receiver.
    pub frame: Arc<Vec<u8>>,
}

impl Relay {
    /// Whether `connection` should forward this relay to its socket.
    pub fn is_for(&self, connection: ConnectionId) -> bool {
        self.exclude != Some(connection)
    }

    pub fn message(&self) -> Result<Message, ProtocolError> {
        Message::decode(&self.frame)
    }
}

pub type RelayReceiver = broadcast::Receiver<Relay>;

/// Broadcast group for a single room.
pub struct BroadcastGroup {
    sender: broadcast::Sender<Relay>,
    capacity: usize,
    relays_sent: AtomicU64,
    relays_dropped: AtomicU64,
}

impl BroadcastGroup {
    /// `capacity` is the number of relays buffered per receiver before a
    /// lagging receiver starts losing them.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            capacity: capacity.max(1),
            relays_sent: AtomicU64::new(0),
            relays_dropped: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> RelayReceiver {
        self.sender.subscribe()
    }

    /// Encode `message` once and relay it to every subscriber except
    /// `exclude`. Returns the number of receivers that got the frame
    /// (including the excluded one, which filters it out itself).
    pub fn relay(
        &self,
        message: &Message,
        exclude: Option<ConnectionId>,
    ) -> Result<usize, ProtocolError> {
        let frame = Arc::new(message.encode()?);
        Ok(self.relay_raw(Relay { exclude, frame }))
    }

    /// Relay a pre-encoded frame.
    pub fn relay_raw(&self, relay: Relay) -> usize {
        self.relays_sent.fetch_add(1, Ordering::Relaxed);
        // No subscribers is not an error: the room may be mid-teardown.
        self.sender.send(relay).unwrap_or(0)
    }

    /// Record relays a lagging receiver never saw.
    pub fn record_dropped(&self, count: u64) {
        self.relays_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            relays_sent: self.relays_sent.load(Ordering::Relaxed),
            relays_dropped: self.relays_dropped.load(Ordering::Relaxed),
            subscribers: self.subscriber_count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_relay_fan_out() {
        let group = BroadcastGroup::new(16);
        let mut rx1 = group.subscribe();
        let mut rx2 = group.subscribe();
        let mut rx3 = group.subscribe();

        let count = group.relay(&Message::code("hello"), None).unwrap();
        assert_eq!(count, 3);

        for rx in [&mut rx1, &mut rx2, &mut rx3] {
            let relay = rx.recv().await.unwrap();
            assert_eq!(relay.message().unwrap(), Message::code("hello"));
        }
    }

    #[tokio::test]
    async fn test_relay_excludes_origin() {
        let group = BroadcastGroup::new(16);
        let origin = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut rx = group.subscribe();

        group.relay(&Message::code("x"), Some(origin)).unwrap();
        let relay = rx.recv().await.unwrap();
        assert!(!relay.is_for(origin));
        assert!(relay.is_for(other));
    }

    #[test]
    fn test_relay_without_subscribers() {
        let group = BroadcastGroup::new(4);
        assert_eq!(group.relay(&Message::RoomLeave, None).unwrap(), 0);
        assert_eq!(group.stats().relays_sent, 1);
    }

    #[test]
    fn test_lagging_receiver_loses_oldest() {
        let group = BroadcastGroup::new(2);
        let mut rx = group.subscribe();
        for i in 0..5 {
            group.relay(&Message::code(i.to_string()), None).unwrap();
        }
        match rx.try_recv() {
            Err(TryRecvError::Lagged(n)) => {
                group.record_dropped(n);
                assert_eq!(n, 3);
            }
            other => panic!("expected lag, got {other:?}"),
        }
        // The newest relays are still there.
        assert_eq!(rx.try_recv().unwrap().message().unwrap(), Message::code("3"));
        assert_eq!(rx.try_recv().unwrap().message().unwrap(), Message::code("4"));
        assert_eq!(group.stats().relays_dropped, 3);
    }

    #[test]
    fn test_stats_track_subscribers() {
        let group = BroadcastGroup::new(8);
        assert_eq!(group.capacity(), 8);
        let rx = group.subscribe();
        assert_eq!(group.stats().subscribers, 1);
        drop(rx);
        assert_eq!(group.stats().subscribers, 0);
    }
}
