//! Realtime fan-out of direct messages to connected websocket clients.
//!
//! Rooms are keyed by identity id. Delivery is best effort: a message
//! published to a room nobody is listening on is dropped, and slow
//! subscribers skip what they lagged past. The message store stays the
//! source of truth.

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::debug;

use crate::db::DirectMessage;

/// Per-room buffer for subscribers that fall behind
const ROOM_CAPACITY: usize = 64;

pub trait MessageRelay: Send + Sync {
    /// Returns how many live subscribers received the message
    fn publish(&self, room: &str, message: &DirectMessage) -> usize;
}

/// In-process relay over tokio broadcast channels
#[derive(Default)]
pub struct BroadcastRelay {
    rooms: DashMap<String, broadcast::Sender<DirectMessage>>,
}

impl BroadcastRelay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, room: &str) -> broadcast::Receiver<DirectMessage> {
        self.rooms
            .entry(room.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    /// Drop rooms whose subscribers have all gone away
    pub fn prune(&self) -> usize {
        let before = self.rooms.len();
        self.rooms.retain(|_, tx| tx.receiver_count() > 0);
        before - self.rooms.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

impl MessageRelay for BroadcastRelay {
    fn publish(&self, room: &str, message: &DirectMessage) -> usize {
        let Some(tx) = self.rooms.get(room) else {
            debug!(room, "No subscribers for relay room");
            return 0;
        };
        tx.send(message.clone()).unwrap_or(0)
    }
}
