//! Per-room event fan-out
//!
//! Each room gets one in-memory broadcast channel. Every connection in
//! the room runs a pump that forwards channel events into its own send
//! queue, filtering out events the session itself originated (it already
//! learned the result from its acknowledgement).
//!
//! Delivery is eventual and unordered relative to a member's own later
//! writes; correctness rests on sync state versions, not arrival order.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use unison_protocol::{ServerEvent, ServerFrame};
use uuid::Uuid;

/// Channel capacity for each room's broadcast channel
const BROADCAST_CAPACITY: usize = 256;

/// One event flowing through a room channel
#[derive(Debug, Clone)]
pub struct RoomEvent {
    /// Session that caused the event; None for server-originated events
    /// like liveness timeouts
    pub origin: Option<Uuid>,

    pub event: ServerEvent,
}

/// Convert a room event into a frame for a specific receiving session
///
/// Returns None when the session is the event's origin and should not be
/// echoed at.
pub fn frame_for_session(event: &RoomEvent, session_id: Uuid) -> Option<ServerFrame> {
    if event.origin == Some(session_id) {
        return None;
    }
    Some(ServerFrame::Event(event.event.clone()))
}

/// Registry of per-room broadcast channels
#[derive(Debug, Clone, Default)]
pub struct RoomChannels {
    channels: Arc<DashMap<String, broadcast::Sender<RoomEvent>>>,
}

impl RoomChannels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a room's events, creating the channel on first use
    pub fn subscribe(&self, code: &str) -> broadcast::Receiver<RoomEvent> {
        self.channels
            .entry(code.to_string())
            .or_insert_with(|| broadcast::channel(BROADCAST_CAPACITY).0)
            .subscribe()
    }

    /// Publish an event to a room; returns the number of live receivers
    pub fn publish(&self, code: &str, origin: Option<Uuid>, event: ServerEvent) -> usize {
        match self.channels.get(code) {
            Some(sender) => sender.send(RoomEvent { origin, event }).unwrap_or(0),
            None => 0,
        }
    }

    /// Drop a room's channel when the room is destroyed
    pub fn drop_room(&self, code: &str) {
        self.channels.remove(code);
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
