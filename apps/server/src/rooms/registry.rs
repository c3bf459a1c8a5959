//! Room registry
//!
//! Owns every live room, keyed by its 6-digit code. The registry itself is
//! a concurrent map so requests for different rooms proceed in parallel;
//! serialization happens per room, behind each room's own lock.

use std::sync::Arc;

use dashmap::DashMap;
use rand::Rng;
use unison_protocol::ControlMode;

use crate::error::{ServerError, ServerResult};
use crate::rooms::room::{Member, Room};

/// Validate the shape of a room code: exactly six ASCII digits
pub fn validate_room_code(code: &str) -> ServerResult<()> {
    if code.len() == 6 && code.bytes().all(|b| b.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ServerError::InvalidRoomCode(code.to_string()))
    }
}

/// Registry of live rooms
#[derive(Debug, Clone)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<String, Arc<Room>>>,

    /// Soft cap applied to every room's queue
    queue_cap: usize,
}

impl RoomRegistry {
    pub fn new(queue_cap: usize) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            queue_cap,
        }
    }

    /// Create a room with a fresh unique code and the given host
    pub fn create(&self, host: Member, control_mode: ControlMode, now_ms: i64) -> Arc<Room> {
        let mut rng = rand::thread_rng();

        loop {
            let code = format!("{:06}", rng.gen_range(0..1_000_000u32));
            if self.rooms.contains_key(&code) {
                continue;
            }

            let room = Arc::new(Room::new(
                code.clone(),
                host.clone(),
                control_mode,
                self.queue_cap,
                now_ms,
            ));

            // Entry-based insert so a concurrent create of the same code
            // cannot clobber an existing room.
            match self.rooms.entry(code.clone()) {
                dashmap::mapref::entry::Entry::Occupied(_) => continue,
                dashmap::mapref::entry::Entry::Vacant(vacant) => {
                    vacant.insert(room.clone());
                    tracing::info!(room = %code, host = %host.client_id, "room created");
                    return room;
                }
            }
        }
    }

    /// Look up a room, validating the code shape first
    pub fn get(&self, code: &str) -> ServerResult<Arc<Room>> {
        validate_room_code(code)?;
        self.rooms
            .get(code)
            .map(|r| r.clone())
            .ok_or_else(|| ServerError::RoomNotFound(code.to_string()))
    }

    pub fn contains(&self, code: &str) -> bool {
        self.rooms.contains_key(code)
    }

    /// Drop a room (last member left, or inactivity sweep)
    pub fn remove(&self, code: &str) -> bool {
        let removed = self.rooms.remove(code).is_some();
        if removed {
            tracing::info!(room = %code, "room destroyed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Snapshot of live room handles, for sweeps
    pub fn all(&self) -> Vec<Arc<Room>> {
        self.rooms.iter().map(|e| e.value().clone()).collect()
    }

    /// Remove rooms whose last activity is older than the timeout and
    /// which have no connected members; returns the removed codes
    pub async fn sweep_inactive(&self, now_ms: i64, inactive_timeout_ms: i64) -> Vec<String> {
        let mut removed = Vec::new();

        for room in self.all() {
            let stale = {
                let inner = room.lock().await;
                inner.connected_members() == 0
                    && now_ms.saturating_sub(inner.last_activity_ms) > inactive_timeout_ms
            };

            if stale && self.remove(room.code()) {
                removed.push(room.code().to_string());
            }
        }

        removed
    }
}
