//! Local playback state mirror and persistence hooks
//!
//! The device keeps a local mirror of the room state it last confirmed
//! with the server. The mirror is what reconciliation diffs against and
//! what the audio layer reads; it is never mutated from a push event
//! whose version is older than what it already holds.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use unison_protocol::{
    version, LoopMode, PlaybackStatus, QueueEntry, RoomSnapshot, SyncState,
};

/// The device's mirror of server-confirmed room state
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LocalPlaybackState {
    pub room_code: String,

    pub sync: SyncState,

    pub playlist: Vec<QueueEntry>,

    pub current_track_index: i64,

    pub loop_mode: LoopMode,

    /// Server time at which this mirror was last aligned (Unix ms)
    pub last_applied_server_ms: i64,
}

impl LocalPlaybackState {
    pub fn from_snapshot(snapshot: &RoomSnapshot) -> Self {
        Self {
            room_code: snapshot.code.clone(),
            sync: snapshot.sync.clone(),
            playlist: snapshot.playlist.clone(),
            current_track_index: snapshot.current_track_index,
            loop_mode: snapshot.loop_mode,
            last_applied_server_ms: snapshot.server_timestamp_ms,
        }
    }

    /// Replace the mirror with a full snapshot
    pub fn apply_snapshot(&mut self, snapshot: &RoomSnapshot) {
        *self = Self::from_snapshot(snapshot);
    }

    /// Apply a pushed sync state, guarded by version ordering
    ///
    /// Returns true when applied; a state older than (or equal to) the
    /// mirror's is ignored, which is what makes correctness independent
    /// of push delivery order.
    pub fn apply_sync_state(&mut self, incoming: &SyncState, server_now_ms: i64) -> bool {
        if !version::is_newer(incoming.version, self.sync.version) {
            tracing::debug!(
                incoming = incoming.version,
                local = self.sync.version,
                "ignoring out-of-order sync state push"
            );
            return false;
        }
        self.sync = incoming.clone();
        self.last_applied_server_ms = server_now_ms;
        true
    }

    /// Playback position projected to a given server time
    ///
    /// A playing mirror advances with wall time at the playback rate; a
    /// paused one sits where it was stamped.
    pub fn projected_position_ms(&self, server_now_ms: i64) -> u64 {
        if self.sync.status != PlaybackStatus::Playing {
            return self.sync.position_ms;
        }

        let elapsed = server_now_ms.saturating_sub(self.sync.server_timestamp_ms);
        if elapsed <= 0 {
            return self.sync.position_ms;
        }

        self.sync.position_ms + (elapsed as f64 * self.sync.rate as f64) as u64
    }

    /// Ordered track ids, for queue diffing
    pub fn track_ids(&self) -> Vec<&str> {
        self.playlist.iter().map(|e| e.track.id.as_str()).collect()
    }
}

/// Persistence failures, opaque to the engine
#[derive(Error, Debug)]
#[error("persistence error: {0}")]
pub struct PersistenceError(pub String);

/// Save/restore hooks for the engine's state
///
/// Storage itself lives outside the sync core; hosts plug in whatever
/// they have (a file, a keychain, platform storage).
#[async_trait]
pub trait StatePersistence: Send + Sync {
    async fn save(&self, state: &LocalPlaybackState) -> Result<(), PersistenceError>;

    async fn restore(&self) -> Result<Option<LocalPlaybackState>, PersistenceError>;
}
