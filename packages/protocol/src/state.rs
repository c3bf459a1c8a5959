//! Room and playback data model
//!
//! These types describe the authoritative state the server owns and the
//! snapshots clients reconcile against. All timestamps are Unix epoch
//! milliseconds stamped by the server; clients translate through their
//! clock offset before comparing against local time.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Playback status of a room
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Playing,
    Paused,
    Loading,
    #[default]
    Stopped,
}

/// Queue loop behavior
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LoopMode {
    #[default]
    None,
    Queue,
}

/// Who may issue playback and queue commands
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ControlMode {
    #[default]
    Open,
    HostOnly,
}

/// Member connection state as tracked by the server
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    Connected,
    Reconnecting,
    Disconnected,
}

/// Direction for queue advancement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AdvanceDirection {
    Next,
    Previous,
}

/// The authoritative description of what a room is playing
///
/// One instance per room, owned by the server, mutated only through the
/// sync coordinator. `version` never decreases for a given room except at
/// the defined wrap point (see [`crate::version`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncState {
    /// Currently playing track ID (None when nothing is loaded)
    pub track_id: Option<String>,

    /// Playback status
    pub status: PlaybackStatus,

    /// Seek position in milliseconds at `server_timestamp_ms`
    pub position_ms: u64,

    /// Server clock at the last accepted write (Unix ms)
    pub server_timestamp_ms: i64,

    /// Playback rate (1.0 = realtime)
    pub rate: f32,

    /// Volume level (0.0 - 1.0)
    pub volume: f32,

    /// Client ID of the last accepted writer
    pub last_writer: Option<String>,

    /// Monotonic write version
    pub version: u64,
}

impl Default for SyncState {
    fn default() -> Self {
        Self {
            track_id: None,
            status: PlaybackStatus::Stopped,
            position_ms: 0,
            server_timestamp_ms: 0,
            rate: 1.0,
            volume: 1.0,
            last_writer: None,
            version: 0,
        }
    }
}

/// Immutable track metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Track {
    /// Catalog track ID
    pub id: String,

    pub title: String,

    pub artist: String,

    /// Track length in milliseconds
    pub duration_ms: u64,

    /// Opaque playable locator from the media resolution service
    pub media_url: Option<String>,
}

/// One entry in a room's playlist
///
/// `entry_id` is distinct from the track ID; the same track may appear in
/// a queue more than once over the room's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    pub entry_id: Uuid,

    pub track: Track,

    /// Client ID of the member who added this entry
    pub added_by: String,

    /// Server clock at insertion (Unix ms)
    pub added_at_ms: i64,
}

/// A room member as seen on the wire
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemberInfo {
    /// Stable client identity; survives reconnects
    pub client_id: String,

    pub display_name: String,

    pub is_host: bool,

    pub connection: ConnectionState,

    /// Last activity observed by the server (Unix ms)
    pub last_seen_ms: i64,

    /// Round-trip latency reported by clock sync, if measured
    pub latency_ms: Option<f64>,

    /// Clock offset reported by clock sync, if measured
    pub clock_offset_ms: Option<f64>,
}

/// Queue portion of the room state, as broadcast after mutations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueView {
    pub playlist: Vec<QueueEntry>,

    /// Index into `playlist`, or -1 when nothing is queued up
    /// ("queue finished" is a valid terminal state, not an error)
    pub current_track_index: i64,

    pub loop_mode: LoopMode,
}

/// Full state transfer used for reconciliation
///
/// Clients always pull one of these after an outage rather than trusting
/// incremental deltas to have survived it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RoomSnapshot {
    /// 6-digit room code
    pub code: String,

    pub sync: SyncState,

    pub playlist: Vec<QueueEntry>,

    pub current_track_index: i64,

    pub loop_mode: LoopMode,

    pub control_mode: ControlMode,

    pub members: Vec<MemberInfo>,

    /// Server clock at snapshot capture (Unix ms)
    pub server_timestamp_ms: i64,
}

impl RoomSnapshot {
    /// Queue portion of this snapshot
    pub fn queue_view(&self) -> QueueView {
        QueueView {
            playlist: self.playlist.clone(),
            current_track_index: self.current_track_index,
            loop_mode: self.loop_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_state_defaults() {
        let state = SyncState::default();
        assert_eq!(state.status, PlaybackStatus::Stopped);
        assert_eq!(state.version, 0);
        assert_eq!(state.rate, 1.0);
        assert_eq!(state.volume, 1.0);
        assert!(state.track_id.is_none());
        assert!(state.last_writer.is_none());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&PlaybackStatus::Playing).unwrap(),
            "\"playing\""
        );
        assert_eq!(
            serde_json::to_string(&PlaybackStatus::Stopped).unwrap(),
            "\"stopped\""
        );
    }

    #[test]
    fn control_mode_uses_kebab_case() {
        assert_eq!(
            serde_json::to_string(&ControlMode::HostOnly).unwrap(),
            "\"host-only\""
        );
        assert_eq!(serde_json::to_string(&ControlMode::Open).unwrap(), "\"open\"");
        let parsed: ControlMode = serde_json::from_str("\"host-only\"").unwrap();
        assert_eq!(parsed, ControlMode::HostOnly);
    }

    #[test]
    fn loop_mode_round_trips() {
        for mode in [LoopMode::None, LoopMode::Queue] {
            let json = serde_json::to_string(&mode).unwrap();
            let parsed: LoopMode = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, mode);
        }
    }

    #[test]
    fn snapshot_queue_view_carries_index_and_mode() {
        let snapshot = RoomSnapshot {
            code: "483920".into(),
            sync: SyncState::default(),
            playlist: vec![],
            current_track_index: -1,
            loop_mode: LoopMode::Queue,
            control_mode: ControlMode::Open,
            members: vec![],
            server_timestamp_ms: 0,
        };

        let view = snapshot.queue_view();
        assert_eq!(view.current_track_index, -1);
        assert_eq!(view.loop_mode, LoopMode::Queue);
        assert!(view.playlist.is_empty());
    }
}
