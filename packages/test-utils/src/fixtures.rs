//! Fixture builders for protocol types
//!
//! Deterministic-enough builders for the data model, so tests read as
//! intent rather than struct literals.

use unison_protocol::{
    ControlMode, LoopMode, MemberInfo, PlaybackStatus, QueueEntry, RoomSnapshot, SyncState, Track,
};
use uuid::Uuid;

/// A track with plausible metadata derived from its id
pub fn track(track_id: &str) -> Track {
    Track {
        id: track_id.to_string(),
        title: format!("Title of {track_id}"),
        artist: format!("Artist of {track_id}"),
        duration_ms: 180_000,
        media_url: Some(format!("https://media.test/{track_id}.mp3")),
    }
}

/// A queue entry wrapping [`track`], added by "client-test"
pub fn queue_entry(track_id: &str) -> QueueEntry {
    QueueEntry {
        entry_id: Uuid::new_v4(),
        track: track(track_id),
        added_by: "client-test".to_string(),
        added_at_ms: 0,
    }
}

/// A connected member
pub fn member(client_id: &str, is_host: bool) -> MemberInfo {
    MemberInfo {
        client_id: client_id.to_string(),
        display_name: format!("Name of {client_id}"),
        is_host,
        connection: unison_protocol::ConnectionState::Connected,
        last_seen_ms: 0,
        latency_ms: None,
        clock_offset_ms: None,
    }
}

/// A playing sync state on `track_id` stamped at `server_ts_ms`
pub fn playing_sync(track_id: &str, position_ms: u64, server_ts_ms: i64, version: u64) -> SyncState {
    SyncState {
        track_id: Some(track_id.to_string()),
        status: PlaybackStatus::Playing,
        position_ms,
        server_timestamp_ms: server_ts_ms,
        rate: 1.0,
        volume: 1.0,
        last_writer: Some("client-test".to_string()),
        version,
    }
}

/// A room snapshot over the given track ids, positioned at `current_index`
pub fn snapshot(
    code: &str,
    track_ids: &[&str],
    current_index: i64,
    server_ts_ms: i64,
) -> RoomSnapshot {
    let sync = if current_index >= 0 {
        playing_sync(track_ids[current_index as usize], 0, server_ts_ms, 1)
    } else {
        SyncState {
            server_timestamp_ms: server_ts_ms,
            ..SyncState::default()
        }
    };

    RoomSnapshot {
        code: code.to_string(),
        sync,
        playlist: track_ids.iter().map(|id| queue_entry(id)).collect(),
        current_track_index: current_index,
        loop_mode: LoopMode::None,
        control_mode: ControlMode::Open,
        members: vec![member("client-test", true)],
        server_timestamp_ms: server_ts_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_positions_sync_on_the_current_track() {
        let snap = snapshot("123456", &["a", "b", "c"], 1, 50_000);
        assert_eq!(snap.sync.track_id.as_deref(), Some("b"));
        assert_eq!(snap.playlist.len(), 3);
        assert_eq!(snap.current_track_index, 1);
        assert_eq!(snap.server_timestamp_ms, 50_000);
    }

    #[test]
    fn finished_snapshot_has_stopped_sync() {
        let snap = snapshot("123456", &["a"], -1, 0);
        assert!(snap.sync.track_id.is_none());
        assert_eq!(snap.sync.status, PlaybackStatus::Stopped);
    }
}
