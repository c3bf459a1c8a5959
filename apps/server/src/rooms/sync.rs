//! Sync state coordination
//!
//! The single authoritative reconciler of playback intents for a room.
//! Conflicts are arbitrated last-write-wins by version; an accepted write
//! always stamps a fresh server timestamp and a server-incremented version.
//! The client's version is only ever compared against, never stored.
//!
//! Track changes additionally pass a leading-edge debounce so two members
//! skipping at nearly the same moment produce one winner and one
//! distinguishable rejection instead of a two-track flicker.

use unison_protocol::{version, PlaybackIntent, PlaybackStatus, SyncState};

use crate::error::{ServerError, ServerResult};

/// Which playback intent is being applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentKind {
    Play,
    Pause,
    Seek,
}

/// Result of applying an intent
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// State changed; broadcast to the rest of the room
    Applied(SyncState),

    /// Incoming version equals the stored one: same-state no-op, nothing
    /// to broadcast
    NoOp(SyncState),
}

impl SyncOutcome {
    pub fn state(&self) -> &SyncState {
        match self {
            Self::Applied(state) | Self::NoOp(state) => state,
        }
    }
}

/// Apply a playback intent to a room's sync state
///
/// `last_track_change_ms` is the room's debounce memory; an accepted track
/// change refreshes it.
pub fn apply_intent(
    state: &mut SyncState,
    last_track_change_ms: &mut Option<i64>,
    kind: IntentKind,
    intent: &PlaybackIntent,
    writer: &str,
    now_ms: i64,
    debounce_ms: u64,
) -> ServerResult<SyncOutcome> {
    if intent.version == state.version {
        return Ok(SyncOutcome::NoOp(state.clone()));
    }
    if !version::is_newer(intent.version, state.version) {
        return Err(ServerError::StaleVersion {
            incoming: intent.version,
            current: state.version,
        });
    }

    let changes_track = match &intent.track_id {
        Some(incoming) => state.track_id.as_deref() != Some(incoming.as_str()),
        None => false,
    };

    if changes_track {
        if let Some(last) = *last_track_change_ms {
            if now_ms.saturating_sub(last) < debounce_ms as i64 {
                return Err(ServerError::TrackChangeDebounced);
            }
        }
    }

    if let Some(track_id) = &intent.track_id {
        state.track_id = Some(track_id.clone());
    }
    state.status = match kind {
        IntentKind::Play => PlaybackStatus::Playing,
        IntentKind::Pause => PlaybackStatus::Paused,
        IntentKind::Seek => state.status,
    };
    state.position_ms = intent.position_ms;
    if let Some(rate) = intent.rate {
        state.rate = rate;
    }
    if let Some(vol) = intent.volume {
        state.volume = vol;
    }
    state.server_timestamp_ms = now_ms;
    state.last_writer = Some(writer.to_string());
    state.version = version::increment(state.version);

    if changes_track {
        *last_track_change_ms = Some(now_ms);
    }

    Ok(SyncOutcome::Applied(state.clone()))
}

/// Mark the room stopped when its queue runs out
///
/// "Queue finished" is a successful terminal state; this transition goes
/// through the same version discipline as any other write.
pub fn mark_finished(state: &mut SyncState, writer: &str, now_ms: i64) -> SyncState {
    state.track_id = None;
    state.status = PlaybackStatus::Stopped;
    state.position_ms = 0;
    state.server_timestamp_ms = now_ms;
    state.last_writer = Some(writer.to_string());
    state.version = version::increment(state.version);
    state.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const DEBOUNCE_MS: u64 = 300;

    fn intent(version: u64) -> PlaybackIntent {
        PlaybackIntent {
            track_id: None,
            position_ms: 0,
            rate: None,
            volume: None,
            version,
        }
    }

    fn track_intent(track_id: &str, version: u64) -> PlaybackIntent {
        PlaybackIntent {
            track_id: Some(track_id.to_string()),
            position_ms: 0,
            rate: None,
            volume: None,
            version,
        }
    }

    #[test]
    fn accepted_write_stamps_server_fields() {
        let mut state = SyncState::default();
        let mut last_change = None;

        let outcome = apply_intent(
            &mut state,
            &mut last_change,
            IntentKind::Play,
            &track_intent("t1", 1),
            "client-a",
            1_000,
            DEBOUNCE_MS,
        )
        .unwrap();

        let applied = assert_matches!(outcome, SyncOutcome::Applied(s) => s);
        assert_eq!(applied.track_id.as_deref(), Some("t1"));
        assert_eq!(applied.status, PlaybackStatus::Playing);
        assert_eq!(applied.server_timestamp_ms, 1_000);
        assert_eq!(applied.last_writer.as_deref(), Some("client-a"));
        assert_eq!(applied.version, 1);
    }

    #[test]
    fn version_is_incremented_not_copied() {
        let mut state = SyncState::default();
        let mut last_change = None;

        // The client claims a wildly high version; the stored version must
        // still be the server-side increment of the previous one.
        apply_intent(
            &mut state,
            &mut last_change,
            IntentKind::Play,
            &intent(40_000),
            "client-a",
            0,
            DEBOUNCE_MS,
        )
        .unwrap();

        assert_eq!(state.version, 1);
    }

    #[test]
    fn stale_version_is_rejected_with_conflict() {
        let mut state = SyncState {
            version: 10,
            ..SyncState::default()
        };
        let mut last_change = None;

        let err = apply_intent(
            &mut state,
            &mut last_change,
            IntentKind::Pause,
            &intent(4),
            "client-b",
            0,
            DEBOUNCE_MS,
        )
        .unwrap_err();

        assert_matches!(
            err,
            ServerError::StaleVersion {
                incoming: 4,
                current: 10
            }
        );
        assert_eq!(state.version, 10);
    }

    #[test]
    fn equal_version_is_a_no_op_not_an_error() {
        let mut state = SyncState {
            version: 5,
            ..SyncState::default()
        };
        let mut last_change = None;

        let outcome = apply_intent(
            &mut state,
            &mut last_change,
            IntentKind::Play,
            &intent(5),
            "client-b",
            9_999,
            DEBOUNCE_MS,
        )
        .unwrap();

        assert_matches!(outcome, SyncOutcome::NoOp(_));
        // Nothing is stamped on a no-op.
        assert_eq!(state.version, 5);
        assert_eq!(state.server_timestamp_ms, 0);
    }

    #[test]
    fn version_monotonicity_across_accepted_writes() {
        let mut state = SyncState::default();
        let mut last_change = None;

        let mut previous = state.version;
        for step in 0..20 {
            apply_intent(
                &mut state,
                &mut last_change,
                IntentKind::Seek,
                &intent(previous + 1),
                "client-a",
                step * 1_000,
                DEBOUNCE_MS,
            )
            .unwrap();
            assert!(unison_protocol::version::is_newer(state.version, previous));
            previous = state.version;
        }
    }

    #[test]
    fn second_track_change_within_window_is_debounced() {
        let mut state = SyncState::default();
        let mut last_change = None;

        apply_intent(
            &mut state,
            &mut last_change,
            IntentKind::Play,
            &track_intent("t1", 1),
            "client-a",
            10_000,
            DEBOUNCE_MS,
        )
        .unwrap();

        let err = apply_intent(
            &mut state,
            &mut last_change,
            IntentKind::Play,
            &track_intent("t2", 2),
            "client-b",
            10_150,
            DEBOUNCE_MS,
        )
        .unwrap_err();

        assert_matches!(err, ServerError::TrackChangeDebounced);
        // The winner's state survives untouched.
        assert_eq!(state.track_id.as_deref(), Some("t1"));
        assert_eq!(state.version, 1);
    }

    #[test]
    fn track_change_after_the_window_is_accepted() {
        let mut state = SyncState::default();
        let mut last_change = None;

        apply_intent(
            &mut state,
            &mut last_change,
            IntentKind::Play,
            &track_intent("t1", 1),
            "client-a",
            10_000,
            DEBOUNCE_MS,
        )
        .unwrap();

        let outcome = apply_intent(
            &mut state,
            &mut last_change,
            IntentKind::Play,
            &track_intent("t2", 2),
            "client-b",
            10_000 + DEBOUNCE_MS as i64,
            DEBOUNCE_MS,
        )
        .unwrap();

        assert_matches!(outcome, SyncOutcome::Applied(_));
        assert_eq!(state.track_id.as_deref(), Some("t2"));
        assert_eq!(last_change, Some(10_000 + DEBOUNCE_MS as i64));
    }

    #[test]
    fn same_track_updates_skip_the_debounce() {
        let mut state = SyncState::default();
        let mut last_change = None;

        apply_intent(
            &mut state,
            &mut last_change,
            IntentKind::Play,
            &track_intent("t1", 1),
            "client-a",
            10_000,
            DEBOUNCE_MS,
        )
        .unwrap();

        // A seek on the same track 50ms later is not a track change.
        let outcome = apply_intent(
            &mut state,
            &mut last_change,
            IntentKind::Seek,
            &track_intent("t1", 2),
            "client-a",
            10_050,
            DEBOUNCE_MS,
        )
        .unwrap();

        assert_matches!(outcome, SyncOutcome::Applied(_));
    }

    #[test]
    fn seek_preserves_playback_status() {
        let mut state = SyncState::default();
        let mut last_change = None;

        apply_intent(
            &mut state,
            &mut last_change,
            IntentKind::Play,
            &track_intent("t1", 1),
            "client-a",
            0,
            DEBOUNCE_MS,
        )
        .unwrap();

        let mut seek = intent(2);
        seek.position_ms = 42_000;
        apply_intent(
            &mut state,
            &mut last_change,
            IntentKind::Seek,
            &seek,
            "client-a",
            100,
            DEBOUNCE_MS,
        )
        .unwrap();

        assert_eq!(state.status, PlaybackStatus::Playing);
        assert_eq!(state.position_ms, 42_000);
    }

    #[test]
    fn mark_finished_clears_track_and_bumps_version() {
        let mut state = SyncState {
            track_id: Some("t1".into()),
            status: PlaybackStatus::Playing,
            position_ms: 180_000,
            version: 3,
            ..SyncState::default()
        };

        let finished = mark_finished(&mut state, "client-a", 50_000);

        assert!(finished.track_id.is_none());
        assert_eq!(finished.status, PlaybackStatus::Stopped);
        assert_eq!(finished.version, 4);
        assert_eq!(finished.server_timestamp_ms, 50_000);
    }
}
