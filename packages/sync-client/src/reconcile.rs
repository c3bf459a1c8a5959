//! Reconciliation protocol
//!
//! After an outage or a return from the background, the device pulls a
//! full authoritative snapshot — never an incremental delta, since deltas
//! cannot be trusted to have survived the gap — validates its freshness
//! against the estimated server clock, and diffs it against the local
//! mirror across four independent axes. The caller applies exactly what
//! changed: a drift-only changeset re-seeks without restarting playback.
//!
//! Reconciliations never overlap: a trigger while one is in flight is
//! reported as skipped, not queued and not an error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use unison_protocol::{ClientRequest, PlaybackStatus, ResponseData, RoomSnapshot};
use unison_shared_config::SyncTuning;

use crate::clock::ClockSynchronizer;
use crate::state::LocalPlaybackState;
use crate::transport::{Transport, TransportError};

/// What caused a reconciliation run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileTrigger {
    /// App returned to the foreground after being backgrounded
    ForegroundReturn,

    /// Network connectivity recovered after an outage
    NetworkRecovered,
}

/// The four independent axes a snapshot can differ from local state on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Changeset {
    /// Different track id or current index
    pub track_changed: bool,

    /// Positions more than the drift threshold apart
    pub position_drift: bool,

    /// Playing vs paused mismatch
    pub play_state_changed: bool,

    /// Queue length or order differs
    pub queue_changed: bool,
}

impl Changeset {
    /// A changeset that applies everything (no prior local state)
    pub fn everything() -> Self {
        Self {
            track_changed: true,
            position_drift: true,
            play_state_changed: true,
            queue_changed: true,
        }
    }

    pub fn any(&self) -> bool {
        self.track_changed || self.position_drift || self.play_state_changed || self.queue_changed
    }
}

/// Result of one reconciliation attempt
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// The snapshot was applied; the changeset says what actually moved
    Applied {
        changeset: Changeset,
        summary: String,
        snapshot: RoomSnapshot,
    },

    /// Another reconciliation was already in flight; nothing happened
    Skipped,

    /// The snapshot was older than the staleness threshold; local state
    /// was retained untouched
    Stale { age_ms: i64 },
}

/// Reconciliation failures
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The server acked with something other than a room snapshot
    #[error("expected a room snapshot, got {0}")]
    UnexpectedResponse(&'static str),
}

/// Client-side reconciliation driver
pub struct Reconciler {
    clock: Arc<ClockSynchronizer>,
    staleness_ms: i64,
    drift_threshold_ms: u64,
    in_flight: AtomicBool,
}

/// Resets the in-flight flag when a run ends, however it ends
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Reconciler {
    pub fn new(clock: Arc<ClockSynchronizer>, tuning: &SyncTuning) -> Self {
        Self {
            clock,
            staleness_ms: tuning.snapshot_max_age_ms as i64,
            drift_threshold_ms: tuning.drift_threshold_ms,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Run one reconciliation against the server
    ///
    /// On success the local mirror is updated in place; on staleness or
    /// skip it is left exactly as it was.
    pub async fn reconcile(
        &self,
        transport: &dyn Transport,
        local: &mut Option<LocalPlaybackState>,
        trigger: ReconcileTrigger,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!(?trigger, "reconciliation already in flight, skipping");
            return Ok(ReconcileOutcome::Skipped);
        }
        let _guard = InFlightGuard(&self.in_flight);

        tracing::info!(?trigger, "reconciling against server snapshot");

        let snapshot = match transport.request(ClientRequest::RoomStateSnapshot).await? {
            Some(ResponseData::Room(snapshot)) => snapshot,
            Some(_) => return Err(ReconcileError::UnexpectedResponse("other payload")),
            None => return Err(ReconcileError::UnexpectedResponse("empty ack")),
        };

        let server_now = self.clock.server_time_ms();
        let age_ms = server_now.saturating_sub(snapshot.server_timestamp_ms);
        if age_ms > self.staleness_ms {
            tracing::warn!(
                age_ms,
                threshold_ms = self.staleness_ms,
                "snapshot too old to trust, keeping local state"
            );
            return Ok(ReconcileOutcome::Stale { age_ms });
        }

        let changeset = match local {
            None => Changeset::everything(),
            Some(local) => diff(local, &snapshot, server_now, self.drift_threshold_ms),
        };

        match local {
            Some(local) => local.apply_snapshot(&snapshot),
            None => *local = Some(LocalPlaybackState::from_snapshot(&snapshot)),
        }

        let summary = summarize(&changeset, &snapshot);
        tracing::info!(%summary, ?changeset, "reconciliation applied");

        Ok(ReconcileOutcome::Applied {
            changeset,
            summary,
            snapshot,
        })
    }
}

/// Diff the local mirror against an authoritative snapshot
fn diff(
    local: &LocalPlaybackState,
    snapshot: &RoomSnapshot,
    server_now_ms: i64,
    drift_threshold_ms: u64,
) -> Changeset {
    let track_changed = local.sync.track_id != snapshot.sync.track_id
        || local.current_track_index != snapshot.current_track_index;

    let server_state = LocalPlaybackState::from_snapshot(snapshot);
    let server_position = server_state.projected_position_ms(server_now_ms);
    let local_position = local.projected_position_ms(server_now_ms);
    let position_drift =
        server_position.abs_diff(local_position) > drift_threshold_ms;

    let play_state_changed = (local.sync.status == PlaybackStatus::Playing)
        != (snapshot.sync.status == PlaybackStatus::Playing);

    let snapshot_ids: Vec<&str> = snapshot
        .playlist
        .iter()
        .map(|e| e.track.id.as_str())
        .collect();
    let queue_changed = local.track_ids() != snapshot_ids;

    Changeset {
        track_changed,
        position_drift,
        play_state_changed,
        queue_changed,
    }
}

/// Human-readable one-liner for the changeset, track changes first
fn summarize(changeset: &Changeset, snapshot: &RoomSnapshot) -> String {
    if changeset.track_changed {
        return if snapshot.current_track_index >= 0 {
            format!(
                "room skipped to track {}",
                snapshot.current_track_index + 1
            )
        } else {
            "room finished its queue".to_string()
        };
    }
    if changeset.play_state_changed {
        return if snapshot.sync.status == PlaybackStatus::Playing {
            "room resumed".to_string()
        } else {
            "room paused".to_string()
        };
    }
    if changeset.position_drift {
        return "room position resynced".to_string();
    }
    if changeset.queue_changed {
        return "queue updated".to_string();
    }
    "already in sync".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use unison_protocol::{ControlMode, LoopMode, SyncState};
    use unison_test_utils::fixtures;

    fn local_from(snapshot: &RoomSnapshot) -> LocalPlaybackState {
        LocalPlaybackState::from_snapshot(snapshot)
    }

    fn snapshot_at(server_ts: i64) -> RoomSnapshot {
        RoomSnapshot {
            code: "123456".into(),
            sync: SyncState {
                track_id: Some("t1".into()),
                status: PlaybackStatus::Playing,
                position_ms: 10_000,
                server_timestamp_ms: server_ts,
                rate: 1.0,
                volume: 1.0,
                last_writer: None,
                version: 3,
            },
            playlist: vec![
                fixtures::queue_entry("t1"),
                fixtures::queue_entry("t2"),
                fixtures::queue_entry("t3"),
            ],
            current_track_index: 0,
            loop_mode: LoopMode::None,
            control_mode: ControlMode::Open,
            members: vec![],
            server_timestamp_ms: server_ts,
        }
    }

    const THRESHOLD: u64 = 3_000;

    #[test]
    fn identical_states_diff_to_nothing() {
        let snapshot = snapshot_at(100_000);
        let local = local_from(&snapshot);

        let changeset = diff(&local, &snapshot, 100_000, THRESHOLD);
        assert!(!changeset.any());
        assert_eq!(summarize(&changeset, &snapshot), "already in sync");
    }

    #[test]
    fn track_change_wins_the_summary() {
        let base = snapshot_at(100_000);
        let local = local_from(&base);

        let mut snapshot = snapshot_at(100_000);
        snapshot.sync.track_id = Some("t3".into());
        snapshot.current_track_index = 2;
        snapshot.sync.status = PlaybackStatus::Paused;

        let changeset = diff(&local, &snapshot, 100_000, THRESHOLD);
        assert!(changeset.track_changed);
        assert!(changeset.play_state_changed);
        // Track messaging outranks play-state messaging.
        assert_eq!(summarize(&changeset, &snapshot), "room skipped to track 3");
    }

    #[test]
    fn index_change_alone_is_a_track_change() {
        let base = snapshot_at(100_000);
        let local = local_from(&base);

        let mut snapshot = snapshot_at(100_000);
        snapshot.current_track_index = 1;

        let changeset = diff(&local, &snapshot, 100_000, THRESHOLD);
        assert!(changeset.track_changed);
    }

    #[test]
    fn small_drift_is_tolerated_large_drift_flags() {
        let base = snapshot_at(100_000);
        let local = local_from(&base);

        // Same stamp time, 2s apart: under the 3s threshold.
        let mut near = snapshot_at(100_000);
        near.sync.position_ms = 12_000;
        assert!(!diff(&local, &near, 100_000, THRESHOLD).position_drift);

        // 5s apart: over it.
        let mut far = snapshot_at(100_000);
        far.sync.position_ms = 15_000;
        let changeset = diff(&local, &far, 100_000, THRESHOLD);
        assert!(changeset.position_drift);
        assert!(!changeset.track_changed);
        assert_eq!(summarize(&changeset, &far), "room position resynced");
    }

    #[test]
    fn projection_prevents_false_drift_on_old_playing_snapshots() {
        // Local was stamped 10s before the snapshot; both are playing the
        // same track at the same real position. Without projection this
        // would read as 10s of drift.
        let mut old = snapshot_at(100_000);
        old.sync.position_ms = 10_000;
        let local = local_from(&old);

        let mut newer = snapshot_at(110_000);
        newer.sync.position_ms = 20_000;

        let changeset = diff(&local, &newer, 110_000, THRESHOLD);
        assert!(!changeset.position_drift);
    }

    #[test]
    fn pause_mismatch_flags_play_state() {
        let base = snapshot_at(100_000);
        let local = local_from(&base);

        let mut snapshot = snapshot_at(100_000);
        snapshot.sync.status = PlaybackStatus::Paused;

        let changeset = diff(&local, &snapshot, 100_000, THRESHOLD);
        assert!(changeset.play_state_changed);
        assert_eq!(summarize(&changeset, &snapshot), "room paused");
    }

    #[test]
    fn queue_reorder_flags_queue_changed() {
        let base = snapshot_at(100_000);
        let local = local_from(&base);

        let mut snapshot = snapshot_at(100_000);
        snapshot.playlist.swap(1, 2);

        let changeset = diff(&local, &snapshot, 100_000, THRESHOLD);
        assert!(changeset.queue_changed);
        assert!(!changeset.track_changed);
        assert_eq!(summarize(&changeset, &snapshot), "queue updated");
    }

    #[test]
    fn finished_queue_summary() {
        let base = snapshot_at(100_000);
        let local = local_from(&base);

        let mut snapshot = snapshot_at(100_000);
        snapshot.sync.track_id = None;
        snapshot.current_track_index = -1;

        let changeset = diff(&local, &snapshot, 100_000, THRESHOLD);
        assert!(changeset.track_changed);
        assert_eq!(summarize(&changeset, &snapshot), "room finished its queue");
    }
}
