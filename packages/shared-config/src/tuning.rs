//! Sync engine tuning knobs
//!
//! Every timing constant the sync engine depends on lives here rather than
//! at a use site, so deployments can tune them and tests can shrink them.
//! Values are loaded from environment variables with defaults matching the
//! shipped behavior.

use std::time::Duration;

use crate::{parse_env, ConfigError, ConfigResult};

/// Tunable thresholds and intervals for the playback sync engine
#[derive(Debug, Clone)]
pub struct SyncTuning {
    /// Leading-edge debounce window for track changes, in milliseconds
    pub track_debounce_ms: u64,

    /// Maximum acceptable age of a reconciliation snapshot, in milliseconds
    pub snapshot_max_age_ms: u64,

    /// Position drift beyond which reconciliation re-seeks, in milliseconds
    pub drift_threshold_ms: u64,

    /// Number of round-trip probes per clock sync run
    pub clock_probe_count: usize,

    /// Rolling window of retained clock samples
    pub clock_sample_window: usize,

    /// Probes with a round-trip delay above this are discarded, in milliseconds
    pub clock_max_delay_ms: u64,

    /// Interval between periodic clock re-syncs, in seconds
    pub clock_resync_interval_secs: u64,

    /// Interval of the member liveness sweep, in seconds
    pub heartbeat_interval_secs: u64,

    /// Silence beyond this marks a member disconnected, in seconds
    pub heartbeat_timeout_secs: u64,

    /// Soft cap on queued tracks per room
    pub queue_max_tracks: usize,

    /// Reconnection attempts before surfacing a terminal failure
    pub reconnect_max_attempts: u32,

    /// Timeout for ordinary requests, in seconds
    pub request_timeout_secs: u64,

    /// Timeout for room create/join requests, in seconds
    pub join_timeout_secs: u64,

    /// Rooms idle beyond this are destroyed, in seconds
    pub room_inactive_timeout_secs: u64,
}

impl SyncTuning {
    /// Load tuning from environment variables, falling back to defaults
    pub fn from_env() -> ConfigResult<Self> {
        let tuning = Self {
            track_debounce_ms: parse_env("SYNC_TRACK_DEBOUNCE_MS", 300)?,
            snapshot_max_age_ms: parse_env("SYNC_SNAPSHOT_MAX_AGE_MS", 60_000)?,
            drift_threshold_ms: parse_env("SYNC_DRIFT_THRESHOLD_MS", 3_000)?,
            clock_probe_count: parse_env("CLOCK_PROBE_COUNT", 10)?,
            clock_sample_window: parse_env("CLOCK_SAMPLE_WINDOW", 10)?,
            clock_max_delay_ms: parse_env("CLOCK_MAX_DELAY_MS", 500)?,
            clock_resync_interval_secs: parse_env("CLOCK_RESYNC_INTERVAL_SECS", 60)?,
            heartbeat_interval_secs: parse_env("HEARTBEAT_INTERVAL_SECS", 300)?,
            heartbeat_timeout_secs: parse_env("HEARTBEAT_TIMEOUT_SECS", 600)?,
            queue_max_tracks: parse_env("QUEUE_MAX_TRACKS", 50)?,
            reconnect_max_attempts: parse_env("RECONNECT_MAX_ATTEMPTS", 5)?,
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS", 5)?,
            join_timeout_secs: parse_env("JOIN_TIMEOUT_SECS", 10)?,
            room_inactive_timeout_secs: parse_env("ROOM_INACTIVE_TIMEOUT_SECS", 3600)?,
        };

        tuning.validate()?;
        Ok(tuning)
    }

    fn validate(&self) -> ConfigResult<()> {
        if self.heartbeat_timeout_secs <= self.heartbeat_interval_secs {
            return Err(ConfigError::ValidationError(format!(
                "HEARTBEAT_TIMEOUT_SECS ({}) must exceed HEARTBEAT_INTERVAL_SECS ({})",
                self.heartbeat_timeout_secs, self.heartbeat_interval_secs
            )));
        }
        if self.clock_probe_count == 0 {
            return Err(ConfigError::ValidationError(
                "CLOCK_PROBE_COUNT must be at least 1".to_string(),
            ));
        }
        if self.clock_sample_window == 0 {
            return Err(ConfigError::ValidationError(
                "CLOCK_SAMPLE_WINDOW must be at least 1".to_string(),
            ));
        }
        if self.queue_max_tracks == 0 {
            return Err(ConfigError::ValidationError(
                "QUEUE_MAX_TRACKS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn track_debounce(&self) -> Duration {
        Duration::from_millis(self.track_debounce_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }

    pub fn clock_resync_interval(&self) -> Duration {
        Duration::from_secs(self.clock_resync_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    pub fn room_inactive_timeout(&self) -> Duration {
        Duration::from_secs(self.room_inactive_timeout_secs)
    }
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            track_debounce_ms: 300,
            snapshot_max_age_ms: 60_000,
            drift_threshold_ms: 3_000,
            clock_probe_count: 10,
            clock_sample_window: 10,
            clock_max_delay_ms: 500,
            clock_resync_interval_secs: 60,
            heartbeat_interval_secs: 300,
            heartbeat_timeout_secs: 600,
            queue_max_tracks: 50,
            reconnect_max_attempts: 5,
            request_timeout_secs: 5,
            join_timeout_secs: 10,
            room_inactive_timeout_secs: 3600,
        }
    }
}
