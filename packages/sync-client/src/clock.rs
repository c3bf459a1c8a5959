//! Clock synchronization
//!
//! NTP-style offset estimation against the server clock with no
//! privileged access to it. Each probe yields a (delay, offset) pair from
//! the four classic timestamps; probes slower than the delay ceiling are
//! discarded, and the effective offset is the median of the retained
//! window so one-sided network jitter cannot drag the estimate.
//!
//! `server_time_ms()` is synchronous and always answerable: before the
//! first successful sync the offset is simply 0.

use std::collections::VecDeque;
use std::sync::RwLock;

use unison_protocol::{ClientRequest, ResponseData};
use unison_shared_config::SyncTuning;

use crate::transport::{Transport, TransportError};

/// One round-trip measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSample {
    /// Estimated clock offset (server - local), milliseconds
    pub offset_ms: f64,

    /// Round-trip delay with server processing time removed, milliseconds
    pub delay_ms: f64,

    /// Local time when the sample was taken (Unix ms)
    pub sampled_at_ms: i64,
}

impl ClockSample {
    /// Compute a sample from the four probe timestamps:
    /// t0 client send, t1 server receive, t2 server send, t3 client receive
    pub fn from_timestamps(t0: i64, t1: i64, t2: i64, t3: i64) -> Self {
        let delay_ms = ((t3 - t0) - (t2 - t1)) as f64;
        let offset_ms = ((t1 - t0) as f64 + (t2 - t3) as f64) / 2.0;
        Self {
            offset_ms,
            delay_ms,
            sampled_at_ms: t3,
        }
    }
}

/// Per-connection clock offset estimator
#[derive(Debug)]
pub struct ClockSynchronizer {
    samples: RwLock<VecDeque<ClockSample>>,
    probe_count: usize,
    window: usize,
    max_delay_ms: f64,
}

impl ClockSynchronizer {
    pub fn new(tuning: &SyncTuning) -> Self {
        Self {
            samples: RwLock::new(VecDeque::with_capacity(tuning.clock_sample_window)),
            probe_count: tuning.clock_probe_count,
            window: tuning.clock_sample_window,
            max_delay_ms: tuning.clock_max_delay_ms as f64,
        }
    }

    /// Record one probe; returns the sample if it passed the delay filter
    pub fn record_probe(&self, t0: i64, t1: i64, t2: i64, t3: i64) -> Option<ClockSample> {
        let sample = ClockSample::from_timestamps(t0, t1, t2, t3);

        if sample.delay_ms > self.max_delay_ms || sample.delay_ms < 0.0 {
            tracing::debug!(
                delay_ms = sample.delay_ms,
                "discarding clock sample over delay ceiling"
            );
            return None;
        }

        let mut samples = self
            .samples
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if samples.len() == self.window {
            samples.pop_front();
        }
        samples.push_back(sample);
        Some(sample)
    }

    /// Effective offset: median of the retained samples, 0 before the
    /// first successful sync
    pub fn offset_ms(&self) -> f64 {
        let samples = self
            .samples
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        median(samples.iter().map(|s| s.offset_ms)).unwrap_or(0.0)
    }

    /// Smoothed one-way latency estimate: half the median delay
    pub fn latency_ms(&self) -> Option<f64> {
        let samples = self
            .samples
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        median(samples.iter().map(|s| s.delay_ms)).map(|d| d / 2.0)
    }

    /// Number of retained samples
    pub fn sample_count(&self) -> usize {
        self.samples
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Estimated server time right now; callable synchronously at any time
    pub fn server_time_ms(&self) -> i64 {
        self.server_time_from(chrono::Utc::now().timestamp_millis())
    }

    /// Estimated server time for a given local time
    pub fn server_time_from(&self, local_now_ms: i64) -> i64 {
        local_now_ms + self.offset_ms().round() as i64
    }

    /// Run one synchronization round: N independent round-trip probes
    ///
    /// Individual probe failures are tolerated; the round reports how
    /// many samples were accepted. It only fails outright when every
    /// probe failed, surfacing the last transport error.
    pub async fn run_sync_round(&self, transport: &dyn Transport) -> Result<usize, TransportError> {
        let mut accepted = 0;
        let mut last_error = None;

        for _ in 0..self.probe_count {
            let t0 = chrono::Utc::now().timestamp_millis();
            match transport
                .request(ClientRequest::TimeSyncRequest { client_send_ms: t0 })
                .await
            {
                Ok(Some(ResponseData::Time(reply))) => {
                    let t3 = chrono::Utc::now().timestamp_millis();
                    if self
                        .record_probe(t0, reply.server_receive_ms, reply.server_send_ms, t3)
                        .is_some()
                    {
                        accepted += 1;
                    }
                }
                Ok(other) => {
                    tracing::warn!(?other, "unexpected time sync reply");
                }
                Err(e) => {
                    tracing::debug!(error = %e, "clock probe failed");
                    last_error = Some(e);
                }
            }
        }

        if accepted == 0 {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        tracing::debug!(
            accepted,
            offset_ms = self.offset_ms(),
            "clock sync round complete"
        );
        Ok(accepted)
    }
}

/// Median of a sequence; averages the middle pair for even counts
fn median(values: impl Iterator<Item = f64>) -> Option<f64> {
    let mut sorted: Vec<f64> = values.collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}
