//! Reconnection orchestration
//!
//! Two independent observers — transport connectivity and app lifecycle —
//! feed reconciliation triggers into the engine. Reconnection itself is
//! bounded: a fixed number of attempts with exponentially increasing
//! delay, after which the orchestrator parks in a persistent failed state
//! that only an explicit user retry can leave.
//!
//! A reconciliation or reconnection in progress is never aborted by a new
//! trigger; new triggers coalesce into the running attempt or are
//! skipped.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::reconcile::{ReconcileError, ReconcileOutcome, ReconcileTrigger, Reconciler};
use crate::state::LocalPlaybackState;
use crate::transport::Transport;

/// Base delay for exponential reconnect backoff, in seconds
const RECONNECT_BASE_DELAY_SECS: f64 = 1.0;

/// Exponent cap so the delay stops growing
const RECONNECT_MAX_EXPONENT: u32 = 5;

/// Events the host application feeds into the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    /// OS reports network connectivity restored
    Online,

    /// OS reports network connectivity lost
    Offline,

    /// App returned to the foreground
    AppForegrounded,

    /// App was backgrounded
    AppBackgrounded,

    /// The user explicitly asked to retry after a terminal failure
    UserRetry,
}

/// Where the orchestrator currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Connected,
    Offline,
    Reconnecting { attempt: u32 },

    /// Attempts exhausted; waiting for an explicit user retry
    Failed,
}

/// What an event ended up doing
#[derive(Debug)]
pub enum ReconnectOutcome {
    /// Connected (or already connected) and reconciliation ran
    Reconciled(ReconcileOutcome),

    /// Nothing to do for this event in the current phase
    Ignored,

    /// A reconnection loop was already running; this trigger coalesced
    Coalesced,

    /// All attempts failed; now parked in the terminal failed state
    Failed { attempts: u32 },
}

/// Exponential backoff delay before reconnect attempt `attempt` (0-based)
pub fn reconnect_delay(attempt: u32) -> Duration {
    let exponent = attempt.min(RECONNECT_MAX_EXPONENT);
    Duration::from_secs_f64(RECONNECT_BASE_DELAY_SECS * 2_f64.powi(exponent as i32))
}

/// Drives reconnection and decides when reconciliation runs
pub struct ReconnectionOrchestrator {
    reconciler: Arc<Reconciler>,
    max_attempts: u32,
    phase: Mutex<ConnectionPhase>,
}

impl ReconnectionOrchestrator {
    pub fn new(reconciler: Arc<Reconciler>, max_attempts: u32) -> Self {
        Self {
            reconciler,
            max_attempts,
            phase: Mutex::new(ConnectionPhase::Connected),
        }
    }

    pub async fn phase(&self) -> ConnectionPhase {
        *self.phase.lock().await
    }

    /// Feed one observer event through the orchestrator
    pub async fn handle_event(
        &self,
        transport: &dyn Transport,
        local: &mut Option<LocalPlaybackState>,
        event: ConnectivityEvent,
    ) -> Result<ReconnectOutcome, ReconcileError> {
        match event {
            ConnectivityEvent::AppBackgrounded => Ok(ReconnectOutcome::Ignored),

            ConnectivityEvent::Offline => {
                let mut phase = self.phase.lock().await;
                if *phase != ConnectionPhase::Failed {
                    *phase = ConnectionPhase::Offline;
                }
                tracing::info!("connectivity lost");
                Ok(ReconnectOutcome::Ignored)
            }

            ConnectivityEvent::AppForegrounded => {
                // Never reconcile while offline; the Online event will
                // take care of it once connectivity is confirmed.
                if !transport.is_connected() {
                    tracing::debug!("foregrounded while offline, skipping reconciliation");
                    return Ok(ReconnectOutcome::Ignored);
                }
                let outcome = self
                    .reconciler
                    .reconcile(transport, local, ReconcileTrigger::ForegroundReturn)
                    .await?;
                Ok(ReconnectOutcome::Reconciled(outcome))
            }

            ConnectivityEvent::Online => {
                self.reconnect(transport, local, false).await
            }

            ConnectivityEvent::UserRetry => {
                self.reconnect(transport, local, true).await
            }
        }
    }

    /// Bounded reconnection loop followed by exactly one reconciliation
    async fn reconnect(
        &self,
        transport: &dyn Transport,
        local: &mut Option<LocalPlaybackState>,
        user_initiated: bool,
    ) -> Result<ReconnectOutcome, ReconcileError> {
        {
            let mut phase = self.phase.lock().await;
            match *phase {
                ConnectionPhase::Reconnecting { .. } => {
                    tracing::debug!("reconnect already running, coalescing trigger");
                    return Ok(ReconnectOutcome::Coalesced);
                }
                // Leaving the terminal failed state takes an explicit
                // user retry; a stray Online event does not.
                ConnectionPhase::Failed if !user_initiated => {
                    tracing::debug!("in failed state, waiting for user retry");
                    return Ok(ReconnectOutcome::Ignored);
                }
                _ => {
                    *phase = ConnectionPhase::Reconnecting { attempt: 0 };
                }
            }
        }

        for attempt in 1..=self.max_attempts {
            {
                let mut phase = self.phase.lock().await;
                *phase = ConnectionPhase::Reconnecting { attempt };
            }

            match transport.connect().await {
                Ok(()) => {
                    *self.phase.lock().await = ConnectionPhase::Connected;
                    tracing::info!(attempt, "reconnected");

                    let outcome = self
                        .reconciler
                        .reconcile(transport, local, ReconcileTrigger::NetworkRecovered)
                        .await?;
                    return Ok(ReconnectOutcome::Reconciled(outcome));
                }
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "reconnect attempt failed");
                    if attempt < self.max_attempts {
                        tokio::time::sleep(reconnect_delay(attempt - 1)).await;
                    }
                }
            }
        }

        *self.phase.lock().await = ConnectionPhase::Failed;
        tracing::error!(
            attempts = self.max_attempts,
            "reconnection attempts exhausted, user retry required"
        );
        Ok(ReconnectOutcome::Failed {
            attempts: self.max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_grows_exponentially_then_caps() {
        assert_eq!(reconnect_delay(0), Duration::from_secs(1));
        assert_eq!(reconnect_delay(1), Duration::from_secs(2));
        assert_eq!(reconnect_delay(2), Duration::from_secs(4));
        assert_eq!(reconnect_delay(5), Duration::from_secs(32));
        // Capped past the max exponent.
        assert_eq!(reconnect_delay(9), Duration::from_secs(32));
    }
}
