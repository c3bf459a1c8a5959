//! Client sync engine facade
//!
//! Owns the device's local mirror and the supporting machinery (clock
//! synchronizer, reconciler, reconnection orchestrator) and exposes the
//! room operations the host application calls. Every request runs with
//! an explicit timeout; every local mutation applies server-confirmed
//! results only.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use unison_protocol::{
    version, AdvanceDirection, ClientRequest, ControlMode, HeartbeatReport, LoopMode,
    PlaybackIntent, QueueView, ResponseData, RoomSnapshot, ServerEvent, SyncState,
};
use unison_shared_config::SyncTuning;

use crate::clock::ClockSynchronizer;
use crate::reconcile::{ReconcileError, Reconciler};
use crate::reconnect::{ConnectivityEvent, ReconnectOutcome, ReconnectionOrchestrator};
use crate::state::{LocalPlaybackState, PersistenceError, StatePersistence};
use crate::transport::{Transport, TransportError};

/// Which playback intent an operation sends
enum PlaybackOp {
    Play,
    Pause,
    Seek,
}

/// Device-side sync engine
pub struct SyncEngine {
    transport: Arc<dyn Transport>,
    clock: Arc<ClockSynchronizer>,
    reconciler: Arc<Reconciler>,
    orchestrator: ReconnectionOrchestrator,
    local: Mutex<Option<LocalPlaybackState>>,
    persistence: Option<Arc<dyn StatePersistence>>,
    request_timeout: Duration,
    join_timeout: Duration,
    heartbeat_interval: Duration,
    clock_resync_interval: Duration,
}

impl SyncEngine {
    pub fn new(transport: Arc<dyn Transport>, tuning: &SyncTuning) -> Self {
        let clock = Arc::new(ClockSynchronizer::new(tuning));
        let reconciler = Arc::new(Reconciler::new(clock.clone(), tuning));
        let orchestrator =
            ReconnectionOrchestrator::new(reconciler.clone(), tuning.reconnect_max_attempts);

        Self {
            transport,
            clock,
            reconciler,
            orchestrator,
            local: Mutex::new(None),
            persistence: None,
            request_timeout: tuning.request_timeout(),
            join_timeout: tuning.join_timeout(),
            heartbeat_interval: tuning.heartbeat_interval(),
            clock_resync_interval: tuning.clock_resync_interval(),
        }
    }

    /// Attach save/restore hooks for the local mirror
    pub fn with_persistence(mut self, persistence: Arc<dyn StatePersistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn clock(&self) -> &Arc<ClockSynchronizer> {
        &self.clock
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    /// Clone of the current local mirror
    pub async fn local_state(&self) -> Option<LocalPlaybackState> {
        self.local.lock().await.clone()
    }

    /// One request with an explicit timeout; a hung request resolves to
    /// a timeout error instead of waiting forever
    async fn request(
        &self,
        request: ClientRequest,
        timeout: Duration,
    ) -> Result<Option<ResponseData>, TransportError> {
        if !self.transport.is_connected() {
            return Err(TransportError::NotConnected);
        }

        match tokio::time::timeout(timeout, self.transport.request(request)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout),
        }
    }

    /// Create a room and become its host
    pub async fn create_room(
        &self,
        control_mode: Option<ControlMode>,
    ) -> Result<RoomSnapshot, TransportError> {
        let data = self
            .request(ClientRequest::RoomCreate { control_mode }, self.join_timeout)
            .await?;
        let snapshot = expect_room(data)?;

        *self.local.lock().await = Some(LocalPlaybackState::from_snapshot(&snapshot));
        self.resync_clock().await;

        Ok(snapshot)
    }

    /// Join a room by code
    pub async fn join_room(&self, code: &str) -> Result<RoomSnapshot, TransportError> {
        let data = self
            .request(
                ClientRequest::RoomJoin {
                    code: code.to_string(),
                },
                self.join_timeout,
            )
            .await?;
        let snapshot = expect_room(data)?;

        *self.local.lock().await = Some(LocalPlaybackState::from_snapshot(&snapshot));
        self.resync_clock().await;

        Ok(snapshot)
    }

    /// Rejoin after a disconnect; the refreshed state arrives as a
    /// pushed snapshot handled by [`SyncEngine::handle_event`]
    pub async fn rejoin_room(&self, code: &str) -> Result<(), TransportError> {
        self.request(
            ClientRequest::RoomRejoin {
                code: code.to_string(),
            },
            self.join_timeout,
        )
        .await?;
        self.resync_clock().await;
        Ok(())
    }

    /// Leave the current room and clear the mirror
    pub async fn leave_room(&self) -> Result<(), TransportError> {
        self.request(ClientRequest::RoomLeave, self.request_timeout)
            .await?;
        *self.local.lock().await = None;
        Ok(())
    }

    /// Check a room code before joining
    pub async fn verify_room(&self, code: &str) -> Result<(bool, bool), TransportError> {
        let data = self
            .request(
                ClientRequest::RoomVerify {
                    code: code.to_string(),
                },
                self.request_timeout,
            )
            .await?;
        match data {
            Some(ResponseData::Verified { exists, joinable }) => Ok((exists, joinable)),
            other => Err(unexpected(other)),
        }
    }

    pub async fn play(
        &self,
        track_id: Option<String>,
        position_ms: u64,
    ) -> Result<SyncState, TransportError> {
        self.send_playback(PlaybackOp::Play, track_id, position_ms)
            .await
    }

    pub async fn pause(&self, position_ms: u64) -> Result<SyncState, TransportError> {
        self.send_playback(PlaybackOp::Pause, None, position_ms).await
    }

    pub async fn seek(&self, position_ms: u64) -> Result<SyncState, TransportError> {
        self.send_playback(PlaybackOp::Seek, None, position_ms).await
    }

    async fn send_playback(
        &self,
        op: PlaybackOp,
        track_id: Option<String>,
        position_ms: u64,
    ) -> Result<SyncState, TransportError> {
        // The intent supersedes the version we last confirmed; the server
        // compares it and stores its own increment.
        let seen_version = {
            let local = self.local.lock().await;
            local
                .as_ref()
                .ok_or_else(|| TransportError::Failed("not in a room".to_string()))?
                .sync
                .version
        };

        let intent = PlaybackIntent {
            track_id,
            position_ms,
            rate: None,
            volume: None,
            version: version::increment(seen_version),
        };

        let request = match op {
            PlaybackOp::Play => ClientRequest::SyncPlay(intent),
            PlaybackOp::Pause => ClientRequest::SyncPause(intent),
            PlaybackOp::Seek => ClientRequest::SyncSeek(intent),
        };

        let data = self.request(request, self.request_timeout).await?;
        let state = match data {
            Some(ResponseData::Sync(state)) => state,
            other => return Err(unexpected(other)),
        };

        if let Some(local) = self.local.lock().await.as_mut() {
            local.sync = state.clone();
            local.last_applied_server_ms = state.server_timestamp_ms;
        }

        Ok(state)
    }

    pub async fn add_track(&self, track_id: &str) -> Result<QueueView, TransportError> {
        self.send_queue(ClientRequest::QueueAdd {
            track_id: track_id.to_string(),
        })
        .await
    }

    pub async fn remove_track(&self, track_id: &str) -> Result<QueueView, TransportError> {
        self.send_queue(ClientRequest::QueueRemove {
            track_id: track_id.to_string(),
        })
        .await
    }

    pub async fn reorder(&self, from: usize, to: usize) -> Result<QueueView, TransportError> {
        self.send_queue(ClientRequest::QueueReorder { from, to }).await
    }

    pub async fn advance(&self, direction: AdvanceDirection) -> Result<QueueView, TransportError> {
        self.send_queue(ClientRequest::QueueAdvance { direction }).await
    }

    pub async fn jump(&self, index: i64) -> Result<QueueView, TransportError> {
        self.send_queue(ClientRequest::QueueJump { index }).await
    }

    pub async fn set_loop_mode(&self, mode: LoopMode) -> Result<QueueView, TransportError> {
        self.send_queue(ClientRequest::QueueLoopMode { mode }).await
    }

    async fn send_queue(&self, request: ClientRequest) -> Result<QueueView, TransportError> {
        let data = self.request(request, self.request_timeout).await?;
        let view = match data {
            Some(ResponseData::Queue(view)) => view,
            other => return Err(unexpected(other)),
        };

        if let Some(local) = self.local.lock().await.as_mut() {
            local.playlist = view.playlist.clone();
            local.current_track_index = view.current_track_index;
            local.loop_mode = view.loop_mode;
        }

        Ok(view)
    }

    /// Liveness heartbeat carrying the latest clock measurements;
    /// returns the server time from the ack
    pub async fn heartbeat(&self) -> Result<i64, TransportError> {
        let report = HeartbeatReport {
            latency_ms: self.clock.latency_ms(),
            clock_offset_ms: (self.clock.sample_count() > 0).then(|| self.clock.offset_ms()),
        };

        let data = self
            .request(ClientRequest::SyncHeartbeat(report), self.request_timeout)
            .await?;
        match data {
            Some(ResponseData::Heartbeat { server_time_ms }) => Ok(server_time_ms),
            other => Err(unexpected(other)),
        }
    }

    /// Run one clock sync round now
    pub async fn sync_clock(&self) -> Result<usize, TransportError> {
        self.clock.run_sync_round(self.transport.as_ref()).await
    }

    /// Clock re-sync on (re)join; failures are logged, not fatal
    async fn resync_clock(&self) {
        if let Err(e) = self.clock.run_sync_round(self.transport.as_ref()).await {
            tracing::warn!(error = %e, "clock sync after join failed");
        }
    }

    /// Spawn the periodic clock re-sync task
    pub fn start_clock_resync(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(engine.clock_resync_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !engine.transport.is_connected() {
                    continue;
                }
                if let Err(e) = engine.clock.run_sync_round(engine.transport.as_ref()).await {
                    tracing::debug!(error = %e, "periodic clock sync failed");
                }
            }
        })
    }

    /// Spawn the periodic liveness heartbeat task
    ///
    /// Heartbeats only flow while a room is joined; failures are logged
    /// and retried at the next tick.
    pub fn start_heartbeat(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(engine.heartbeat_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if engine.local.lock().await.is_none() {
                    continue;
                }
                if let Err(e) = engine.heartbeat().await {
                    tracing::debug!(error = %e, "heartbeat failed");
                }
            }
        })
    }

    /// Apply a pushed server event to the local mirror
    ///
    /// Sync state pushes are version-guarded, so late or reordered
    /// deliveries can never regress the mirror.
    pub async fn handle_event(&self, event: ServerEvent) {
        let mut local = self.local.lock().await;

        match event {
            ServerEvent::SyncStateChanged(state) => {
                if let Some(local) = local.as_mut() {
                    local.apply_sync_state(&state, self.clock.server_time_ms());
                }
            }
            ServerEvent::QueueUpdated(view) => {
                if let Some(local) = local.as_mut() {
                    local.playlist = view.playlist;
                    local.current_track_index = view.current_track_index;
                    local.loop_mode = view.loop_mode;
                }
            }
            ServerEvent::StateSnapshot(snapshot) => match local.as_mut() {
                Some(local) => local.apply_snapshot(&snapshot),
                None => *local = Some(LocalPlaybackState::from_snapshot(&snapshot)),
            },
            ServerEvent::MemberJoined(_)
            | ServerEvent::MemberLeft { .. }
            | ServerEvent::MemberTimeout { .. } => {
                // Membership display is the host application's concern.
            }
        }
    }

    /// Feed a connectivity or lifecycle event through the orchestrator
    pub async fn on_connectivity(
        &self,
        event: ConnectivityEvent,
    ) -> Result<ReconnectOutcome, ReconcileError> {
        let mut local = self.local.lock().await;
        self.orchestrator
            .handle_event(self.transport.as_ref(), &mut local, event)
            .await
    }

    /// Save the mirror through the persistence hooks, if attached
    pub async fn save_state(&self) -> Result<(), PersistenceError> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };
        let local = self.local.lock().await;
        match local.as_ref() {
            Some(state) => persistence.save(state).await,
            None => Ok(()),
        }
    }

    /// Restore the mirror through the persistence hooks, if attached
    ///
    /// The restored state is a starting point only; the next
    /// reconciliation decides whether it still holds.
    pub async fn restore_state(&self) -> Result<bool, PersistenceError> {
        let Some(persistence) = &self.persistence else {
            return Ok(false);
        };
        match persistence.restore().await? {
            Some(state) => {
                *self.local.lock().await = Some(state);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

fn expect_room(data: Option<ResponseData>) -> Result<RoomSnapshot, TransportError> {
    match data {
        Some(ResponseData::Room(snapshot)) => Ok(snapshot),
        other => Err(unexpected(other)),
    }
}

fn unexpected(data: Option<ResponseData>) -> TransportError {
    TransportError::Failed(format!("unexpected ack payload: {data:?}"))
}
