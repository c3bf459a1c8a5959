//! WebSocket upgrade handler and session request loop
//!
//! Each connection carries one session: requests arrive as tagged JSON
//! frames, every request is acknowledged, and room events are pushed
//! through a per-session pump that filters out self-originated events.
//!
//! Disconnect cleanup goes through the identity tracker, so an old
//! socket's teardown racing a fast reconnect never touches the membership
//! the new socket is carrying.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use unison_protocol::{
    AckFrame, ClientFrame, ClientRequest, ErrorPayload, HeartbeatReport, PlaybackIntent,
    QueueEntry, ResponseData, ServerEvent, ServerFrame, SyncState, TimeSyncReply,
};
use uuid::Uuid;

use crate::error::{ServerError, ServerResult};
use crate::rooms::registry::validate_room_code;
use crate::rooms::room::{Member, Room, RoomInner};
use crate::rooms::sync::{self, IntentKind, SyncOutcome};
use crate::util::now_ms;
use crate::websocket::broadcast::{frame_for_session, RoomEvent};
use crate::AppState;

/// Query parameters for the WebSocket handshake
#[derive(Debug, Deserialize)]
pub struct WsQueryParams {
    /// Stable client identity (client-generated, persisted per device)
    client_id: String,

    /// Human-readable display name
    #[serde(default = "default_display_name")]
    display_name: String,
}

fn default_display_name() -> String {
    "Listener".to_string()
}

/// Validate client ID format
fn validate_client_id(client_id: &str) -> Result<(), &'static str> {
    if client_id.is_empty() {
        return Err("client_id cannot be empty");
    }
    if client_id.len() > 128 {
        return Err("client_id must be at most 128 characters");
    }
    if !client_id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err("client_id contains invalid characters");
    }
    Ok(())
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsQueryParams>,
    State(state): State<AppState>,
) -> Response {
    if let Err(e) = validate_client_id(&params.client_id) {
        tracing::warn!(client_id = %params.client_id, "invalid client id: {}", e);
        let message = e.to_string();
        return ws.on_upgrade(move |mut socket| async move {
            let frame = ServerFrame::Ack(AckFrame::err(
                0,
                ErrorPayload::new("INVALID_CLIENT_ID", message),
            ));
            if let Ok(json) = serde_json::to_string(&frame) {
                let _ = socket.send(Message::Text(json)).await;
            }
            let _ = socket.close().await;
        });
    }

    let client_id = params.client_id.clone();
    let display_name = params.display_name.clone();

    tracing::info!(client_id = %client_id, display_name = %display_name, "WebSocket connection accepted");

    ws.on_upgrade(move |socket| handle_socket(socket, state, client_id, display_name))
}

/// Handle an established WebSocket connection
async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    client_id: String,
    display_name: String,
) {
    let session_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerFrame>();

    state
        .connections
        .add(session_id, &client_id, tx.clone(), now_ms());

    // If a previous session for this identity is still around, the new one
    // takes over. The old socket will observe its own close; membership is
    // untouched here.
    if let Some(old_session) = state.identity.register(&client_id, session_id, &display_name) {
        tracing::debug!(
            client_id = %client_id,
            old_session = %old_session,
            "new session superseded an existing one"
        );
    }

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Outbound pump: everything for this session funnels through the mpsc
    // channel (acks from the request loop, room events from the room pump).
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            match serde_json::to_string(&frame) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize outbound frame");
                }
            }
        }
    });

    let mut session = Session {
        state: state.clone(),
        session_id,
        client_id: client_id.clone(),
        display_name,
        tx: tx.clone(),
        room: None,
        pump: None,
    };

    // Inbound loop: parse, dispatch, acknowledge.
    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let received_ms = now_ms();
                state.connections.touch(session_id, received_ms);

                match serde_json::from_str::<ClientFrame>(&text) {
                    Ok(frame) => {
                        let ack = session
                            .dispatch(frame.request_id, frame.request, received_ms)
                            .await;
                        if session.tx.send(ServerFrame::Ack(ack)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(
                            error = %e,
                            session = %session_id,
                            "failed to parse client frame"
                        );
                        // request_id 0 marks an error we could not attribute
                        // to a specific request.
                        let ack = AckFrame::err(0, ErrorPayload::invalid_message(e.to_string()));
                        let _ = session.tx.send(ServerFrame::Ack(ack));
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                tracing::debug!(session = %session_id, "ignoring unsupported binary message");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                state.connections.touch(session_id, now_ms());
            }
            Ok(Message::Close(_)) => {
                tracing::debug!(session = %session_id, "WebSocket close received");
                break;
            }
            Err(e) => {
                tracing::debug!(error = %e, session = %session_id, "WebSocket error");
                break;
            }
        }
    }

    session.stop_pump();
    send_task.abort();
    state.connections.remove(session_id);

    // Disconnect handling is race-free: only the session that is still
    // current for this identity may mark the member disconnected. A
    // superseded session finds the identity already re-registered and
    // skips membership entirely.
    match state.identity.release_if_current(&client_id, session_id) {
        Some(record) => {
            if let Some(code) = record.room_code {
                disconnect_member(&state, &code, &client_id).await;
            }
            tracing::info!(client_id = %client_id, session = %session_id, "WebSocket connection closed");
        }
        None => {
            tracing::debug!(
                client_id = %client_id,
                session = %session_id,
                "superseded session disconnected; membership untouched"
            );
        }
    }
}

/// Mark a member disconnected after a confirmed-current transport loss
async fn disconnect_member(state: &AppState, code: &str, client_id: &str) {
    let room = match state.registry.get(code) {
        Ok(room) => room,
        Err(_) => return,
    };

    let now = now_ms();
    let marked = {
        let mut inner = room.lock().await;
        inner.last_activity_ms = now;
        inner.mark_disconnected(client_id, now)
    };

    if marked {
        state.channels.publish(
            code,
            None,
            ServerEvent::MemberLeft {
                client_id: client_id.to_string(),
            },
        );
    }
}

/// Forward filtered room events into the session's send queue
fn spawn_room_pump(
    mut rx: broadcast::Receiver<RoomEvent>,
    session_id: Uuid,
    tx: mpsc::UnboundedSender<ServerFrame>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    if let Some(frame) = frame_for_session(&event, session_id) {
                        if tx.send(frame).is_err() {
                            break;
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(session = %session_id, lagged = n, "room pump lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Per-connection request handling state
struct Session {
    state: AppState,
    session_id: Uuid,
    client_id: String,
    display_name: String,
    tx: mpsc::UnboundedSender<ServerFrame>,
    room: Option<Arc<Room>>,
    pump: Option<JoinHandle<()>>,
}

impl Session {
    async fn dispatch(
        &mut self,
        request_id: u64,
        request: ClientRequest,
        received_ms: i64,
    ) -> AckFrame {
        match self.handle_request(request, received_ms).await {
            Ok(data) => AckFrame::ok(request_id, data),
            Err(e) => {
                e.log();
                AckFrame::err(request_id, e.payload())
            }
        }
    }

    async fn handle_request(
        &mut self,
        request: ClientRequest,
        received_ms: i64,
    ) -> ServerResult<Option<ResponseData>> {
        match request {
            ClientRequest::RoomCreate { control_mode } => {
                self.create_room(control_mode.unwrap_or_default()).await
            }
            ClientRequest::RoomJoin { code } => self.join_room(&code, false).await,
            ClientRequest::RoomRejoin { code } => self.join_room(&code, true).await,
            ClientRequest::RoomLeave => {
                self.leave_room().await?;
                Ok(None)
            }
            ClientRequest::RoomVerify { code } => self.verify_room(&code).await,
            ClientRequest::RoomStateSnapshot => self.snapshot().await,
            ClientRequest::QueueAdd { track_id } => self.queue_add(&track_id).await,
            ClientRequest::QueueRemove { track_id } => {
                self.mutate_queue(|inner| inner.queue.remove(&track_id).map_err(Into::into))
                    .await
            }
            ClientRequest::QueueReorder { from, to } => {
                self.mutate_queue(|inner| inner.queue.reorder(from, to).map_err(Into::into))
                    .await
            }
            ClientRequest::QueueAdvance { direction } => {
                self.mutate_queue(|inner| Ok(inner.queue.advance(direction)))
                    .await
            }
            ClientRequest::QueueJump { index } => {
                self.mutate_queue(|inner| inner.queue.jump(index).map_err(Into::into))
                    .await
            }
            ClientRequest::QueueLoopMode { mode } => {
                self.mutate_queue(|inner| Ok(inner.queue.set_loop_mode(mode)))
                    .await
            }
            ClientRequest::SyncPlay(intent) => self.apply_sync(IntentKind::Play, intent).await,
            ClientRequest::SyncPause(intent) => self.apply_sync(IntentKind::Pause, intent).await,
            ClientRequest::SyncSeek(intent) => self.apply_sync(IntentKind::Seek, intent).await,
            ClientRequest::SyncHeartbeat(report) => self.heartbeat(report).await,
            ClientRequest::TimeSyncRequest { client_send_ms } => Ok(Some(ResponseData::Time(
                TimeSyncReply {
                    client_send_ms,
                    server_receive_ms: received_ms,
                    server_send_ms: now_ms(),
                },
            ))),
        }
    }

    fn current_room(&self) -> ServerResult<Arc<Room>> {
        self.room.clone().ok_or(ServerError::NotInRoom)
    }

    fn start_pump(&mut self, code: &str) {
        self.stop_pump();
        let rx = self.state.channels.subscribe(code);
        self.pump = Some(spawn_room_pump(rx, self.session_id, self.tx.clone()));
    }

    fn stop_pump(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }

    async fn create_room(
        &mut self,
        control_mode: unison_protocol::ControlMode,
    ) -> ServerResult<Option<ResponseData>> {
        if self.room.is_some() {
            self.leave_room().await?;
        }

        let now = now_ms();
        let host = Member::new(&self.client_id, &self.display_name, now);
        let room = self.state.registry.create(host, control_mode, now);

        self.state
            .identity
            .set_room(&self.client_id, Some(room.code().to_string()));
        self.start_pump(room.code());

        let snapshot = room.lock().await.snapshot(room.code(), now);
        self.room = Some(room);

        Ok(Some(ResponseData::Room(snapshot)))
    }

    async fn join_room(&mut self, code: &str, rejoin: bool) -> ServerResult<Option<ResponseData>> {
        let already_here = self
            .room
            .as_ref()
            .map(|r| r.code() == code)
            .unwrap_or(false);
        if self.room.is_some() && !already_here {
            self.leave_room().await?;
        }

        let room = self.state.registry.get(code)?;
        let now = now_ms();

        let (snapshot, announce) = {
            let mut inner = room.lock().await;
            let was_disconnected = inner
                .member(&self.client_id)
                .map(|m| m.connection != unison_protocol::ConnectionState::Connected)
                .unwrap_or(false);
            let is_new = inner.add_or_revive_member(&self.client_id, &self.display_name, now);
            inner.last_activity_ms = now;
            (inner.snapshot(room.code(), now), is_new || was_disconnected)
        };

        self.state
            .identity
            .set_room(&self.client_id, Some(code.to_string()));
        self.start_pump(room.code());

        if announce {
            if let Some(info) = snapshot
                .members
                .iter()
                .find(|m| m.client_id == self.client_id)
                .cloned()
            {
                self.state.channels.publish(
                    room.code(),
                    Some(self.session_id),
                    ServerEvent::MemberJoined(info),
                );
            }
        }

        self.room = Some(room);

        if rejoin {
            // Rejoining clients reconcile from the pushed snapshot; the ack
            // itself just confirms membership.
            let _ = self
                .tx
                .send(ServerFrame::Event(ServerEvent::StateSnapshot(snapshot)));
            Ok(None)
        } else {
            Ok(Some(ResponseData::Room(snapshot)))
        }
    }

    async fn leave_room(&mut self) -> ServerResult<()> {
        let room = self.current_room()?;
        let now = now_ms();

        let emptied = {
            let mut inner = room.lock().await;
            inner.remove_member(&self.client_id);
            inner.last_activity_ms = now;
            inner.members.is_empty()
        };

        self.state.channels.publish(
            room.code(),
            Some(self.session_id),
            ServerEvent::MemberLeft {
                client_id: self.client_id.clone(),
            },
        );

        if emptied {
            self.state.registry.remove(room.code());
            self.state.channels.drop_room(room.code());
        }

        self.stop_pump();
        self.state.identity.set_room(&self.client_id, None);
        self.room = None;
        Ok(())
    }

    async fn verify_room(&self, code: &str) -> ServerResult<Option<ResponseData>> {
        validate_room_code(code)?;

        let (exists, joinable) = match self.state.registry.get(code) {
            Ok(room) => {
                let connected = room.lock().await.connected_members();
                (true, connected > 0)
            }
            Err(ServerError::RoomNotFound(_)) => (false, false),
            Err(e) => return Err(e),
        };

        Ok(Some(ResponseData::Verified { exists, joinable }))
    }

    async fn snapshot(&self) -> ServerResult<Option<ResponseData>> {
        let room = self.current_room()?;
        let now = now_ms();
        let inner = room.lock().await;
        if !inner.is_member(&self.client_id) {
            return Err(ServerError::NotAMember(self.client_id.clone()));
        }
        Ok(Some(ResponseData::Room(inner.snapshot(room.code(), now))))
    }

    async fn queue_add(&mut self, track_id: &str) -> ServerResult<Option<ResponseData>> {
        let room = self.current_room()?;

        // Check permission before paying for resolution, and resolve
        // outside the room lock so one slow lookup cannot stall the room.
        room.lock().await.ensure_control(&self.client_id)?;
        let track = self.state.media.resolve(track_id).await?;

        let now = now_ms();
        let view = {
            let mut inner = room.lock().await;
            inner.ensure_control(&self.client_id)?;
            let entry = QueueEntry {
                entry_id: Uuid::new_v4(),
                track,
                added_by: self.client_id.clone(),
                added_at_ms: now,
            };
            let view = inner.queue.add(entry)?;
            inner.last_activity_ms = now;
            view
        };

        self.state.channels.publish(
            room.code(),
            Some(self.session_id),
            ServerEvent::QueueUpdated(view.clone()),
        );

        Ok(Some(ResponseData::Queue(view)))
    }

    /// Shared path for queue mutations that need no external I/O
    async fn mutate_queue<F>(&mut self, op: F) -> ServerResult<Option<ResponseData>>
    where
        F: FnOnce(&mut RoomInner) -> ServerResult<unison_protocol::QueueView>,
    {
        let room = self.current_room()?;
        let now = now_ms();

        let (view, finished_sync) = {
            let mut inner = room.lock().await;
            inner.ensure_control(&self.client_id)?;
            let view = op(&mut inner)?;
            let finished_sync = finish_if_exhausted(&mut inner, &self.client_id, now);
            inner.last_activity_ms = now;
            (view, finished_sync)
        };

        self.state.channels.publish(
            room.code(),
            Some(self.session_id),
            ServerEvent::QueueUpdated(view.clone()),
        );

        // When the queue ran out, everyone (including the originator, whose
        // local version would otherwise fall behind) learns the stopped
        // sync state.
        if let Some(sync_state) = finished_sync {
            self.state
                .channels
                .publish(room.code(), None, ServerEvent::SyncStateChanged(sync_state));
        }

        Ok(Some(ResponseData::Queue(view)))
    }

    async fn apply_sync(
        &mut self,
        kind: IntentKind,
        intent: PlaybackIntent,
    ) -> ServerResult<Option<ResponseData>> {
        let room = self.current_room()?;
        let now = now_ms();
        let debounce_ms = self.state.config.tuning().track_debounce_ms;

        let outcome = {
            let mut inner = room.lock().await;
            inner.ensure_control(&self.client_id)?;

            let RoomInner {
                sync,
                last_track_change_ms,
                ..
            } = &mut *inner;
            let outcome = sync::apply_intent(
                sync,
                last_track_change_ms,
                kind,
                &intent,
                &self.client_id,
                now,
                debounce_ms,
            )?;
            inner.last_activity_ms = now;
            outcome
        };

        if let SyncOutcome::Applied(state) = &outcome {
            self.state.channels.publish(
                room.code(),
                Some(self.session_id),
                ServerEvent::SyncStateChanged(state.clone()),
            );
        }

        Ok(Some(ResponseData::Sync(outcome.state().clone())))
    }

    async fn heartbeat(&mut self, report: HeartbeatReport) -> ServerResult<Option<ResponseData>> {
        let room = self.current_room()?;
        let now = now_ms();

        {
            let mut inner = room.lock().await;
            let member = inner
                .member_mut(&self.client_id)
                .ok_or_else(|| ServerError::NotAMember(self.client_id.clone()))?;
            member.last_heartbeat_ms = now;
            member.touch(now);
            if report.latency_ms.is_some() {
                member.latency_ms = report.latency_ms;
            }
            if report.clock_offset_ms.is_some() {
                member.clock_offset_ms = report.clock_offset_ms;
            }
            // A heartbeat from a member the sweeper gave up on revives it.
            if member.connection == unison_protocol::ConnectionState::Disconnected {
                member.connection = unison_protocol::ConnectionState::Connected;
            }
        }

        Ok(Some(ResponseData::Heartbeat { server_time_ms: now }))
    }
}

/// Stop the sync state when the queue has reached its terminal -1 index
fn finish_if_exhausted(inner: &mut RoomInner, writer: &str, now: i64) -> Option<SyncState> {
    if inner.queue.current_index() == -1
        && inner.sync.status != unison_protocol::PlaybackStatus::Stopped
    {
        Some(sync::mark_finished(&mut inner.sync, writer, now))
    } else {
        None
    }
}
