//! Tagged message unions for the room transport
//!
//! Every frame is JSON with a `type` tag and a `payload`, validated at the
//! transport boundary before anything reaches the room engine. Requests
//! carry a client-chosen `request_id`; the server answers each one with an
//! [`AckFrame`] echoing that id, and separately pushes [`ServerEvent`]s
//! that are fire-and-forget.

use serde::{Deserialize, Serialize};

use crate::state::{
    AdvanceDirection, ControlMode, LoopMode, MemberInfo, QueueView, RoomSnapshot, SyncState,
};

// =============================================================================
// Client -> Server
// =============================================================================

/// Envelope for a client request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientFrame {
    /// Client-chosen id echoed back on the acknowledgement
    pub request_id: u64,

    #[serde(flatten)]
    pub request: ClientRequest,
}

/// Requests sent from client to server; each is acknowledged
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum ClientRequest {
    /// Create a room and become its host
    #[serde(rename = "room:create")]
    RoomCreate {
        #[serde(default)]
        control_mode: Option<ControlMode>,
    },

    /// Join an existing room by code
    #[serde(rename = "room:join")]
    RoomJoin { code: String },

    /// Rejoin after a disconnect, keeping the same member identity
    #[serde(rename = "room:rejoin")]
    RoomRejoin { code: String },

    /// Leave the current room
    #[serde(rename = "room:leave")]
    RoomLeave,

    /// Check whether a room code exists and can be joined
    #[serde(rename = "room:verify")]
    RoomVerify { code: String },

    /// Request a full state snapshot for reconciliation
    #[serde(rename = "room:state_snapshot")]
    RoomStateSnapshot,

    /// Add a track to the queue ("play next" insertion)
    #[serde(rename = "queue:add")]
    QueueAdd { track_id: String },

    /// Remove a track from the queue
    #[serde(rename = "queue:remove")]
    QueueRemove { track_id: String },

    /// Move an upcoming entry to another upcoming position
    #[serde(rename = "queue:reorder")]
    QueueReorder { from: usize, to: usize },

    /// Step the current track index forward or backward
    #[serde(rename = "queue:advance")]
    QueueAdvance { direction: AdvanceDirection },

    /// Set the current track index directly
    #[serde(rename = "queue:jump")]
    QueueJump { index: i64 },

    /// Change the queue loop mode
    #[serde(rename = "queue:loop_mode")]
    QueueLoopMode { mode: LoopMode },

    /// Start or resume playback
    #[serde(rename = "sync:play")]
    SyncPlay(PlaybackIntent),

    /// Pause playback
    #[serde(rename = "sync:pause")]
    SyncPause(PlaybackIntent),

    /// Seek within the current track
    #[serde(rename = "sync:seek")]
    SyncSeek(PlaybackIntent),

    /// Liveness heartbeat, optionally reporting clock sync measurements
    #[serde(rename = "sync:heartbeat")]
    SyncHeartbeat(HeartbeatReport),

    /// Clock synchronization probe; `client_send_ms` is the client's t0
    #[serde(rename = "time:sync_request")]
    TimeSyncRequest { client_send_ms: i64 },
}

/// Clock measurements piggybacked on a heartbeat
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct HeartbeatReport {
    /// One-way latency estimate from clock sync, if measured
    #[serde(default)]
    pub latency_ms: Option<f64>,

    /// Clock offset estimate from clock sync, if measured
    #[serde(default)]
    pub clock_offset_ms: Option<f64>,
}

/// A client's view of the playback state it wants to establish
///
/// `version` is the version the client last saw; the server compares it
/// against the stored version and never stores it verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlaybackIntent {
    #[serde(default)]
    pub track_id: Option<String>,

    pub position_ms: u64,

    #[serde(default)]
    pub rate: Option<f32>,

    #[serde(default)]
    pub volume: Option<f32>,

    pub version: u64,
}

// =============================================================================
// Server -> Client
// =============================================================================

/// Envelope for anything the server sends
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum ServerFrame {
    /// Acknowledgement of a client request
    #[serde(rename = "ack")]
    Ack(AckFrame),

    /// Fire-and-forget push event
    #[serde(rename = "event")]
    Event(ServerEvent),
}

/// Acknowledgement of a single request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AckFrame {
    /// Echo of the request's `request_id`
    pub request_id: u64,

    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ResponseData>,
}

impl AckFrame {
    pub fn ok(request_id: u64, data: Option<ResponseData>) -> Self {
        Self {
            request_id,
            success: true,
            error: None,
            data,
        }
    }

    pub fn err(request_id: u64, error: ErrorPayload) -> Self {
        Self {
            request_id,
            success: false,
            error: Some(error),
            data: None,
        }
    }
}

/// Typed payloads carried on successful acknowledgements
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", content = "body")]
pub enum ResponseData {
    /// Full room state (create/join/rejoin/state_snapshot)
    #[serde(rename = "room")]
    Room(RoomSnapshot),

    /// Room verification result
    #[serde(rename = "verified")]
    Verified { exists: bool, joinable: bool },

    /// Queue state after a queue mutation
    #[serde(rename = "queue")]
    Queue(QueueView),

    /// Sync state after an accepted playback intent
    #[serde(rename = "sync")]
    Sync(SyncState),

    /// Clock probe reply
    #[serde(rename = "time")]
    Time(TimeSyncReply),

    /// Heartbeat acknowledgement
    #[serde(rename = "heartbeat")]
    Heartbeat { server_time_ms: i64 },
}

/// Server timestamps for one clock probe
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct TimeSyncReply {
    /// Echo of the client's send time (t0)
    pub client_send_ms: i64,

    /// Server receive time (t1)
    pub server_receive_ms: i64,

    /// Server send time (t2)
    pub server_send_ms: i64,
}

/// Push events broadcast to room members
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum ServerEvent {
    /// Authoritative sync state changed
    #[serde(rename = "sync:state")]
    SyncStateChanged(SyncState),

    /// Queue contents or position changed
    #[serde(rename = "queue:updated")]
    QueueUpdated(QueueView),

    /// A member joined the room
    #[serde(rename = "member:joined")]
    MemberJoined(MemberInfo),

    /// A member left the room
    #[serde(rename = "member:left")]
    MemberLeft { client_id: String },

    /// A member missed the heartbeat timeout
    #[serde(rename = "member:timeout")]
    MemberTimeout { client_id: String },

    /// Unsolicited full snapshot (pushed on rejoin)
    #[serde(rename = "room:state_snapshot")]
    StateSnapshot(RoomSnapshot),
}

// =============================================================================
// Errors on the wire
// =============================================================================

/// Error carried on a failed acknowledgement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorPayload {
    /// Stable code for client-side handling
    pub code: String,

    /// Human-readable message
    pub message: String,
}

impl ErrorPayload {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn invalid_message(message: impl Into<String>) -> Self {
        Self::new("INVALID_MESSAGE", message)
    }

    pub fn invalid_room_code(code: &str) -> Self {
        Self::new("INVALID_ROOM_CODE", format!("malformed room code: {code}"))
    }

    pub fn room_not_found(code: &str) -> Self {
        Self::new("ROOM_NOT_FOUND", format!("room {code} does not exist"))
    }

    pub fn not_in_room() -> Self {
        Self::new("NOT_IN_ROOM", "this connection has not joined a room")
    }

    pub fn not_permitted() -> Self {
        Self::new(
            "NOT_PERMITTED",
            "room is host-only and this member is not the host",
        )
    }

    pub fn stale_version(incoming: u64, current: u64) -> Self {
        Self::new(
            "STALE_VERSION",
            format!("version {incoming} is not newer than {current}"),
        )
    }

    pub fn track_change_debounced() -> Self {
        Self::new(
            "TRACK_CHANGE_DEBOUNCED",
            "another track change was accepted within the debounce window",
        )
    }

    pub fn duplicate_track(track_id: &str) -> Self {
        Self::new(
            "DUPLICATE_TRACK",
            format!("track {track_id} is already queued"),
        )
    }

    pub fn queue_full(cap: usize) -> Self {
        Self::new("QUEUE_FULL", format!("queue is at its limit of {cap} tracks"))
    }

    pub fn index_out_of_range(index: i64, len: usize) -> Self {
        Self::new(
            "INDEX_OUT_OF_RANGE",
            format!("index {index} is out of range for a queue of {len}"),
        )
    }

    pub fn reorder_frozen() -> Self {
        Self::new(
            "REORDER_FROZEN",
            "only entries after the current track can be reordered",
        )
    }

    pub fn track_not_found(track_id: &str) -> Self {
        Self::new("TRACK_NOT_FOUND", format!("track {track_id} is not queued"))
    }

    pub fn media_unresolvable(track_id: &str) -> Self {
        Self::new(
            "MEDIA_UNRESOLVABLE",
            format!("no playable media for track {track_id}"),
        )
    }

    pub fn request_timeout() -> Self {
        Self::new("REQUEST_TIMEOUT", "the request did not complete in time")
    }

    pub fn not_connected() -> Self {
        Self::new("NOT_CONNECTED", "transport is not connected")
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }
}
