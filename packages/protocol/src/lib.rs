//! Wire protocol and shared state types for unison playback sync
//!
//! This crate defines everything that crosses the client/server boundary:
//! the tagged request/ack/event unions, the room and playback data model,
//! and the version arithmetic used to arbitrate concurrent writes. Both the
//! server and the device-side sync engine depend on it, so neither can
//! drift from the wire format.

pub mod messages;
pub mod state;
pub mod version;

pub use messages::{
    AckFrame, ClientFrame, ClientRequest, ErrorPayload, HeartbeatReport, PlaybackIntent,
    ResponseData, ServerEvent, ServerFrame, TimeSyncReply,
};
pub use state::{
    AdvanceDirection, ConnectionState, ControlMode, LoopMode, MemberInfo, PlaybackStatus,
    QueueEntry, QueueView, RoomSnapshot, SyncState, Track,
};
pub use version::{increment, is_newer, VERSION_CEILING};
