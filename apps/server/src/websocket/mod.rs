//! WebSocket transport
//!
//! The room-scoped pub/sub transport: connection registry, per-room event
//! fan-out, and the upgrade handler that drives a session's request loop.

pub mod broadcast;
pub mod connection;
pub mod handler;

pub use broadcast::RoomChannels;
pub use connection::ConnectionManager;
pub use handler::ws_handler;
