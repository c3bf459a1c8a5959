//! HTTP route handlers
//!
//! The HTTP surface is intentionally small; the transport for everything
//! playback-related is the WebSocket protocol.

pub mod health;

pub use health::health_router;
