//! Room state engine
//!
//! Everything that owns or mutates authoritative room state: the room
//! registry, the queue state machine, the sync coordinator, connection
//! identity tracking, and the liveness sweeper. All mutations for one
//! room are serialized behind that room's lock; rooms never contend with
//! each other.

pub mod identity;
pub mod liveness;
pub mod queue;
pub mod registry;
pub mod room;
pub mod sync;

pub use identity::IdentityTracker;
pub use registry::RoomRegistry;
pub use room::{Member, Room};
