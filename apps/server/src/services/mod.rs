//! External service clients
//!
//! Collaborators the sync core talks to but does not own. Each one sits
//! behind a trait so tests can swap in canned implementations.

pub mod media;

pub use media::{HttpMediaResolver, MediaError, MediaResolver};
