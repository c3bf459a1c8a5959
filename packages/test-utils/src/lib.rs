//! Shared test utilities for the unison workspace
//!
//! This crate provides protocol fixture builders and a mock media
//! resolution server, usable across the server and sync-client test
//! suites without network dependencies.
//!
//! # Example
//!
//! ```rust,ignore
//! use unison_test_utils::{fixtures, MockMediaServer};
//!
//! #[tokio::test]
//! async fn test_with_mocks() {
//!     let media = MockMediaServer::start().await;
//!     media.mock_track(&fixtures::track("t1")).await;
//!
//!     // Point a MediaResolverConfig at media.url()
//! }
//! ```

pub mod fixtures;
mod media;

pub use media::MockMediaServer;
