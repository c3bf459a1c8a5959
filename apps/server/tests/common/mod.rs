//! Shared test infrastructure for server integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use unison_protocol::Track;
use unison_server::services::media::{MediaError, MediaResolver, MediaResult};
use unison_server::{AppState, Config};
use unison_test_utils::fixtures;

/// Resolver that answers every track id with fixture metadata
pub struct StubResolver;

#[async_trait]
impl MediaResolver for StubResolver {
    async fn resolve(&self, track_id: &str) -> MediaResult<Track> {
        if track_id.starts_with("missing") {
            return Err(MediaError::NotFound(track_id.to_string()));
        }
        Ok(fixtures::track(track_id))
    }
}

/// App state wired with default config and the stub resolver
pub fn app_state() -> AppState {
    AppState::new(Config::default(), Arc::new(StubResolver))
}

pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}
