//! Unison room server library
//!
//! Exposes the server's components for integration tests and embeds; the
//! binary in `main.rs` wires them to a listening socket.

use std::sync::Arc;

use axum::{routing::get, Router};

pub mod config;
pub mod error;
pub mod rooms;
pub mod routes;
pub mod services;
pub mod util;
pub mod websocket;

pub use config::Config;
pub use error::{ServerError, ServerResult};

use rooms::{IdentityTracker, RoomRegistry};
use services::MediaResolver;
use websocket::{ConnectionManager, RoomChannels};

/// Shared application state handed to every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub registry: RoomRegistry,
    pub channels: RoomChannels,
    pub connections: ConnectionManager,
    pub identity: IdentityTracker,
    pub media: Arc<dyn MediaResolver>,
}

impl AppState {
    pub fn new(config: Config, media: Arc<dyn MediaResolver>) -> Self {
        let registry = RoomRegistry::new(config.tuning().queue_max_tracks);
        Self {
            config: Arc::new(config),
            registry,
            channels: RoomChannels::new(),
            connections: ConnectionManager::new(),
            identity: IdentityTracker::new(),
            media,
        }
    }
}

/// Build the server router: the WebSocket transport plus health routes
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/ws", get(websocket::ws_handler))
        .nest("/health", routes::health_router())
        .with_state(state)
}

async fn root() -> &'static str {
    "unison room server"
}
