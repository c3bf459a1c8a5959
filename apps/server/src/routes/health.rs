//! Health check HTTP route handlers
//!
//! Provides endpoints for checking the health of the server and its
//! dependencies:
//! - `GET /health` - Simple liveness check (returns 200 OK)
//! - `GET /health/live` - Kubernetes-style liveness probe
//! - `GET /health/ready` - Readiness check (verifies the media resolver)

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};

use crate::AppState;

/// Create health check router
pub fn health_router() -> Router<AppState> {
    Router::new()
        .route("/", get(simple_health))
        .route("/live", get(liveness_probe))
        .route("/ready", get(readiness_probe))
}

/// Simple health check - always returns OK if the server is running
async fn simple_health() -> &'static str {
    "OK"
}

/// Liveness probe
///
/// Returns 200 if the server process is running; external dependencies
/// are readiness's problem.
async fn liveness_probe() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "alive",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Readiness probe - checks the media resolver and reports engine gauges
async fn readiness_probe(State(state): State<AppState>) -> impl IntoResponse {
    let media_ok = state.media.ping().await;

    let body = serde_json::json!({
        "status": if media_ok { "ready" } else { "degraded" },
        "rooms": state.registry.len(),
        "connections": state.connections.total(),
        "media_resolver": if media_ok { "ok" } else { "unreachable" },
    });

    let status = if media_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(body))
}
