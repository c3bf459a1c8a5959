//! Mock media resolution server
//!
//! Wiremock-backed stand-in for the external media resolution service,
//! so server tests can exercise queue:add without network dependencies.

use unison_protocol::Track;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// A running mock media resolver
pub struct MockMediaServer {
    server: MockServer,
}

impl MockMediaServer {
    /// Start the mock server and stub its health endpoint
    pub async fn start() -> Self {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        Self { server }
    }

    /// Base URL to point a resolver config at
    pub fn url(&self) -> String {
        self.server.uri()
    }

    /// Stub a successful resolution for `track`
    pub async fn mock_track(&self, track: &Track) {
        Mock::given(method("GET"))
            .and(path(format!("/tracks/{}", track.id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": track.id,
                "title": track.title,
                "artist": track.artist,
                "duration_ms": track.duration_ms,
                "media_url": track.media_url,
            })))
            .mount(&self.server)
            .await;
    }

    /// Stub a 404 for an unknown track id
    pub async fn mock_missing_track(&self, track_id: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/tracks/{track_id}")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&self.server)
            .await;
    }

    /// Stub resolver outage: every track request answers 503
    pub async fn mock_outage(&self) {
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&self.server)
            .await;
    }
}
