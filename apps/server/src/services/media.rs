//! Media resolution service client
//!
//! The sync core never touches audio; it only asks the external resolver
//! to turn a track ID into metadata plus a playable locator, and stores
//! the locator opaquely. The trait seam lets tests swap the HTTP client
//! for a canned resolver.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use unison_protocol::Track;
use unison_shared_config::MediaResolverConfig;

/// Default connection timeout in seconds
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;

/// Media resolution errors
#[derive(Error, Debug)]
pub enum MediaError {
    /// The resolver does not know this track
    #[error("no playable media for track {0}")]
    NotFound(String),

    /// HTTP request failed
    #[error("media resolver request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Resolver answered with an unexpected status
    #[error("media resolver returned status {0}")]
    Status(u16),

    /// Resolver answered with a body we could not understand
    #[error("unparseable media resolver response: {0}")]
    InvalidResponse(String),
}

/// Result type for media resolution
pub type MediaResult<T> = Result<T, MediaError>;

/// Seam for resolving track IDs to playable tracks
#[async_trait]
pub trait MediaResolver: Send + Sync {
    /// Resolve a track ID to full metadata plus a playable locator
    async fn resolve(&self, track_id: &str) -> MediaResult<Track>;

    /// Whether the resolver is currently reachable
    async fn ping(&self) -> bool {
        true
    }
}

/// Wire shape of a resolver response
#[derive(Debug, Deserialize)]
struct ResolvedTrack {
    id: String,
    title: String,
    artist: String,
    duration_ms: u64,
    media_url: Option<String>,
}

impl From<ResolvedTrack> for Track {
    fn from(resolved: ResolvedTrack) -> Self {
        Track {
            id: resolved.id,
            title: resolved.title,
            artist: resolved.artist,
            duration_ms: resolved.duration_ms,
            media_url: resolved.media_url,
        }
    }
}

/// HTTP implementation of the media resolver
#[derive(Clone)]
pub struct HttpMediaResolver {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl std::fmt::Debug for HttpMediaResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpMediaResolver")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl HttpMediaResolver {
    pub fn new(config: &MediaResolverConfig) -> MediaResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS))
            .user_agent("unison-server/0.1")
            .build()?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http_client.get(format!("{}{}", self.base_url, path));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        builder
    }
}

#[async_trait]
impl MediaResolver for HttpMediaResolver {
    async fn resolve(&self, track_id: &str) -> MediaResult<Track> {
        let response = self.request(&format!("/tracks/{track_id}")).send().await?;

        match response.status() {
            status if status.is_success() => {}
            reqwest::StatusCode::NOT_FOUND => {
                return Err(MediaError::NotFound(track_id.to_string()));
            }
            status => return Err(MediaError::Status(status.as_u16())),
        }

        let resolved: ResolvedTrack = response
            .json()
            .await
            .map_err(|e| MediaError::InvalidResponse(e.to_string()))?;

        tracing::debug!(track_id = %track_id, "resolved track media");
        Ok(resolved.into())
    }

    async fn ping(&self) -> bool {
        match self.request("/health").send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "media resolver ping failed");
                false
            }
        }
    }
}
