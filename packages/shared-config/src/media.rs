//! Media resolution service configuration

use crate::{get_env_or_default, parse_env, ConfigResult};

/// Configuration for the external media resolution service
///
/// The sync core only ever asks this service to turn a track ID into
/// metadata plus a playable locator; everything else about it is opaque.
#[derive(Debug, Clone)]
pub struct MediaResolverConfig {
    /// Base URL of the resolver service
    pub base_url: String,

    /// Optional API key sent as a bearer token
    pub api_key: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl MediaResolverConfig {
    /// Load resolver configuration from environment variables
    pub fn from_env() -> ConfigResult<Self> {
        Ok(Self {
            base_url: get_env_or_default("MEDIA_RESOLVER_URL", "http://localhost:9090"),
            api_key: std::env::var("MEDIA_RESOLVER_API_KEY")
                .ok()
                .filter(|s| !s.is_empty()),
            timeout_secs: parse_env("MEDIA_RESOLVER_TIMEOUT", 5)?,
        })
    }

    /// Create a configuration with a custom URL (useful for testing)
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout_secs: 5,
        }
    }
}

impl Default for MediaResolverConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9090".to_string(),
            api_key: None,
            timeout_secs: 5,
        }
    }
}
