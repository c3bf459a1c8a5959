//! Room server configuration

use std::env;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use unison_shared_config::{CommonConfig, Environment, MediaResolverConfig, SyncTuning};

/// Server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Common configuration shared with other services
    pub common: CommonConfig,

    /// Server port (default: 8080)
    pub port: u16,

    /// CORS allowed origins (optional)
    pub cors_allowed_origins: Option<Vec<String>>,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// In production mode `CORS_ORIGINS` must be explicitly set; in
    /// development permissive CORS is used for convenience.
    pub fn from_env() -> Result<Self> {
        let environment = Environment::from_str(
            &env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
        )
        .unwrap_or_default();

        let cors_allowed_origins = env::var("CORS_ORIGINS").ok().map(|s| {
            s.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        });

        if environment.is_production()
            && cors_allowed_origins
                .as_ref()
                .map(|o| o.is_empty())
                .unwrap_or(true)
        {
            bail!(
                "CORS_ORIGINS environment variable is required in production. \
                 Set a comma-separated list of allowed origins."
            );
        }

        let common = CommonConfig::from_env()
            .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

        Ok(Self {
            common,

            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid PORT value")?,

            cors_allowed_origins,
        })
    }

    /// Get the sync tuning knobs
    pub fn tuning(&self) -> &SyncTuning {
        &self.common.tuning
    }

    /// Get the media resolver settings
    pub fn media(&self) -> &MediaResolverConfig {
        &self.common.media
    }

    /// Get environment mode
    pub fn environment(&self) -> Environment {
        self.common.environment
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.common.environment.is_production()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            common: CommonConfig::default(),
            port: 8080,
            cors_allowed_origins: None,
        }
    }
}
