use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use unison_server::rooms::liveness;
use unison_server::services::HttpMediaResolver;
use unison_server::{build_router, AppState, Config};

/// Build the CORS layer based on configuration.
///
/// In production the allowed origins come from `CORS_ORIGINS` (required);
/// in development permissive CORS is used for convenience.
fn build_cors_layer(config: &Config) -> CorsLayer {
    match &config.cors_allowed_origins {
        Some(origins) if !origins.is_empty() => {
            let allowed_origins: Vec<axum::http::HeaderValue> = origins
                .iter()
                .filter_map(|origin| {
                    origin.parse().ok().or_else(|| {
                        tracing::warn!("Invalid CORS origin '{}', skipping", origin);
                        None
                    })
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::error!("No valid CORS origins configured, CORS requests will be rejected");
                CorsLayer::new()
            } else {
                tracing::info!(
                    "CORS configured with {} allowed origin(s)",
                    allowed_origins.len()
                );
                CorsLayer::new().allow_origin(allowed_origins)
            }
        }
        _ => {
            tracing::warn!(
                "Using permissive CORS in development mode. \
                 Set CORS_ORIGINS for production-like behavior."
            );
            CorsLayer::permissive()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unison_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting unison room server on port {}", config.port);

    let cors_layer = build_cors_layer(&config);

    // Media resolution service client
    let media = Arc::new(HttpMediaResolver::new(config.media())?);
    tracing::info!(
        resolver = %config.media().base_url,
        "media resolver initialized"
    );

    let tuning = Arc::new(config.tuning().clone());
    let port = config.port;
    let state = AppState::new(config, media);

    // Liveness sweeper: times out silent members and reaps idle rooms
    liveness::spawn_sweeper(state.registry.clone(), state.channels.clone(), tuning);
    tracing::info!("liveness sweeper started");

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
