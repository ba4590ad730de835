//! Hookwatch Relay - Streaming event-feed intermediary
//!
//! This server handles:
//! - Relaying a session's server-sent event feed from the origin listener
//! - Passing historical request pages through to the viewer
//! - Resolving the origin address from Redis with environment fallbacks

mod config;
mod error;
mod resolver;
mod routes;

use resolver::OriginResolver;
use std::net::SocketAddr;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,hookwatch_relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::from_env()?;
    tracing::info!("Starting Hookwatch relay on {}:{}", config.host, config.port);

    // Redis is optional: without it the relay runs on the environment fallback
    let redis_client = match &config.redis_url {
        Some(url) => {
            tracing::info!("Connecting to Redis...");
            match resolver::init_client(url).await {
                Ok(client) => Some(client),
                Err(e) => {
                    tracing::warn!("Redis unavailable, using environment origin only: {}", e);
                    None
                }
            }
        }
        None => None,
    };

    match &config.fallback_origin {
        Some(origin) => tracing::info!("Fallback origin: {}", origin),
        None if redis_client.is_none() => {
            tracing::warn!("No origin configured; feed requests will return 503")
        }
        None => {}
    }

    let resolver = OriginResolver::new(redis_client, config.fallback_origin.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let addr: SocketAddr = config.bind_addr().parse()?;
    let state = routes::AppState::new(config, resolver, shutdown_rx)?;
    let app = routes::app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Relay listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Shutting down, closing relayed feeds");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    Ok(())
}
