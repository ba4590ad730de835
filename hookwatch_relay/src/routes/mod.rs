//! Route handlers for the relay

pub mod history;
pub mod relay;
pub mod session;

use crate::{config::Config, error::RelayError, resolver::OriginResolver};
use axum::{extract::State, routing::get, Json, Router};
use std::sync::Arc;
use tokio::sync::watch;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub resolver: Arc<OriginResolver>,
    /// Upstream client; one connection is opened per relayed subscriber
    pub http: reqwest::Client,
    /// Flips to `true` when the server shuts down
    pub shutdown: watch::Receiver<bool>,
}

impl AppState {
    pub fn new(
        config: Config,
        resolver: OriginResolver,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self, reqwest::Error> {
        // No overall timeout: feeds are long-lived
        let http = reqwest::Client::builder()
            .connect_timeout(config.upstream_connect_timeout)
            .build()?;

        Ok(Self {
            config: Arc::new(config),
            resolver: Arc::new(resolver),
            http,
            shutdown,
        })
    }

    /// Resolve the origin address or fail with `ServiceUnavailable`
    pub async fn origin(&self) -> Result<String, RelayError> {
        self.resolver
            .resolve()
            .await
            .ok_or(RelayError::ServiceUnavailable)
    }
}

/// Build the full application router
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/health", get(health_check))
        .merge(relay::router())
        .merge(history::router())
        .merge(session::router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint
async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let redis_status = match state.resolver.store_healthy().await {
        Some(true) => "ok",
        Some(false) => "error",
        None => "disabled",
    };
    let origin_status = if state.resolver.resolve().await.is_some() {
        "configured"
    } else {
        "missing"
    };
    let status = if redis_status != "error" && origin_status == "configured" {
        "healthy"
    } else {
        "degraded"
    };

    Json(serde_json::json!({
        "status": status,
        "redis": redis_status,
        "origin": origin_status,
        "origin_fallback": state.config.fallback_origin.is_some(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Turn a non-success origin response into an error carrying its status
pub async fn upstream_rejection(response: reqwest::Response) -> RelayError {
    let status = response.status();
    let message = response.text().await.unwrap_or_default();
    let message = if message.trim().is_empty() {
        status.canonical_reason().unwrap_or("Upstream error").to_string()
    } else {
        message.trim().to_string()
    };
    RelayError::UpstreamStatus { status, message }
}

/// Session ids are opaque but must be a single URL path segment
pub fn validate_session_id(session_id: &str) -> Result<(), RelayError> {
    let valid = !session_id.is_empty()
        && session_id.len() <= 128
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(RelayError::InvalidSession(session_id.to_string()))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;

    pub fn test_config() -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            redis_url: None,
            fallback_origin: None,
            upstream_connect_timeout: Duration::from_secs(2),
        }
    }

    /// State pointing at `origin`; the returned sender drives shutdown
    pub fn test_state(origin: Option<String>) -> (AppState, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let state = AppState::new(test_config(), OriginResolver::fixed(origin), rx).unwrap();
        (state, tx)
    }

    /// Serve a router on an ephemeral local port
    pub async fn spawn_server(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        addr
    }
}
