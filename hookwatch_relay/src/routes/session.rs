//! Session creation passthrough

use crate::error::RelayError;
use crate::routes::{upstream_rejection, AppState};
use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use hookwatch_common::constants;

/// Build the session router
pub fn router() -> Router<AppState> {
    Router::new().route(constants::RELAY_SESSIONS_PATH, post(create_session))
}

/// Ask the origin for a new capture session
async fn create_session(State(state): State<AppState>) -> Result<Response, RelayError> {
    let origin = state.origin().await?;
    let url = format!("{}{}", origin, constants::ORIGIN_SESSION_PATH);

    let response = state.http.post(&url).send().await?;

    if !response.status().is_success() {
        let err = upstream_rejection(response).await;
        tracing::warn!("Session creation rejected: {}", err);
        return Err(err);
    }

    let status = response.status();
    let body = response.bytes().await?;
    tracing::info!(bytes = body.len(), "Created session through origin");

    Ok((status, [(header::CONTENT_TYPE, "application/json")], body).into_response())
}
