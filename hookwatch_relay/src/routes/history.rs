//! Historical fetch passthrough

use crate::error::RelayError;
use crate::routes::{upstream_rejection, validate_session_id, AppState};
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use hookwatch_common::constants;
use serde::Deserialize;

/// Pagination forwarded to the origin
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl HistoryQuery {
    fn validated_limit(&self) -> usize {
        self.limit
            .unwrap_or(constants::DEFAULT_HISTORY_LIMIT)
            .clamp(1, constants::MAX_HISTORY_LIMIT)
    }
}

/// Build the history router
pub fn router() -> Router<AppState> {
    Router::new().route(
        &format!("{}/{{session_id}}", constants::RELAY_REQUESTS_PREFIX),
        get(fetch_requests),
    )
}

/// Fetch one page of a session's captured requests from the origin
async fn fetch_requests(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Response, RelayError> {
    validate_session_id(&session_id)?;

    let origin = state.origin().await?;
    let url = format!(
        "{}{}/{}",
        origin,
        constants::ORIGIN_REQUESTS_PREFIX,
        session_id
    );
    let limit = query.validated_limit();
    let offset = query.offset.unwrap_or(0);

    let response = state
        .http
        .get(&url)
        .query(&[("limit", limit), ("offset", offset)])
        .send()
        .await?;

    if !response.status().is_success() {
        let err = upstream_rejection(response).await;
        tracing::warn!(session_id = %session_id, "History fetch rejected: {}", err);
        return Err(err);
    }

    let body = response.bytes().await?;
    tracing::debug!(session_id = %session_id, bytes = body.len(), "Relayed history page");

    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}
