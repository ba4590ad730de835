//! Streaming event-feed relay
//!
//! Each downstream subscriber gets exactly one upstream connection to the
//! origin feed. Chunks are forwarded as they arrive; nothing is parsed,
//! coalesced or retried here. Dropping the downstream body drops the
//! upstream read with it.

use crate::error::RelayError;
use crate::routes::{validate_session_id, AppState};
use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use hookwatch_common::constants;
use std::pin::Pin;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// How long to wait for an error body from a failed upstream
const ERROR_BODY_TIMEOUT: Duration = Duration::from_secs(2);

/// Longest upstream error message passed downstream
const MAX_ERROR_MESSAGE: usize = 512;

/// Byte stream handed to the downstream response
pub type RelayStream = Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>;

/// Build the relay router
pub fn router() -> Router<AppState> {
    Router::new().route(
        &format!("{}/{{session_id}}", constants::RELAY_STREAM_PREFIX),
        get(stream_handler),
    )
}

/// Relay the origin feed of one session
async fn stream_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, RelayError> {
    validate_session_id(&session_id)?;

    let stream = relay(&state, &session_id, state.shutdown.clone()).await?;

    Ok((
        [
            (header::CONTENT_TYPE, constants::EVENT_STREAM_CONTENT_TYPE),
            (header::CACHE_CONTROL, "no-cache, no-transform"),
            (
                header::HeaderName::from_static(constants::ACCEL_BUFFERING_HEADER),
                "no",
            ),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

/// Open the upstream feed for `session_id` and return its byte stream.
///
/// Fails before any socket is opened when no origin is configured, and
/// with the upstream's own status when the origin rejects the request.
/// The stream ends when the origin closes, when `cancel` flips to `true`
/// (or its sender goes away), or when the caller drops it.
pub async fn relay(
    state: &AppState,
    session_id: &str,
    mut cancel: watch::Receiver<bool>,
) -> Result<RelayStream, RelayError> {
    let origin = state.origin().await?;
    let url = format!("{}{}/{}", origin, constants::ORIGIN_STREAM_PREFIX, session_id);

    tracing::debug!(session_id = %session_id, url = %url, "Opening upstream feed");

    let response = state
        .http
        .get(&url)
        .header(header::ACCEPT, constants::EVENT_STREAM_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache")
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let message = error_message(response, status).await;
        tracing::warn!(
            session_id = %session_id,
            status = status.as_u16(),
            "Upstream feed rejected: {}",
            message
        );
        return Err(RelayError::UpstreamStatus { status, message });
    }

    tracing::info!(session_id = %session_id, "Relaying event feed");

    let mut upstream = response.bytes_stream();
    let mut guard = RelayGuard::new(session_id.to_string());

    let stream = async_stream::stream! {
        if *cancel.borrow() {
            guard.finish("cancelled");
            return;
        }

        loop {
            let step = tokio::select! {
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        Step::Cancelled
                    } else {
                        continue;
                    }
                }
                chunk = upstream.next() => Step::Chunk(chunk),
            };

            match step {
                Step::Cancelled => {
                    guard.finish("cancelled");
                    break;
                }
                Step::Chunk(Some(Ok(chunk))) => {
                    guard.record(chunk.len());
                    yield Ok(chunk);
                }
                Step::Chunk(Some(Err(e))) => {
                    guard.finish("upstream error");
                    tracing::warn!(session_id = %guard.session_id, "Upstream feed error: {}", e);
                    yield Err(e);
                    break;
                }
                Step::Chunk(None) => {
                    guard.finish("origin closed");
                    break;
                }
            }
        }
    };

    Ok(Box::pin(stream))
}

enum Step {
    Cancelled,
    Chunk(Option<Result<Bytes, reqwest::Error>>),
}

/// Logs the end of a relayed stream, whichever side ended it
struct RelayGuard {
    session_id: String,
    started: Instant,
    chunks: u64,
    bytes: u64,
    reason: &'static str,
}

impl RelayGuard {
    fn new(session_id: String) -> Self {
        Self {
            session_id,
            started: Instant::now(),
            chunks: 0,
            bytes: 0,
            // Overwritten unless the body is dropped mid-stream
            reason: "downstream disconnected",
        }
    }

    fn finish(&mut self, reason: &'static str) {
        self.reason = reason;
    }

    fn record(&mut self, len: usize) {
        self.chunks += 1;
        self.bytes += len as u64;
    }
}

impl Drop for RelayGuard {
    fn drop(&mut self) {
        tracing::info!(
            session_id = %self.session_id,
            chunks = self.chunks,
            bytes = self.bytes,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Relay closed: {}",
            self.reason
        );
    }
}

/// Descriptive message for a failed upstream response
async fn error_message(response: reqwest::Response, status: http::StatusCode) -> String {
    let fallback = || {
        status
            .canonical_reason()
            .unwrap_or("Upstream error")
            .to_string()
    };

    match tokio::time::timeout(ERROR_BODY_TIMEOUT, response.text()).await {
        Ok(Ok(text)) if !text.trim().is_empty() => {
            let text = text.trim();
            match text.char_indices().nth(MAX_ERROR_MESSAGE) {
                Some((idx, _)) => text[..idx].to_string(),
                None => text.to_string(),
            }
        }
        _ => fallback(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::{app, test_support::*};
    use axum::http::StatusCode;
    use chrono::{TimeZone, Utc};
    use hookwatch_common::{CapturedRequestEvent, FeedMessage};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    #[derive(Clone)]
    struct Origin {
        hits: Arc<AtomicUsize>,
        closed_tx: mpsc::UnboundedSender<()>,
    }

    struct DropSignal(mpsc::UnboundedSender<()>);

    impl Drop for DropSignal {
        fn drop(&mut self) {
            let _ = self.0.send(());
        }
    }

    fn ping_frame() -> Bytes {
        let ts = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();
        FeedMessage::ping(ts).unwrap().to_frame()
    }

    fn request_frame() -> Bytes {
        let event = CapturedRequestEvent {
            request_id: "r1".to_string(),
            method: "POST".to_string(),
            path: "/i/s1".to_string(),
            query_params: HashMap::new(),
            headers: HashMap::from([("X-Custom".to_string(), "1".to_string())]),
            body: Some("{}".to_string()),
            source_address: "127.0.0.1".to_string(),
            user_agent: "curl/8".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 1).unwrap(),
            content_length: 2,
        };
        FeedMessage::request(&event).unwrap().to_frame()
    }

    async fn origin_feed(State(origin): State<Origin>, Path(id): Path<String>) -> Response {
        origin.hits.fetch_add(1, Ordering::SeqCst);
        if id == "missing" {
            return (StatusCode::NOT_FOUND, "Session not found or expired").into_response();
        }

        let closed = origin.closed_tx.clone();
        let stream = async_stream::stream! {
            let _signal = DropSignal(closed);
            yield Ok::<_, std::io::Error>(ping_frame());
            yield Ok(request_frame());
            let mut ticker = tokio::time::interval(Duration::from_millis(20));
            loop {
                ticker.tick().await;
                yield Ok(ping_frame());
            }
        };

        (
            [(header::CONTENT_TYPE, constants::EVENT_STREAM_CONTENT_TYPE)],
            Body::from_stream(stream),
        )
            .into_response()
    }

    async fn spawn_origin() -> (String, Origin, mpsc::UnboundedReceiver<()>) {
        let (closed_tx, closed_rx) = mpsc::unbounded_channel();
        let origin = Origin {
            hits: Arc::new(AtomicUsize::new(0)),
            closed_tx,
        };
        let router = Router::new()
            .route("/s/{id}", get(origin_feed))
            .with_state(origin.clone());
        let addr = spawn_server(router).await;
        (format!("http://{}", addr), origin, closed_rx)
    }

    #[tokio::test]
    async fn test_frames_are_forwarded_verbatim() {
        let (origin_url, _origin, _closed) = spawn_origin().await;
        let (state, _shutdown) = test_state(Some(origin_url));
        let relay_addr = spawn_server(app(state)).await;

        let mut response = reqwest::get(format!("http://{}/api/stream/s1", relay_addr))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            constants::EVENT_STREAM_CONTENT_TYPE
        );
        assert_eq!(response.headers()[constants::ACCEL_BUFFERING_HEADER], "no");

        let expected = [ping_frame(), request_frame()].concat();
        let mut received = Vec::new();
        while received.len() < expected.len() {
            let chunk = response.chunk().await.unwrap().expect("stream ended early");
            received.extend_from_slice(&chunk);
        }

        assert_eq!(&received[..expected.len()], &expected[..]);
    }

    #[tokio::test]
    async fn test_upstream_404_is_transparent() {
        let (origin_url, origin, _closed) = spawn_origin().await;
        let (state, _shutdown) = test_state(Some(origin_url));
        let relay_addr = spawn_server(app(state)).await;

        let response = reqwest::get(format!("http://{}/api/stream/missing", relay_addr))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["status"], 404);
        assert!(body["message"]
            .as_str()
            .unwrap()
            .contains("Session not found or expired"));
        assert_eq!(origin.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_origin_is_503_without_upstream_attempt() {
        let (_origin_url, origin, _closed) = spawn_origin().await;
        let (state, _shutdown) = test_state(None);
        let relay_addr = spawn_server(app(state)).await;

        let response = reqwest::get(format!("http://{}/api/stream/s1", relay_addr))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(origin.hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_downstream_disconnect_cancels_upstream() {
        let (origin_url, origin, mut closed) = spawn_origin().await;
        let (state, _shutdown) = test_state(Some(origin_url));
        let relay_addr = spawn_server(app(state)).await;

        let mut response = reqwest::get(format!("http://{}/api/stream/s1", relay_addr))
            .await
            .unwrap();
        assert!(response.chunk().await.unwrap().is_some());
        drop(response);

        tokio::time::timeout(Duration::from_secs(5), closed.recv())
            .await
            .expect("upstream stream still open after downstream disconnect")
            .unwrap();
        assert_eq!(origin.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_signal_ends_relay() {
        let (origin_url, _origin, mut closed) = spawn_origin().await;
        let (state, _shutdown) = test_state(Some(origin_url));
        let (cancel_tx, cancel_rx) = watch::channel(false);

        let mut stream = relay(&state, "s1", cancel_rx).await.unwrap();
        assert!(stream.next().await.unwrap().is_ok());

        cancel_tx.send(true).unwrap();
        let next = tokio::time::timeout(Duration::from_secs(1), async {
            // Chunks already buffered may still drain before the signal is seen
            while let Some(item) = stream.next().await {
                item.unwrap();
            }
        })
        .await;
        assert!(next.is_ok(), "relay did not end after cancel");

        drop(stream);
        tokio::time::timeout(Duration::from_secs(5), closed.recv())
            .await
            .expect("upstream stream still open after cancel")
            .unwrap();
    }
}
