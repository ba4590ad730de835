//! Hookwatch Common - Shared event-feed protocol library
//!
//! This crate contains the wire types and the server-sent events codec
//! used by both the relay and the CLI viewer.

pub mod sse;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

pub use sse::{SseDecoder, SseFrame};

/// Protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Malformed {kind} payload: {source}")]
    Malformed {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// One captured inbound webhook delivery
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedRequestEvent {
    /// Stable identifier, unique within a session
    pub request_id: String,

    pub method: String,

    pub path: String,

    #[serde(default)]
    pub query_params: HashMap<String, String>,

    /// Header names keep the case they were received with
    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default)]
    pub body: Option<String>,

    /// Address of the webhook sender
    #[serde(rename = "ip_address", alias = "source_address", default)]
    pub source_address: String,

    #[serde(default)]
    pub user_agent: String,

    /// Capture instant, source of truth for ordering
    pub timestamp: DateTime<Utc>,

    #[serde(default)]
    pub content_length: u64,
}

/// Heartbeat payload carried by `ping` events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingPayload {
    pub timestamp: DateTime<Utc>,
}

/// Response of the one-shot historical fetch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestsResponse {
    #[serde(default)]
    pub session_id: Option<String>,

    #[serde(rename = "total_requests", alias = "totalCount", alias = "total_count")]
    pub total_count: u64,

    pub requests: Vec<CapturedRequestEvent>,
}

/// Response of session creation. URLs point at the origin listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSessionResponse {
    pub session_id: String,

    /// Where webhook senders deliver to
    pub ingestion_url: String,

    pub stream_url: String,

    pub requests_url: String,

    /// Expiry as reported by the origin (RFC 3339)
    pub expires_at: String,
}

/// Named event kinds carried by the feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedKind {
    Request,
    Ping,
}

impl FeedKind {
    /// Map an SSE `event:` name to a feed kind. Unknown names yield `None`.
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            constants::EVENT_REQUEST => Some(FeedKind::Request),
            constants::EVENT_PING => Some(FeedKind::Ping),
            _ => None,
        }
    }

    /// Get the SSE `event:` name
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::Request => constants::EVENT_REQUEST,
            FeedKind::Ping => constants::EVENT_PING,
        }
    }
}

/// A typed feed message: the event kind plus its undecoded `data:` payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedMessage {
    pub kind: FeedKind,
    pub payload: String,
}

impl FeedMessage {
    /// Build a `request` message from a captured event
    pub fn request(event: &CapturedRequestEvent) -> Result<Self, ProtocolError> {
        Ok(Self {
            kind: FeedKind::Request,
            payload: serde_json::to_string(event).map_err(ProtocolError::Encode)?,
        })
    }

    /// Build a `ping` message
    pub fn ping(timestamp: DateTime<Utc>) -> Result<Self, ProtocolError> {
        Ok(Self {
            kind: FeedKind::Ping,
            payload: serde_json::to_string(&PingPayload { timestamp })
                .map_err(ProtocolError::Encode)?,
        })
    }

    /// Convert a decoded SSE frame. Frames of unknown kinds yield `None`.
    pub fn from_frame(frame: SseFrame) -> Option<Self> {
        let kind = FeedKind::from_event_name(&frame.event)?;
        Some(Self {
            kind,
            payload: frame.data,
        })
    }

    /// Decode the payload of a `request` message
    pub fn parse_request(&self) -> Result<CapturedRequestEvent, ProtocolError> {
        serde_json::from_str(&self.payload).map_err(|source| ProtocolError::Malformed {
            kind: constants::EVENT_REQUEST,
            source,
        })
    }

    /// Decode the payload of a `ping` message
    pub fn parse_ping(&self) -> Result<PingPayload, ProtocolError> {
        serde_json::from_str(&self.payload).map_err(|source| ProtocolError::Malformed {
            kind: constants::EVENT_PING,
            source,
        })
    }

    /// Encode as a blank-line-terminated SSE frame
    pub fn to_frame(&self) -> Bytes {
        SseFrame {
            event: self.kind.as_str().to_string(),
            data: self.payload.clone(),
        }
        .encode()
    }
}

/// Constants for the protocol
pub mod constants {
    /// SSE event name for captured requests
    pub const EVENT_REQUEST: &str = "request";

    /// SSE event name for heartbeats
    pub const EVENT_PING: &str = "ping";

    /// Content type of the event feed
    pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

    /// Redis key holding the origin listener's public base address
    pub const API_URL_KEY: &str = "hookwatch:api_url";

    /// Origin path prefix of the per-session event feed
    pub const ORIGIN_STREAM_PREFIX: &str = "/s";

    /// Origin path prefix of the per-session history
    pub const ORIGIN_REQUESTS_PREFIX: &str = "/r";

    /// Origin path that creates a session
    pub const ORIGIN_SESSION_PATH: &str = "/c";

    /// Relay route creating a session
    pub const RELAY_SESSIONS_PATH: &str = "/api/sessions";

    /// Relay route serving the event feed
    pub const RELAY_STREAM_PREFIX: &str = "/api/stream";

    /// Relay route serving the history
    pub const RELAY_REQUESTS_PREFIX: &str = "/api/requests";

    /// Header that disables response buffering in nginx-style proxies
    pub const ACCEL_BUFFERING_HEADER: &str = "x-accel-buffering";

    /// Default page size of the historical fetch
    pub const DEFAULT_HISTORY_LIMIT: usize = 100;

    /// Largest page size the origin accepts
    pub const MAX_HISTORY_LIMIT: usize = 1000;
}

#[cfg(test)]
mod tests {
    use super::*;

    const ORIGIN_JSON: &str = r#"{
        "request_id": "0190a6f2-7c1e-7b3a-9d52-3c1f2a9e8b10",
        "method": "POST",
        "path": "/i/abc/hooks",
        "query_params": {"a": "b"},
        "headers": {"Content-Type": "application/json", "X-Signature": "sha256=00"},
        "body": "{\"ok\":true}",
        "ip_address": "203.0.113.7",
        "user_agent": "Stripe/1.0",
        "timestamp": "2024-07-01T12:00:00.123456+00:00",
        "content_length": 11
    }"#;

    #[test]
    fn test_decode_origin_request_payload() {
        let event: CapturedRequestEvent = serde_json::from_str(ORIGIN_JSON).unwrap();

        assert_eq!(event.method, "POST");
        assert_eq!(event.source_address, "203.0.113.7");
        assert_eq!(event.body.as_deref(), Some("{\"ok\":true}"));
        assert_eq!(event.content_length, 11);
        // Header case survives decoding
        assert!(event.headers.contains_key("X-Signature"));
        assert!(!event.headers.contains_key("x-signature"));
    }

    #[test]
    fn test_request_message_frame() {
        let event: CapturedRequestEvent = serde_json::from_str(ORIGIN_JSON).unwrap();
        let message = FeedMessage::request(&event).unwrap();
        let frame = message.to_frame();

        let text = std::str::from_utf8(&frame).unwrap();
        assert!(text.starts_with("event: request\ndata: {"));
        assert!(text.ends_with("\n\n"));
        assert_eq!(message.parse_request().unwrap(), event);
    }

    #[test]
    fn test_malformed_payload() {
        let message = FeedMessage {
            kind: FeedKind::Request,
            payload: "not json".to_string(),
        };

        let err = message.parse_request().unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { kind: "request", .. }));
    }

    #[test]
    fn test_unknown_kind_is_ignored() {
        let frame = SseFrame {
            event: "message".to_string(),
            data: "{}".to_string(),
        };
        assert!(FeedMessage::from_frame(frame).is_none());
    }

    #[test]
    fn test_requests_response_aliases() {
        let origin = r#"{"session_id": "s", "total_requests": 0, "requests": []}"#;
        let camel = r#"{"totalCount": 3, "requests": []}"#;

        let a: RequestsResponse = serde_json::from_str(origin).unwrap();
        let b: RequestsResponse = serde_json::from_str(camel).unwrap();

        assert_eq!(a.total_count, 0);
        assert_eq!(a.session_id.as_deref(), Some("s"));
        assert_eq!(b.total_count, 3);
        assert!(b.session_id.is_none());
    }

    #[test]
    fn test_create_session_response() {
        let origin = r#"{
            "session_id": "0190a6f2",
            "ingestion_url": "https://listen.example.com/i/0190a6f2",
            "stream_url": "https://listen.example.com/s/0190a6f2",
            "requests_url": "https://listen.example.com/r/0190a6f2",
            "expires_at": "2024-07-02T12:00:00+00:00"
        }"#;

        let session: CreateSessionResponse = serde_json::from_str(origin).unwrap();
        assert_eq!(session.session_id, "0190a6f2");
        assert!(session.ingestion_url.ends_with("/i/0190a6f2"));
    }
}
