//! Relay REST client: session creation and historical listing

use anyhow::{Context, Result};
use hookwatch_common::{constants, CreateSessionResponse, RequestsResponse};
use reqwest::Client;
use std::time::Duration;

/// Client for the relay's non-streaming endpoints
#[derive(Clone)]
pub struct RelayClient {
    base_url: String,
    client: Client,
}

impl RelayClient {
    pub fn new(relay_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: relay_url.trim().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Create a new capture session through the relay
    pub async fn create_session(&self) -> Result<CreateSessionResponse> {
        let url = format!("{}{}", self.base_url, constants::RELAY_SESSIONS_PATH);

        let response = self
            .client
            .post(&url)
            .send()
            .await
            .with_context(|| format!("Failed to reach relay at {}", self.base_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Failed to create session: {} - {}", status, text);
        }

        response
            .json::<CreateSessionResponse>()
            .await
            .context("Failed to parse session response")
    }

    /// Fetch one page of a session's captured requests, newest first
    pub async fn fetch(&self, session_id: &str, limit: usize, offset: usize) -> Result<RequestsResponse> {
        let url = format!(
            "{}{}/{}",
            self.base_url,
            constants::RELAY_REQUESTS_PREFIX,
            session_id
        );

        let response = self
            .client
            .get(&url)
            .query(&[("limit", limit), ("offset", offset)])
            .send()
            .await
            .with_context(|| format!("Failed to reach relay at {}", self.base_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Failed to fetch requests: {} - {}", status, text);
        }

        response
            .json::<RequestsResponse>()
            .await
            .context("Failed to parse requests response")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Path, Query},
        http::StatusCode,
        routing::{get, post},
        Json, Router,
    };
    use std::collections::HashMap;

    async fn spawn_relay(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        format!("http://{}/", addr)
    }

    #[tokio::test]
    async fn test_fetch_passes_paging_and_parses() {
        let router = Router::new().route(
            "/api/requests/{id}",
            get(
                |Path(id): Path<String>, Query(q): Query<HashMap<String, String>>| async move {
                    Json(serde_json::json!({
                        "session_id": id,
                        "totalCount": 42,
                        "requests": [{
                            "request_id": format!("{}-{}", q["limit"], q["offset"]),
                            "method": "POST",
                            "path": "/i/abc",
                            "timestamp": "2024-07-01T12:00:00Z"
                        }]
                    }))
                },
            ),
        );
        let client = RelayClient::new(&spawn_relay(router).await).unwrap();

        let response = client.fetch("abc", 5, 10).await.unwrap();

        assert_eq!(response.session_id.as_deref(), Some("abc"));
        assert_eq!(response.total_count, 42);
        assert_eq!(response.requests.len(), 1);
        assert_eq!(response.requests[0].request_id, "5-10");
    }

    #[tokio::test]
    async fn test_fetch_surfaces_status() {
        let router = Router::new().route(
            "/api/requests/{id}",
            get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "no origin") }),
        );
        let client = RelayClient::new(&spawn_relay(router).await).unwrap();

        let err = client.fetch("abc", 5, 0).await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_create_session() {
        let router = Router::new().route(
            "/api/sessions",
            post(|| async {
                (
                    StatusCode::CREATED,
                    Json(serde_json::json!({
                        "session_id": "0190a6f2",
                        "ingestion_url": "https://hooks.example.com/i/0190a6f2",
                        "stream_url": "https://hooks.example.com/s/0190a6f2",
                        "requests_url": "https://hooks.example.com/r/0190a6f2",
                        "expires_at": "2024-07-02T12:00:00+00:00"
                    })),
                )
            }),
        );
        let client = RelayClient::new(&spawn_relay(router).await).unwrap();

        let session = client.create_session().await.unwrap();

        assert_eq!(session.session_id, "0190a6f2");
        assert_eq!(session.ingestion_url, "https://hooks.example.com/i/0190a6f2");
    }

    #[tokio::test]
    async fn test_create_session_surfaces_status() {
        let router = Router::new().route(
            "/api/sessions",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "Slow down") }),
        );
        let client = RelayClient::new(&spawn_relay(router).await).unwrap();

        let err = client.create_session().await.unwrap_err();
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Slow down"));
    }
}
