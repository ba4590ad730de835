//! Origin address resolution: Redis lookup first, environment fallback second

use fred::clients::Client;
use fred::interfaces::*;
use fred::types::config::Config as RedisConfig;
use hookwatch_common::constants;

/// Initialize Redis client
pub async fn init_client(redis_url: &str) -> anyhow::Result<Client> {
    let config = RedisConfig::from_url(redis_url)?;
    let client = Client::new(config, None, None, None);
    client.init().await?;
    Ok(client)
}

/// Resolves the origin listener's base address.
///
/// Constructed once in `main` and shared through the app state. Every call
/// re-reads the dynamic store so an origin that re-registers under a new
/// address is picked up without restarting the relay.
pub struct OriginResolver {
    redis: Option<Client>,
    fallback: Option<String>,
}

impl OriginResolver {
    pub fn new(redis: Option<Client>, fallback: Option<String>) -> Self {
        Self {
            redis,
            fallback: fallback.map(normalize),
        }
    }

    /// Resolver that only knows a fixed address (or none)
    pub fn fixed(origin: Option<String>) -> Self {
        Self::new(None, origin)
    }

    /// Resolve the origin base address, `None` when nothing is configured
    pub async fn resolve(&self) -> Option<String> {
        if let Some(client) = &self.redis {
            match client.get::<Option<String>, _>(constants::API_URL_KEY).await {
                Ok(Some(url)) if !url.trim().is_empty() => return Some(normalize(url)),
                Ok(_) => {
                    tracing::debug!("No origin address in Redis, using environment fallback");
                }
                Err(e) => {
                    tracing::warn!("Redis origin lookup failed: {}", e);
                }
            }
        }

        self.fallback.clone()
    }

    /// Redis health: `None` when no store is configured
    pub async fn store_healthy(&self) -> Option<bool> {
        match &self.redis {
            Some(client) => Some(client.ping::<()>(None).await.is_ok()),
            None => None,
        }
    }
}

fn normalize(url: String) -> String {
    url.trim().trim_end_matches('/').to_string()
}
