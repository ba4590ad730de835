//! Relay configuration loaded from environment variables

use std::env;
use std::time::Duration;

/// Environment variables consulted, in order, when the dynamic store has no
/// origin address
pub const ORIGIN_FALLBACK_VARS: [&str; 3] = ["ORIGIN_URL", "LISTENER_URL", "API_URL"];

#[derive(Debug, Clone)]
pub struct Config {
    /// Host to bind to
    pub host: String,

    /// Port for downstream viewer traffic
    pub port: u16,

    /// Redis connection string for the dynamic origin lookup (optional)
    pub redis_url: Option<String>,

    /// Origin base address taken from the environment fallbacks
    pub fallback_origin: Option<String>,

    /// Connect timeout for upstream origin connections
    pub upstream_connect_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            redis_url: non_empty_var("REDIS_URL"),
            fallback_origin: fallback_origin(non_empty_var),
            upstream_connect_timeout: Duration::from_secs(
                env::var("UPSTREAM_CONNECT_TIMEOUT_SECS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidNumber("UPSTREAM_CONNECT_TIMEOUT_SECS"))?,
            ),
        })
    }

    /// Socket address string to bind
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// First origin fallback set, in `ORIGIN_FALLBACK_VARS` order
fn fallback_origin(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    ORIGIN_FALLBACK_VARS.iter().find_map(|name| lookup(name))
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid number in environment variable: {0}")]
    InvalidNumber(&'static str),
}
