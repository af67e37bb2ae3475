//! Client configuration from environment variables.

use std::str::FromStr;
use std::time::Duration;

use crate::api_client::ApiClient;
use crate::endpoint::{Runtime, DEFAULT_DEV_HOST, DEFAULT_DEV_PORT};
use crate::messages::Normalizer;
use crate::ws::{ConnectionConfig, ReconnectConfig, StoredToken, DEFAULT_HEARTBEAT_INTERVAL};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub runtime: Runtime,
    pub api_base_url: String,
    pub media_origin: String,
    /// Storage key of the auth token.
    pub token_key: String,
    pub heartbeat_interval: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl ClientConfig {
    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PAWTALK_ORIGIN`: page origin; when set the client runs as in a browser
    /// - `PAWTALK_DEV_HOST` / `PAWTALK_DEV_PORT`: socket host otherwise (default: "localhost:8000")
    /// - `PAWTALK_SECURE`: "1" or "true" for `wss` on the dev host
    /// - `PAWTALK_API_BASE_URL`: REST base (default: HTTP origin of the socket)
    /// - `PAWTALK_MEDIA_ORIGIN`: origin for relative media paths (default: REST base)
    /// - `PAWTALK_TOKEN_KEY`: storage key of the auth token (default: "userToken")
    /// - `PAWTALK_HEARTBEAT_SECS`: ping interval (default: 30)
    /// - `PAWTALK_RECONNECT_BASE_MS`: first reconnect delay (default: 1000)
    /// - `PAWTALK_RECONNECT_MAX_ATTEMPTS`: reconnect attempts before giving up (default: 5)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let runtime = match var("PAWTALK_ORIGIN") {
            Some(origin) => Runtime::Browser { origin },
            None => Runtime::Native {
                host: var("PAWTALK_DEV_HOST").unwrap_or_else(|| DEFAULT_DEV_HOST.to_string()),
                port: parse_or("PAWTALK_DEV_PORT", var("PAWTALK_DEV_PORT"), DEFAULT_DEV_PORT),
                secure: var("PAWTALK_SECURE")
                    .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                    .unwrap_or(false),
            },
        };

        let api_base_url = var("PAWTALK_API_BASE_URL").unwrap_or_else(|| {
            runtime.http_origin().unwrap_or_else(|e| {
                crate::log_warn!("No REST base URL: {}", e);
                String::new()
            })
        });
        let media_origin = var("PAWTALK_MEDIA_ORIGIN").unwrap_or_else(|| api_base_url.clone());

        let reconnect_defaults = ReconnectConfig::default();
        let base_ms = parse_or(
            "PAWTALK_RECONNECT_BASE_MS",
            var("PAWTALK_RECONNECT_BASE_MS"),
            reconnect_defaults.base_delay.as_millis() as u64,
        );

        Self {
            runtime,
            api_base_url,
            media_origin,
            token_key: var("PAWTALK_TOKEN_KEY")
                .unwrap_or_else(|| StoredToken::DEFAULT_KEY.to_string()),
            heartbeat_interval: Duration::from_secs(parse_or(
                "PAWTALK_HEARTBEAT_SECS",
                var("PAWTALK_HEARTBEAT_SECS"),
                DEFAULT_HEARTBEAT_INTERVAL.as_secs(),
            )),
            reconnect: ReconnectConfig {
                base_delay: Duration::from_millis(base_ms),
                max_attempts: parse_or(
                    "PAWTALK_RECONNECT_MAX_ATTEMPTS",
                    var("PAWTALK_RECONNECT_MAX_ATTEMPTS"),
                    reconnect_defaults.max_attempts,
                ),
            },
        }
    }

    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            runtime: self.runtime.clone(),
            heartbeat_interval: self.heartbeat_interval,
            reconnect: self.reconnect.clone(),
        }
    }

    pub fn token_source(&self) -> StoredToken {
        StoredToken::new(self.token_key.clone())
    }

    pub fn api_client(&self, token: Option<String>) -> ApiClient {
        ApiClient::new()
            .with_base_url(self.api_base_url.clone())
            .with_token(token)
    }

    pub fn normalizer(&self) -> Normalizer {
        Normalizer::new(self.media_origin.clone())
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Display>(key: &str, value: Option<String>, default: T) -> T {
    match value {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            crate::log_warn!("Ignoring {}={:?}, using {}", key, raw, default);
            default
        }),
    }
}
