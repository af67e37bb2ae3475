//! Socket endpoint resolution.

use url::Url;

/// Socket path on the server.
pub const WS_PATH: &str = "/ws/";

pub const DEFAULT_DEV_HOST: &str = "localhost";
pub const DEFAULT_DEV_PORT: u16 = 8000;

/// Where the client is running, which decides how the socket URL is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Runtime {
    /// Hosted in a page loaded from `origin` (e.g. `https://app.example.com`).
    Browser { origin: String },
    /// No page origin; connect to a fixed host.
    Native {
        host: String,
        port: u16,
        secure: bool,
    },
}

impl Default for Runtime {
    fn default() -> Self {
        Runtime::Native {
            host: DEFAULT_DEV_HOST.to_string(),
            port: DEFAULT_DEV_PORT,
            secure: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EndpointError {
    #[error("invalid page origin '{origin}': {reason}")]
    InvalidOrigin { origin: String, reason: String },
}

impl Runtime {
    /// Base `ws://` / `wss://` origin of the socket server, without a path.
    pub fn socket_origin(&self) -> Result<String, EndpointError> {
        match self {
            Runtime::Browser { origin } => {
                let invalid = |reason: String| EndpointError::InvalidOrigin {
                    origin: origin.clone(),
                    reason,
                };
                let url = Url::parse(origin).map_err(|e| invalid(e.to_string()))?;
                let scheme = match url.scheme() {
                    "https" => "wss",
                    "http" => "ws",
                    other => return Err(invalid(format!("unsupported scheme '{other}'"))),
                };
                let host = url
                    .host_str()
                    .ok_or_else(|| invalid("origin has no host".to_string()))?;
                Ok(match url.port() {
                    Some(port) => format!("{scheme}://{host}:{port}"),
                    None => format!("{scheme}://{host}"),
                })
            }
            Runtime::Native { host, port, secure } => {
                let scheme = if *secure { "wss" } else { "ws" };
                Ok(format!("{scheme}://{host}:{port}"))
            }
        }
    }

    /// HTTP origin matching the socket origin, used as the REST default.
    pub fn http_origin(&self) -> Result<String, EndpointError> {
        let origin = self.socket_origin()?;
        Ok(if let Some(rest) = origin.strip_prefix("wss://") {
            format!("https://{rest}")
        } else {
            origin.replacen("ws://", "http://", 1)
        })
    }

    /// Full socket URL carrying `token`.
    pub fn resolve(&self, token: &str) -> Result<String, EndpointError> {
        Ok(format!(
            "{}{}?token={}",
            self.socket_origin()?,
            WS_PATH,
            urlencoding::encode(token)
        ))
    }
}
