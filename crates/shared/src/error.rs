//! Error taxonomy shared by the transport and the REST facade.

use serde::Deserialize;
use thiserror::Error;

/// An inbound socket frame that could not be read as an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("frame has an empty type")]
    MissingType,
}

/// REST collaborator failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<String>,
    error: Option<String>,
    message: Option<String>,
}

impl ApiError {
    /// Text suitable for a user-facing notification.
    ///
    /// Prefers the server's `detail`, `error` or `message` field when the body
    /// is JSON, and falls back to the error's own display text.
    pub fn user_message(&self) -> String {
        if let ApiError::Http { body, .. } = self {
            if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
                let found = [parsed.detail, parsed.error, parsed.message]
                    .into_iter()
                    .flatten()
                    .find(|s| !s.trim().is_empty());
                if let Some(msg) = found {
                    return msg;
                }
            }
        }
        self.to_string()
    }
}

/// Client-side content validation failure, raised before any network call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("message is empty")]
    EmptyMessage,
    #[error("message is too long ({len} characters, max {max})")]
    MessageTooLong { len: usize, max: usize },
    #[error("too many images ({count}, max {max})")]
    TooManyImages { count: usize, max: usize },
}

/// Failure of an outbound message send.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("nothing to send: no text and no images")]
    EmptyPayload,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("send failed: {0}")]
    Failed(#[from] ApiError),
}
