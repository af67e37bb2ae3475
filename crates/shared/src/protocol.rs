//! Socket wire protocol.
//!
//! Every frame on the socket is a JSON envelope:
//!
//! ```text
//! { "type": string, "data": <any>, "conversation_id"?: integer }
//! ```
//!
//! The only control frame the client itself understands is `ping`. Every other
//! `type` is an application routing key and is carried through untouched as
//! [`Frame::Message`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FrameError;

/// Envelope type of the heartbeat frame.
pub const PING: &str = "ping";

/// Raw envelope as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WireEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<i64>,
}

/// A parsed socket frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Keep-alive, no payload.
    Ping,
    /// Any application-defined frame, kept verbatim for forward compatibility.
    Message {
        kind: String,
        data: Value,
        conversation_id: Option<i64>,
    },
}

static NULL: Value = Value::Null;

impl Frame {
    /// Build an application frame.
    pub fn message(kind: impl Into<String>, data: Value) -> Self {
        Frame::Message {
            kind: kind.into(),
            data,
            conversation_id: None,
        }
    }

    /// Attach a conversation id. No effect on `Ping`.
    pub fn with_conversation(self, id: i64) -> Self {
        match self {
            Frame::Ping => Frame::Ping,
            Frame::Message { kind, data, .. } => Frame::Message {
                kind,
                data,
                conversation_id: Some(id),
            },
        }
    }

    /// The envelope `type` this frame travels under.
    pub fn kind(&self) -> &str {
        match self {
            Frame::Ping => PING,
            Frame::Message { kind, .. } => kind,
        }
    }

    /// The frame payload; `Null` for frames without one.
    pub fn data(&self) -> &Value {
        match self {
            Frame::Ping => &NULL,
            Frame::Message { data, .. } => data,
        }
    }

    pub fn conversation_id(&self) -> Option<i64> {
        match self {
            Frame::Ping => None,
            Frame::Message {
                conversation_id, ..
            } => *conversation_id,
        }
    }

    /// Parse a text frame received from the socket.
    pub fn parse(text: &str) -> Result<Self, FrameError> {
        let envelope: WireEnvelope =
            serde_json::from_str(text).map_err(|e| FrameError::Malformed(e.to_string()))?;
        Frame::try_from(envelope)
    }

    /// Serialize to the JSON text written on the socket.
    pub fn to_json(&self) -> Result<String, FrameError> {
        serde_json::to_string(&WireEnvelope::from(self.clone()))
            .map_err(|e| FrameError::Malformed(e.to_string()))
    }
}

impl TryFrom<WireEnvelope> for Frame {
    type Error = FrameError;

    fn try_from(envelope: WireEnvelope) -> Result<Self, Self::Error> {
        if envelope.kind.is_empty() {
            return Err(FrameError::MissingType);
        }
        if envelope.kind == PING {
            return Ok(Frame::Ping);
        }
        Ok(Frame::Message {
            kind: envelope.kind,
            data: envelope.data,
            conversation_id: envelope.conversation_id,
        })
    }
}

impl From<Frame> for WireEnvelope {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Ping => WireEnvelope {
                kind: PING.to_string(),
                data: Value::Null,
                conversation_id: None,
            },
            Frame::Message {
                kind,
                data,
                conversation_id,
            } => WireEnvelope {
                kind,
                data,
                conversation_id,
            },
        }
    }
}
