//! REST records and the canonical in-memory message shape.

use std::fmt;
use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// --- Roles ---

/// Which side of a conversation the current user is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Professional,
    Owner,
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "professional" => Ok(UserRole::Professional),
            "petOwner" | "pet_owner" | "owner" => Ok(UserRole::Owner),
            other => Err(format!("unknown user role: {other}")),
        }
    }
}

// --- Conversations ---

/// Unread counters kept separately for each participant role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnreadCounts {
    #[serde(default)]
    pub professional: u32,
    #[serde(default, alias = "pet_owner", alias = "petOwner")]
    pub owner: u32,
}

/// Conversation list entry as returned by the list-conversations call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    #[serde(alias = "id")]
    pub conversation_id: i64,
    pub other_user_id: i64,
    #[serde(default)]
    pub other_user_name: String,
    #[serde(default)]
    pub last_message: Option<String>,
    #[serde(default, alias = "last_message_time")]
    pub last_message_timestamp: Option<DateTime<Utc>>,
    #[serde(default, alias = "unread_count")]
    pub unread_counts: UnreadCounts,
    #[serde(default)]
    pub has_active_booking: bool,
    #[serde(default)]
    pub has_draft: bool,
    #[serde(default)]
    pub is_professional: bool,
}

impl Conversation {
    /// Whether a user acting as `role` should see this conversation.
    pub fn visible_to(&self, role: UserRole) -> bool {
        match role {
            UserRole::Professional => self.is_professional,
            UserRole::Owner => !self.is_professional,
        }
    }

    pub fn unread_for(&self, role: UserRole) -> u32 {
        match role {
            UserRole::Professional => self.unread_counts.professional,
            UserRole::Owner => self.unread_counts.owner,
        }
    }
}

// --- Messages ---

/// Canonical message taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    BookingRequest,
    BookingResponse,
}

impl MessageType {
    /// Map a server `type_of_message` value onto the canonical taxonomy.
    pub fn from_server(raw: Option<&str>) -> Self {
        match raw {
            Some("image_message") => MessageType::Image,
            Some("booking_confirmed") => MessageType::BookingResponse,
            Some("send_approved_message") | Some("request_changes") => {
                MessageType::BookingRequest
            }
            _ => MessageType::Text,
        }
    }

    pub fn is_booking(self) -> bool {
        matches!(
            self,
            MessageType::BookingRequest | MessageType::BookingResponse
        )
    }
}

/// Message identity: permanent server ids, or a client-generated
/// placeholder while an optimistic send is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    Server(i64),
    Temp(String),
}

impl MessageId {
    pub fn temporary() -> Self {
        MessageId::Temp(format!("temp-{}", uuid::Uuid::new_v4()))
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, MessageId::Temp(_))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Server(id) => write!(f, "{id}"),
            MessageId::Temp(id) => f.write_str(id),
        }
    }
}

/// A message record as the server returns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    #[serde(alias = "id")]
    pub message_id: i64,
    #[serde(alias = "conversation")]
    pub conversation_id: i64,
    #[serde(alias = "sender_id")]
    pub sender: i64,
    #[serde(default)]
    pub content: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub is_read: Option<bool>,
    #[serde(default)]
    pub type_of_message: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// One page of the get-conversation-messages call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<RawMessage>,
    #[serde(default)]
    pub has_more: Option<bool>,
}

/// Normalized message, the shape every consumer renders from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: i64,
    pub sender_id: i64,
    pub message: String,
    pub message_type: MessageType,
    pub timestamp: DateTime<Utc>,
    pub is_read: bool,
    pub image_url: Option<String>,
    pub image_urls: Vec<String>,
    pub booking_data: Option<Value>,
    pub show_timestamp: bool,
    pub formatted_time: String,
}

/// An image picked for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl ImageAttachment {
    pub fn new(mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            bytes,
        }
    }

    /// `data:` URL form used in upload bodies and optimistic previews.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, BASE64.encode(&self.bytes))
    }
}
