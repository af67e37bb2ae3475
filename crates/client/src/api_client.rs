//! HTTP API client for the messaging REST endpoints.

use async_trait::async_trait;
use pawtalk_shared::{ApiError, Conversation, ImageAttachment, MessagesResponse, RawMessage};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::messages::{MessagingApi, PageRequest};

const CONVERSATIONS_PATH: &str = "/api/messages/v1/conversations/";
const SEND_TEXT_PATH: &str = "/api/messages/v1/send_norm_message/";
const SEND_IMAGE_PATH: &str = "/api/messages/v1/send_message_image/";

fn conversation_path(conversation_id: i64, page: PageRequest) -> String {
    format!(
        "/api/messages/v1/conversation/{}/?page={}&limit={}",
        conversation_id, page.page, page.limit
    )
}

#[derive(Debug, Serialize)]
struct TextMessageBody<'a> {
    conversation_id: i64,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ImageMessageBody<'a> {
    conversation_id: i64,
    images: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    caption: Option<&'a str>,
}

/// HTTP client authenticated with the user's token.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: String::new(),
            token: None,
        }
    }

    /// Set the base URL for API requests
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if self.base_url.is_empty() {
            if path.starts_with('/') {
                path.to_string()
            } else {
                format!("/{path}")
            }
        } else {
            let base = self.base_url.trim_end_matches('/');
            let path = path.trim_start_matches('/');
            format!("{base}/{path}")
        }
    }

    fn authorize(&self, rb: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => rb.header("Authorization", format!("Bearer {token}")),
            None => rb,
        }
    }

    /// Make an authenticated GET request
    pub async fn get_json<TRes: DeserializeOwned>(&self, path: &str) -> Result<TRes, ApiError> {
        let rb = self.authorize(self.client.get(self.url(path)));
        let resp = rb.send().await.map_err(|e| ApiError::Network(e.to_string()))?;
        read_json(resp).await
    }

    /// Make an authenticated POST request with JSON body
    pub async fn post_json<TReq: Serialize, TRes: DeserializeOwned>(
        &self,
        path: &str,
        body: &TReq,
    ) -> Result<TRes, ApiError> {
        let body_bytes =
            serde_json::to_vec(body).map_err(|e| ApiError::Deserialize(e.to_string()))?;
        let resp = self
            .authorize(self.client.post(self.url(path)))
            .body(body_bytes)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| ApiError::Network(e.to_string()))?;
        read_json(resp).await
    }
}

impl Default for ApiClient {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_json<TRes: DeserializeOwned>(resp: reqwest::Response) -> Result<TRes, ApiError> {
    let status = resp.status().as_u16();
    let is_success = resp.status().is_success();
    let text = resp
        .text()
        .await
        .map_err(|e| ApiError::Network(format!("failed to read body: {e}")))?;

    if !is_success {
        return Err(ApiError::Http { status, body: text });
    }

    if text.is_empty() {
        serde_json::from_str("null").map_err(|e| ApiError::Deserialize(e.to_string()))
    } else {
        serde_json::from_str(&text).map_err(|e| ApiError::Deserialize(e.to_string()))
    }
}

#[async_trait]
impl MessagingApi for ApiClient {
    async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError> {
        self.get_json(CONVERSATIONS_PATH).await
    }

    async fn conversation_messages(
        &self,
        conversation_id: i64,
        page: PageRequest,
    ) -> Result<MessagesResponse, ApiError> {
        self.get_json(&conversation_path(conversation_id, page)).await
    }

    async fn send_text_message(
        &self,
        conversation_id: i64,
        text: &str,
    ) -> Result<RawMessage, ApiError> {
        let body = TextMessageBody {
            conversation_id,
            content: text,
        };
        self.post_json(SEND_TEXT_PATH, &body).await
    }

    async fn send_image_message(
        &self,
        conversation_id: i64,
        images: &[ImageAttachment],
        caption: Option<&str>,
    ) -> Result<RawMessage, ApiError> {
        let body = ImageMessageBody {
            conversation_id,
            images: images.iter().map(ImageAttachment::to_data_url).collect(),
            caption,
        };
        self.post_json(SEND_IMAGE_PATH, &body).await
    }
}
