//! Conversation fetch and send facade.
//!
//! [`ConversationService`] is the one place UI code goes through to read or
//! write conversation data. It wraps a [`MessagingApi`] (the REST surface),
//! normalizes what comes back, and runs the optimistic send protocol.

use async_trait::async_trait;
use chrono::Utc;
use pawtalk_shared::{
    ApiError, Conversation, ImageAttachment, Message, MessageId, MessageType, MessagesResponse,
    RawMessage, SendError, UserRole, ValidationError,
};

use super::normalize::{format_time, Normalizer};

pub const MAX_MESSAGE_LENGTH: usize = 2000;
pub const MAX_IMAGES: usize = 5;

/// Page of a conversation's messages to request. Pages start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

impl PageRequest {
    pub fn first(limit: u32) -> Self {
        Self { page: 1, limit }
    }

    pub fn next(self) -> Self {
        Self {
            page: self.page.saturating_add(1),
            ..self
        }
    }
}

/// The REST calls the facade depends on.
#[async_trait]
pub trait MessagingApi: Send + Sync {
    async fn list_conversations(&self) -> Result<Vec<Conversation>, ApiError>;

    async fn conversation_messages(
        &self,
        conversation_id: i64,
        page: PageRequest,
    ) -> Result<MessagesResponse, ApiError>;

    async fn send_text_message(
        &self,
        conversation_id: i64,
        text: &str,
    ) -> Result<RawMessage, ApiError>;

    async fn send_image_message(
        &self,
        conversation_id: i64,
        images: &[ImageAttachment],
        caption: Option<&str>,
    ) -> Result<RawMessage, ApiError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationPage {
    pub conversations: Vec<Conversation>,
    /// The conversation list is not paginated, so this is always `false`.
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessagePage {
    pub messages: Vec<Message>,
    pub has_more: bool,
    pub next_page: Option<u32>,
}

/// What the user composed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub text: Option<String>,
    pub images: Vec<ImageAttachment>,
    pub caption: Option<String>,
}

impl OutgoingMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn images(images: Vec<ImageAttachment>) -> Self {
        Self {
            images,
            ..Self::default()
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    /// [`validate_message_content`] plus the same length limit on the caption.
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_message_content(self.text.as_deref(), &self.images)?;
        check_length(self.caption.as_deref())
    }

    /// Text with surrounding whitespace removed; `None` when blank.
    fn body(&self) -> Option<&str> {
        non_blank(self.text.as_deref())
    }

    /// Caption for an image upload, falling back to the text.
    fn image_caption(&self) -> Option<&str> {
        non_blank(self.caption.as_deref()).or_else(|| self.body())
    }
}

/// Receives the optimistic send protocol: `add` before the network call,
/// then `remove` followed by either `success` or `error`.
pub trait OptimisticSink {
    fn add(&mut self, provisional: &Message);
    fn remove(&mut self, temp_id: &MessageId);
    fn success(&mut self, confirmed: &Message);
    fn error(&mut self, error: &SendError);
}

fn non_blank(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}

fn check_length(text: Option<&str>) -> Result<(), ValidationError> {
    let len = text.map_or(0, |t| t.chars().count());
    if len > MAX_MESSAGE_LENGTH {
        return Err(ValidationError::MessageTooLong {
            len,
            max: MAX_MESSAGE_LENGTH,
        });
    }
    Ok(())
}

/// Check a draft before sending.
///
/// Blank text counts as no text. The length limit applies to the text as
/// given, surrounding whitespace included.
pub fn validate_message_content(
    text: Option<&str>,
    images: &[ImageAttachment],
) -> Result<(), ValidationError> {
    if non_blank(text).is_none() && images.is_empty() {
        return Err(ValidationError::EmptyMessage);
    }
    check_length(text)?;
    if images.len() > MAX_IMAGES {
        return Err(ValidationError::TooManyImages {
            count: images.len(),
            max: MAX_IMAGES,
        });
    }
    Ok(())
}

pub struct ConversationService<A> {
    api: A,
    normalizer: Normalizer,
}

impl<A: MessagingApi> ConversationService<A> {
    pub fn new(api: A, normalizer: Normalizer) -> Self {
        Self { api, normalizer }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// All conversations visible to `role` (every one when `None`), most
    /// recently active first. Conversations with no messages sort last.
    pub async fn fetch_conversations(
        &self,
        role: Option<UserRole>,
    ) -> Result<ConversationPage, ApiError> {
        let mut conversations = self.api.list_conversations().await?;
        if let Some(role) = role {
            conversations.retain(|c| c.visible_to(role));
        }
        conversations.sort_by(|a, b| b.last_message_timestamp.cmp(&a.last_message_timestamp));
        crate::log_debug!("Fetched {} conversations", conversations.len());
        Ok(ConversationPage {
            conversations,
            has_more: false,
        })
    }

    /// One page of a conversation, normalized, in the server's order.
    pub async fn fetch_messages(
        &self,
        conversation_id: i64,
        page: PageRequest,
    ) -> Result<MessagePage, ApiError> {
        let response = self.api.conversation_messages(conversation_id, page).await?;
        let returned = response.messages.len();
        let has_more = response
            .has_more
            .unwrap_or(page.limit > 0 && returned == page.limit as usize);
        Ok(MessagePage {
            messages: self.normalizer.normalize_page(response.messages),
            has_more,
            next_page: has_more.then(|| page.next().page),
        })
    }

    /// Send a draft, picking the REST call by what it contains.
    pub async fn send_message(
        &self,
        conversation_id: i64,
        draft: &OutgoingMessage,
    ) -> Result<Message, SendError> {
        let raw = if !draft.images.is_empty() {
            self.api
                .send_image_message(conversation_id, &draft.images, draft.image_caption())
                .await?
        } else if let Some(text) = draft.body() {
            self.api.send_text_message(conversation_id, text).await?
        } else {
            return Err(SendError::EmptyPayload);
        };
        Ok(self.normalizer.normalize(raw))
    }

    /// Send with a provisional message shown in the meantime.
    ///
    /// Validation runs first and its failure is returned without touching
    /// `sink`. Otherwise the provisional message is always removed again,
    /// whatever the outcome of the send.
    pub async fn send_message_with_optimistic_ui<S>(
        &self,
        conversation_id: i64,
        sender_id: i64,
        draft: &OutgoingMessage,
        sink: &mut S,
    ) -> Result<Message, SendError>
    where
        S: OptimisticSink + ?Sized,
    {
        draft.validate()?;

        let provisional = self.provisional(conversation_id, sender_id, draft);
        sink.add(&provisional);

        let result = self.send_message(conversation_id, draft).await;
        sink.remove(&provisional.id);
        match &result {
            Ok(confirmed) => sink.success(confirmed),
            Err(e) => {
                crate::log_warn!("Send to conversation {} failed: {}", conversation_id, e);
                sink.error(e);
            }
        }
        result
    }

    fn provisional(&self, conversation_id: i64, sender_id: i64, draft: &OutgoingMessage) -> Message {
        let now = Utc::now();
        let image_urls: Vec<String> = draft.images.iter().map(|i| i.to_data_url()).collect();
        let (message_type, message) = if image_urls.is_empty() {
            (MessageType::Text, draft.body().unwrap_or_default())
        } else {
            (MessageType::Image, draft.image_caption().unwrap_or_default())
        };
        Message {
            id: MessageId::temporary(),
            conversation_id,
            sender_id,
            message: message.to_string(),
            message_type,
            timestamp: now,
            is_read: false,
            image_url: image_urls.first().cloned(),
            image_urls,
            booking_data: None,
            show_timestamp: true,
            formatted_time: format_time(now),
        }
    }
}
