//! Conversation data: REST records in, canonical messages out.

mod normalize;
mod service;
mod window;

pub use normalize::{format_time, mark_timestamps, GapOrSenderChange, Normalizer, TimestampPolicy};
pub use service::{
    validate_message_content, ConversationPage, ConversationService, MessagePage, MessagingApi,
    OptimisticSink, OutgoingMessage, PageRequest, MAX_IMAGES, MAX_MESSAGE_LENGTH,
};
pub use window::MessageWindow;
