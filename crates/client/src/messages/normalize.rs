//! Converts server message records into the canonical [`Message`] shape.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use pawtalk_shared::{Message, MessageId, MessageType, RawMessage};

/// Decides whether a message shows its timestamp, given the message right
/// before it in the same page (`None` for the first one).
pub trait TimestampPolicy: Send + Sync {
    fn show_timestamp(&self, current: &Message, previous: Option<&Message>) -> bool;
}

/// Show the timestamp at the start of a page, when the sender changes, or
/// when more than `gap` separates the two messages.
#[derive(Debug, Clone, Copy)]
pub struct GapOrSenderChange {
    pub gap: Duration,
}

impl Default for GapOrSenderChange {
    fn default() -> Self {
        Self {
            gap: Duration::minutes(15),
        }
    }
}

impl TimestampPolicy for GapOrSenderChange {
    fn show_timestamp(&self, current: &Message, previous: Option<&Message>) -> bool {
        let Some(previous) = previous else {
            return true;
        };
        current.sender_id != previous.sender_id
            || (current.timestamp - previous.timestamp).abs() > self.gap
    }
}

/// Recompute `show_timestamp` across a window, in place.
pub fn mark_timestamps(messages: &mut [Message], policy: &dyn TimestampPolicy) {
    for i in 0..messages.len() {
        let (before, rest) = messages.split_at_mut(i);
        rest[0].show_timestamp = policy.show_timestamp(&rest[0], before.last());
    }
}

/// Clock time shown next to a message, e.g. `3:07 PM`.
pub fn format_time(timestamp: DateTime<Utc>) -> String {
    timestamp.format("%-I:%M %p").to_string()
}

#[derive(Clone)]
pub struct Normalizer {
    media_origin: String,
    policy: Arc<dyn TimestampPolicy>,
}

impl Normalizer {
    pub fn new(media_origin: impl Into<String>) -> Self {
        Self {
            media_origin: media_origin.into().trim_end_matches('/').to_string(),
            policy: Arc::new(GapOrSenderChange::default()),
        }
    }

    pub fn with_policy(mut self, policy: impl TimestampPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    pub fn policy(&self) -> &dyn TimestampPolicy {
        self.policy.as_ref()
    }

    /// Resolve a server-relative media path (`/media/...`) against the media
    /// origin. Anything else is returned unchanged.
    pub fn resolve_media_url(&self, path: &str) -> String {
        if path.starts_with('/') && !path.starts_with("//") {
            format!("{}{}", self.media_origin, path)
        } else {
            path.to_string()
        }
    }

    /// Normalize a single record. `show_timestamp` is `true`; use
    /// [`Normalizer::normalize_page`] for page-relative flags.
    pub fn normalize(&self, raw: RawMessage) -> Message {
        let message_type = MessageType::from_server(raw.type_of_message.as_deref());
        let is_read = raw
            .is_read
            .unwrap_or_else(|| raw.status.as_deref() == Some("read"));
        let image_urls: Vec<String> = raw
            .image_urls
            .iter()
            .map(|url| self.resolve_media_url(url))
            .collect();
        let image_url = raw
            .image_url
            .as_deref()
            .map(|url| self.resolve_media_url(url))
            .or_else(|| image_urls.first().cloned());
        let booking_data = if message_type.is_booking() {
            raw.metadata
        } else {
            None
        };

        Message {
            id: MessageId::Server(raw.message_id),
            conversation_id: raw.conversation_id,
            sender_id: raw.sender,
            message: raw.content.unwrap_or_default(),
            message_type,
            timestamp: raw.timestamp,
            is_read,
            image_url,
            image_urls,
            booking_data,
            show_timestamp: true,
            formatted_time: format_time(raw.timestamp),
        }
    }

    /// Normalize a fetched page, keeping the server's order.
    pub fn normalize_page(&self, raws: Vec<RawMessage>) -> Vec<Message> {
        let mut messages: Vec<Message> = raws.into_iter().map(|raw| self.normalize(raw)).collect();
        mark_timestamps(&mut messages, self.policy());
        messages
    }
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer")
            .field("media_origin", &self.media_origin)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn raw(id: i64, sender: i64, minute: u32) -> RawMessage {
        RawMessage {
            message_id: id,
            conversation_id: 1,
            sender,
            content: Some(format!("m{id}")),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 15, minute, 0).unwrap(),
            status: None,
            is_read: None,
            type_of_message: None,
            image_url: None,
            image_urls: Vec::new(),
            metadata: None,
        }
    }

    #[test]
    fn resolves_relative_media_paths() {
        let n = Normalizer::new("https://cdn.example.com/");
        assert_eq!(
            n.resolve_media_url("/media/a.jpg"),
            "https://cdn.example.com/media/a.jpg"
        );
        assert_eq!(
            n.resolve_media_url("https://s3.example.com/b.jpg"),
            "https://s3.example.com/b.jpg"
        );
    }

    #[test]
    fn maps_image_message() {
        let n = Normalizer::new("https://cdn.example.com");
        let mut record = raw(5, 2, 0);
        record.type_of_message = Some("image_message".into());
        record.image_urls = vec!["/media/1.png".into(), "/media/2.png".into()];
        record.status = Some("read".into());

        let msg = n.normalize(record);
        assert_eq!(msg.message_type, MessageType::Image);
        assert_eq!(
            msg.image_url.as_deref(),
            Some("https://cdn.example.com/media/1.png")
        );
        assert_eq!(msg.image_urls.len(), 2);
        assert!(msg.is_read);
        assert_eq!(msg.formatted_time, "3:00 PM");
    }

    #[test]
    fn booking_metadata_is_kept_only_for_booking_types() {
        let n = Normalizer::new("");
        let mut booking = raw(1, 1, 0);
        booking.type_of_message = Some("request_changes".into());
        booking.metadata = Some(json!({"booking_id": 44}));
        let mut text = raw(2, 1, 0);
        text.metadata = Some(json!({"ignored": true}));

        assert_eq!(
            n.normalize(booking).booking_data,
            Some(json!({"booking_id": 44}))
        );
        assert_eq!(n.normalize(text).booking_data, None);
    }

    #[test]
    fn explicit_read_flag_wins() {
        let n = Normalizer::new("");
        let mut record = raw(1, 1, 0);
        record.status = Some("read".into());
        record.is_read = Some(false);
        assert!(!n.normalize(record).is_read);
    }

    #[test]
    fn page_order_is_preserved_and_timestamps_marked() {
        let n = Normalizer::new("");
        // newest first, as the server sends it
        let page = n.normalize_page(vec![
            raw(4, 1, 50),
            raw(3, 1, 49),
            raw(2, 2, 48),
            raw(1, 2, 10),
        ]);
        let ids: Vec<MessageId> = page.iter().map(|m| m.id.clone()).collect();
        assert_eq!(
            ids,
            vec![
                MessageId::Server(4),
                MessageId::Server(3),
                MessageId::Server(2),
                MessageId::Server(1)
            ]
        );
        let shown: Vec<bool> = page.iter().map(|m| m.show_timestamp).collect();
        // first, same sender close by, sender change, long gap
        assert_eq!(shown, vec![true, false, true, true]);
    }

    struct Never;

    impl TimestampPolicy for Never {
        fn show_timestamp(&self, _: &Message, _: Option<&Message>) -> bool {
            false
        }
    }

    #[test]
    fn custom_policy() {
        let n = Normalizer::new("").with_policy(Never);
        let page = n.normalize_page(vec![raw(1, 1, 0), raw(2, 2, 0)]);
        assert!(page.iter().all(|m| !m.show_timestamp));
    }
}
