//! The loaded message window for one conversation.
//!
//! Messages are kept in the server's order, newest first. Older pages are
//! appended at the tail, optimistic messages go to the head, confirmed and
//! incoming ones go right below any still pending, and the
//! timestamp flags are recomputed every time the window changes.

use std::sync::Arc;

use pawtalk_shared::{Message, MessageId, SendError};

use super::normalize::{mark_timestamps, GapOrSenderChange, TimestampPolicy};
use super::service::{MessagePage, OptimisticSink};

#[derive(Clone)]
pub struct MessageWindow {
    conversation_id: i64,
    messages: Vec<Message>,
    next_page: Option<u32>,
    has_more: bool,
    is_loaded: bool,
    policy: Arc<dyn TimestampPolicy>,
}

impl MessageWindow {
    pub fn new(conversation_id: i64) -> Self {
        Self {
            conversation_id,
            messages: Vec::new(),
            next_page: None,
            has_more: false,
            is_loaded: false,
            policy: Arc::new(GapOrSenderChange::default()),
        }
    }

    pub fn with_policy(mut self, policy: impl TimestampPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self.remark();
        self
    }

    pub fn conversation_id(&self) -> i64 {
        self.conversation_id
    }

    /// Newest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Whether the first page has been fetched.
    pub fn is_loaded(&self) -> bool {
        self.is_loaded
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Page to request next when scrolling back.
    pub fn next_page(&self) -> Option<u32> {
        self.next_page
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.messages.iter().any(|m| &m.id == id)
    }

    /// Replace the window with a freshly fetched first page. Pending
    /// optimistic messages are kept at the head.
    pub fn set_first_page(&mut self, page: MessagePage) {
        let pending: Vec<Message> = self
            .messages
            .drain(..)
            .filter(|m| m.id.is_temporary())
            .collect();
        self.messages = pending;
        self.extend_tail(page.messages);
        self.next_page = page.next_page;
        self.has_more = page.has_more;
        self.is_loaded = true;
        self.remark();
    }

    /// Append an older page at the tail, skipping messages already present.
    pub fn append_page(&mut self, page: MessagePage) {
        self.extend_tail(page.messages);
        self.next_page = page.next_page;
        self.has_more = page.has_more;
        self.is_loaded = true;
        self.remark();
    }

    /// Insert a message as the newest. Pending optimistic messages stay on
    /// top until superseded, so a server message goes right below them.
    /// Returns `false` if a message with the same id is already in the window.
    pub fn push_latest(&mut self, message: Message) -> bool {
        if self.contains(&message.id) {
            return false;
        }
        let at = if message.id.is_temporary() {
            0
        } else {
            self.pending_count()
        };
        self.messages.insert(at, message);
        self.remark();
        true
    }

    /// Remove the message with `id`. Returns whether one was removed.
    pub fn remove(&mut self, id: &MessageId) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| &m.id != id);
        let removed = self.messages.len() != before;
        if removed {
            self.remark();
        }
        removed
    }

    /// Number of optimistic messages still waiting at the head.
    pub fn pending_count(&self) -> usize {
        self.messages
            .iter()
            .take_while(|m| m.id.is_temporary())
            .count()
    }

    fn extend_tail(&mut self, messages: Vec<Message>) {
        for message in messages {
            if !self.contains(&message.id) {
                self.messages.push(message);
            }
        }
    }

    fn remark(&mut self) {
        mark_timestamps(&mut self.messages, self.policy.as_ref());
    }
}

impl OptimisticSink for MessageWindow {
    fn add(&mut self, provisional: &Message) {
        self.push_latest(provisional.clone());
    }

    fn remove(&mut self, temp_id: &MessageId) {
        MessageWindow::remove(self, temp_id);
    }

    fn success(&mut self, confirmed: &Message) {
        // The socket may already have delivered it
        self.push_latest(confirmed.clone());
    }

    fn error(&mut self, _error: &SendError) {}
}

impl std::fmt::Debug for MessageWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageWindow")
            .field("conversation_id", &self.conversation_id)
            .field("messages", &self.messages.len())
            .field("next_page", &self.next_page)
            .field("has_more", &self.has_more)
            .finish()
    }
}
