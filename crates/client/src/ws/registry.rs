//! Handler registry: fans inbound frames out to independent subscribers.
//!
//! Handlers are bucketed by [`Topic`] and keyed by a subscriber id inside each
//! bucket. Registering returns a [`SubscriptionHandle`]; releasing or dropping
//! it removes that registration and nothing else.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use pawtalk_shared::{Frame, PING};

/// Callback invoked with every frame routed to its topic.
pub type Handler = Arc<dyn Fn(&Frame) + Send + Sync>;

/// Routing key for a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Ping,
    Kind(String),
    /// Every frame, whatever its type.
    Any,
}

impl Topic {
    pub const WILDCARD: &'static str = "*";

    pub fn of(frame: &Frame) -> Topic {
        match frame {
            Frame::Ping => Topic::Ping,
            Frame::Message { kind, .. } => Topic::Kind(kind.clone()),
        }
    }
}

impl From<&str> for Topic {
    fn from(s: &str) -> Self {
        match s {
            Topic::WILDCARD => Topic::Any,
            PING => Topic::Ping,
            other => Topic::Kind(other.to_string()),
        }
    }
}

impl From<String> for Topic {
    fn from(s: String) -> Self {
        Topic::from(s.as_str())
    }
}

struct Entry {
    handler: Handler,
    /// Distinguishes a registration from a later one under the same id.
    token: u64,
}

#[derive(Default)]
struct Buckets {
    by_topic: HashMap<Topic, HashMap<String, Entry>>,
    next_token: u64,
}

impl Buckets {
    fn remove(&mut self, topic: &Topic, subscriber_id: &str, token: Option<u64>) -> bool {
        let Some(bucket) = self.by_topic.get_mut(topic) else {
            return false;
        };
        let matches = bucket
            .get(subscriber_id)
            .is_some_and(|entry| token.map_or(true, |t| entry.token == t));
        if !matches {
            return false;
        }
        bucket.remove(subscriber_id);
        if bucket.is_empty() {
            self.by_topic.remove(topic);
        }
        true
    }
}

/// Multi-map from topic to uniquely identified handlers.
///
/// Cheap to clone; clones share the same table.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    inner: Arc<RwLock<Buckets>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` under `(topic, subscriber_id)`, replacing any handler
    /// already registered there.
    #[must_use = "dropping the handle unregisters the handler"]
    pub fn register(
        &self,
        topic: impl Into<Topic>,
        subscriber_id: impl Into<String>,
        handler: impl Fn(&Frame) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.register_arc(topic, subscriber_id, Arc::new(handler))
    }

    /// [`register`](Self::register) for an already shared handler.
    #[must_use = "dropping the handle unregisters the handler"]
    pub fn register_arc(
        &self,
        topic: impl Into<Topic>,
        subscriber_id: impl Into<String>,
        handler: Handler,
    ) -> SubscriptionHandle {
        let topic = topic.into();
        let subscriber_id = subscriber_id.into();

        let mut buckets = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        buckets.next_token += 1;
        let token = buckets.next_token;
        let replaced = buckets
            .by_topic
            .entry(topic.clone())
            .or_default()
            .insert(subscriber_id.clone(), Entry { handler, token })
            .is_some();
        drop(buckets);

        if replaced {
            crate::log_debug!("Replaced handler {:?}/{}", topic, subscriber_id);
        }

        SubscriptionHandle {
            registry: Arc::downgrade(&self.inner),
            topic,
            subscriber_id,
            token,
            released: false,
        }
    }

    /// Remove whatever handler is registered under `(topic, subscriber_id)`.
    /// Returns whether one was present.
    pub fn unregister(&self, topic: &Topic, subscriber_id: &str) -> bool {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(topic, subscriber_id, None)
    }

    /// Invoke every handler for the frame's topic plus every wildcard handler.
    ///
    /// Handlers run outside the table lock, so they may register or unregister.
    /// A panicking handler is logged and does not stop the rest. Returns the
    /// number of handlers invoked.
    pub fn dispatch(&self, frame: &Frame) -> usize {
        let topic = Topic::of(frame);
        let handlers: Vec<(String, Handler)> = {
            let buckets = self.inner.read().unwrap_or_else(PoisonError::into_inner);
            [&topic, &Topic::Any]
                .into_iter()
                .filter_map(|t| buckets.by_topic.get(t))
                .flat_map(|bucket| bucket.iter())
                .map(|(id, entry)| (id.clone(), entry.handler.clone()))
                .collect()
        };

        for (subscriber_id, handler) in &handlers {
            if catch_unwind(AssertUnwindSafe(|| handler(frame))).is_err() {
                crate::log_error!(
                    "Handler '{}' panicked while handling '{}'",
                    subscriber_id,
                    frame.kind()
                );
            }
        }
        handlers.len()
    }

    /// Drop every registration.
    pub fn clear(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .by_topic
            .clear();
    }

    /// Total number of registered handlers.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_topic
            .values()
            .map(HashMap::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of topics with at least one handler.
    pub fn bucket_count(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_topic
            .len()
    }

    pub fn contains(&self, topic: &Topic, subscriber_id: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .by_topic
            .get(topic)
            .is_some_and(|bucket| bucket.contains_key(subscriber_id))
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.len())
            .field("buckets", &self.bucket_count())
            .finish()
    }
}

/// Owns one registration. Released explicitly or on drop.
#[derive(Debug)]
pub struct SubscriptionHandle {
    registry: Weak<RwLock<Buckets>>,
    topic: Topic,
    subscriber_id: String,
    token: u64,
    released: bool,
}

impl SubscriptionHandle {
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    pub fn subscriber_id(&self) -> &str {
        &self.subscriber_id
    }

    /// Remove this registration. Calling it again is a no-op, and it never
    /// removes a newer handler registered under the same id.
    pub fn release(&mut self) {
        if std::mem::replace(&mut self.released, true) {
            return;
        }
        if let Some(inner) = self.registry.upgrade() {
            inner
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.topic, &self.subscriber_id, Some(self.token));
        }
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.release();
    }
}
