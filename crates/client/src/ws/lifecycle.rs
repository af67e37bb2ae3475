//! Binds the shared [`Connection`] to a UI component's mount/unmount.
//!
//! A component mounts a [`ComponentSession`], subscribes to the frame types it
//! cares about, and drops (or `unmount`s) the session when it goes away. Every
//! subscription the session made is released at that point.

use pawtalk_shared::Frame;
use tokio::sync::watch;

use super::connection::{Connection, ConnectionState};
use super::registry::{Handler, SubscriptionHandle, Topic};
use crate::storage::{self, FileStorage};

/// Where the auth token comes from when a component auto-connects.
pub trait TokenSource: Send + Sync {
    fn token(&self) -> Option<String>;
}

impl<F> TokenSource for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn token(&self) -> Option<String> {
        self()
    }
}

/// Token saved in [`storage`] under `key`, in the default location unless
/// another [`FileStorage`] is given.
#[derive(Debug, Clone)]
pub struct StoredToken {
    pub key: String,
    storage: Option<FileStorage>,
}

impl StoredToken {
    pub const DEFAULT_KEY: &'static str = "userToken";

    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            storage: None,
        }
    }

    pub fn in_storage(mut self, storage: FileStorage) -> Self {
        self.storage = Some(storage);
        self
    }
}

impl Default for StoredToken {
    fn default() -> Self {
        Self::new(Self::DEFAULT_KEY)
    }
}

impl TokenSource for StoredToken {
    fn token(&self) -> Option<String> {
        match &self.storage {
            Some(storage) => storage.load::<String>(&self.key),
            None => storage::load::<String>(&self.key),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MountOptions {
    /// Connect with the stored token on mount.
    pub auto_connect: bool,
}

impl Default for MountOptions {
    fn default() -> Self {
        Self { auto_connect: true }
    }
}

/// One component's view of the shared connection.
pub struct ComponentSession {
    connection: Connection,
    subscriber_id: String,
    handles: Vec<SubscriptionHandle>,
    state: watch::Receiver<ConnectionState>,
}

impl ComponentSession {
    /// Mount a component named `component`.
    ///
    /// With `auto_connect`, the token is read from `tokens` and `connect()` is
    /// fired without waiting for the socket to open. A missing token is logged
    /// and the component mounts disconnected.
    pub fn mount(
        connection: &Connection,
        component: &str,
        tokens: &dyn TokenSource,
        options: MountOptions,
    ) -> Self {
        let subscriber_id = format!("{}-{}", component, uuid::Uuid::new_v4());

        if options.auto_connect {
            match tokens.token() {
                Some(token) => connection.connect(&token),
                None => crate::log_warn!("{}: no auth token stored, not connecting", component),
            }
        }

        Self {
            connection: connection.clone(),
            subscriber_id,
            handles: Vec::new(),
            state: connection.watch_state(),
        }
    }

    /// Id under which this session's handlers are registered.
    pub fn subscriber_id(&self) -> &str {
        &self.subscriber_id
    }

    /// Route frames of `topic` to `handler` until this session is unmounted.
    pub fn subscribe(
        &mut self,
        topic: impl Into<Topic>,
        handler: impl Fn(&Frame) + Send + Sync + 'static,
    ) -> &mut Self {
        let handle = self
            .connection
            .register_handler(topic, self.subscriber_id.clone(), handler);
        self.handles.push(handle);
        self
    }

    /// [`subscribe`](Self::subscribe) with an already shared handler.
    pub fn subscribe_shared(&mut self, topic: impl Into<Topic>, handler: Handler) -> &mut Self {
        let handle =
            self.connection
                .register_shared_handler(topic, self.subscriber_id.clone(), handler);
        self.handles.push(handle);
        self
    }

    pub fn subscription_count(&self) -> usize {
        self.handles.len()
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_open()
    }

    /// Wait for the next connection state change and return the new state.
    /// Returns `None` once the connection itself is gone.
    pub async fn changed(&mut self) -> Option<ConnectionState> {
        self.state.changed().await.ok()?;
        Some(*self.state.borrow_and_update())
    }

    /// Send straight through the shared connection.
    pub fn send_message(&self, frame: &Frame) -> bool {
        self.connection.send(frame)
    }

    /// Release every subscription made through this session.
    pub fn unmount(mut self) {
        self.release_all();
    }

    fn release_all(&mut self) {
        for mut handle in self.handles.drain(..) {
            handle.release();
        }
    }
}

impl Drop for ComponentSession {
    fn drop(&mut self) {
        self.release_all();
    }
}
