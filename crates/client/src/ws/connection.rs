//! Socket connection with state management, heartbeat and auto-reconnect.
//!
//! A [`Connection`] owns at most one live socket. All state lives behind one
//! mutex and is only changed by the connection's own methods and tasks:
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──open──▶ Open
//!      ▲                          │                  │
//!      └──────── failure ─────────┴──── close ───────┘
//!                     (schedules a reconnect unless disconnect() was called)
//! ```
//!
//! Every socket is tagged with an epoch. `disconnect()` and each new connect
//! bump the epoch, so events from a superseded socket are ignored.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures_channel::mpsc::UnboundedSender;
use futures_util::StreamExt;
use pawtalk_shared::Frame;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::registry::{Handler, HandlerRegistry, SubscriptionHandle, Topic};
use super::transport::{Connector, Inbound, SocketIo, TungsteniteConnector};
use crate::endpoint::Runtime;

/// Interval between heartbeat pings while the socket is open.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Connecting or open; a new `connect()` is a no-op in these states.
    pub fn is_active(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Open)
    }
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// Delay before the first attempt; doubles on each following attempt
    pub base_delay: Duration,
    /// Consecutive failed attempts before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_attempts: 5,
        }
    }
}

impl ReconnectConfig {
    /// Delay before attempt number `attempt` (starting at 1).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub runtime: Runtime,
    pub heartbeat_interval: Duration,
    pub reconnect: ReconnectConfig,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            runtime: Runtime::default(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect: ReconnectConfig::default(),
        }
    }
}

struct Inner {
    state: ConnectionState,
    epoch: u64,
    reconnect_attempts: u32,
    /// Token of the current session; cleared by `disconnect()`.
    token: Option<String>,
    outgoing: Option<UnboundedSender<String>>,
    socket_task: Option<JoinHandle<()>>,
    heartbeat: Option<JoinHandle<()>>,
    reconnect_timer: Option<JoinHandle<()>>,
}

impl Inner {
    fn abort_tasks(&mut self) {
        let tasks = [
            self.heartbeat.take(),
            self.reconnect_timer.take(),
            self.socket_task.take(),
        ];
        for task in tasks.into_iter().flatten() {
            task.abort();
        }
    }
}

struct Shared {
    config: ConnectionConfig,
    connector: Arc<dyn Connector>,
    registry: HandlerRegistry,
    inner: Mutex<Inner>,
    state_tx: watch::Sender<ConnectionState>,
}

/// Handle to the single shared connection. Clones share the same socket,
/// registry and state; dropping the last clone aborts its tasks.
///
/// `connect()` spawns onto the current tokio runtime and must be called from
/// within one.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

impl Connection {
    pub fn new(config: ConnectionConfig, connector: Arc<dyn Connector>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                config,
                connector,
                registry: HandlerRegistry::new(),
                inner: Mutex::new(Inner {
                    state: ConnectionState::Disconnected,
                    epoch: 0,
                    reconnect_attempts: 0,
                    token: None,
                    outgoing: None,
                    socket_task: None,
                    heartbeat: None,
                    reconnect_timer: None,
                }),
                state_tx,
            }),
        }
    }

    /// Connection over `tokio-tungstenite`.
    pub fn tungstenite(config: ConnectionConfig) -> Self {
        Self::new(config, Arc::new(TungsteniteConnector))
    }

    /// Open the socket with `token`. No-op while connecting or open.
    ///
    /// Returns before the socket is open; watch [`Connection::watch_state`]
    /// for the outcome. Resets the reconnect attempt counter.
    pub fn connect(&self, token: &str) {
        self.shared.start(token, true);
    }

    /// Close the socket, cancel timers and drop every registered handler.
    /// No automatic reconnect follows until the next `connect()`.
    pub fn disconnect(&self) {
        self.shared.disconnect();
    }

    /// Write a frame if the socket is open. Returns whether it was queued;
    /// when not open the frame is dropped and logged.
    pub fn send(&self, frame: &Frame) -> bool {
        self.shared.send(frame)
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_open()
    }

    /// Receiver notified on every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.lock().reconnect_attempts
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.shared.config
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.shared.registry
    }

    #[must_use = "dropping the handle unregisters the handler"]
    pub fn register_handler(
        &self,
        topic: impl Into<Topic>,
        subscriber_id: impl Into<String>,
        handler: impl Fn(&Frame) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        self.shared.registry.register(topic, subscriber_id, handler)
    }

    #[must_use = "dropping the handle unregisters the handler"]
    pub fn register_shared_handler(
        &self,
        topic: impl Into<Topic>,
        subscriber_id: impl Into<String>,
        handler: Handler,
    ) -> SubscriptionHandle {
        self.shared
            .registry
            .register_arc(topic, subscriber_id, handler)
    }

    pub fn unregister_handler(&self, topic: &Topic, subscriber_id: &str) -> bool {
        self.shared.registry.unregister(topic, subscriber_id)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("registry", &self.shared.registry)
            .finish()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, inner: &mut Inner, state: ConnectionState) {
        if inner.state != state {
            crate::log_debug!("Connection state {:?} -> {:?}", inner.state, state);
            inner.state = state;
            self.state_tx.send_replace(state);
        }
    }

    fn start(self: &Arc<Self>, token: &str, manual: bool) {
        let mut inner = self.lock();
        if inner.state.is_active() {
            crate::log_debug!("connect() ignored, connection is {:?}", inner.state);
            return;
        }

        if manual {
            inner.reconnect_attempts = 0;
            if let Some(timer) = inner.reconnect_timer.take() {
                timer.abort();
            }
        } else {
            // Called from the reconnect timer itself
            inner.reconnect_timer = None;
        }

        let url = match self.config.runtime.resolve(token) {
            Ok(url) => url,
            Err(e) => {
                crate::log_error!("Cannot resolve socket endpoint: {}", e);
                return;
            }
        };

        inner.epoch += 1;
        let epoch = inner.epoch;
        inner.token = Some(token.to_string());
        self.set_state(&mut inner, ConnectionState::Connecting);
        crate::log_info!(
            "Connecting socket (reconnect attempt {})",
            inner.reconnect_attempts
        );

        inner.socket_task = Some(tokio::spawn(run_socket(
            Arc::downgrade(self),
            self.connector.clone(),
            url,
            epoch,
        )));
    }

    fn on_open(self: &Arc<Self>, epoch: u64, outgoing: UnboundedSender<String>) -> bool {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            // Superseded; dropping `outgoing` closes this socket
            return false;
        }
        inner.reconnect_attempts = 0;
        inner.outgoing = Some(outgoing);
        inner.heartbeat = Some(self.spawn_heartbeat());
        self.set_state(&mut inner, ConnectionState::Open);
        crate::log_info!("Socket open");
        true
    }

    fn on_text(&self, epoch: u64, text: &str) {
        if self.lock().epoch != epoch {
            return;
        }
        match Frame::parse(text) {
            Ok(frame) => {
                self.registry.dispatch(&frame);
            }
            Err(e) => crate::log_warn!("Dropping inbound frame: {}", e),
        }
    }

    fn on_closed(self: &Arc<Self>, epoch: u64) {
        let mut inner = self.lock();
        if inner.epoch != epoch {
            return;
        }
        if let Some(heartbeat) = inner.heartbeat.take() {
            heartbeat.abort();
        }
        inner.outgoing = None;
        // This runs on the socket task; detach rather than abort it
        inner.socket_task = None;
        self.set_state(&mut inner, ConnectionState::Disconnected);
        self.schedule_reconnect(&mut inner);
    }

    fn schedule_reconnect(self: &Arc<Self>, inner: &mut Inner) {
        let Some(token) = inner.token.clone() else {
            return;
        };
        let max = self.config.reconnect.max_attempts;
        if inner.reconnect_attempts >= max {
            crate::log_warn!("Giving up after {} reconnect attempts", max);
            return;
        }

        inner.reconnect_attempts += 1;
        let attempt = inner.reconnect_attempts;
        let delay = self.config.reconnect.delay_for_attempt(attempt);
        crate::log_info!(
            "Reconnecting in {}ms (attempt {}/{})",
            delay.as_millis(),
            attempt,
            max
        );

        let weak = Arc::downgrade(self);
        inner.reconnect_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = weak.upgrade() {
                shared.start(&token, false);
            }
        }));
    }

    fn spawn_heartbeat(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let period = self
            .config
            .heartbeat_interval
            .max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                if !shared.send(&Frame::Ping) {
                    break;
                }
            }
        })
    }

    fn send(&self, frame: &Frame) -> bool {
        let inner = self.lock();
        let outgoing = match inner.outgoing.as_ref() {
            Some(tx) if inner.state.is_open() => tx,
            _ => {
                crate::log_debug!("Socket not open, dropping '{}' frame", frame.kind());
                return false;
            }
        };
        let json = match frame.to_json() {
            Ok(json) => json,
            Err(e) => {
                crate::log_error!("Serialize failed: {}", e);
                return false;
            }
        };
        if let Err(e) = outgoing.unbounded_send(json) {
            crate::log_warn!("Send failed: {}", e);
            return false;
        }
        true
    }

    fn disconnect(&self) {
        let mut inner = self.lock();
        inner.epoch += 1;
        inner.token = None;
        inner.reconnect_attempts = 0;
        if inner.outgoing.is_some() || inner.socket_task.is_some() {
            self.set_state(&mut inner, ConnectionState::Closing);
        }
        inner.abort_tasks();
        // Dropping the sender closes the socket
        inner.outgoing = None;
        self.set_state(&mut inner, ConnectionState::Disconnected);
        drop(inner);

        self.registry.clear();
        crate::log_info!("Disconnected");
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.inner
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .abort_tasks();
    }
}

/// Drives one socket from open to close.
async fn run_socket(
    shared: Weak<Shared>,
    connector: Arc<dyn Connector>,
    url: String,
    epoch: u64,
) {
    let result = connector.connect(&url).await;
    let Some(this) = shared.upgrade() else {
        return;
    };

    let SocketIo {
        outgoing,
        mut incoming,
    } = match result {
        Ok(io) => io,
        Err(e) => {
            crate::log_warn!("Socket failed to open: {}", e);
            this.on_closed(epoch);
            return;
        }
    };

    if !this.on_open(epoch, outgoing) {
        return;
    }
    drop(this);

    while let Some(event) = incoming.next().await {
        let Some(this) = shared.upgrade() else {
            return;
        };
        match event {
            Inbound::Text(text) => this.on_text(epoch, &text),
            Inbound::Closed(reason) => {
                crate::log_info!(
                    "Socket closed: {}",
                    reason.as_deref().unwrap_or("no reason given")
                );
                break;
            }
        }
    }

    if let Some(this) = shared.upgrade() {
        this.on_closed(epoch);
    }
}
