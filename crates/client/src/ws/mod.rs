//! Real-time transport: one socket shared by many subscribers.
//!
//! This module provides:
//! - A connection state machine with heartbeat and exponential-backoff reconnect
//! - A handler registry routing inbound frames by type
//! - A per-component session that ties subscriptions to mount/unmount
//!
//! # Architecture
//!
//! ```text
//!   ┌────────────┐ ┌────────────┐ ┌────────────┐
//!   │ Component  │ │ Component  │ │ Component  │
//!   │ (session)  │ │ (session)  │ │ (session)  │
//!   └────────────┘ └────────────┘ └────────────┘
//!          │ subscribe    │              │
//!          └──────────────┼──────────────┘
//!                         ▼
//!              ┌─────────────────────┐
//!              │   HandlerRegistry   │
//!              └─────────────────────┘
//!                         ▲ dispatch
//!              ┌─────────────────────┐
//!              │     Connection      │──▶ heartbeat / reconnect timers
//!              └─────────────────────┘
//!                         │
//!                    Connector (socket)
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let connection = Connection::tungstenite(config.connection());
//! let mut session = ComponentSession::mount(
//!     &connection,
//!     "inbox",
//!     &StoredToken::default(),
//!     MountOptions::default(),
//! );
//! session.subscribe("new_message", |frame| println!("{:?}", frame.data()));
//! ```

mod connection;
#[cfg(feature = "dioxus")]
mod hooks;
mod lifecycle;
mod registry;
mod transport;

pub use connection::{
    Connection, ConnectionConfig, ConnectionState, ReconnectConfig, DEFAULT_HEARTBEAT_INTERVAL,
};
#[cfg(feature = "dioxus")]
pub use hooks::{use_messaging, UseMessaging};
pub use lifecycle::{ComponentSession, MountOptions, StoredToken, TokenSource};
pub use registry::{Handler, HandlerRegistry, SubscriptionHandle, Topic};
pub use transport::{Connector, Inbound, SocketIo, TransportError, TungsteniteConnector};
