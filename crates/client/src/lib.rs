//! Pawtalk client - real-time messaging transport
//!
//! One shared socket per process with heartbeat and reconnect, a registry
//! routing inbound frames to subscribers, and the REST facade used to fetch
//! conversations and send messages.

pub mod api_client;
pub mod config;
pub mod endpoint;
pub mod logging;
pub mod messages;
pub mod storage;
pub mod ws;

pub use api_client::ApiClient;
pub use config::ClientConfig;
pub use endpoint::{EndpointError, Runtime};
pub use messages::{ConversationService, MessageWindow, Normalizer};
pub use ws::{ComponentSession, Connection, ConnectionState, Topic};
