//! Shared types for the pawtalk messaging client.
//!
//! Wire frames exchanged over the socket, the REST records the server hands
//! back, the canonical in-memory message shape and the error taxonomy.

pub mod error;
pub mod models;
pub mod protocol;

pub use error::*;
pub use models::*;
pub use protocol::*;
