//! # courier-client
//!
//! Keeps one WebSocket connection to a Courier server alive: reconnects with
//! capped exponential backoff, detects dead links with a heartbeat
//! watchdog, and reports state changes and new messages to its consumer.

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod state;

pub use config::ClientConfig;
pub use connection::ConnectionClient;
pub use error::ClientError;
pub use events::{ClientEvent, StateDeduplicator};
pub use state::{ConnectionMachine, ReconnectDecision};
