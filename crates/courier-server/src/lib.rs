//! # courier-server
//!
//! Chat backend: an encrypted SQLite store, a WebSocket endpoint pushing
//! synthetic `new_message` traffic with ping/pong liveness checks, and a
//! REST API plus Prometheus `/metrics` over the same store.

pub mod api;
pub mod app;
pub mod config;
pub mod db;
pub mod emitter;
pub mod error;
pub mod hub;
pub mod metrics;
pub mod server;

mod shutdown;

pub use app::{launch, RunningServer};
pub use config::ServerConfig;
pub use error::ServerError;
