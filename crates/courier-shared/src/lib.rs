//! # courier-shared
//!
//! Types shared by every Courier crate: the message-body cipher, the
//! WebSocket wire protocol, connection states, metrics hooks and the
//! constants both ends of a connection agree on.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod types;

pub use crypto::MessageCipher;
pub use error::{CryptoError, ProtocolError};
pub use types::ConnectionState;
