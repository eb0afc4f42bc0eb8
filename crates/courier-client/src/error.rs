use thiserror::Error;

/// Errors surfaced to callers of [`ConnectionClient`](crate::ConnectionClient).
///
/// Network failures never appear here: they are absorbed by the reconnect
/// state machine and reported as [`ConnectionState`] transitions.
///
/// [`ConnectionState`]: courier_shared::ConnectionState
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Connection task has stopped")]
    Stopped,
}
