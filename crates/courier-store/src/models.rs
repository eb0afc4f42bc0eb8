//! Domain model structs persisted in the local SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` (camelCase) so it can
//! be handed directly to the HTTP layer.

use courier_shared::protocol::MessagePayload;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// A conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    /// Unique chat identifier (UUID v4 string).
    pub id: String,
    /// Display title.
    pub title: String,
    /// Timestamp of the newest message (unix ms). Never moves backward.
    pub last_message_at: i64,
    /// Messages received since the chat was last marked read.
    pub unread_count: u32,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message. `body` is plaintext in memory and ciphertext on
/// disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Unique message identifier.
    pub id: String,
    /// The chat this message belongs to.
    pub chat_id: String,
    /// When the message was sent (unix ms).
    pub ts: i64,
    /// Display name of the sender.
    pub sender: String,
    /// Plaintext body.
    pub body: String,
}

impl From<Message> for MessagePayload {
    fn from(message: Message) -> Self {
        Self {
            id: message.id,
            chat_id: message.chat_id,
            ts: message.ts,
            sender: message.sender,
            body: message.body,
        }
    }
}

// ---------------------------------------------------------------------------
// Seeding
// ---------------------------------------------------------------------------

/// Outcome of [`Database::seed_database`](crate::Database::seed_database).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeedReport {
    pub chats: usize,
    /// Messages written by this call; 0 when the database was already seeded.
    pub messages: usize,
}

/// Tables whose row counts are reported to metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Chats,
    Messages,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chats => "chats",
            Self::Messages => "messages",
        }
    }
}
