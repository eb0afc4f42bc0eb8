//! Message persistence. Bodies are sealed before every write and opened
//! after every read.

use courier_shared::metrics::{MetricsSink, QueryTimer};
use courier_shared::types::now_millis;
use rusqlite::params;
use uuid::Uuid;

use crate::database::{seal, unseal, Database};
use crate::error::{Result, StoreError};
use crate::models::Message;

/// Sender name stamped on messages written through [`Database::send_message`].
pub const LOCAL_SENDER: &str = "You";

/// A message row as stored: body still sealed.
pub(crate) struct StoredMessage {
    pub id: String,
    pub chat_id: String,
    pub ts: i64,
    pub sender: String,
    pub sealed_body: String,
}

impl Database {
    /// Persist a message and fold it into the owning chat's metadata.
    ///
    /// The row insert and the chat update commit together: a visible message
    /// always has `last_message_at >= ts` on its chat, and
    /// `last_message_at` is max-merged so out-of-order inserts never move it
    /// backward.
    pub fn insert_message(&mut self, message: &Message) -> Result<()> {
        let Self {
            conn,
            cipher,
            metrics,
        } = self;
        let metrics: &dyn MetricsSink = &**metrics;
        let _timer = QueryTimer::start(metrics, "insert_message");

        let sealed = seal(cipher, metrics, &message.body)?;

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO messages (id, chat_id, ts, sender, body)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![message.id, message.chat_id, message.ts, message.sender, sealed],
        )?;
        tx.execute(
            "UPDATE chats
             SET last_message_at = MAX(last_message_at, ?1),
                 unread_count = unread_count + 1
             WHERE id = ?2",
            params![message.ts, message.chat_id],
        )?;
        tx.commit()?;

        metrics.message_stored();
        tracing::debug!(message_id = %message.id, chat_id = %message.chat_id, "message stored");
        Ok(())
    }

    /// Write a message authored locally, stamping id and timestamp.
    pub fn send_message(&mut self, chat_id: &str, body: &str) -> Result<Message> {
        if self.get_chat(chat_id)?.is_none() {
            return Err(StoreError::NotFound(format!("chat {chat_id}")));
        }

        let message = Message {
            id: Uuid::new_v4().to_string(),
            chat_id: chat_id.to_string(),
            ts: now_millis(),
            sender: LOCAL_SENDER.to_string(),
            body: body.to_string(),
        };
        self.insert_message(&message)?;
        Ok(message)
    }

    /// Up to `limit` messages of `chat_id` older than `before_ts`, newest
    /// first, bodies decrypted.
    ///
    /// Cursor pagination: pass `now + 1` for the latest page and the oldest
    /// loaded `ts` for the page before it.
    pub fn list_messages(&self, chat_id: &str, before_ts: i64, limit: u32) -> Result<Vec<Message>> {
        let _timer = QueryTimer::start(self.metrics(), "list_messages");
        let mut stmt = self.conn().prepare(
            "SELECT id, chat_id, ts, sender, body
             FROM messages
             WHERE chat_id = ?1 AND ts < ?2
             ORDER BY ts DESC
             LIMIT ?3",
        )?;

        let rows = stmt.query_map(params![chat_id, before_ts, limit], row_to_stored)?;

        let mut messages = Vec::new();
        for row in rows {
            messages.push(self.open(row?)?);
        }
        Ok(messages)
    }

    /// Decrypt a stored row into a [`Message`].
    pub(crate) fn open(&self, stored: StoredMessage) -> Result<Message> {
        let body = unseal(&self.cipher, self.metrics(), &stored.sealed_body)?;
        Ok(Message {
            id: stored.id,
            chat_id: stored.chat_id,
            ts: stored.ts,
            sender: stored.sender,
            body,
        })
    }
}

pub(crate) fn row_to_stored(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredMessage> {
    Ok(StoredMessage {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        ts: row.get(2)?,
        sender: row.get(3)?,
        sealed_body: row.get(4)?,
    })
}
