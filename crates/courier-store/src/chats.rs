//! CRUD operations for [`Chat`] records.

use courier_shared::metrics::QueryTimer;
use courier_shared::types::now_millis;
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::database::Database;
use crate::error::Result;
use crate::models::{Chat, Table};

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Create an empty chat stamped with a fresh id and the current time.
    pub fn create_chat(&self, title: &str) -> Result<Chat> {
        let chat = Chat {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            last_message_at: now_millis(),
            unread_count: 0,
        };
        self.insert_chat(&chat)?;

        tracing::debug!(chat_id = %chat.id, "chat created");
        Ok(chat)
    }

    /// Insert a chat with caller-provided fields.
    pub fn insert_chat(&self, chat: &Chat) -> Result<()> {
        let _timer = QueryTimer::start(self.metrics(), "insert_chat");
        self.conn().execute(
            "INSERT INTO chats (id, title, last_message_at, unread_count)
             VALUES (?1, ?2, ?3, ?4)",
            params![chat.id, chat.title, chat.last_message_at, chat.unread_count],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single chat by id.
    pub fn get_chat(&self, id: &str) -> Result<Option<Chat>> {
        let _timer = QueryTimer::start(self.metrics(), "get_chat");
        let chat = self
            .conn()
            .query_row(
                "SELECT id, title, last_message_at, unread_count
                 FROM chats
                 WHERE id = ?1",
                params![id],
                row_to_chat,
            )
            .optional()?;
        Ok(chat)
    }

    /// One page of chats, most recently active first. Ties keep insertion
    /// order.
    pub fn list_chats(&self, offset: u32, limit: u32) -> Result<Vec<Chat>> {
        let _timer = QueryTimer::start(self.metrics(), "list_chats");
        let mut stmt = self.conn().prepare(
            "SELECT id, title, last_message_at, unread_count
             FROM chats
             ORDER BY last_message_at DESC, rowid ASC
             LIMIT ?1 OFFSET ?2",
        )?;

        let rows = stmt.query_map(params![limit, offset], row_to_chat)?;

        let mut chats = Vec::new();
        for row in rows {
            chats.push(row?);
        }
        Ok(chats)
    }

    /// Pick a chat uniformly at random, if any exist.
    pub fn random_chat(&self) -> Result<Option<Chat>> {
        let _timer = QueryTimer::start(self.metrics(), "random_chat");
        let chat = self
            .conn()
            .query_row(
                "SELECT id, title, last_message_at, unread_count
                 FROM chats
                 ORDER BY RANDOM()
                 LIMIT 1",
                [],
                row_to_chat,
            )
            .optional()?;
        Ok(chat)
    }

    /// Row count of `table`, also published to the metrics sink.
    pub fn count_rows(&self, table: Table) -> Result<u64> {
        let sql = match table {
            Table::Chats => "SELECT COUNT(*) FROM chats",
            Table::Messages => "SELECT COUNT(*) FROM messages",
        };
        let count: i64 = self.conn().query_row(sql, [], |row| row.get(0))?;
        let count = count.max(0) as u64;

        self.metrics().set_row_count(table.as_str(), count);
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Reset the unread counter. Unknown ids are ignored.
    pub fn mark_read(&self, chat_id: &str) -> Result<()> {
        let _timer = QueryTimer::start(self.metrics(), "mark_read");
        let affected = self.conn().execute(
            "UPDATE chats SET unread_count = 0 WHERE id = ?1",
            params![chat_id],
        )?;

        if affected == 0 {
            tracing::debug!(chat_id, "mark_read on unknown chat");
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`Chat`].
pub(crate) fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chat> {
    Ok(Chat {
        id: row.get(0)?,
        title: row.get(1)?,
        last_message_at: row.get(2)?,
        unread_count: row.get(3)?,
    })
}
