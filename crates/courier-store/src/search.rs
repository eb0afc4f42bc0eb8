//! Plaintext search over encrypted bodies.
//!
//! Bodies are sealed at rest, so SQLite cannot match on their content. The
//! search walks every row in scope, newest first, decrypts each body and
//! keeps the ones containing the query (case-insensitive), stopping once
//! `limit` matches are collected.
//!
//! Cost is O(messages in scope) decryptions per search. A faster replacement
//! (a separate index encrypted at rest, or searchable encryption) must still
//! only ever match plaintext the caller is able to decrypt.

use courier_shared::metrics::QueryTimer;
use rusqlite::params;

use crate::database::Database;
use crate::error::Result;
use crate::messages::row_to_stored;
use crate::models::Message;

impl Database {
    /// Case-insensitive substring search, scoped to one chat or global.
    ///
    /// A body that fails to decrypt aborts the search with the crypto error.
    pub fn search_messages(
        &self,
        chat_id: Option<&str>,
        query: &str,
        limit: u32,
    ) -> Result<Vec<Message>> {
        let _timer = QueryTimer::start(self.metrics(), "search_messages");
        let limit = limit as usize;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let needle = query.to_lowercase();
        let mut results = Vec::new();
        let mut scanned = 0usize;

        let mut stmt = match chat_id {
            Some(_) => self.conn().prepare(
                "SELECT id, chat_id, ts, sender, body
                 FROM messages
                 WHERE chat_id = ?1
                 ORDER BY ts DESC",
            )?,
            None => self.conn().prepare(
                "SELECT id, chat_id, ts, sender, body
                 FROM messages
                 ORDER BY ts DESC",
            )?,
        };
        let mut rows = match chat_id {
            Some(id) => stmt.query(params![id])?,
            None => stmt.query([])?,
        };

        while let Some(row) = rows.next()? {
            scanned += 1;
            let message = self.open(row_to_stored(row)?)?;
            if message.body.to_lowercase().contains(&needle) {
                results.push(message);
                if results.len() >= limit {
                    break;
                }
            }
        }

        tracing::debug!(
            scoped = chat_id.is_some(),
            scanned,
            matched = results.len(),
            "message search finished"
        );
        Ok(results)
    }
}
