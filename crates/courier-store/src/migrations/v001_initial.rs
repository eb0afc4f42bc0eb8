//! v001 -- Initial schema creation.
//!
//! Creates `chats` and `messages`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Chats
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS chats (
    id              TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    title           TEXT NOT NULL,
    last_message_at INTEGER NOT NULL,           -- unix ms, only ever max-merged
    unread_count    INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_chats_last_message
    ON chats(last_message_at DESC);

-- ----------------------------------------------------------------
-- Messages
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS messages (
    id      TEXT PRIMARY KEY NOT NULL,  -- UUID v4
    chat_id TEXT NOT NULL,              -- FK -> chats(id)
    ts      INTEGER NOT NULL,           -- unix ms
    sender  TEXT NOT NULL,
    body    TEXT NOT NULL,              -- packed ciphertext, never plaintext

    FOREIGN KEY (chat_id) REFERENCES chats(id)
);

CREATE INDEX IF NOT EXISTS idx_messages_chat_ts
    ON messages(chat_id, ts DESC);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
