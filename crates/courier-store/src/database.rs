//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] together with the
//! process-wide [`MessageCipher`], and guarantees that migrations are run
//! before any other operation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use courier_shared::constants::{DB_FILE_NAME, KEY_FILE_NAME};
use courier_shared::metrics::{CryptoOp, MetricsSink, NoopMetrics};
use courier_shared::MessageCipher;
use directories::ProjectDirs;
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

/// Wrapper around a [`rusqlite::Connection`] and the message cipher.
pub struct Database {
    pub(crate) conn: Connection,
    pub(crate) cipher: MessageCipher,
    pub(crate) metrics: Arc<dyn MetricsSink>,
}

/// Platform data directory for Courier:
/// - Linux:   `~/.local/share/courier`
/// - macOS:   `~/Library/Application Support/dev.courier.courier`
/// - Windows: `{FOLDERID_RoamingAppData}\courier\courier\data`
pub fn default_data_dir() -> Result<PathBuf> {
    let project_dirs =
        ProjectDirs::from("dev", "courier", "courier").ok_or(StoreError::NoDataDir)?;
    Ok(project_dirs.data_dir().to_path_buf())
}

/// Path of the persisted message key inside `data_dir`.
pub fn key_path(data_dir: &Path) -> PathBuf {
    data_dir.join(KEY_FILE_NAME)
}

impl Database {
    /// Open (or create) the database inside `data_dir`.
    pub fn new(data_dir: &Path, cipher: MessageCipher) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join(DB_FILE_NAME);

        tracing::info!(path = %db_path.display(), "opening database");

        Self::open_at(&db_path, cipher)
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path, cipher: MessageCipher) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL lets readers proceed while the emitter writes.
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Self::init(conn, cipher)
    }

    /// Open a private in-memory database. Used by tests and tooling.
    pub fn open_in_memory(cipher: MessageCipher) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, cipher)
    }

    fn init(conn: Connection, cipher: MessageCipher) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run_migrations(&conn)?;

        tracing::debug!(algorithm = cipher.algorithm(), "database ready");

        Ok(Self {
            conn,
            cipher,
            metrics: Arc::new(NoopMetrics),
        })
    }

    /// Attach a metrics sink; every query and crypto operation reports to it.
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Return a reference to the underlying `rusqlite::Connection`.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }

    pub fn cipher(&self) -> &MessageCipher {
        &self.cipher
    }

    pub(crate) fn metrics(&self) -> &dyn MetricsSink {
        self.metrics.as_ref()
    }
}

/// Encrypt a body for storage, counting the operation.
pub(crate) fn seal(cipher: &MessageCipher, metrics: &dyn MetricsSink, body: &str) -> Result<String> {
    metrics.record_crypto_op(CryptoOp::Encrypt);
    Ok(cipher.encrypt(body)?)
}

/// Decrypt a stored body, counting the operation.
pub(crate) fn unseal(
    cipher: &MessageCipher,
    metrics: &dyn MetricsSink,
    packed: &str,
) -> Result<String> {
    metrics.record_crypto_op(CryptoOp::Decrypt);
    Ok(cipher.decrypt(packed)?)
}

#[cfg(test)]
mod tests {
    use courier_shared::crypto::generate_symmetric_key;

    use super::*;

    #[test]
    fn open_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let cipher = MessageCipher::from_key(generate_symmetric_key());

        let db = Database::open_at(&path, cipher).expect("should open");
        assert!(db.path().is_some());
    }

    #[test]
    fn new_creates_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("courier");
        let cipher = MessageCipher::from_key(generate_symmetric_key());

        Database::new(&data_dir, cipher).expect("should open");
        assert!(data_dir.join(DB_FILE_NAME).exists());
    }

    #[test]
    fn reopen_keeps_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let key = generate_symmetric_key();

        {
            let db = Database::open_at(&path, MessageCipher::from_key(key)).unwrap();
            db.create_chat("Alice").unwrap();
        }

        let db = Database::open_at(&path, MessageCipher::from_key(key)).unwrap();
        assert_eq!(db.list_chats(0, 10).unwrap().len(), 1);
    }
}
