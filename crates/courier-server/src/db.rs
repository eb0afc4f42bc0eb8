//! Shared access to the synchronous [`Database`] from async code.

use std::sync::{Arc, Mutex};

use courier_store::{Database, StoreError};

use crate::error::ServerError;

pub type SharedDatabase = Arc<Mutex<Database>>;

pub fn shared(db: Database) -> SharedDatabase {
    Arc::new(Mutex::new(db))
}

/// Run `f` against the database on the blocking pool.
///
/// Queries decrypt bodies and search scans whole tables, so they never run
/// on a runtime worker thread.
pub async fn with_db<T, F>(db: &SharedDatabase, f: F) -> Result<T, ServerError>
where
    F: FnOnce(&mut Database) -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let db = Arc::clone(db);
    tokio::task::spawn_blocking(move || -> Result<T, ServerError> {
        let mut guard = db
            .lock()
            .map_err(|e| ServerError::Internal(format!("Lock poisoned: {e}")))?;
        Ok(f(&mut guard)?)
    })
    .await
    .map_err(|e| ServerError::Internal(format!("Database task failed: {e}")))?
}
