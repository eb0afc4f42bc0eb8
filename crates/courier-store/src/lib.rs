//! # courier-store
//!
//! SQLite storage for chats and messages.
//!
//! Message bodies never touch the database in plaintext: every write goes
//! through [`MessageCipher::encrypt`](courier_shared::MessageCipher::encrypt)
//! and every read through `decrypt`. The crate exposes a synchronous
//! [`Database`] handle wrapping a `rusqlite::Connection` with typed helpers
//! for each operation.

pub mod chats;
pub mod database;
pub mod messages;
pub mod migrations;
pub mod models;
pub mod search;
pub mod seed;

mod error;

pub use database::Database;
pub use error::StoreError;
pub use models::*;
pub use seed::SeedConfig;
