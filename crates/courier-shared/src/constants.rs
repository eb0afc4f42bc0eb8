/// Application name
pub const APP_NAME: &str = "Courier";

/// AEAD used for message bodies at rest
pub const CIPHER_ALGORITHM: &str = "chacha20-poly1305";

/// ChaCha20-Poly1305 nonce size in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Poly1305 authentication tag size in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Symmetric key size in bytes (256 bits)
pub const SYMMETRIC_KEY_SIZE: usize = 32;

/// Separator between the base64 fields of a packed ciphertext
pub const CIPHERTEXT_FIELD_SEPARATOR: char = ':';

/// File name of the persisted message key inside the data directory
pub const KEY_FILE_NAME: &str = ".encryption-key";

/// File name of the SQLite database inside the data directory
pub const DB_FILE_NAME: &str = "courier.db";

/// Default WebSocket port (server)
pub const DEFAULT_WS_PORT: u16 = 9876;

/// Default HTTP API port (server)
pub const DEFAULT_HTTP_PORT: u16 = 3000;

/// Default page sizes
pub const CHATS_PAGE_SIZE: u32 = 50;
pub const MESSAGES_PAGE_SIZE: u32 = 50;
pub const SEARCH_RESULTS_LIMIT: u32 = 100;

/// Seed data volume
pub const SEED_TOTAL_CHATS: usize = 200;
pub const SEED_MESSAGES_PER_CHAT_MIN: usize = 50;
pub const SEED_MESSAGES_PER_CHAT_MAX: usize = 200;

/// Window for the server's synthetic message emission, in milliseconds
pub const EMIT_INTERVAL_MIN_MS: u64 = 1_000;
pub const EMIT_INTERVAL_MAX_MS: u64 = 3_000;

/// Liveness timings, in milliseconds
pub const HEARTBEAT_INTERVAL_MS: u64 = 5_000;
pub const HEARTBEAT_TIMEOUT_MS: u64 = 10_000;

/// Client reconnect backoff
pub const RECONNECT_BASE_DELAY_MS: u64 = 1_000;
pub const RECONNECT_MAX_DELAY_MS: u64 = 30_000;
pub const RECONNECT_MAX_RETRIES: u32 = 10;
