use thiserror::Error;

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Encryption failed")]
    EncryptionFailed,

    /// The packed ciphertext does not have the `nonce:tag:ciphertext` shape.
    #[error("Invalid ciphertext format: {0}")]
    Integrity(String),

    /// Tag mismatch, wrong key, or a field that does not decode.
    #[error("Decryption failed: invalid ciphertext or wrong key")]
    Authentication,

    #[error("Invalid key length")]
    InvalidKeyLength,

    #[error("Key file error: {0}")]
    KeyFile(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("new_message chat id {outer} does not match message chat id {inner}")]
    ChatIdMismatch { outer: String, inner: String },

    #[error("Event cannot be sent on the wire")]
    NotSendable,
}
