//! Encryption boundary for message bodies at rest.
//!
//! Every body goes through [`MessageCipher::encrypt`] before it reaches
//! SQLite and through [`MessageCipher::decrypt`] after it is read back.
//!
//! Packed format (all base64, standard alphabet):
//!   base64( base64(nonce) ":" base64(tag) ":" base64(ciphertext) )
//!
//! One cipher per process: build it once with
//! [`MessageCipher::load_or_generate`] at startup and hand clones to whoever
//! needs to touch message bodies.

use std::fmt;
use std::io::Write;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20poly1305::{
    aead::{AeadInPlace, KeyInit},
    ChaCha20Poly1305, Key, Nonce, Tag,
};
use rand::RngCore;

use crate::constants::{
    CIPHERTEXT_FIELD_SEPARATOR, CIPHER_ALGORITHM, NONCE_SIZE, SYMMETRIC_KEY_SIZE, TAG_SIZE,
};
use crate::error::CryptoError;

pub type SymmetricKey = [u8; SYMMETRIC_KEY_SIZE];

pub fn generate_symmetric_key() -> SymmetricKey {
    let mut key = [0u8; SYMMETRIC_KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut key);
    key
}

pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Authenticated encryption of message bodies with a single 256-bit key.
#[derive(Clone)]
pub struct MessageCipher {
    key: SymmetricKey,
}

impl fmt::Debug for MessageCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageCipher")
            .field("algorithm", &CIPHER_ALGORITHM)
            .finish_non_exhaustive()
    }
}

impl MessageCipher {
    /// Build a cipher around an explicit key.
    pub fn from_key(key: SymmetricKey) -> Self {
        Self { key }
    }

    /// Load the hex-encoded key at `path`, or generate and persist a new one.
    ///
    /// A missing, unreadable or malformed key file is replaced by a fresh
    /// random key written with owner-only permissions.
    pub fn load_or_generate(path: &Path) -> Result<Self, CryptoError> {
        match read_key_file(path) {
            Some(key) => {
                tracing::debug!(path = %path.display(), "loaded message key");
                return Ok(Self::from_key(key));
            }
            None if path.exists() => {
                tracing::warn!(path = %path.display(), "key file unreadable, regenerating");
            }
            None => {
                tracing::info!(path = %path.display(), "no message key found, generating");
            }
        }

        let key = generate_symmetric_key();
        write_key_file(path, &key)?;
        Ok(Self::from_key(key))
    }

    /// Name of the AEAD in use. Safe to log.
    pub fn algorithm(&self) -> &'static str {
        CIPHER_ALGORITHM
    }

    /// Encrypt a body under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        let nonce_bytes = generate_nonce();

        let mut buffer = plaintext.as_bytes().to_vec();
        let tag = cipher
            .encrypt_in_place_detached(Nonce::from_slice(&nonce_bytes), b"", &mut buffer)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let packed = format!(
            "{}{sep}{}{sep}{}",
            STANDARD.encode(nonce_bytes),
            STANDARD.encode(tag),
            STANDARD.encode(&buffer),
            sep = CIPHERTEXT_FIELD_SEPARATOR,
        );
        Ok(STANDARD.encode(packed))
    }

    /// Decrypt a packed body. Never returns partial plaintext.
    pub fn decrypt(&self, packed: &str) -> Result<String, CryptoError> {
        let outer = STANDARD
            .decode(packed)
            .map_err(|e| CryptoError::Integrity(format!("outer encoding: {e}")))?;
        let outer = String::from_utf8(outer)
            .map_err(|_| CryptoError::Integrity("outer encoding is not UTF-8".into()))?;

        let fields: Vec<&str> = outer.split(CIPHERTEXT_FIELD_SEPARATOR).collect();
        if fields.len() != 3 {
            return Err(CryptoError::Integrity(format!(
                "expected nonce:tag:ciphertext, got {} fields",
                fields.len()
            )));
        }

        let nonce = decode_field(fields[0])?;
        let tag = decode_field(fields[1])?;
        let mut buffer = decode_field(fields[2])?;
        if nonce.len() != NONCE_SIZE || tag.len() != TAG_SIZE {
            return Err(CryptoError::Authentication);
        }

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&self.key));
        cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(&nonce),
                b"",
                &mut buffer,
                Tag::from_slice(&tag),
            )
            .map_err(|_| CryptoError::Authentication)?;

        String::from_utf8(buffer).map_err(|_| CryptoError::Authentication)
    }

    pub fn encrypt_batch(&self, plaintexts: &[&str]) -> Result<Vec<String>, CryptoError> {
        plaintexts.iter().map(|p| self.encrypt(p)).collect()
    }

    pub fn decrypt_batch(&self, ciphertexts: &[&str]) -> Result<Vec<String>, CryptoError> {
        ciphertexts.iter().map(|c| self.decrypt(c)).collect()
    }

    /// Integrity probe: `true` iff `packed` decrypts under this key.
    pub fn verify(&self, packed: &str) -> bool {
        self.decrypt(packed).is_ok()
    }
}

fn decode_field(field: &str) -> Result<Vec<u8>, CryptoError> {
    STANDARD
        .decode(field)
        .map_err(|_| CryptoError::Authentication)
}

fn read_key_file(path: &Path) -> Option<SymmetricKey> {
    let contents = std::fs::read_to_string(path).ok()?;
    let bytes = hex::decode(contents.trim()).ok()?;
    bytes.try_into().ok()
}

fn write_key_file(path: &Path, key: &SymmetricKey) -> Result<(), CryptoError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(hex::encode(key).as_bytes())?;

    // `mode` only applies on creation; tighten a pre-existing file too.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!(path = %path.display(), "persisted new message key");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cipher() -> MessageCipher {
        MessageCipher::from_key(generate_symmetric_key())
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let cipher = cipher();
        let plaintext = "Meeting in 5 minutes";

        let encrypted = cipher.encrypt(plaintext).unwrap();
        assert_ne!(encrypted, plaintext);
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), plaintext);
    }

    #[test]
    fn test_roundtrip_edge_cases() {
        let cipher = cipher();
        let long = "x".repeat(10_000);
        let cases = ["", long.as_str(), "héllo wörld 你好 🔐🚀 𝄞", "a:b:c"];

        for case in cases {
            let encrypted = cipher.encrypt(case).unwrap();
            assert_eq!(cipher.decrypt(&encrypted).unwrap(), case);
        }
    }

    #[test]
    fn test_same_plaintext_different_ciphertexts() {
        let cipher = cipher();
        let a = cipher.encrypt("same body").unwrap();
        let b = cipher.encrypt("same body").unwrap();

        assert_ne!(a, b);
        assert_eq!(cipher.decrypt(&a).unwrap(), "same body");
        assert_eq!(cipher.decrypt(&b).unwrap(), "same body");
    }

    #[test]
    fn test_wrong_key_fails() {
        let encrypted = cipher().encrypt("Secret message").unwrap();
        assert!(matches!(
            cipher().decrypt(&encrypted),
            Err(CryptoError::Authentication)
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let cipher = cipher();
        let encrypted = cipher.encrypt("Important data").unwrap();

        // Rewrite the inner ciphertext field with one byte flipped.
        let inner = String::from_utf8(STANDARD.decode(&encrypted).unwrap()).unwrap();
        let fields: Vec<&str> = inner.split(':').collect();
        let mut ct = STANDARD.decode(fields[2]).unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0x01;
        let forged = STANDARD.encode(format!("{}:{}:{}", fields[0], fields[1], STANDARD.encode(ct)));

        assert!(matches!(cipher.decrypt(&forged), Err(CryptoError::Authentication)));
    }

    #[test]
    fn test_trailing_characters_changed_fails() {
        let cipher = cipher();
        let encrypted = cipher.encrypt("Important data").unwrap();

        let keep = encrypted.len() - 4;
        let replacement = if &encrypted[keep..] == "AAAA" { "BBBB" } else { "AAAA" };
        let tampered = format!("{}{}", &encrypted[..keep], replacement);

        assert!(cipher.decrypt(&tampered).is_err());
        assert!(!cipher.verify(&tampered));
    }

    #[test]
    fn test_wrong_field_count_is_integrity_error() {
        let cipher = cipher();
        let packed = STANDARD.encode("only:two");
        assert!(matches!(cipher.decrypt(&packed), Err(CryptoError::Integrity(_))));

        let packed = STANDARD.encode("a:b:c:d");
        assert!(matches!(cipher.decrypt(&packed), Err(CryptoError::Integrity(_))));
    }

    #[test]
    fn test_undecodable_field_is_authentication_error() {
        let cipher = cipher();
        let packed = STANDARD.encode("!!!:???:***");
        assert!(matches!(cipher.decrypt(&packed), Err(CryptoError::Authentication)));
    }

    #[test]
    fn test_verify() {
        let cipher = cipher();
        let encrypted = cipher.encrypt("probe").unwrap();
        assert!(cipher.verify(&encrypted));
        assert!(!cipher.verify("not a ciphertext"));
    }

    #[test]
    fn test_batch_roundtrip() {
        let cipher = cipher();
        let encrypted = cipher.encrypt_batch(&["one", "two", "three"]).unwrap();
        let refs: Vec<&str> = encrypted.iter().map(String::as_str).collect();
        assert_eq!(cipher.decrypt_batch(&refs).unwrap(), vec!["one", "two", "three"]);
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let cipher = MessageCipher::from_key([0xAB; 32]);
        let rendered = format!("{cipher:?}");
        assert!(!rendered.to_lowercase().contains("abab"));
        assert_eq!(cipher.algorithm(), "chacha20-poly1305");
    }

    #[test]
    fn test_load_or_generate_persists_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(".encryption-key");

        let first = MessageCipher::load_or_generate(&path).unwrap();
        let encrypted = first.encrypt("persisted").unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.len(), 64);

        let second = MessageCipher::load_or_generate(&path).unwrap();
        assert_eq!(second.decrypt(&encrypted).unwrap(), "persisted");
    }

    #[cfg(unix)]
    #[test]
    fn test_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".encryption-key");
        MessageCipher::load_or_generate(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_corrupt_key_file_is_regenerated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".encryption-key");
        std::fs::write(&path, "not-hex").unwrap();

        let cipher = MessageCipher::load_or_generate(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(hex::decode(contents).unwrap().len(), 32);

        let encrypted = cipher.encrypt("fresh").unwrap();
        assert_eq!(cipher.decrypt(&encrypted).unwrap(), "fresh");
    }
}
