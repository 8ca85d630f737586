//! Stored-secret encryption
//!
//! Entity passwords are stored as AES-256-GCM ciphertext, base64 encoded,
//! under a key derived per entity with HKDF. Propagation decodes them when
//! no cleartext password is supplied.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use idsync_core::EntityKey;

use crate::error::{ConnectorError, ConnectorResult};

/// Length of AES-256 key in bytes.
const KEY_LENGTH: usize = 32;

/// Length of GCM nonce in bytes.
const NONCE_LENGTH: usize = 12;

/// Length of GCM authentication tag in bytes.
const TAG_LENGTH: usize = 16;

/// Context string for HKDF key derivation.
const HKDF_INFO: &[u8] = b"idsync-stored-secret-v1";

/// Encodes and decodes stored secrets.
#[derive(Clone)]
pub struct SecretCipher {
    master_key: [u8; KEY_LENGTH],
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher")
            .field("master_key", &"[REDACTED]")
            .finish()
    }
}

impl SecretCipher {
    /// Create a cipher with the given master key.
    #[must_use]
    pub fn new(master_key: [u8; KEY_LENGTH]) -> Self {
        Self { master_key }
    }

    /// Create a cipher from a hex-encoded master key.
    pub fn from_hex(hex_key: &str) -> ConnectorResult<Self> {
        let bytes = hex::decode(hex_key).map_err(|e| ConnectorError::EncryptionFailed {
            message: format!("invalid hex key: {e}"),
        })?;

        let key: [u8; KEY_LENGTH] =
            bytes
                .try_into()
                .map_err(|bytes: Vec<u8>| ConnectorError::EncryptionFailed {
                    message: format!("key must be {} bytes, got {}", KEY_LENGTH, bytes.len()),
                })?;
        Ok(Self::new(key))
    }

    /// Generate a random master key.
    #[must_use]
    pub fn generate_master_key() -> [u8; KEY_LENGTH] {
        let mut key = [0u8; KEY_LENGTH];
        OsRng.fill_bytes(&mut key);
        key
    }

    fn cipher_for(&self, owner: EntityKey) -> ConnectorResult<Aes256Gcm> {
        let hkdf = Hkdf::<Sha256>::new(Some(owner.as_uuid().as_bytes()), &self.master_key);
        let mut derived = [0u8; KEY_LENGTH];
        hkdf.expand(HKDF_INFO, &mut derived)
            .map_err(|e| ConnectorError::EncryptionFailed {
                message: format!("key derivation failed: {e}"),
            })?;
        Aes256Gcm::new_from_slice(&derived).map_err(|e| ConnectorError::EncryptionFailed {
            message: format!("failed to create cipher: {e}"),
        })
    }

    /// Encrypt a secret owned by `owner`.
    ///
    /// Returns base64 of `nonce || ciphertext || tag`.
    pub fn encode(&self, owner: EntityKey, secret: &str) -> ConnectorResult<String> {
        let cipher = self.cipher_for(owner)?;

        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, secret.as_bytes())
            .map_err(|e| ConnectorError::EncryptionFailed {
                message: format!("encryption failed: {e}"),
            })?;

        let mut result = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(result))
    }

    /// Decrypt a secret owned by `owner`.
    pub fn decode(&self, owner: EntityKey, encoded: &str) -> ConnectorResult<String> {
        let data = STANDARD
            .decode(encoded)
            .map_err(|e| ConnectorError::DecryptionFailed {
                message: format!("invalid base64: {e}"),
            })?;
        if data.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(ConnectorError::DecryptionFailed {
                message: "ciphertext too short".to_string(),
            });
        }

        let cipher = self.cipher_for(owner).map_err(|e| ConnectorError::DecryptionFailed {
            message: e.to_string(),
        })?;
        let (nonce_bytes, encrypted) = data.split_at(NONCE_LENGTH);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), encrypted)
            .map_err(|e| ConnectorError::DecryptionFailed {
                message: format!("decryption failed: {e}"),
            })?;

        String::from_utf8(plaintext).map_err(|e| ConnectorError::DecryptionFailed {
            message: format!("decrypted data is not valid UTF-8: {e}"),
        })
    }
}
