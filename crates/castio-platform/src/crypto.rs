//! Access-token encryption.
//!
//! AES-256-GCM with HKDF-SHA256 key derivation per publisher identity: the
//! workspace master key never encrypts anything directly, and a leaked
//! per-identity key exposes only that identity's token. Ciphertext layout is
//! nonce || ciphertext || tag.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use castio_core::ids::IdentityId;
use hkdf::Hkdf;
use sha2::Sha256;

use crate::error::{PlatformError, PlatformResult};

/// Length of an AES-256 key in bytes.
const KEY_LENGTH: usize = 32;

/// Length of a GCM nonce in bytes.
const NONCE_LENGTH: usize = 12;

/// Length of a GCM authentication tag in bytes.
const TAG_LENGTH: usize = 16;

/// Context string for HKDF key derivation.
const HKDF_INFO: &[u8] = b"castio-publisher-token-v1";

/// Cipher for access tokens, deriving one key per publisher identity.
#[derive(Clone)]
pub struct TokenCipher {
    master_key: [u8; KEY_LENGTH],
}

impl TokenCipher {
    /// Create a cipher with the given master key.
    #[must_use]
    pub fn new(master_key: [u8; KEY_LENGTH]) -> Self {
        Self { master_key }
    }

    /// Create a cipher from a hex-encoded master key.
    pub fn from_hex(hex_key: &str) -> PlatformResult<Self> {
        let bytes = hex::decode(hex_key).map_err(|e| PlatformError::Encryption {
            message: format!("invalid hex key: {e}"),
        })?;

        if bytes.len() != KEY_LENGTH {
            return Err(PlatformError::Encryption {
                message: format!("key must be {} bytes, got {}", KEY_LENGTH, bytes.len()),
            });
        }

        let mut key = [0u8; KEY_LENGTH];
        key.copy_from_slice(&bytes);
        Ok(Self::new(key))
    }

    /// Derive the key for one identity.
    ///
    /// # Panics
    ///
    /// Panics if HKDF expansion fails, which cannot happen for a 32-byte
    /// output with HKDF-SHA256.
    fn derive_identity_key(&self, identity_id: IdentityId) -> [u8; KEY_LENGTH] {
        let hkdf = Hkdf::<Sha256>::new(Some(identity_id.as_uuid().as_bytes()), &self.master_key);
        let mut derived = [0u8; KEY_LENGTH];
        hkdf.expand(HKDF_INFO, &mut derived)
            .expect("HKDF-SHA256 supports 32-byte output");
        derived
    }

    /// Encrypt a token for an identity. Returns nonce || ciphertext || tag.
    pub fn encrypt_token(&self, identity_id: IdentityId, token: &str) -> PlatformResult<Vec<u8>> {
        let key = self.derive_identity_key(identity_id);
        let cipher =
            Aes256Gcm::new_from_slice(&key).map_err(|e| PlatformError::Encryption {
                message: format!("failed to create cipher: {e}"),
            })?;

        use rand::rngs::OsRng;
        use rand::RngCore;
        let mut nonce_bytes = [0u8; NONCE_LENGTH];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, token.as_bytes())
            .map_err(|e| PlatformError::Encryption {
                message: format!("encryption failed: {e}"),
            })?;

        let mut blob = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Decrypt a token blob for an identity.
    pub fn decrypt_token(&self, identity_id: IdentityId, blob: &[u8]) -> PlatformResult<String> {
        if blob.len() < NONCE_LENGTH + TAG_LENGTH {
            return Err(PlatformError::Decryption {
                message: "ciphertext too short".to_string(),
            });
        }

        let key = self.derive_identity_key(identity_id);
        let cipher =
            Aes256Gcm::new_from_slice(&key).map_err(|e| PlatformError::Decryption {
                message: format!("failed to create cipher: {e}"),
            })?;

        let (nonce_bytes, encrypted) = blob.split_at(NONCE_LENGTH);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, encrypted)
            .map_err(|e| PlatformError::Decryption {
                message: format!("decryption failed: {e}"),
            })?;

        String::from_utf8(plaintext).map_err(|e| PlatformError::Decryption {
            message: format!("decrypted token is not valid UTF-8: {e}"),
        })
    }
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher")
            .field("master_key", &"[REDACTED]")
            .finish()
    }
}

/// Generate a random master key. Initial setup and tests only.
#[must_use]
pub fn generate_master_key() -> [u8; KEY_LENGTH] {
    use rand::rngs::OsRng;
    use rand::RngCore;
    let mut key = [0u8; KEY_LENGTH];
    OsRng.fill_bytes(&mut key);
    key
}

/// Generate a random master key as a hex string.
#[must_use]
pub fn generate_master_key_hex() -> String {
    hex::encode(generate_master_key())
}
