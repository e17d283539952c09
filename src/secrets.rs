//! Installation key management and at-rest sealing of stored API keys.
//!
//! A single 256-bit key is generated on first run and kept in the state
//! document next to the configuration it protects. Sealed values are
//! `base64(nonce || ciphertext)` with a fresh 96-bit nonce per value.

use crate::error::SecretsError;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::Engine as _;
use rand::RngCore as _;
use sha2::{Digest as _, Sha256};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Symmetric cipher bound to the installation key.
#[derive(Clone)]
pub struct SecretCipher {
    key: [u8; KEY_LEN],
}

impl std::fmt::Debug for SecretCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl SecretCipher {
    /// Generate a new random installation key.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        rand::rng().fill_bytes(&mut key);
        Self { key }
    }

    /// Restore a cipher from its base64 encoded key.
    pub fn from_base64(encoded: &str) -> Result<Self, SecretsError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|_| SecretsError::InvalidKey)?;
        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| SecretsError::InvalidKey)?;
        Ok(Self { key })
    }

    /// The key in the form persisted to the state document.
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.key)
    }

    pub fn seal(&self, plaintext: &str) -> Result<String, SecretsError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|error| SecretsError::EncryptionFailed(error.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(base64::engine::general_purpose::STANDARD.encode(sealed))
    }

    pub fn open(&self, sealed: &str) -> Result<String, SecretsError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(sealed.trim())
            .map_err(|error| SecretsError::DecryptionFailed(error.to_string()))?;
        if bytes.len() <= NONCE_LEN {
            return Err(SecretsError::DecryptionFailed(
                "sealed value is too short".into(),
            ));
        }

        let (nonce_bytes, ciphertext) = bytes.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|error| SecretsError::DecryptionFailed(error.to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|error| SecretsError::DecryptionFailed(error.to_string()))
    }
}

/// Compare a presented activation secret against the configured one.
///
/// Both sides are hashed first so the comparison runs over fixed-length
/// digests regardless of input length.
pub fn secret_matches(presented: &str, expected: &str) -> bool {
    let presented = Sha256::digest(presented.trim().as_bytes());
    let expected = Sha256::digest(expected.trim().as_bytes());
    presented
        .iter()
        .zip(expected.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
