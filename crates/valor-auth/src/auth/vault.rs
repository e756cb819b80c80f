use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::RngCore;
use zeroize::Zeroize;

use crate::storage::StorageArea;

use super::AuthError;

const KEY_LENGTH: usize = 32;
const IV_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;

/// Session-storage slot holding the exported vault key.
const VAULT_KEY_SLOT: &str = "valor.auth.vault-key";

/// Encrypts locally persisted authentication material with a session-scoped
/// AES-256-GCM key.
///
/// The key is generated on first use and exported into the session storage
/// area so a page reload mid-flow re-imports it instead of regenerating.
/// It is a device nonce, not derived from anything user-guessable, never
/// leaves the device, and is destroyed on logout, which permanently
/// invalidates every blob it produced.
pub struct EncryptedVault {
    session: Arc<dyn StorageArea>,
}

impl EncryptedVault {
    pub fn new(session: Arc<dyn StorageArea>) -> Self {
        Self { session }
    }

    /// Encrypt a payload into base64(IV || ciphertext + tag).
    ///
    /// The 96-bit IV is freshly random per call and never reused with the
    /// same key.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, AuthError> {
        let mut key_bytes = self.load_or_generate_key()?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
        key_bytes.zeroize();

        let mut iv = [0u8; IV_LENGTH];
        rand::thread_rng().fill_bytes(&mut iv);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
            .map_err(|err| AuthError::Encryption(err.to_string()))?;

        let mut blob = Vec::with_capacity(IV_LENGTH + ciphertext.len());
        blob.extend_from_slice(&iv);
        blob.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(blob))
    }

    /// Decrypt a blob produced by [`EncryptedVault::encrypt`].
    ///
    /// Fails closed: malformed base64, a truncated blob, a missing key, or a
    /// rejected authentication tag all surface as [`AuthError::Decryption`]
    /// and never yield partial plaintext.
    pub fn decrypt(&self, blob: &str) -> Result<String, AuthError> {
        let mut key_bytes = self
            .load_key()?
            .ok_or_else(|| AuthError::Decryption("vault key missing".into()))?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
        key_bytes.zeroize();

        let raw = BASE64
            .decode(blob)
            .map_err(|_| AuthError::Decryption("payload is not valid base64".into()))?;
        if raw.len() < IV_LENGTH + TAG_LENGTH {
            return Err(AuthError::Decryption("payload too short".into()));
        }
        let (iv, ciphertext) = raw.split_at(IV_LENGTH);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(iv), ciphertext)
            .map_err(|_| AuthError::Decryption("authentication tag rejected".into()))?;
        String::from_utf8(plaintext).map_err(|_| AuthError::Decryption("payload is not UTF-8".into()))
    }

    /// Destroy the session key. Every previously produced blob becomes
    /// permanently undecryptable.
    pub fn clear_key(&self) -> Result<(), AuthError> {
        self.session.remove(VAULT_KEY_SLOT)?;
        Ok(())
    }

    fn load_key(&self) -> Result<Option<Vec<u8>>, AuthError> {
        match self.session.get(VAULT_KEY_SLOT)? {
            Some(encoded) => {
                let bytes = BASE64
                    .decode(encoded)
                    .map_err(|_| AuthError::Decryption("stored vault key is corrupt".into()))?;
                if bytes.len() != KEY_LENGTH {
                    return Err(AuthError::Decryption("stored vault key has wrong length".into()));
                }
                Ok(Some(bytes))
            }
            None => Ok(None),
        }
    }

    fn load_or_generate_key(&self) -> Result<Vec<u8>, AuthError> {
        if let Some(key) = self.load_key()? {
            return Ok(key);
        }
        let mut key = vec![0u8; KEY_LENGTH];
        rand::thread_rng().fill_bytes(&mut key);
        self.session.set(VAULT_KEY_SLOT, &BASE64.encode(&key))?;
        tracing::debug!("generated vault key for this browsing session");
        Ok(key)
    }
}
