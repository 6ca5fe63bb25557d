//! Encryption of key material at rest.
//!
//! Grounded on the original Python `infrastructure/utils/encryption.py`: a
//! process-wide secret read from an environment variable, used directly when
//! it already looks like a raw key, otherwise stretched via PBKDF2-HMAC-SHA256
//! with a configurable salt. The original uses Fernet (AES-128-CBC + HMAC);
//! here the stack's `aes-gcm-siv` dependency provides an AEAD construction
//! directly, so ciphertext is `nonce || tag-appended-ciphertext`, base64-encoded.

use aes_gcm_siv::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm_siv::{Aes256GcmSiv, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use keyrouter_types::{EncryptionConfig, RouterError};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// Encrypts and decrypts key material using a process-wide secret.
///
/// The secret is read fresh from the environment on every operation rather
/// than cached at construction, so rotating the environment variable (and
/// restarting key access, not the process) takes effect without rebuilding
/// the router.
pub struct Encryptor {
    config: EncryptionConfig,
}

impl Encryptor {
    /// Construct an encryptor reading its secret per `config`.
    #[must_use]
    pub fn new(config: EncryptionConfig) -> Self {
        Self { config }
    }

    fn derive_key(&self) -> Result<[u8; KEY_LEN], RouterError> {
        let secret = std::env::var(&self.config.key_env_var).map_err(|_| {
            RouterError::Encryption(format!(
                "{} environment variable is required for encryption",
                self.config.key_env_var
            ))
        })?;

        // A 44-character value is treated as an already-sized raw key
        // (mirroring the source's Fernet-key-length shortcut), otherwise the
        // value is stretched via PBKDF2.
        if secret.len() == 44 {
            let mut key = [0u8; KEY_LEN];
            let decoded = BASE64
                .decode(secret.as_bytes())
                .map_err(|e| RouterError::Encryption(format!("invalid encryption key: {e}")))?;
            if decoded.len() != KEY_LEN {
                return Err(RouterError::Encryption(
                    "decoded encryption key must be 32 bytes".to_string(),
                ));
            }
            key.copy_from_slice(&decoded);
            return Ok(key);
        }

        let salt = std::env::var(&self.config.salt_env_var)
            .unwrap_or_else(|_| self.config.default_salt.clone());
        let mut key = [0u8; KEY_LEN];
        pbkdf2::pbkdf2_hmac::<sha2::Sha256>(
            secret.as_bytes(),
            salt.as_bytes(),
            self.config.kdf_iterations,
            &mut key,
        );
        Ok(key)
    }

    /// Encrypt `plaintext` key material, returning base64-encoded ciphertext
    /// (`nonce || ciphertext+tag`).
    ///
    /// # Errors
    /// Returns `RouterError::Encryption` if the process secret is missing or
    /// malformed, or if the underlying AEAD operation fails.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, RouterError> {
        let key = self.derive_key()?;
        let cipher = Aes256GcmSiv::new_from_slice(&key)
            .map_err(|e| RouterError::Encryption(format!("invalid key material: {e}")))?;
        let nonce = Aes256GcmSiv::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| RouterError::Encryption(format!("encryption failed: {e}")))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(out))
    }

    /// Decrypt a value produced by `encrypt`, returning the plaintext key material.
    ///
    /// # Errors
    /// Returns `RouterError::Encryption` if the input is malformed, the
    /// process secret is missing, or authentication fails (tampering or a
    /// wrong secret).
    pub fn decrypt(&self, encoded: &str) -> Result<String, RouterError> {
        let key = self.derive_key()?;
        let cipher = Aes256GcmSiv::new_from_slice(&key)
            .map_err(|e| RouterError::Encryption(format!("invalid key material: {e}")))?;

        let raw = BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| RouterError::Encryption(format!("invalid ciphertext encoding: {e}")))?;
        if raw.len() < NONCE_LEN {
            return Err(RouterError::Encryption(
                "ciphertext shorter than nonce".to_string(),
            ));
        }
        let (nonce_bytes, ciphertext) = raw.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);
        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| RouterError::Encryption(format!("decryption failed: {e}")))?;
        String::from_utf8(plaintext)
            .map_err(|e| RouterError::Encryption(format!("decrypted material not utf-8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tests that touch process environment variables must not run concurrently.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn with_test_key<F: FnOnce()>(f: F) {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        // SAFETY: protected by ENV_LOCK against concurrent test env mutation.
        unsafe {
            std::env::set_var("KEYROUTER_TEST_ENC_KEY", "correct horse battery staple");
        }
        f();
        unsafe {
            std::env::remove_var("KEYROUTER_TEST_ENC_KEY");
        }
    }

    fn test_config() -> EncryptionConfig {
        EncryptionConfig {
            key_env_var: "KEYROUTER_TEST_ENC_KEY".to_string(),
            ..EncryptionConfig::default()
        }
    }

    #[test]
    fn round_trips_plaintext() {
        with_test_key(|| {
            let enc = Encryptor::new(test_config());
            let ciphertext = enc.encrypt("sk-super-secret").unwrap();
            assert_ne!(ciphertext, "sk-super-secret");
            let plaintext = enc.decrypt(&ciphertext).unwrap();
            assert_eq!(plaintext, "sk-super-secret");
        });
    }

    #[test]
    fn missing_secret_is_an_error() {
        let enc = Encryptor::new(EncryptionConfig {
            key_env_var: "KEYROUTER_DEFINITELY_UNSET_VAR".to_string(),
            ..EncryptionConfig::default()
        });
        assert!(enc.encrypt("secret").is_err());
    }

    #[test]
    fn tampered_ciphertext_fails_to_decrypt() {
        with_test_key(|| {
            let enc = Encryptor::new(test_config());
            let mut ciphertext = enc.encrypt("sk-super-secret").unwrap();
            ciphertext.push('A');
            assert!(enc.decrypt(&ciphertext).is_err());
        });
    }
}
