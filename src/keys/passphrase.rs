//! Passphrase handling and secret key encryption at rest.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::Argon2;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::error::{MailcryptError, Result};

/// A user passphrase.
///
/// Wraps the string so it is wiped from memory on drop and never shows up
/// in debug output.
#[derive(Clone)]
pub struct Passphrase(String);

impl Passphrase {
    /// Wrap a passphrase string
    pub fn new<S: Into<String>>(passphrase: S) -> Self {
        Self(passphrase.into())
    }

    /// Access the passphrase bytes
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Passphrase length in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the passphrase is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Drop for Passphrase {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl std::fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Passphrase").field(&"[REDACTED]").finish()
    }
}

impl From<&str> for Passphrase {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Secret key material encrypted under a passphrase.
///
/// The passphrase is stretched with Argon2id and the key material sealed
/// with AES-256-GCM, so a wrong passphrase fails authentication instead of
/// yielding garbage key bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedSecretKey {
    /// Argon2id salt
    pub salt: [u8; 16],
    /// AES-GCM nonce
    pub nonce: [u8; 12],
    /// Sealed secret key material
    pub ciphertext: Vec<u8>,
}

impl EncryptedSecretKey {
    /// Seal secret key material under a passphrase
    pub fn encrypt(secret: &[u8], passphrase: &Passphrase) -> Result<Self> {
        let mut salt = [0u8; 16];
        let mut nonce = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut salt);
        rand::thread_rng().fill_bytes(&mut nonce);

        let mut kek = derive_key(passphrase, &salt)?;

        let cipher = Aes256Gcm::new_from_slice(&kek)
            .map_err(|e| MailcryptError::crypto(format!("Failed to create cipher: {}", e)))?;
        kek.zeroize();

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), secret)
            .map_err(|e| MailcryptError::crypto(format!("Failed to seal secret key: {}", e)))?;

        Ok(Self {
            salt,
            nonce,
            ciphertext,
        })
    }

    /// Unseal the secret key material.
    ///
    /// A wrong passphrase surfaces as a passphrase error, not a crypto
    /// error, since that is the only way GCM authentication can fail here.
    pub fn decrypt(&self, passphrase: &Passphrase) -> Result<Vec<u8>> {
        let mut kek = derive_key(passphrase, &self.salt)?;

        let cipher = Aes256Gcm::new_from_slice(&kek)
            .map_err(|e| MailcryptError::crypto(format!("Failed to create cipher: {}", e)))?;
        kek.zeroize();

        cipher
            .decrypt(Nonce::from_slice(&self.nonce), self.ciphertext.as_ref())
            .map_err(|_| MailcryptError::passphrase("wrong passphrase for secret key"))
    }

    /// Check whether a passphrase unseals this key
    pub fn passphrase_matches(&self, passphrase: &Passphrase) -> bool {
        match self.decrypt(passphrase) {
            Ok(mut secret) => {
                secret.zeroize();
                true
            }
            Err(_) => false,
        }
    }
}

fn derive_key(passphrase: &Passphrase, salt: &[u8; 16]) -> Result<[u8; 32]> {
    let mut key = [0u8; 32];
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| MailcryptError::crypto(format!("Passphrase derivation failed: {}", e)))?;
    Ok(key)
}
