//! In-memory cache for unlocked private keys.
//!
//! Unlocking an encrypted key costs an Argon2 derivation, so a client
//! processing a thread of messages would otherwise re-prompt or re-derive
//! for every message. The cache keeps unlocked key material for a short
//! sliding window and wipes everything once the window lapses.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use zeroize::Zeroize;

use crate::error::{MailcryptError, Result};
use crate::keys::Algorithm;

/// Default idle lifetime before the cache wipes itself
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(2 * 60);

/// Decrypted private key material ready for use
#[derive(Clone)]
pub struct UnlockedKey {
    /// Key ID of the key this material belongs to
    pub key_id: u64,
    /// Key algorithm
    pub algorithm: Algorithm,
    secret: Vec<u8>,
}

impl UnlockedKey {
    /// Wrap raw unlocked key material
    pub fn new(key_id: u64, algorithm: Algorithm, secret: Vec<u8>) -> Self {
        Self {
            key_id,
            algorithm,
            secret,
        }
    }

    /// Interpret the material as an X25519 secret
    pub fn as_x25519(&self) -> Result<x25519_dalek::StaticSecret> {
        let bytes: [u8; 32] = self
            .secret
            .as_slice()
            .try_into()
            .map_err(|_| MailcryptError::key("Invalid X25519 secret key length"))?;
        Ok(x25519_dalek::StaticSecret::from(bytes))
    }

    /// Interpret the material as an Ed25519 signing key
    pub fn as_ed25519(&self) -> Result<ed25519_dalek::SigningKey> {
        let bytes: [u8; 32] = self
            .secret
            .as_slice()
            .try_into()
            .map_err(|_| MailcryptError::key("Invalid Ed25519 secret key length"))?;
        Ok(ed25519_dalek::SigningKey::from_bytes(&bytes))
    }
}

impl Drop for UnlockedKey {
    fn drop(&mut self) {
        self.secret.zeroize();
    }
}

impl std::fmt::Debug for UnlockedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnlockedKey")
            .field("key_id", &format_args!("{:016X}", self.key_id))
            .field("algorithm", &self.algorithm)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

struct CacheInner {
    keys: HashMap<u64, UnlockedKey>,
    last_access: Instant,
}

/// Sliding-expiry cache of unlocked keys.
///
/// Any access renews the window; once the cache sits idle past its TTL the
/// *entire* contents are wiped on the next access. Per-entry expiry would
/// let an attacker with intermittent access keep single keys warm forever.
pub struct UnlockedKeyCache {
    inner: Mutex<CacheInner>,
    ttl: Duration,
}

impl UnlockedKeyCache {
    /// Create a cache with the default idle lifetime
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_CACHE_TTL)
    }

    /// Create a cache with a custom idle lifetime
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                keys: HashMap::new(),
                last_access: Instant::now(),
            }),
            ttl,
        }
    }

    /// Look up an unlocked key, renewing the expiry window
    pub fn get(&self, key_id: u64) -> Option<UnlockedKey> {
        let mut inner = self.lock();
        Self::expire(&mut inner, self.ttl);
        inner.last_access = Instant::now();
        inner.keys.get(&key_id).cloned()
    }

    /// Store an unlocked key, renewing the expiry window
    pub fn put(&self, key: UnlockedKey) {
        let mut inner = self.lock();
        Self::expire(&mut inner, self.ttl);
        inner.last_access = Instant::now();
        inner.keys.insert(key.key_id, key);
    }

    /// Wipe all cached key material immediately
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.keys.clear();
        inner.last_access = Instant::now();
    }

    /// Number of keys currently cached
    pub fn len(&self) -> usize {
        let mut inner = self.lock();
        Self::expire(&mut inner, self.ttl);
        inner.keys.len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expire(inner: &mut CacheInner, ttl: Duration) {
        if inner.last_access.elapsed() > ttl {
            inner.keys.clear();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        // A poisoned lock only means another thread panicked mid-access;
        // the map itself is still a valid cache.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for UnlockedKeyCache {
    fn default() -> Self {
        Self::new()
    }
}
