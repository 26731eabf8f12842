//! Matching private keys against a message's session key packets.
//!
//! Given the private keys a user holds and the key IDs an encrypted
//! message names, work out which keys can decrypt it, unlock the ones we
//! can, and report the ones still waiting on a passphrase. Unlocked
//! material goes through the [`UnlockedKeyCache`] so repeated messages in
//! a thread do not re-derive the same keys.

use tracing::debug;

use crate::keys::cache::{UnlockedKey, UnlockedKeyCache};
use crate::keys::passphrase::Passphrase;
use crate::keys::{format_long_id, key_ids_equal, Algorithm, PrivateKey};

/// A private key offered for decryption, with its subkeys and an optional
/// passphrase supplied by the user.
#[derive(Debug, Clone)]
pub struct PrivateKeyCandidate {
    /// The primary private key
    pub key: PrivateKey,
    /// Subkeys bound to the primary
    pub subkeys: Vec<PrivateKey>,
    /// Passphrase to unlock sealed key material, if the user provided one
    pub passphrase: Option<Passphrase>,
}

impl PrivateKeyCandidate {
    /// Offer a primary key without subkeys
    pub fn new(key: PrivateKey, passphrase: Option<Passphrase>) -> Self {
        Self {
            key,
            subkeys: Vec::new(),
            passphrase,
        }
    }

    /// Attach subkeys to the candidate
    pub fn with_subkeys(mut self, subkeys: Vec<PrivateKey>) -> Self {
        self.subkeys = subkeys;
        self
    }

    /// The keys in this candidate capable of decrypting session keys
    pub fn decryption_keys(&self) -> Vec<&PrivateKey> {
        std::iter::once(&self.key)
            .chain(self.subkeys.iter())
            .filter(|k| k.metadata.usage.encrypt && k.metadata.algorithm == Algorithm::X25519)
            .collect()
    }
}

/// The outcome of matching candidates against a message
#[derive(Debug, Default)]
pub struct KeyMatch {
    /// Key IDs the message's session key packets name
    pub message_key_ids: Vec<u64>,
    /// Candidate key IDs that match the message
    pub matching: Vec<u64>,
    /// Keys that were unlocked and are ready to decrypt
    pub unlocked: Vec<UnlockedKey>,
    /// Matching key IDs still sealed because no working passphrase was given
    pub missing_passphrase: Vec<u64>,
}

impl KeyMatch {
    /// Key IDs of the unlocked keys
    pub fn unlocked_ids(&self) -> Vec<u64> {
        self.unlocked.iter().map(|k| k.key_id).collect()
    }
}

/// Match private key candidates against the key IDs an encrypted message
/// names, unlocking every matching key that can be unlocked.
///
/// Candidates without any decryption-capable key are skipped. If no
/// candidate key ID matches the message, every candidate is tried anyway:
/// messages addressed to a wildcard recipient, and senders that encrypt to
/// a stale key ID, are both common enough that a strict ID match would
/// reject decryptable mail.
pub fn match_keys(
    cache: &UnlockedKeyCache,
    candidates: &[PrivateKeyCandidate],
    message_key_ids: &[u64],
) -> KeyMatch {
    let mut result = KeyMatch {
        message_key_ids: message_key_ids.to_vec(),
        ..Default::default()
    };

    // A message that names no recipient keys needs no private key at all
    // (password-only mail), so there is nothing to match or unlock.
    if message_key_ids.is_empty() {
        return result;
    }

    let mut usable: Vec<(&PrivateKeyCandidate, Vec<&PrivateKey>)> = Vec::new();
    for candidate in candidates {
        let keys = candidate.decryption_keys();
        if keys.is_empty() {
            debug!(
                key = %candidate.key.long_id(),
                "skipping candidate without decryption-capable keys"
            );
            continue;
        }
        usable.push((candidate, keys));
    }

    let mut matched: Vec<(&PrivateKeyCandidate, &PrivateKey)> = Vec::new();
    for (candidate, keys) in &usable {
        for key in keys {
            if message_key_ids
                .iter()
                .any(|&id| key_ids_equal(id, key.key_id()))
            {
                matched.push((*candidate, *key));
            }
        }
    }

    if matched.is_empty() && !usable.is_empty() {
        debug!("no key ID matched the message, trying all candidates");
        for (candidate, keys) in &usable {
            for key in keys {
                matched.push((*candidate, *key));
            }
        }
    } else {
        for (_, key) in &matched {
            result.matching.push(key.key_id());
        }
    }

    for (candidate, key) in matched {
        if let Some(unlocked) = cache.get(key.key_id()) {
            result.unlocked.push(unlocked);
            continue;
        }

        match key.unlock(candidate.passphrase.as_ref()) {
            Ok(unlocked) => {
                cache.put(unlocked.clone());
                result.unlocked.push(unlocked);
            }
            Err(_) => {
                debug!(
                    key = %format_long_id(key.key_id()),
                    "key needs a passphrase to unlock"
                );
                result.missing_passphrase.push(key.key_id());
            }
        }
    }

    result
}
