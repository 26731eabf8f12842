//! Signature verification and the rules for summarizing it.
//!
//! Verification never fails the surrounding operation: whatever happens is
//! folded into a [`VerifyOutcome`] the client renders next to the message.
//! The summary distinguishes "signature is bad" from "signature could not
//! be checked", because showing a red warning over a missing public key
//! would train users to ignore red warnings.

use ed25519_dalek::{Signature, Signer, Verifier};
use tracing::debug;

use crate::error::Result;
use crate::keys::{format_long_id, key_ids_equal, unix_time_now, Algorithm, PublicKey, UnlockedKey};
use crate::message::SignaturePacket;

/// A public key offered for signature verification, with the contact it
/// belongs to.
#[derive(Debug, Clone)]
pub struct SignerKey {
    /// The verification key
    pub key: PublicKey,
    /// Email address of the key's owner, if known
    pub email: Option<String>,
}

impl SignerKey {
    /// Pair a verification key with its owner
    pub fn new(key: PublicKey, email: Option<String>) -> Self {
        Self { key, email }
    }
}

/// Summary of signature verification for one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyOutcome {
    /// Key ID the message claims signed it
    pub signer_key_id: Option<u64>,
    /// `Some(true)` if every checkable signature verified, `Some(false)`
    /// if any checked signature is bad, `None` if nothing could be checked
    pub valid: Option<bool>,
    /// Why verification could not run, when it could not
    pub error: Option<String>,
    /// Email of the contact whose key verified the signature
    pub attributed_to: Option<String>,
}

impl VerifyOutcome {
    /// Outcome for an unsigned message
    pub fn unsigned() -> Self {
        Self {
            signer_key_id: None,
            valid: None,
            error: None,
            attributed_to: None,
        }
    }

    /// Outcome when verification structurally cannot run
    pub fn cannot_verify<S: Into<String>>(reason: S) -> Self {
        Self {
            signer_key_id: None,
            valid: None,
            error: Some(reason.into()),
            attributed_to: None,
        }
    }

    /// The claimed signer rendered as a hex long ID
    pub fn signer_long_id(&self) -> Option<String> {
        self.signer_key_id.map(format_long_id)
    }
}

/// Verify signatures over message data against the given keys.
///
/// Signatures whose signer key is absent from `keys` count as unchecked,
/// not bad. One bad checked signature makes the whole outcome bad.
pub fn verify_signatures(
    signatures: &[SignaturePacket],
    data: &[u8],
    keys: &[SignerKey],
) -> VerifyOutcome {
    if signatures.is_empty() {
        return VerifyOutcome::unsigned();
    }

    let mut outcome = VerifyOutcome::unsigned();
    outcome.signer_key_id = Some(signatures[0].signer_key_id);

    let mut checked = 0usize;

    for signature in signatures {
        let signer = keys.iter().find(|sk| {
            key_ids_equal(sk.key.key_id(), signature.signer_key_id)
                && sk.key.metadata.usage.sign
                && sk.key.metadata.algorithm == Algorithm::Ed25519
        });

        let signer = match signer {
            Some(signer) => signer,
            None => {
                debug!(
                    signer = %format_long_id(signature.signer_key_id),
                    "no verification key for signer"
                );
                continue;
            }
        };

        // A structural failure means verification cannot be trusted
        // either way, so any verdict from earlier signatures is dropped.
        let verifying_key = match signer.key.as_ed25519() {
            Ok(key) => key,
            Err(e) => {
                outcome.valid = None;
                outcome.attributed_to = None;
                outcome.error = Some(e.to_string());
                return outcome;
            }
        };

        let parsed = match Signature::from_slice(&signature.signature) {
            Ok(parsed) => parsed,
            Err(e) => {
                outcome.valid = None;
                outcome.attributed_to = None;
                outcome.error = Some(format!("Malformed signature: {}", e));
                return outcome;
            }
        };

        checked += 1;

        if verifying_key.verify(data, &parsed).is_ok() {
            if outcome.valid.is_none() {
                outcome.valid = Some(true);
                outcome.attributed_to = signer.email.clone();
            }
        } else {
            // One bad signature poisons the whole message, no matter how
            // many others verified.
            outcome.valid = Some(false);
            outcome.attributed_to = None;
        }
    }

    if checked == 0 {
        outcome.valid = None;
    }

    outcome
}

/// Verify a detached signature over data.
///
/// Accepts either an armored signature block or raw signature packets,
/// and folds with the same rules as [`verify_signatures`]. Unparsable
/// signature input yields a could-not-check outcome, never an `Err`.
pub fn verify_detached(data: &[u8], signature: &[u8], keys: &[SignerKey]) -> VerifyOutcome {
    let packet_bytes = match std::str::from_utf8(signature) {
        Ok(text) if text.contains("-----BEGIN PGP SIGNATURE-----") => {
            match crate::armor::decode_normalized(text) {
                Ok(block) => block.data,
                Err(e) => return VerifyOutcome::cannot_verify(e.to_string()),
            }
        }
        _ => signature.to_vec(),
    };

    match crate::message::parse_signature_packets(&packet_bytes) {
        Ok(signatures) => verify_signatures(&signatures, data, keys),
        Err(e) => VerifyOutcome::cannot_verify(e.to_string()),
    }
}

/// Sign message data with an unlocked Ed25519 key
pub(crate) fn sign_data(key: &UnlockedKey, data: &[u8]) -> Result<SignaturePacket> {
    let signing = key.as_ed25519()?;
    let signature = signing.sign(data);

    Ok(SignaturePacket {
        version: 4,
        signer_key_id: key.key_id,
        algorithm: Algorithm::Ed25519,
        created: unix_time_now(),
        signature: signature.to_bytes().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyPair;

    fn signed(data: &[u8]) -> (SignaturePacket, SignerKey) {
        let pair = KeyPair::generate_ed25519(None).unwrap();
        let unlocked = pair.private.unlock(None).unwrap();
        let packet = sign_data(&unlocked, data).unwrap();
        let key = SignerKey::new(pair.public, Some("alice@example.com".into()));
        (packet, key)
    }

    #[test]
    fn test_good_signature_verifies() {
        let data = b"meet at noon";
        let (packet, key) = signed(data);

        let outcome = verify_signatures(&[packet], data, &[key]);
        assert_eq!(outcome.valid, Some(true));
        assert_eq!(outcome.attributed_to.as_deref(), Some("alice@example.com"));
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_tampered_data_fails() {
        let (packet, key) = signed(b"meet at noon");

        let outcome = verify_signatures(&[packet], b"meet at midnight", &[key]);
        assert_eq!(outcome.valid, Some(false));
        assert!(outcome.attributed_to.is_none());
    }

    #[test]
    fn test_missing_key_means_unknown() {
        let data = b"meet at noon";
        let (packet, _key) = signed(data);
        let signer_id = packet.signer_key_id;

        let outcome = verify_signatures(&[packet], data, &[]);
        assert_eq!(outcome.valid, None);
        assert_eq!(outcome.signer_key_id, Some(signer_id));
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_one_bad_signature_poisons_outcome() {
        let data = b"meet at noon";
        let (good, good_key) = signed(data);
        let (bad, bad_key) = signed(b"something else entirely");

        let outcome =
            verify_signatures(&[good, bad], data, &[good_key, bad_key]);
        assert_eq!(outcome.valid, Some(false));
    }

    #[test]
    fn test_unsigned_message() {
        let outcome = verify_signatures(&[], b"hello", &[]);
        assert_eq!(outcome.valid, None);
        assert!(outcome.signer_key_id.is_none());
    }

    #[test]
    fn test_malformed_signature_is_unknown_with_error() {
        let data = b"meet at noon";
        let (mut packet, key) = signed(data);
        packet.signature.truncate(10);

        let outcome = verify_signatures(&[packet], data, &[key]);
        assert_eq!(outcome.valid, None);
        assert!(outcome.error.is_some());
    }

    #[test]
    fn test_good_then_malformed_collapses_to_unknown() {
        let data = b"meet at noon";
        let (good, good_key) = signed(data);
        let (mut broken, broken_key) = signed(data);
        broken.signature.truncate(10);

        // The earlier good verdict must not survive the structural
        // failure on the second signature.
        let outcome = verify_signatures(&[good, broken], data, &[good_key, broken_key]);
        assert_eq!(outcome.valid, None);
        assert!(outcome.attributed_to.is_none());
        assert!(outcome.error.is_some());
    }

    #[test]
    fn test_detached_signature_verifies() {
        use crate::message::encrypt::sign_detached;

        let pair = KeyPair::generate_ed25519(None).unwrap();
        let data = b"release tarball";
        let armored = sign_detached(data, &pair.private, None).unwrap();
        let keys = [SignerKey::new(pair.public, Some("rel@example.com".into()))];

        let outcome = verify_detached(data, armored.as_bytes(), &keys);
        assert_eq!(outcome.valid, Some(true));

        let outcome = verify_detached(b"tampered tarball", armored.as_bytes(), &keys);
        assert_eq!(outcome.valid, Some(false));
    }

    #[test]
    fn test_detached_garbage_signature_cannot_verify() {
        let outcome = verify_detached(b"data", b"not a signature", &[]);
        assert_eq!(outcome.valid, None);
        assert!(outcome.error.is_some());
    }

    #[test]
    fn test_long_id_rendering() {
        let mut outcome = VerifyOutcome::unsigned();
        outcome.signer_key_id = Some(0xDEADBEEF);
        assert_eq!(outcome.signer_long_id().as_deref(), Some("00000000DEADBEEF"));
    }
}
