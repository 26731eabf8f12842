//! Decryption with typed, actionable outcomes.
//!
//! Decryption failures are part of normal operation for a mail client: a
//! locked key, a password-protected message, mail encrypted to a key the
//! user no longer has. So [`decrypt`] never returns `Err`; every path
//! produces a [`DecryptOutcome`] that tells the client exactly what to do
//! next, including which key long IDs were involved.

use tracing::debug;

use crate::keys::cache::UnlockedKeyCache;
use crate::keys::matcher::{match_keys, KeyMatch, PrivateKeyCandidate};
use crate::keys::{format_long_id, Passphrase};
use crate::message::classify::{classify_decrypt_error, DecryptErrorKind};
use crate::message::verify::{verify_signatures, SignerKey, VerifyOutcome};
use crate::message::{
    decrypt_payload, parse_inner_stream, unwrap_session_key, unwrap_session_key_password,
    EncryptedMessage, LiteralData, MessageEnvelope, SignaturePacket,
};

/// Key long IDs involved in a failed decryption, for diagnostics and
/// prompting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LongIds {
    /// Keys the message is encrypted to
    pub message: Vec<String>,
    /// Available keys that match the message
    pub matching: Vec<String>,
    /// Matching keys that were unlocked
    pub chosen: Vec<String>,
    /// Matching keys still waiting on a passphrase
    pub need_passphrase: Vec<String>,
}

impl LongIds {
    fn from_match(key_match: &KeyMatch) -> Self {
        Self {
            message: key_match.message_key_ids.iter().copied().map(format_long_id).collect(),
            matching: key_match.matching.iter().copied().map(format_long_id).collect(),
            chosen: key_match.unlocked_ids().into_iter().map(format_long_id).collect(),
            need_passphrase: key_match
                .missing_passphrase
                .iter()
                .copied()
                .map(format_long_id)
                .collect(),
        }
    }
}

/// The result of a decryption attempt
#[derive(Debug, Clone)]
pub enum DecryptOutcome {
    /// The message was opened
    Success {
        /// Decrypted content bytes
        content: Vec<u8>,
        /// Filename carried by the literal packet, if any
        filename: Option<String>,
        /// Signature verification summary, if the message was signed
        signature: Option<VerifyOutcome>,
    },
    /// The message could not be opened
    Failure {
        /// What kind of failure, and therefore what to do next
        kind: DecryptErrorKind,
        /// Human-readable detail
        message: String,
        /// Key long IDs involved
        longids: LongIds,
        /// Content that was recovered despite the failure, when the
        /// failure is advisory (missing integrity protection)
        partial_content: Option<Vec<u8>>,
    },
}

impl DecryptOutcome {
    /// Whether the message was opened
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    fn failure(kind: DecryptErrorKind, message: impl Into<String>, longids: LongIds) -> Self {
        Self::Failure {
            kind,
            message: message.into(),
            longids,
            partial_content: None,
        }
    }
}

/// Decrypt a message with the user's keys and, optionally, a message
/// password, then verify any signatures against `verification_keys`.
pub fn decrypt(
    cache: &UnlockedKeyCache,
    candidates: &[PrivateKeyCandidate],
    data: &[u8],
    password: Option<&Passphrase>,
    verification_keys: &[SignerKey],
) -> DecryptOutcome {
    let envelope = match MessageEnvelope::parse_any(data) {
        Ok(envelope) => envelope,
        Err(e) => {
            let raw = e.to_string();
            let kind = classify_decrypt_error(&raw, password.is_some());
            return DecryptOutcome::failure(kind, raw, LongIds::default());
        }
    };

    match envelope {
        MessageEnvelope::Cleartext(msg) => {
            finish(&msg.literals, &msg.signatures, verification_keys)
        }
        MessageEnvelope::Encrypted(msg) => {
            decrypt_encrypted(cache, candidates, &msg, password, verification_keys)
        }
    }
}

fn decrypt_encrypted(
    cache: &UnlockedKeyCache,
    candidates: &[PrivateKeyCandidate],
    msg: &EncryptedMessage,
    password: Option<&Passphrase>,
    verification_keys: &[SignerKey],
) -> DecryptOutcome {
    let target_ids = msg.target_key_ids();
    let key_match = match_keys(cache, candidates, &target_ids);
    let longids = LongIds::from_match(&key_match);

    let mut session_key: Option<[u8; 32]> = None;
    let mut last_error: Option<String> = None;

    'outer: for packet in &msg.session_keys {
        for unlocked in &key_match.unlocked {
            let secret = match unlocked.as_x25519() {
                Ok(secret) => secret,
                Err(_) => continue,
            };
            match unwrap_session_key(packet, &secret) {
                Ok(key) => {
                    debug!(
                        key = %format_long_id(unlocked.key_id),
                        "session key unwrapped"
                    );
                    session_key = Some(key);
                    break 'outer;
                }
                Err(e) => last_error = Some(e.to_string()),
            }
        }
    }

    if session_key.is_none() && !msg.password_keys.is_empty() {
        if let Some(password) = password {
            for packet in &msg.password_keys {
                match unwrap_session_key_password(packet, password) {
                    Ok(key) => {
                        session_key = Some(key);
                        break;
                    }
                    Err(e) => last_error = Some(e.to_string()),
                }
            }
        }
    }

    let session_key = match session_key {
        Some(key) => key,
        None => {
            // A locked matching key wins over the password prompt: the
            // user holds a key for this message, so ask for its
            // passphrase first.
            if key_match.unlocked.is_empty() && !key_match.missing_passphrase.is_empty() {
                return DecryptOutcome::failure(
                    DecryptErrorKind::NeedPassphrase,
                    format!(
                        "Passphrase needed for key(s) {}",
                        longids.need_passphrase.join(", ")
                    ),
                    longids,
                );
            }

            // Only a symmetric-only message asks for the message password.
            if msg.session_keys.is_empty() && !msg.password_keys.is_empty() && password.is_none() {
                return DecryptOutcome::failure(
                    DecryptErrorKind::UsePassword,
                    "Message is protected by a password",
                    longids,
                );
            }

            let raw = last_error
                .unwrap_or_else(|| "no matching session key for this message".to_string());
            let kind = classify_decrypt_error(&raw, password.is_some());
            return DecryptOutcome::failure(kind, raw, longids);
        }
    };

    let inner = match decrypt_payload(&session_key, &msg.payload.body) {
        Ok(inner) => inner,
        Err(e) => {
            let raw = e.to_string();
            let kind = classify_decrypt_error(&raw, password.is_some());
            return DecryptOutcome::failure(kind, raw, longids);
        }
    };

    let (signatures, literals) = match parse_inner_stream(&inner) {
        Ok(parsed) => parsed,
        Err(e) => {
            let raw = e.to_string();
            let kind = classify_decrypt_error(&raw, password.is_some());
            return DecryptOutcome::failure(kind, raw, longids);
        }
    };

    if !msg.payload.integrity_protected {
        // The content decrypted fine but nothing protects it from
        // ciphertext tampering, so the caller gets it with a warning
        // attached rather than as a clean success.
        let content = literals
            .first()
            .map(|literal| literal.data.clone());
        return DecryptOutcome::Failure {
            kind: DecryptErrorKind::NoMdc,
            message: "Message lacks integrity protection".to_string(),
            longids,
            partial_content: content,
        };
    }

    finish(&literals, &signatures, verification_keys)
}

fn finish(
    literals: &[LiteralData],
    signatures: &[SignaturePacket],
    verification_keys: &[SignerKey],
) -> DecryptOutcome {
    let literal = match literals.first() {
        Some(literal) => literal,
        None => {
            return DecryptOutcome::failure(
                DecryptErrorKind::FormatError,
                "Message contains no literal data",
                LongIds::default(),
            );
        }
    };

    // Signatures are checked before the literal content is handed over;
    // consuming the content first would stall on streamed input whose
    // signature trailer has not arrived yet.
    let signature = if literals.len() > 1 {
        Some(VerifyOutcome::cannot_verify(
            "more than one literal payload in message",
        ))
    } else if signatures.is_empty() {
        None
    } else {
        Some(verify_signatures(signatures, &literal.data, verification_keys))
    };

    DecryptOutcome::Success {
        content: literal.data.clone(),
        filename: literal.filename.clone(),
        signature,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::KeyPair;
    use crate::message::encrypt::{encrypt, EncryptRequest, EncryptedOutput};
    use crate::keys::RecipientKey;

    fn encrypt_to(
        recipient: &KeyPair,
        signer: Option<&KeyPair>,
        password: Option<&Passphrase>,
        plaintext: &[u8],
    ) -> Vec<u8> {
        let recipients = vec![RecipientKey::new(
            recipient.public.clone(),
            "bob@example.com",
            false,
        )];
        let request = EncryptRequest {
            recipients,
            signer: signer.map(|pair| (&pair.private, None)),
            password: password.cloned(),
            plaintext: plaintext.to_vec(),
            filename: None,
            armor: false,
            date: None,
        };
        match encrypt(&request).unwrap().output {
            EncryptedOutput::Binary(bytes) => bytes,
            EncryptedOutput::Armored(_) => panic!("expected binary output"),
        }
    }

    #[test]
    fn test_decrypt_roundtrip() {
        let cache = UnlockedKeyCache::new();
        let recipient = KeyPair::generate_x25519(None).unwrap();
        let data = encrypt_to(&recipient, None, None, b"secret plans");

        let candidates = vec![PrivateKeyCandidate::new(recipient.private, None)];
        let outcome = decrypt(&cache, &candidates, &data, None, &[]);

        match outcome {
            DecryptOutcome::Success {
                content, signature, ..
            } => {
                assert_eq!(content, b"secret plans");
                assert!(signature.is_none());
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_decrypt_signed_roundtrip() {
        let cache = UnlockedKeyCache::new();
        let recipient = KeyPair::generate_x25519(None).unwrap();
        let signer = KeyPair::generate_ed25519(None).unwrap();
        let data = encrypt_to(&recipient, Some(&signer), None, b"signed secret");

        let candidates = vec![PrivateKeyCandidate::new(recipient.private, None)];
        let signer_keys = vec![SignerKey::new(
            signer.public.clone(),
            Some("alice@example.com".into()),
        )];
        let outcome = decrypt(&cache, &candidates, &data, None, &signer_keys);

        match outcome {
            DecryptOutcome::Success {
                content, signature, ..
            } => {
                assert_eq!(content, b"signed secret");
                let signature = signature.unwrap();
                assert_eq!(signature.valid, Some(true));
                assert_eq!(signature.attributed_to.as_deref(), Some("alice@example.com"));
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[test]
    fn test_locked_key_reports_need_passphrase() {
        let cache = UnlockedKeyCache::new();
        let passphrase = Passphrase::new("locked");
        let recipient = KeyPair::generate_x25519(Some(&passphrase)).unwrap();
        let expected_id = recipient.private.long_id();
        let data = encrypt_to(&recipient, None, None, b"secret");

        let candidates = vec![PrivateKeyCandidate::new(recipient.private, None)];
        let outcome = decrypt(&cache, &candidates, &data, None, &[]);

        match outcome {
            DecryptOutcome::Failure { kind, longids, .. } => {
                assert_eq!(kind, DecryptErrorKind::NeedPassphrase);
                assert_eq!(longids.need_passphrase, vec![expected_id.clone()]);
                assert_eq!(longids.matching, vec![expected_id.clone()]);
                assert_eq!(longids.message, vec![expected_id]);
                assert!(longids.chosen.is_empty());
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_wrong_recipient_reports_key_mismatch() {
        let cache = UnlockedKeyCache::new();
        let recipient = KeyPair::generate_x25519(None).unwrap();
        let stranger = KeyPair::generate_x25519(None).unwrap();
        let data = encrypt_to(&recipient, None, None, b"secret");

        let candidates = vec![PrivateKeyCandidate::new(stranger.private, None)];
        let outcome = decrypt(&cache, &candidates, &data, None, &[]);

        match outcome {
            DecryptOutcome::Failure { kind, .. } => {
                assert_eq!(kind, DecryptErrorKind::KeyMismatch);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_password_only_message() {
        let cache = UnlockedKeyCache::new();
        let password = Passphrase::new("tea time");
        let request = EncryptRequest {
            recipients: Vec::new(),
            signer: None,
            password: Some(password.clone()),
            plaintext: b"for the group".to_vec(),
            filename: None,
            armor: false,
            date: None,
        };
        let data = match encrypt(&request).unwrap().output {
            EncryptedOutput::Binary(bytes) => bytes,
            EncryptedOutput::Armored(_) => panic!("expected binary output"),
        };

        // No password supplied: the client should prompt for one.
        let outcome = decrypt(&cache, &[], &data, None, &[]);
        match outcome {
            DecryptOutcome::Failure { kind, .. } => {
                assert_eq!(kind, DecryptErrorKind::UsePassword);
            }
            other => panic!("expected failure, got {:?}", other),
        }

        // Wrong password.
        let outcome = decrypt(&cache, &[], &data, Some(&Passphrase::new("coffee")), &[]);
        match outcome {
            DecryptOutcome::Failure { kind, .. } => {
                assert_eq!(kind, DecryptErrorKind::WrongPassword);
            }
            other => panic!("expected failure, got {:?}", other),
        }

        // Right password.
        let outcome = decrypt(&cache, &[], &data, Some(&password), &[]);
        assert!(outcome.is_success());
    }

    #[test]
    fn test_locked_key_outranks_password_prompt() {
        // Message addressed to both a key and a password. The holder of
        // the (sealed) key should be asked for a passphrase, not for the
        // message password.
        let cache = UnlockedKeyCache::new();
        let passphrase = Passphrase::new("sealed");
        let recipient = KeyPair::generate_x25519(Some(&passphrase)).unwrap();
        let expected_id = recipient.private.long_id();
        let data = encrypt_to(
            &recipient,
            None,
            Some(&Passphrase::new("fallback password")),
            b"mixed recipients",
        );

        let candidates = vec![PrivateKeyCandidate::new(recipient.private, None)];
        let outcome = decrypt(&cache, &candidates, &data, None, &[]);

        match outcome {
            DecryptOutcome::Failure { kind, longids, .. } => {
                assert_eq!(kind, DecryptErrorKind::NeedPassphrase);
                assert_eq!(longids.need_passphrase, vec![expected_id]);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_corrupted_payload_reports_bad_mdc() {
        let cache = UnlockedKeyCache::new();
        let recipient = KeyPair::generate_x25519(None).unwrap();
        let mut data = encrypt_to(&recipient, None, None, b"secret");
        let last = data.len() - 1;
        data[last] ^= 0x01;

        let candidates = vec![PrivateKeyCandidate::new(recipient.private, None)];
        let outcome = decrypt(&cache, &candidates, &data, None, &[]);

        match outcome {
            DecryptOutcome::Failure { kind, .. } => {
                assert_eq!(kind, DecryptErrorKind::BadMdc);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_legacy_payload_reports_no_mdc_with_content() {
        use crate::message::{encode_body, encrypt_payload, wrap_session_key};
        use crate::packet::{Packet, PacketTag};

        let cache = UnlockedKeyCache::new();
        let recipient = KeyPair::generate_x25519(None).unwrap();

        let session_key = [0x77u8; 32];
        let wrapped = wrap_session_key(&recipient.public, &session_key).unwrap();
        let literal = LiteralData {
            filename: None,
            created: 0,
            data: b"old message".to_vec(),
        };
        let inner =
            Packet::write_all(&[encode_body(PacketTag::LiteralData, &literal).unwrap()]);
        let body = encrypt_payload(&session_key, &inner).unwrap();

        // A legacy message uses the unprotected payload packet.
        let data = Packet::write_all(&[
            encode_body(PacketTag::PublicKeyEncryptedSessionKey, &wrapped).unwrap(),
            encode_body(PacketTag::SymmetricallyEncryptedData, &body).unwrap(),
        ]);

        let candidates = vec![PrivateKeyCandidate::new(recipient.private, None)];
        let outcome = decrypt(&cache, &candidates, &data, None, &[]);

        match outcome {
            DecryptOutcome::Failure {
                kind,
                partial_content,
                ..
            } => {
                assert_eq!(kind, DecryptErrorKind::NoMdc);
                assert_eq!(partial_content.as_deref(), Some(b"old message".as_slice()));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_garbage_input_reports_format_error() {
        let cache = UnlockedKeyCache::new();
        let outcome = decrypt(&cache, &[], b"\xC1\x02\x00", None, &[]);

        match outcome {
            DecryptOutcome::Failure { kind, .. } => {
                assert_eq!(kind, DecryptErrorKind::FormatError);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
