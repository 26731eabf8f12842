//! Message encryption, signing, and encryption date negotiation.

use rand::RngCore;
use tracing::debug;
use zeroize::Zeroize;

use crate::armor::{self, ArmorKind};
use crate::error::{MailcryptError, Result};
use crate::keys::{unix_time_now, Passphrase, PrivateKey, RecipientKey};
use crate::message::verify::sign_data;
use crate::message::{
    encode_body, encrypt_payload, wrap_session_key, wrap_session_key_password, LiteralData,
};
use crate::packet::{Packet, PacketTag};
use crate::validation::Validator;

/// Everything needed to encrypt one message
#[derive(Debug)]
pub struct EncryptRequest<'a> {
    /// Recipient public keys; may be empty if a password is set
    pub recipients: Vec<RecipientKey>,
    /// Signing key and its passphrase, if the message should be signed
    pub signer: Option<(&'a PrivateKey, Option<&'a Passphrase>)>,
    /// Message password for recipients without keys
    pub password: Option<Passphrase>,
    /// Content to encrypt
    pub plaintext: Vec<u8>,
    /// Filename to record in the literal packet
    pub filename: Option<String>,
    /// Whether to armor the output
    pub armor: bool,
    /// Encryption time override, seconds since the Unix epoch
    pub date: Option<u64>,
}

/// Encrypted message output
#[derive(Debug, Clone)]
pub enum EncryptedOutput {
    /// ASCII-armored message
    Armored(String),
    /// Raw binary packet stream
    Binary(Vec<u8>),
}

/// The result of encrypting a message
#[derive(Debug, Clone)]
pub struct EncryptResult {
    /// The encrypted message
    pub output: EncryptedOutput,
    /// Key ID of the signing key, if the message was signed
    pub signed_by: Option<u64>,
}

/// Which timestamp the message should be encrypted under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateNegotiation {
    /// All recipient keys are currently usable
    UseNow,
    /// Some recipient key has expired; use the last moment the whole key
    /// set was usable
    Historic {
        /// Negotiated timestamp, seconds since the Unix epoch
        as_of: u64,
    },
}

/// Negotiate the encryption date for a recipient key set.
///
/// If every key is usable right now, now wins. If some key has expired,
/// fall back to the newest moment at which every key was simultaneously
/// valid; senders routinely hold stale keys for correspondents, and
/// refusing to encrypt outright would bounce the mail. When the keys'
/// validity windows never overlapped there is no honest date to use, and
/// that is a hard error.
pub fn negotiate_encryption_date(recipients: &[RecipientKey], now: u64) -> Result<DateNegotiation> {
    let any_expired = recipients
        .iter()
        .any(|r| r.key.metadata.is_expired_at(now));
    if !any_expired {
        return Ok(DateNegotiation::UseNow);
    }

    let window_start = recipients
        .iter()
        .map(|r| r.key.metadata.created)
        .max()
        .unwrap_or(0);
    let window_end = recipients
        .iter()
        .filter_map(|r| r.key.metadata.usable_until())
        .min();

    let window_end = match window_end {
        Some(end) => end,
        // Unreachable in practice: a key expired, so some expiry exists.
        None => return Ok(DateNegotiation::UseNow),
    };

    if window_start > window_end {
        let expired: Vec<String> = recipients
            .iter()
            .filter(|r| r.key.metadata.is_expired_at(now))
            .map(|r| r.email.clone())
            .collect();
        return Err(MailcryptError::expired_key(format!(
            "No usable date covers all recipient keys; expired keys for: {}",
            expired.join(", ")
        )));
    }

    // `now` at or before the window close cannot happen once a key has
    // expired, unless the clock moved.
    if window_end > now {
        return Err(MailcryptError::expired_key(
            "Negotiated encryption date is not in the past",
        ));
    }

    Ok(DateNegotiation::Historic { as_of: window_end })
}

/// Encrypt (and optionally sign) a message.
///
/// The session key is wrapped once per recipient key and once more under
/// the message password if one is set. At least one of the two must be
/// present.
pub fn encrypt(request: &EncryptRequest<'_>) -> Result<EncryptResult> {
    Validator::validate_message_size(&request.plaintext)?;
    if let Some(name) = &request.filename {
        Validator::validate_filename(name)?;
    }

    if request.recipients.is_empty() && request.password.is_none() {
        return Err(MailcryptError::invalid_input(
            "Encryption requires recipient keys or a message password",
        ));
    }

    for recipient in &request.recipients {
        if !recipient.key.metadata.usage.encrypt {
            return Err(MailcryptError::key(format!(
                "Key {} for {} cannot encrypt",
                recipient.key.long_id(),
                recipient.email
            )));
        }
    }

    let now = request.date.unwrap_or_else(unix_time_now);
    let created = if request.recipients.is_empty() {
        now
    } else {
        match negotiate_encryption_date(&request.recipients, now)? {
            DateNegotiation::UseNow => now,
            DateNegotiation::Historic { as_of } => {
                // Back-dating the message is visible to recipients, so it
                // needs an explicit opt-in: the caller re-submits the
                // request with the negotiated date.
                if request.date != Some(as_of) {
                    return Err(MailcryptError::HistoricDateRequired { as_of });
                }
                debug!(as_of, "encrypting under a historic date for expired keys");
                as_of
            }
        }
    };

    let literal = LiteralData {
        filename: request.filename.clone(),
        created,
        data: request.plaintext.clone(),
    };

    let mut inner_packets = Vec::new();
    let mut signed_by = None;

    if let Some((signing_key, passphrase)) = request.signer {
        let unlocked = signing_key.unlock(passphrase)?;
        let mut signature = sign_data(&unlocked, &literal.data)?;
        signature.created = created;
        signed_by = Some(unlocked.key_id);
        inner_packets.push(encode_body(PacketTag::Signature, &signature)?);
    }
    inner_packets.push(encode_body(PacketTag::LiteralData, &literal)?);

    let mut session_key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut session_key);

    let mut packets = Vec::new();
    for recipient in &request.recipients {
        let wrapped = wrap_session_key(&recipient.key, &session_key)?;
        packets.push(encode_body(
            PacketTag::PublicKeyEncryptedSessionKey,
            &wrapped,
        )?);
    }
    if let Some(password) = &request.password {
        let wrapped = wrap_session_key_password(password, &session_key)?;
        packets.push(encode_body(
            PacketTag::SymmetricKeyEncryptedSessionKey,
            &wrapped,
        )?);
    }

    let inner = Packet::write_all(&inner_packets);
    let body = encrypt_payload(&session_key, &inner)?;
    session_key.zeroize();

    packets.push(encode_body(
        PacketTag::SymEncryptedIntegrityProtectedData,
        &body,
    )?);

    let bytes = Packet::write_all(&packets);
    let output = if request.armor {
        EncryptedOutput::Armored(armor::encode(&bytes, ArmorKind::Message))
    } else {
        EncryptedOutput::Binary(bytes)
    };

    Ok(EncryptResult { output, signed_by })
}

/// Create an armored detached signature over data
pub fn sign_detached(
    data: &[u8],
    signer: &PrivateKey,
    passphrase: Option<&Passphrase>,
) -> Result<String> {
    let unlocked = signer.unlock(passphrase)?;
    let signature = sign_data(&unlocked, data)?;
    let packet = encode_body(PacketTag::Signature, &signature)?;
    Ok(armor::encode(&packet.to_bytes(), ArmorKind::Signature))
}

/// Create an armored cleartext signed message.
///
/// Line endings are canonicalized to `\n` and trailing newlines dropped
/// before signing, so the text survives the armor round trip byte for
/// byte and still verifies.
pub fn sign_cleartext(
    text: &str,
    signer: &PrivateKey,
    passphrase: Option<&Passphrase>,
) -> Result<String> {
    let normalized = text.replace("\r\n", "\n");
    let normalized = normalized.trim_end_matches('\n');

    let unlocked = signer.unlock(passphrase)?;
    let signature = sign_data(&unlocked, normalized.as_bytes())?;
    let packet = encode_body(PacketTag::Signature, &signature)?;
    Ok(armor::write_signed_message(normalized, &packet.to_bytes()))
}
