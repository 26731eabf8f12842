//! Message structure: packet bodies, envelopes, and session key handling.
//!
//! A message is either cleartext (a literal payload, possibly signed) or
//! encrypted (session key packets naming recipients, plus the sealed
//! payload). This module owns the packet body types and the parsing that
//! turns armored text or raw packet bytes into a [`MessageEnvelope`]; the
//! operations on envelopes live in the sibling modules.

pub mod classify;
pub mod decrypt;
pub mod encrypt;
pub mod verify;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::Argon2;
use hkdf::Hkdf;
use rand::RngCore;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::armor::{self, ArmorKind};
use crate::error::{MailcryptError, Result};
use crate::keys::{Algorithm, Passphrase, PublicKey};
use crate::packet::{Packet, PacketTag};
use crate::validation::Validator;

pub use classify::{classify_decrypt_error, DecryptErrorKind};
pub use decrypt::{decrypt, DecryptOutcome, LongIds};
pub use encrypt::{
    encrypt, negotiate_encryption_date, sign_cleartext, sign_detached, DateNegotiation,
    EncryptRequest, EncryptResult, EncryptedOutput,
};
pub use verify::{verify_detached, verify_signatures, SignerKey, VerifyOutcome};

const SESSION_WRAP_INFO: &[u8] = b"mailcrypt/v1/session-wrap";

/// A session key encrypted to one recipient's public key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PkSessionKey {
    /// Packet version
    pub version: u8,
    /// Key ID of the recipient key this copy is wrapped for
    pub recipient_key_id: u64,
    /// Ephemeral X25519 public key
    pub ephemeral: [u8; 32],
    /// AES-GCM nonce for the key wrap
    pub nonce: [u8; 12],
    /// Wrapped session key
    pub wrapped_key: Vec<u8>,
}

/// A session key wrapped under a password
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PwSessionKey {
    /// Packet version
    pub version: u8,
    /// Argon2id salt
    pub salt: [u8; 16],
    /// AES-GCM nonce for the key wrap
    pub nonce: [u8; 12],
    /// Wrapped session key
    pub wrapped_key: Vec<u8>,
}

/// A signature over literal data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignaturePacket {
    /// Packet version
    pub version: u8,
    /// Key ID of the signing key
    pub signer_key_id: u64,
    /// Signature algorithm
    pub algorithm: Algorithm,
    /// Signature creation time, seconds since the Unix epoch
    pub created: u64,
    /// The signature bytes
    pub signature: Vec<u8>,
}

/// The actual message content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiteralData {
    /// Original filename, if the content came from a file
    pub filename: Option<String>,
    /// Content timestamp, seconds since the Unix epoch
    pub created: u64,
    /// Content bytes
    pub data: Vec<u8>,
}

/// The sealed payload body of an encrypted message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedPayloadBody {
    /// AES-GCM nonce
    pub nonce: [u8; 12],
    /// Sealed inner packet stream
    pub ciphertext: Vec<u8>,
}

/// The sealed payload with its protection level
#[derive(Debug, Clone)]
pub struct EncryptedPayload {
    /// False for the legacy packet format without integrity protection
    pub integrity_protected: bool,
    /// The payload body
    pub body: EncryptedPayloadBody,
}

/// An encrypted message: who can open it, and the sealed payload
#[derive(Debug, Clone)]
pub struct EncryptedMessage {
    /// Session key copies wrapped for recipient keys
    pub session_keys: Vec<PkSessionKey>,
    /// Session key copies wrapped under passwords
    pub password_keys: Vec<PwSessionKey>,
    /// The sealed payload
    pub payload: EncryptedPayload,
}

impl EncryptedMessage {
    /// Key IDs of the recipient keys this message is encrypted to
    pub fn target_key_ids(&self) -> Vec<u64> {
        self.session_keys
            .iter()
            .map(|sk| sk.recipient_key_id)
            .collect()
    }
}

/// A cleartext message, possibly signed
#[derive(Debug, Clone)]
pub struct CleartextMessage {
    /// Literal payloads; well-formed messages have exactly one
    pub literals: Vec<LiteralData>,
    /// Signatures over the payload
    pub signatures: Vec<SignaturePacket>,
}

impl CleartextMessage {
    /// The first literal payload
    pub fn primary(&self) -> Option<&LiteralData> {
        self.literals.first()
    }
}

/// A parsed message of either protection level
#[derive(Debug, Clone)]
pub enum MessageEnvelope {
    /// Cleartext, possibly signed
    Cleartext(CleartextMessage),
    /// Encrypted
    Encrypted(EncryptedMessage),
}

impl MessageEnvelope {
    /// Parse a message from bytes, accepting both armored text and raw
    /// binary packet streams.
    pub fn parse_any(data: &[u8]) -> Result<Self> {
        Validator::validate_message_size(data)?;

        if let Ok(text) = std::str::from_utf8(data) {
            if text.contains("-----BEGIN PGP") || {
                let normalized = armor::strip_quote_prefixes(text);
                normalized.contains("-----BEGIN PGP")
            } {
                return Self::parse_text(text);
            }
        }

        let packets = Packet::parse_all(data)?;
        Self::from_packets(&packets)
    }

    /// Parse a message from armored text
    pub fn parse_text(text: &str) -> Result<Self> {
        let normalized = armor::strip_quote_prefixes(text);
        let signed_text = if text.contains(&ArmorKind::SignedMessage.begin_marker()) {
            text
        } else if normalized.contains(&ArmorKind::SignedMessage.begin_marker()) {
            normalized.as_str()
        } else {
            ""
        };

        if !signed_text.is_empty() {
            let (message, signature_bytes) = armor::parse_signed_message(signed_text)?;
            let signatures = parse_signature_packets(&signature_bytes)?;
            return Ok(Self::Cleartext(CleartextMessage {
                literals: vec![LiteralData {
                    filename: None,
                    created: 0,
                    data: message.into_bytes(),
                }],
                signatures,
            }));
        }

        let block = armor::decode_normalized(text)?;
        match block.kind {
            ArmorKind::Message => {
                let packets = Packet::parse_all(&block.data)?;
                Self::from_packets(&packets)
            }
            other => Err(MailcryptError::message(format!(
                "Expected a message block, found {}",
                other.label()
            ))),
        }
    }

    /// Assemble an envelope from a parsed packet stream
    pub fn from_packets(packets: &[Packet]) -> Result<Self> {
        let mut session_keys = Vec::new();
        let mut password_keys = Vec::new();
        let mut signatures = Vec::new();
        let mut literals = Vec::new();
        let mut payload: Option<EncryptedPayload> = None;

        for packet in packets {
            match packet.header.tag {
                PacketTag::PublicKeyEncryptedSessionKey => {
                    session_keys.push(decode_body::<PkSessionKey>(packet)?);
                }
                PacketTag::SymmetricKeyEncryptedSessionKey => {
                    password_keys.push(decode_body::<PwSessionKey>(packet)?);
                }
                PacketTag::Signature => {
                    signatures.push(decode_body::<SignaturePacket>(packet)?);
                }
                PacketTag::LiteralData => {
                    literals.push(decode_body::<LiteralData>(packet)?);
                }
                PacketTag::SymEncryptedIntegrityProtectedData => {
                    payload = Some(EncryptedPayload {
                        integrity_protected: true,
                        body: decode_body::<EncryptedPayloadBody>(packet)?,
                    });
                }
                PacketTag::SymmetricallyEncryptedData => {
                    payload = Some(EncryptedPayload {
                        integrity_protected: false,
                        body: decode_body::<EncryptedPayloadBody>(packet)?,
                    });
                }
                PacketTag::CompressedData | PacketTag::AeadEncryptedData => {
                    return Err(MailcryptError::packet(format!(
                        "Unsupported packet in message: {:?}",
                        packet.header.tag
                    )));
                }
                other => {
                    return Err(MailcryptError::message(format!(
                        "Unexpected packet in message: {:?}",
                        other
                    )));
                }
            }
        }

        if let Some(payload) = payload {
            return Ok(Self::Encrypted(EncryptedMessage {
                session_keys,
                password_keys,
                payload,
            }));
        }

        if !literals.is_empty() {
            return Ok(Self::Cleartext(CleartextMessage {
                literals,
                signatures,
            }));
        }

        Err(MailcryptError::message(
            "Message contains neither a payload nor literal data",
        ))
    }
}

/// Parse an inner (decrypted) packet stream into signatures and literals
pub(crate) fn parse_inner_stream(data: &[u8]) -> Result<(Vec<SignaturePacket>, Vec<LiteralData>)> {
    let packets = Packet::parse_all(data)?;
    let mut signatures = Vec::new();
    let mut literals = Vec::new();

    for packet in &packets {
        match packet.header.tag {
            PacketTag::Signature => signatures.push(decode_body::<SignaturePacket>(packet)?),
            PacketTag::LiteralData => literals.push(decode_body::<LiteralData>(packet)?),
            other => {
                return Err(MailcryptError::message(format!(
                    "Unexpected packet inside encrypted payload: {:?}",
                    other
                )));
            }
        }
    }

    if literals.is_empty() {
        return Err(MailcryptError::message(
            "Encrypted payload contains no literal data",
        ));
    }

    Ok((signatures, literals))
}

pub(crate) fn parse_signature_packets(data: &[u8]) -> Result<Vec<SignaturePacket>> {
    let packets = Packet::parse_all(data)?;
    let mut signatures = Vec::new();
    for packet in &packets {
        if packet.header.tag != PacketTag::Signature {
            return Err(MailcryptError::signature(format!(
                "Expected signature packets, found {:?}",
                packet.header.tag
            )));
        }
        signatures.push(decode_body::<SignaturePacket>(packet)?);
    }
    Ok(signatures)
}

pub(crate) fn encode_body<T: Serialize>(tag: PacketTag, body: &T) -> Result<Packet> {
    let bytes = bincode::serialize(body)
        .map_err(|e| MailcryptError::serialization(format!("Failed to serialize packet: {}", e)))?;
    Ok(Packet::new(tag, bytes))
}

pub(crate) fn decode_body<T: DeserializeOwned>(packet: &Packet) -> Result<T> {
    bincode::deserialize(&packet.body).map_err(|e| {
        MailcryptError::serialization(format!(
            "Failed to deserialize {:?} packet: {}",
            packet.header.tag, e
        ))
    })
}

/// Wrap a session key for an X25519 recipient key.
///
/// An ephemeral key agreement produces a shared secret; HKDF-SHA256 turns
/// it into a wrapping key that seals the session key with AES-256-GCM.
pub(crate) fn wrap_session_key(recipient: &PublicKey, session_key: &[u8; 32]) -> Result<PkSessionKey> {
    let recipient_public = recipient.as_x25519()?;

    let ephemeral_secret = x25519_dalek::StaticSecret::random_from_rng(rand::thread_rng());
    let ephemeral_public = x25519_dalek::PublicKey::from(&ephemeral_secret);
    let shared = ephemeral_secret.diffie_hellman(&recipient_public);

    let mut wrap_key = derive_wrap_key(shared.as_bytes())?;
    let mut nonce = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut nonce);

    let cipher = Aes256Gcm::new_from_slice(&wrap_key)
        .map_err(|e| MailcryptError::crypto(format!("Failed to create cipher: {}", e)))?;
    wrap_key.zeroize();

    let wrapped_key = cipher
        .encrypt(Nonce::from_slice(&nonce), session_key.as_slice())
        .map_err(|e| MailcryptError::crypto(format!("Failed to wrap session key: {}", e)))?;

    Ok(PkSessionKey {
        version: 3,
        recipient_key_id: recipient.key_id(),
        ephemeral: *ephemeral_public.as_bytes(),
        nonce,
        wrapped_key,
    })
}

/// Unwrap a session key with an X25519 secret key
pub(crate) fn unwrap_session_key(
    packet: &PkSessionKey,
    secret: &x25519_dalek::StaticSecret,
) -> Result<[u8; 32]> {
    let ephemeral = x25519_dalek::PublicKey::from(packet.ephemeral);
    let shared = secret.diffie_hellman(&ephemeral);

    let mut wrap_key = derive_wrap_key(shared.as_bytes())?;
    let cipher = Aes256Gcm::new_from_slice(&wrap_key)
        .map_err(|e| MailcryptError::crypto(format!("Failed to create cipher: {}", e)))?;
    wrap_key.zeroize();

    let mut unwrapped = cipher
        .decrypt(
            Nonce::from_slice(&packet.nonce),
            packet.wrapped_key.as_slice(),
        )
        .map_err(|_| MailcryptError::crypto("no matching session key for this secret key"))?;

    let session_key: [u8; 32] = unwrapped
        .as_slice()
        .try_into()
        .map_err(|_| MailcryptError::crypto("Invalid session key length"))?;
    unwrapped.zeroize();

    Ok(session_key)
}

/// Wrap a session key under a password
pub(crate) fn wrap_session_key_password(
    password: &Passphrase,
    session_key: &[u8; 32],
) -> Result<PwSessionKey> {
    let mut salt = [0u8; 16];
    let mut nonce = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut salt);
    rand::thread_rng().fill_bytes(&mut nonce);

    let mut wrap_key = derive_password_wrap_key(password, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&wrap_key)
        .map_err(|e| MailcryptError::crypto(format!("Failed to create cipher: {}", e)))?;
    wrap_key.zeroize();

    let wrapped_key = cipher
        .encrypt(Nonce::from_slice(&nonce), session_key.as_slice())
        .map_err(|e| MailcryptError::crypto(format!("Failed to wrap session key: {}", e)))?;

    Ok(PwSessionKey {
        version: 4,
        salt,
        nonce,
        wrapped_key,
    })
}

/// Unwrap a password-wrapped session key
pub(crate) fn unwrap_session_key_password(
    packet: &PwSessionKey,
    password: &Passphrase,
) -> Result<[u8; 32]> {
    let mut wrap_key = derive_password_wrap_key(password, &packet.salt)?;
    let cipher = Aes256Gcm::new_from_slice(&wrap_key)
        .map_err(|e| MailcryptError::crypto(format!("Failed to create cipher: {}", e)))?;
    wrap_key.zeroize();

    let mut unwrapped = cipher
        .decrypt(
            Nonce::from_slice(&packet.nonce),
            packet.wrapped_key.as_slice(),
        )
        .map_err(|_| MailcryptError::crypto("wrong password for symmetric session key"))?;

    let session_key: [u8; 32] = unwrapped
        .as_slice()
        .try_into()
        .map_err(|_| MailcryptError::crypto("Invalid session key length"))?;
    unwrapped.zeroize();

    Ok(session_key)
}

/// Seal an inner packet stream under a session key
pub(crate) fn encrypt_payload(session_key: &[u8; 32], inner: &[u8]) -> Result<EncryptedPayloadBody> {
    let mut nonce = [0u8; 12];
    rand::thread_rng().fill_bytes(&mut nonce);

    let cipher = Aes256Gcm::new_from_slice(session_key)
        .map_err(|e| MailcryptError::crypto(format!("Failed to create cipher: {}", e)))?;

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), inner)
        .map_err(|e| MailcryptError::crypto(format!("Failed to seal payload: {}", e)))?;

    Ok(EncryptedPayloadBody { nonce, ciphertext })
}

/// Open a sealed payload with a session key.
///
/// An authentication failure surfaces as a crypto error carrying the AEAD
/// error text, which the decrypt error classifier maps to a corrupted
/// message.
pub(crate) fn decrypt_payload(
    session_key: &[u8; 32],
    body: &EncryptedPayloadBody,
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(session_key)
        .map_err(|e| MailcryptError::crypto(format!("Failed to create cipher: {}", e)))?;

    cipher
        .decrypt(Nonce::from_slice(&body.nonce), body.ciphertext.as_slice())
        .map_err(|e| MailcryptError::crypto(format!("Payload authentication failed: {}", e)))
}

fn derive_wrap_key(shared_secret: &[u8]) -> Result<[u8; 32]> {
    let hkdf = Hkdf::<Sha256>::new(None, shared_secret);
    let mut key = [0u8; 32];
    hkdf.expand(SESSION_WRAP_INFO, &mut key)
        .map_err(|e| MailcryptError::crypto(format!("Key derivation failed: {}", e)))?;
    Ok(key)
}

fn derive_password_wrap_key(password: &Passphrase, salt: &[u8; 16]) -> Result<[u8; 32]> {
    let mut key = [0u8; 32];
    Argon2::default()
        .hash_password_into(password.as_bytes(), salt, &mut key)
        .map_err(|e| MailcryptError::crypto(format!("Password derivation failed: {}", e)))?;
    Ok(key)
}
