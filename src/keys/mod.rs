//! Key types, generation, and identification.
//!
//! Keys carry their metadata (algorithm, creation time, optional expiry,
//! usage flags) alongside the raw key material, and are identified by a
//! 64-bit key ID derived from a SHA3-256 fingerprint. Private key material
//! is either stored in the clear or sealed under a passphrase; sealed keys
//! must be unlocked before use and the unlocked material can be held in an
//! [`UnlockedKeyCache`](cache::UnlockedKeyCache).

pub mod cache;
pub mod matcher;
pub mod passphrase;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::armor::{self, ArmorKind};
use crate::error::{MailcryptError, Result};
use crate::packet::{Packet, PacketTag};
use crate::validation::Validator;

pub use cache::{UnlockedKey, UnlockedKeyCache};
pub use matcher::{KeyMatch, PrivateKeyCandidate};
pub use passphrase::{EncryptedSecretKey, Passphrase};

/// Supported key and cipher algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Algorithm {
    /// X25519 key agreement
    X25519 = 18,
    /// Ed25519 signatures
    Ed25519 = 22,
    /// AES-256 in GCM mode
    Aes256Gcm = 100,
    /// SHA3-256 digest
    Sha3_256 = 101,
}

impl Algorithm {
    /// Convert algorithm to its identifier byte
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Convert an identifier byte to an algorithm
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            18 => Some(Self::X25519),
            22 => Some(Self::Ed25519),
            100 => Some(Self::Aes256Gcm),
            101 => Some(Self::Sha3_256),
            _ => None,
        }
    }
}

/// What a key may be used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyUsage {
    /// Key may encrypt session keys
    pub encrypt: bool,
    /// Key may create signatures
    pub sign: bool,
}

impl KeyUsage {
    /// Encryption-only usage
    pub fn encrypt_only() -> Self {
        Self {
            encrypt: true,
            sign: false,
        }
    }

    /// Signing-only usage
    pub fn sign_only() -> Self {
        Self {
            encrypt: false,
            sign: true,
        }
    }
}

/// Metadata attached to every key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyMetadata {
    /// Key algorithm
    pub algorithm: Algorithm,
    /// Creation time, seconds since the Unix epoch
    pub created: u64,
    /// Expiry time, seconds since the Unix epoch
    pub expires: Option<u64>,
    /// Usage flags
    pub usage: KeyUsage,
    /// 64-bit key ID derived from the fingerprint
    pub key_id: u64,
}

impl KeyMetadata {
    /// Whether the key is expired at the given time
    pub fn is_expired_at(&self, at: u64) -> bool {
        match self.expires {
            Some(expires) => at >= expires,
            None => false,
        }
    }

    /// Last second at which the key is still usable, if it expires at all
    pub fn usable_until(&self) -> Option<u64> {
        self.expires
    }
}

/// A public key with its metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKey {
    /// Raw public key material
    pub key_bytes: Vec<u8>,
    /// Key metadata
    pub metadata: KeyMetadata,
}

impl PublicKey {
    /// The 64-bit key ID
    pub fn key_id(&self) -> u64 {
        self.metadata.key_id
    }

    /// The key ID rendered as a 16-digit hex long ID
    pub fn long_id(&self) -> String {
        format_long_id(self.metadata.key_id)
    }

    /// The full SHA3-256 fingerprint rendered as uppercase hex
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha3_256::new();
        hasher.update([self.metadata.algorithm.to_byte()]);
        hasher.update(self.metadata.created.to_be_bytes());
        hasher.update(&self.key_bytes);
        hex::encode_upper(hasher.finalize())
    }

    /// Interpret the material as an X25519 public key
    pub fn as_x25519(&self) -> Result<x25519_dalek::PublicKey> {
        let bytes: [u8; 32] = self
            .key_bytes
            .as_slice()
            .try_into()
            .map_err(|_| MailcryptError::key("Invalid X25519 public key length"))?;
        Ok(x25519_dalek::PublicKey::from(bytes))
    }

    /// Interpret the material as an Ed25519 verifying key
    pub fn as_ed25519(&self) -> Result<ed25519_dalek::VerifyingKey> {
        let bytes: [u8; 32] = self
            .key_bytes
            .as_slice()
            .try_into()
            .map_err(|_| MailcryptError::key("Invalid Ed25519 public key length"))?;
        ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map_err(|e| MailcryptError::key(format!("Invalid Ed25519 public key: {}", e)))
    }

    /// Serialize into a key packet
    pub fn to_packet(&self, tag: PacketTag) -> Result<Packet> {
        let body = bincode::serialize(self)
            .map_err(|e| MailcryptError::serialization(format!("Failed to serialize key: {}", e)))?;
        Ok(Packet::new(tag, body))
    }

    /// Deserialize from a key packet body
    pub fn from_packet(packet: &Packet) -> Result<Self> {
        Validator::validate_key_size(&packet.body)?;
        bincode::deserialize(&packet.body)
            .map_err(|e| MailcryptError::serialization(format!("Failed to parse key: {}", e)))
    }
}

/// How private key material is stored
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SecretKeyStorage {
    /// Key material in the clear
    Unencrypted(Vec<u8>),
    /// Key material sealed under a passphrase
    Encrypted(EncryptedSecretKey),
}

/// A private key with its metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivateKey {
    /// Secret key material
    pub storage: SecretKeyStorage,
    /// Key metadata (shared with the matching public key)
    pub metadata: KeyMetadata,
}

impl PrivateKey {
    /// The 64-bit key ID
    pub fn key_id(&self) -> u64 {
        self.metadata.key_id
    }

    /// The key ID rendered as a 16-digit hex long ID
    pub fn long_id(&self) -> String {
        format_long_id(self.metadata.key_id)
    }

    /// Whether the key material is sealed under a passphrase
    pub fn is_encrypted(&self) -> bool {
        matches!(self.storage, SecretKeyStorage::Encrypted(_))
    }

    /// Unlock the key material for use.
    ///
    /// Unencrypted keys unlock without a passphrase. Sealed keys require
    /// the correct passphrase; a missing or wrong one fails with a
    /// passphrase error.
    pub fn unlock(&self, passphrase: Option<&Passphrase>) -> Result<UnlockedKey> {
        let secret = match &self.storage {
            SecretKeyStorage::Unencrypted(bytes) => bytes.clone(),
            SecretKeyStorage::Encrypted(sealed) => {
                let passphrase = passphrase.ok_or_else(|| {
                    MailcryptError::passphrase(format!(
                        "Passphrase required to unlock key {}",
                        self.long_id()
                    ))
                })?;
                sealed.decrypt(passphrase)?
            }
        };

        Ok(UnlockedKey::new(
            self.metadata.key_id,
            self.metadata.algorithm,
            secret,
        ))
    }

    /// Check whether a passphrase would unlock this key.
    ///
    /// Unencrypted keys accept any passphrase.
    pub fn passphrase_matches(&self, passphrase: &Passphrase) -> bool {
        match &self.storage {
            SecretKeyStorage::Unencrypted(_) => true,
            SecretKeyStorage::Encrypted(sealed) => sealed.passphrase_matches(passphrase),
        }
    }

    /// Serialize into a secret key packet
    pub fn to_packet(&self, tag: PacketTag) -> Result<Packet> {
        let body = bincode::serialize(self)
            .map_err(|e| MailcryptError::serialization(format!("Failed to serialize key: {}", e)))?;
        Ok(Packet::new(tag, body))
    }

    /// Deserialize from a secret key packet body
    pub fn from_packet(packet: &Packet) -> Result<Self> {
        bincode::deserialize(&packet.body)
            .map_err(|e| MailcryptError::serialization(format!("Failed to parse key: {}", e)))
    }
}

/// A generated public/private key pair
#[derive(Debug, Clone)]
pub struct KeyPair {
    /// The public half
    pub public: PublicKey,
    /// The private half
    pub private: PrivateKey,
}

impl KeyPair {
    /// Generate a fresh X25519 encryption key pair
    pub fn generate_x25519(passphrase: Option<&Passphrase>) -> Result<Self> {
        Self::generate_x25519_at(unix_time_now(), None, passphrase)
    }

    /// Generate an X25519 encryption key pair with explicit timestamps
    pub fn generate_x25519_at(
        created: u64,
        expires: Option<u64>,
        passphrase: Option<&Passphrase>,
    ) -> Result<Self> {
        let secret = x25519_dalek::StaticSecret::random_from_rng(rand::thread_rng());
        let public = x25519_dalek::PublicKey::from(&secret);

        Self::assemble(
            Algorithm::X25519,
            KeyUsage::encrypt_only(),
            created,
            expires,
            public.as_bytes().to_vec(),
            secret.to_bytes().to_vec(),
            passphrase,
        )
    }

    /// Generate a fresh Ed25519 signing key pair
    pub fn generate_ed25519(passphrase: Option<&Passphrase>) -> Result<Self> {
        Self::generate_ed25519_at(unix_time_now(), None, passphrase)
    }

    /// Generate an Ed25519 signing key pair with explicit timestamps
    pub fn generate_ed25519_at(
        created: u64,
        expires: Option<u64>,
        passphrase: Option<&Passphrase>,
    ) -> Result<Self> {
        let signing = ed25519_dalek::SigningKey::generate(&mut rand::thread_rng());
        let verifying = signing.verifying_key();

        Self::assemble(
            Algorithm::Ed25519,
            KeyUsage::sign_only(),
            created,
            expires,
            verifying.to_bytes().to_vec(),
            signing.to_bytes().to_vec(),
            passphrase,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        algorithm: Algorithm,
        usage: KeyUsage,
        created: u64,
        expires: Option<u64>,
        public_bytes: Vec<u8>,
        mut secret_bytes: Vec<u8>,
        passphrase: Option<&Passphrase>,
    ) -> Result<Self> {
        let key_id = generate_key_id(algorithm, created, &public_bytes);
        let metadata = KeyMetadata {
            algorithm,
            created,
            expires,
            usage,
            key_id,
        };

        let storage = match passphrase {
            Some(passphrase) => {
                let sealed = EncryptedSecretKey::encrypt(&secret_bytes, passphrase)?;
                secret_bytes.zeroize();
                SecretKeyStorage::Encrypted(sealed)
            }
            None => SecretKeyStorage::Unencrypted(secret_bytes),
        };

        Ok(Self {
            public: PublicKey {
                key_bytes: public_bytes,
                metadata,
            },
            private: PrivateKey { storage, metadata },
        })
    }
}

/// A recipient's public key with its address-book context
#[derive(Debug, Clone)]
pub struct RecipientKey {
    /// The recipient's public key
    pub key: PublicKey,
    /// Email address the key belongs to
    pub email: String,
    /// Whether this key belongs to the sending user
    pub is_mine: bool,
}

impl RecipientKey {
    /// Pair a public key with a recipient address
    pub fn new<S: Into<String>>(key: PublicKey, email: S, is_mine: bool) -> Self {
        Self {
            key,
            email: email.into(),
            is_mine,
        }
    }
}

/// Derive the 64-bit key ID from key material.
///
/// The fingerprint is SHA3-256 over the algorithm byte, the creation time,
/// and the public key material; the key ID is its trailing eight bytes.
pub fn generate_key_id(algorithm: Algorithm, created: u64, public_bytes: &[u8]) -> u64 {
    let mut hasher = Sha3_256::new();
    hasher.update([algorithm.to_byte()]);
    hasher.update(created.to_be_bytes());
    hasher.update(public_bytes);
    let fingerprint = hasher.finalize();

    let mut id_bytes = [0u8; 8];
    id_bytes.copy_from_slice(&fingerprint[24..32]);
    u64::from_be_bytes(id_bytes)
}

/// Constant-time key ID comparison
pub fn key_ids_equal(a: u64, b: u64) -> bool {
    a.to_be_bytes().ct_eq(&b.to_be_bytes()).into()
}

/// Render a key ID as an uppercase 16-digit hex long ID
pub fn format_long_id(key_id: u64) -> String {
    format!("{:016X}", key_id)
}

/// Current time in seconds since the Unix epoch
pub fn unix_time_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Export public keys as an armored public key block.
///
/// The first key becomes the primary key packet, the rest subkey packets.
pub fn export_public_keys(keys: &[PublicKey]) -> Result<String> {
    if keys.is_empty() {
        return Err(MailcryptError::invalid_input("No keys to export"));
    }

    let mut packets = Vec::with_capacity(keys.len());
    for (index, key) in keys.iter().enumerate() {
        let tag = if index == 0 {
            PacketTag::PublicKey
        } else {
            PacketTag::PublicSubkey
        };
        packets.push(key.to_packet(tag)?);
    }

    Ok(armor::encode(
        &Packet::write_all(&packets),
        ArmorKind::PublicKey,
    ))
}

/// Import public keys from an armored public key block
pub fn import_public_keys(armored: &str) -> Result<Vec<PublicKey>> {
    let block = armor::decode_normalized(armored)?;
    if block.kind != ArmorKind::PublicKey {
        return Err(MailcryptError::key(format!(
            "Expected a public key block, found {}",
            block.kind.label()
        )));
    }

    let packets = Packet::parse_all(&block.data)?;
    let mut keys = Vec::new();
    for packet in &packets {
        match packet.header.tag {
            PacketTag::PublicKey | PacketTag::PublicSubkey => {
                keys.push(PublicKey::from_packet(packet)?);
            }
            other => {
                return Err(MailcryptError::key(format!(
                    "Unexpected packet in key block: {:?}",
                    other
                )));
            }
        }
    }

    if keys.is_empty() {
        return Err(MailcryptError::key("Key block contains no keys"));
    }

    Ok(keys)
}

/// Export a private key (with subkeys) as an armored private key block
pub fn export_private_keys(keys: &[PrivateKey]) -> Result<String> {
    if keys.is_empty() {
        return Err(MailcryptError::invalid_input("No keys to export"));
    }

    let mut packets = Vec::with_capacity(keys.len());
    for (index, key) in keys.iter().enumerate() {
        let tag = if index == 0 {
            PacketTag::SecretKey
        } else {
            PacketTag::SecretSubkey
        };
        packets.push(key.to_packet(tag)?);
    }

    Ok(armor::encode(
        &Packet::write_all(&packets),
        ArmorKind::PrivateKey,
    ))
}

/// Import private keys from an armored private key block
pub fn import_private_keys(armored: &str) -> Result<Vec<PrivateKey>> {
    let block = armor::decode_normalized(armored)?;
    if block.kind != ArmorKind::PrivateKey {
        return Err(MailcryptError::key(format!(
            "Expected a private key block, found {}",
            block.kind.label()
        )));
    }

    let packets = Packet::parse_all(&block.data)?;
    let mut keys = Vec::new();
    for packet in &packets {
        match packet.header.tag {
            PacketTag::SecretKey | PacketTag::SecretSubkey => {
                keys.push(PrivateKey::from_packet(packet)?);
            }
            other => {
                return Err(MailcryptError::key(format!(
                    "Unexpected packet in key block: {:?}",
                    other
                )));
            }
        }
    }

    if keys.is_empty() {
        return Err(MailcryptError::key("Key block contains no keys"));
    }

    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_id_is_stable() {
        let material = [5u8; 32];
        let a = generate_key_id(Algorithm::X25519, 1000, &material);
        let b = generate_key_id(Algorithm::X25519, 1000, &material);
        assert_eq!(a, b);

        // Different creation time gives a different fingerprint.
        let c = generate_key_id(Algorithm::X25519, 1001, &material);
        assert_ne!(a, c);
    }

    #[test]
    fn test_fingerprint_ends_with_long_id() {
        let pair = KeyPair::generate_x25519(None).unwrap();
        let fingerprint = pair.public.fingerprint();
        assert_eq!(fingerprint.len(), 64);
        assert!(fingerprint.ends_with(&pair.public.long_id()));
    }

    #[test]
    fn test_long_id_format() {
        assert_eq!(format_long_id(0xDEADBEEF), "00000000DEADBEEF");
        assert_eq!(format_long_id(u64::MAX), "FFFFFFFFFFFFFFFF");
    }

    #[test]
    fn test_key_ids_equal() {
        assert!(key_ids_equal(42, 42));
        assert!(!key_ids_equal(42, 43));
    }

    #[test]
    fn test_generate_x25519_roundtrip() {
        let pair = KeyPair::generate_x25519(None).unwrap();
        assert_eq!(pair.public.metadata.algorithm, Algorithm::X25519);
        assert!(pair.public.metadata.usage.encrypt);
        assert_eq!(pair.public.key_id(), pair.private.key_id());

        // Unlocked secret must correspond to the public half.
        let unlocked = pair.private.unlock(None).unwrap();
        let secret = unlocked.as_x25519().unwrap();
        let derived = x25519_dalek::PublicKey::from(&secret);
        assert_eq!(derived.as_bytes().as_slice(), pair.public.key_bytes);
    }

    #[test]
    fn test_generate_ed25519_signs() {
        let pair = KeyPair::generate_ed25519(None).unwrap();
        assert!(pair.public.metadata.usage.sign);

        let unlocked = pair.private.unlock(None).unwrap();
        let signing = unlocked.as_ed25519().unwrap();
        assert_eq!(
            signing.verifying_key().to_bytes().as_slice(),
            pair.public.key_bytes
        );
    }

    #[test]
    fn test_encrypted_private_key_unlock() {
        let passphrase = Passphrase::new("open sesame");
        let pair = KeyPair::generate_x25519(Some(&passphrase)).unwrap();

        assert!(pair.private.is_encrypted());
        assert!(pair.private.unlock(None).is_err());
        assert!(pair.private.unlock(Some(&Passphrase::new("nope"))).is_err());
        assert!(pair.private.unlock(Some(&passphrase)).is_ok());

        assert!(pair.private.passphrase_matches(&passphrase));
        assert!(!pair.private.passphrase_matches(&Passphrase::new("nope")));
    }

    #[test]
    fn test_public_key_export_import() {
        let primary = KeyPair::generate_ed25519(None).unwrap();
        let subkey = KeyPair::generate_x25519(None).unwrap();

        let armored =
            export_public_keys(&[primary.public.clone(), subkey.public.clone()]).unwrap();
        assert!(armored.contains("BEGIN PGP PUBLIC KEY BLOCK"));

        let imported = import_public_keys(&armored).unwrap();
        assert_eq!(imported.len(), 2);
        assert_eq!(imported[0].key_id(), primary.public.key_id());
        assert_eq!(imported[1].key_id(), subkey.public.key_id());
    }

    #[test]
    fn test_private_key_export_import() {
        let pair = KeyPair::generate_x25519(None).unwrap();
        let armored = export_private_keys(&[pair.private.clone()]).unwrap();
        assert!(armored.contains("BEGIN PGP PRIVATE KEY BLOCK"));

        let imported = import_private_keys(&armored).unwrap();
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].key_id(), pair.private.key_id());
    }

    #[test]
    fn test_expiry_metadata() {
        let pair = KeyPair::generate_x25519_at(100, Some(200), None).unwrap();
        assert!(!pair.public.metadata.is_expired_at(150));
        assert!(pair.public.metadata.is_expired_at(200));
        assert_eq!(pair.public.metadata.usable_until(), Some(200));
    }
}
