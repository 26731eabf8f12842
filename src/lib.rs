//! # mailcrypt - OpenPGP message processing for webmail
//!
//! The message-processing core of a webmail encryption client. It parses,
//! decrypts, verifies, and produces PGP messages, and turns every failure
//! into something a mail client can act on: prompt for a passphrase, ask
//! for a message password, or warn about a corrupted message.
//!
//! ## Features
//!
//! - **Typed decrypt outcomes**: decryption never just "fails"; the client
//!   learns which keys matched, which need a passphrase, and what to ask for
//! - **Block detection**: classify partially fetched attachments from the
//!   first bytes, before downloading the rest
//! - **Quote-tolerant parsing**: armored blocks mangled by reply quoting
//!   (`> ` prefixes) are recovered automatically
//! - **Expired-key date negotiation**: mail to stale keys is encrypted
//!   under the last date the whole recipient key set was valid
//!
//! ## Cryptographic Algorithms
//!
//! - **Key Agreement**: X25519
//! - **Digital Signatures**: Ed25519
//! - **Symmetric Encryption**: AES-256-GCM
//! - **Passphrase Stretching**: Argon2id
//! - **Hashing**: SHA3-256 key fingerprints, HKDF-SHA256 key wrapping
//!
//! ## Examples
//!
//! ### Encrypt and decrypt a message
//!
//! ```rust,no_run
//! use mailcrypt::keys::{KeyPair, PrivateKeyCandidate, RecipientKey, UnlockedKeyCache};
//! use mailcrypt::message::{decrypt, encrypt, DecryptOutcome, EncryptRequest, EncryptedOutput};
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bob = KeyPair::generate_x25519(None)?;
//!
//! let request = EncryptRequest {
//!     recipients: vec![RecipientKey::new(bob.public.clone(), "bob@example.com", false)],
//!     signer: None,
//!     password: None,
//!     plaintext: b"Meet at noon".to_vec(),
//!     filename: None,
//!     armor: true,
//!     date: None,
//! };
//! let encrypted = encrypt(&request)?;
//!
//! let cache = UnlockedKeyCache::new();
//! let candidates = vec![PrivateKeyCandidate::new(bob.private, None)];
//! if let EncryptedOutput::Armored(text) = encrypted.output {
//!     match decrypt(&cache, &candidates, text.as_bytes(), None, &[]) {
//!         DecryptOutcome::Success { content, .. } => {
//!             assert_eq!(content, b"Meet at noon");
//!         }
//!         DecryptOutcome::Failure { kind, .. } => panic!("{}", kind),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod armor;
pub mod detect;
pub mod error;
pub mod keys;
pub mod message;
pub mod packet;
pub mod validation;

pub use detect::{detect_block, BlockKind, DetectedBlock};
pub use error::{MailcryptError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Supported PGP packet version
pub const PGP_VERSION: u8 = 4;
