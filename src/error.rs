//! Error types for mailcrypt operations.

use thiserror::Error;

/// Result type alias for mailcrypt operations.
pub type Result<T> = std::result::Result<T, MailcryptError>;

/// Main error type for mailcrypt operations.
///
/// This is the internal, `Result`-propagated error. Decrypt-time failures
/// that callers are expected to act on are *not* raised through this type;
/// they are returned as typed [`DecryptOutcome`](crate::message::DecryptOutcome)
/// values instead.
#[derive(Error, Debug)]
pub enum MailcryptError {
    /// Cryptographic operation errors
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Key parsing or usage errors
    #[error("Key error: {0}")]
    Key(String),

    /// Packet parsing or construction errors
    #[error("Packet error: {0}")]
    Packet(String),

    /// Armor encoding/decoding errors
    #[error("Armor error: {0}")]
    Armor(String),

    /// Message assembly/parsing errors
    #[error("Message error: {0}")]
    Message(String),

    /// Signature creation or verification errors
    #[error("Signature error: {0}")]
    Signature(String),

    /// Passphrase-related errors
    #[error("Passphrase error: {0}")]
    Passphrase(String),

    /// Input validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid input or arguments (programmer misuse)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No common usable date exists for the recipient key set
    #[error("Expired key: {0}")]
    ExpiredKey(String),

    /// Expired recipient keys require the caller to confirm encrypting
    /// under a historic date
    #[error("Historic encryption date {as_of} requires confirmation")]
    HistoricDateRequired {
        /// The negotiated timestamp, seconds since the Unix epoch
        as_of: u64,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MailcryptError {
    /// Creates a new cryptographic error.
    pub fn crypto<T: ToString>(msg: T) -> Self {
        Self::Crypto(msg.to_string())
    }

    /// Creates a new key error.
    pub fn key<T: ToString>(msg: T) -> Self {
        Self::Key(msg.to_string())
    }

    /// Creates a new packet error.
    pub fn packet<T: ToString>(msg: T) -> Self {
        Self::Packet(msg.to_string())
    }

    /// Creates a new armor error.
    pub fn armor<T: ToString>(msg: T) -> Self {
        Self::Armor(msg.to_string())
    }

    /// Creates a new message error.
    pub fn message<T: ToString>(msg: T) -> Self {
        Self::Message(msg.to_string())
    }

    /// Creates a new signature error.
    pub fn signature<T: ToString>(msg: T) -> Self {
        Self::Signature(msg.to_string())
    }

    /// Creates a new passphrase error.
    pub fn passphrase<T: ToString>(msg: T) -> Self {
        Self::Passphrase(msg.to_string())
    }

    /// Creates a new validation error.
    pub fn validation<T: ToString>(msg: T) -> Self {
        Self::Validation(msg.to_string())
    }

    /// Creates a new invalid input error.
    pub fn invalid_input<T: ToString>(msg: T) -> Self {
        Self::InvalidInput(msg.to_string())
    }

    /// Creates a new expired-key error.
    pub fn expired_key<T: ToString>(msg: T) -> Self {
        Self::ExpiredKey(msg.to_string())
    }

    /// Creates a new serialization error.
    pub fn serialization<T: ToString>(msg: T) -> Self {
        Self::Serialization(msg.to_string())
    }
}
