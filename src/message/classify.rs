//! Mapping raw decrypt failures to actionable categories.
//!
//! The crypto layers report failures as error strings; clients need to
//! know whether to prompt for a passphrase, ask for a password, or give
//! up. The mapping is a closed substring table so a new failure mode shows
//! up as [`DecryptErrorKind::Other`] and gets logged for triage instead of
//! being silently mislabeled.

use tracing::warn;

/// Actionable category of a decrypt failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptErrorKind {
    /// A matching private key exists but is locked
    NeedPassphrase,
    /// The message is password-protected and no password was supplied
    UsePassword,
    /// The supplied password did not open the message
    WrongPassword,
    /// No available private key matches the message
    KeyMismatch,
    /// The message lacks integrity protection
    NoMdc,
    /// The message failed integrity checking
    BadMdc,
    /// The message is structurally malformed
    FormatError,
    /// Unrecognized failure
    Other,
}

impl std::fmt::Display for DecryptErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::NeedPassphrase => "key passphrase needed",
            Self::UsePassword => "message password needed",
            Self::WrongPassword => "wrong message password",
            Self::KeyMismatch => "no matching key",
            Self::NoMdc => "message lacks integrity protection",
            Self::BadMdc => "message failed integrity check",
            Self::FormatError => "malformed message",
            Self::Other => "decryption failed",
        };
        f.write_str(text)
    }
}

// Substring patterns checked in order against the lowercased raw error.
// Earlier entries win; password-related entries are resolved against
// whether a password was actually supplied.
const ERROR_PATTERNS: &[(&str, DecryptErrorKind)] = &[
    ("aead::error", DecryptErrorKind::BadMdc),
    ("authentication failed", DecryptErrorKind::BadMdc),
    ("wrong password", DecryptErrorKind::WrongPassword),
    ("wrong passphrase", DecryptErrorKind::WrongPassword),
    ("no matching session key", DecryptErrorKind::KeyMismatch),
    ("session key", DecryptErrorKind::KeyMismatch),
    ("packet", DecryptErrorKind::FormatError),
    ("armor", DecryptErrorKind::FormatError),
    ("deserialize", DecryptErrorKind::FormatError),
    ("base64", DecryptErrorKind::FormatError),
    ("checksum", DecryptErrorKind::FormatError),
    ("validation", DecryptErrorKind::FormatError),
];

/// Classify a raw decrypt error string.
///
/// `password_supplied` disambiguates the password cases: a "wrong
/// password" failure without any password supplied means a locked key, so
/// the right prompt is for a passphrase.
pub fn classify_decrypt_error(raw: &str, password_supplied: bool) -> DecryptErrorKind {
    let lowered = raw.to_lowercase();

    for (pattern, kind) in ERROR_PATTERNS {
        if lowered.contains(pattern) {
            let kind = *kind;
            if kind == DecryptErrorKind::WrongPassword && !password_supplied {
                return DecryptErrorKind::NeedPassphrase;
            }
            return kind;
        }
    }

    warn!(error = raw, "unclassified decrypt error");
    DecryptErrorKind::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aead_failure_is_bad_mdc() {
        assert_eq!(
            classify_decrypt_error("Cryptographic error: Payload authentication failed: aead::Error", true),
            DecryptErrorKind::BadMdc
        );
    }

    #[test]
    fn test_wrong_password_requires_password_supplied() {
        assert_eq!(
            classify_decrypt_error("wrong password for symmetric session key", true),
            DecryptErrorKind::WrongPassword
        );
        assert_eq!(
            classify_decrypt_error("wrong passphrase for secret key", false),
            DecryptErrorKind::NeedPassphrase
        );
    }

    #[test]
    fn test_key_mismatch() {
        assert_eq!(
            classify_decrypt_error("no matching session key for this secret key", false),
            DecryptErrorKind::KeyMismatch
        );
    }

    #[test]
    fn test_format_errors() {
        assert_eq!(
            classify_decrypt_error("Packet error: Incomplete packet body", false),
            DecryptErrorKind::FormatError
        );
        assert_eq!(
            classify_decrypt_error("Armor error: Invalid base64 data", false),
            DecryptErrorKind::FormatError
        );
    }

    #[test]
    fn test_unknown_is_other() {
        assert_eq!(
            classify_decrypt_error("the moon is in the wrong phase", false),
            DecryptErrorKind::Other
        );
    }
}
