//! Input validation and security limits for mailcrypt.
//!
//! Centralizes the size limits and bounds-checked parsing helpers used by
//! the packet and message layers, so malformed or hostile input fails with
//! a validation error instead of a panic or an oversized allocation.

use crate::error::{MailcryptError, Result};

/// Maximum allowed plaintext message size (100MB)
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Maximum allowed single packet size (50MB)
pub const MAX_PACKET_SIZE: usize = 50 * 1024 * 1024;

/// Maximum allowed number of packets in one message
pub const MAX_PACKETS_PER_MESSAGE: usize = 1000;

/// Maximum allowed key material size (4KB)
pub const MAX_KEY_SIZE: usize = 4 * 1024;

/// Maximum allowed literal filename length
pub const MAX_FILENAME_LENGTH: usize = 255;

/// Validation functions for input data
pub struct Validator;

impl Validator {
    /// Validate plaintext message size
    pub fn validate_message_size(data: &[u8]) -> Result<()> {
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(MailcryptError::validation(format!(
                "Message too large: {} bytes exceeds maximum of {} bytes",
                data.len(),
                MAX_MESSAGE_SIZE
            )));
        }
        Ok(())
    }

    /// Validate packet body size
    pub fn validate_packet_size(size: usize) -> Result<()> {
        if size > MAX_PACKET_SIZE {
            return Err(MailcryptError::validation(format!(
                "Packet too large: {} bytes exceeds maximum of {} bytes",
                size, MAX_PACKET_SIZE
            )));
        }
        Ok(())
    }

    /// Validate packet count in a message
    pub fn validate_packet_count(count: usize) -> Result<()> {
        if count > MAX_PACKETS_PER_MESSAGE {
            return Err(MailcryptError::validation(format!(
                "Too many packets: {} exceeds maximum of {}",
                count, MAX_PACKETS_PER_MESSAGE
            )));
        }
        Ok(())
    }

    /// Validate key material size
    pub fn validate_key_size(data: &[u8]) -> Result<()> {
        if data.len() > MAX_KEY_SIZE {
            return Err(MailcryptError::validation(format!(
                "Key material too large: {} bytes exceeds maximum of {} bytes",
                data.len(),
                MAX_KEY_SIZE
            )));
        }
        Ok(())
    }

    /// Validate literal filename
    pub fn validate_filename(name: &str) -> Result<()> {
        if name.len() > MAX_FILENAME_LENGTH {
            return Err(MailcryptError::validation(format!(
                "Filename too long: {} bytes exceeds maximum of {}",
                name.len(),
                MAX_FILENAME_LENGTH
            )));
        }
        if name.contains('\0') {
            return Err(MailcryptError::validation("Filename contains null bytes"));
        }
        Ok(())
    }

    /// Bounds-checked big-endian u32 extraction
    pub fn validate_u32_from_bytes(data: &[u8], offset: usize) -> Result<u32> {
        if data.len() < offset + 4 {
            return Err(MailcryptError::validation(format!(
                "Insufficient data for u32: need {} bytes, have {} bytes",
                offset + 4,
                data.len()
            )));
        }

        let bytes = [
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ];
        Ok(u32::from_be_bytes(bytes))
    }

    /// Bounds-checked slice extraction
    pub fn validate_slice_extraction(data: &[u8], offset: usize, length: usize) -> Result<&[u8]> {
        if data.len() < offset + length {
            return Err(MailcryptError::validation(format!(
                "Slice out of bounds: trying to extract {} bytes at offset {} from {} byte array",
                length,
                offset,
                data.len()
            )));
        }

        Ok(&data[offset..offset + length])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_size_validation() {
        let small_message = vec![0u8; 1000];
        assert!(Validator::validate_message_size(&small_message).is_ok());

        let large_message = vec![0u8; MAX_MESSAGE_SIZE + 1];
        assert!(Validator::validate_message_size(&large_message).is_err());
    }

    #[test]
    fn test_filename_validation() {
        assert!(Validator::validate_filename("report.pdf").is_ok());
        assert!(Validator::validate_filename("evil\0name").is_err());

        let long_name = "a".repeat(MAX_FILENAME_LENGTH + 1);
        assert!(Validator::validate_filename(&long_name).is_err());
    }

    #[test]
    fn test_bounds_checking() {
        let data = [1, 2, 3, 4, 5, 6, 7, 8];

        assert!(Validator::validate_u32_from_bytes(&data, 0).is_ok());
        assert!(Validator::validate_slice_extraction(&data, 2, 3).is_ok());

        assert!(Validator::validate_u32_from_bytes(&data, 6).is_err());
        assert!(Validator::validate_slice_extraction(&data, 5, 5).is_err());
    }

    #[test]
    fn test_packet_count_validation() {
        assert!(Validator::validate_packet_count(3).is_ok());
        assert!(Validator::validate_packet_count(MAX_PACKETS_PER_MESSAGE + 1).is_err());
    }
}
