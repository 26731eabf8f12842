//! PGP packet framing for mailcrypt messages.
//!
//! Implements the RFC 4880 packet header (tag byte plus new-format length
//! encoding) used to frame the message and key material this crate
//! produces. Packet bodies are structured payloads owned by the message and
//! key layers; this module only concerns itself with the framing.

use crate::error::{MailcryptError, Result};
use crate::validation::Validator;

/// PGP packet tags defined in RFC 4880 (and RFC 4880bis for AEAD)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketTag {
    /// Public-Key Encrypted Session Key Packet
    PublicKeyEncryptedSessionKey = 1,
    /// Signature Packet
    Signature = 2,
    /// Symmetric-Key Encrypted Session Key Packet
    SymmetricKeyEncryptedSessionKey = 3,
    /// Secret-Key Packet
    SecretKey = 5,
    /// Public-Key Packet
    PublicKey = 6,
    /// Secret-Subkey Packet
    SecretSubkey = 7,
    /// Compressed Data Packet
    CompressedData = 8,
    /// Symmetrically Encrypted Data Packet (legacy, no integrity protection)
    SymmetricallyEncryptedData = 9,
    /// Literal Data Packet
    LiteralData = 11,
    /// Public-Subkey Packet
    PublicSubkey = 14,
    /// Sym. Encrypted and Integrity Protected Data Packet
    SymEncryptedIntegrityProtectedData = 18,
    /// AEAD Encrypted Data Packet
    AeadEncryptedData = 20,
}

impl PacketTag {
    /// Convert packet tag to its byte value
    pub fn to_byte(self) -> u8 {
        self as u8
    }

    /// Convert a byte value to a packet tag
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::PublicKeyEncryptedSessionKey),
            2 => Some(Self::Signature),
            3 => Some(Self::SymmetricKeyEncryptedSessionKey),
            5 => Some(Self::SecretKey),
            6 => Some(Self::PublicKey),
            7 => Some(Self::SecretSubkey),
            8 => Some(Self::CompressedData),
            9 => Some(Self::SymmetricallyEncryptedData),
            11 => Some(Self::LiteralData),
            14 => Some(Self::PublicSubkey),
            18 => Some(Self::SymEncryptedIntegrityProtectedData),
            20 => Some(Self::AeadEncryptedData),
            _ => None,
        }
    }
}

/// PGP packet header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    /// Packet tag
    pub tag: PacketTag,
    /// Packet body length
    pub length: usize,
}

impl PacketHeader {
    /// Create a new packet header
    pub fn new(tag: PacketTag, length: usize) -> Self {
        Self { tag, length }
    }

    /// Serialize the header using the new packet format
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::new();

        // New packet format: 0xC0 plus the tag in the low six bits.
        bytes.push(0xC0 | self.tag.to_byte());

        if self.length < 192 {
            bytes.push(self.length as u8);
        } else if self.length < 8384 {
            let encoded = self.length - 192;
            bytes.push(192 + (encoded >> 8) as u8);
            bytes.push((encoded & 0xFF) as u8);
        } else {
            bytes.push(0xFF);
            bytes.extend_from_slice(&(self.length as u32).to_be_bytes());
        }

        bytes
    }

    /// Parse a packet header from bytes, returning the header and the number
    /// of bytes consumed.
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize)> {
        if data.is_empty() {
            return Err(MailcryptError::validation("Empty packet header"));
        }

        let first_byte = data[0];

        if (first_byte & 0x80) == 0 {
            return Err(MailcryptError::validation(
                "Invalid packet header: MSB not set",
            ));
        }

        if (first_byte & 0x40) == 0 {
            // Old-format framing is recognized by the block detector for
            // sniffing purposes only; full parsing is new-format.
            return Err(MailcryptError::validation(
                "Old packet format not supported",
            ));
        }

        let tag_byte = first_byte & 0x3F;
        let tag = PacketTag::from_byte(tag_byte)
            .ok_or_else(|| MailcryptError::packet(format!("Unknown packet tag: {}", tag_byte)))?;

        if data.len() < 2 {
            return Err(MailcryptError::validation("Incomplete packet header"));
        }

        let (length, length_bytes) = if data[1] < 192 {
            (data[1] as usize, 1)
        } else if data[1] < 224 {
            if data.len() < 3 {
                return Err(MailcryptError::validation("Incomplete two-byte length"));
            }
            let len = ((data[1] as usize - 192) << 8) + data[2] as usize + 192;
            (len, 2)
        } else if data[1] == 255 {
            if data.len() < 6 {
                return Err(MailcryptError::validation("Incomplete five-byte length"));
            }
            let len = Validator::validate_u32_from_bytes(data, 2)? as usize;
            Validator::validate_packet_size(len)?;
            (len, 5)
        } else {
            return Err(MailcryptError::validation(
                "Partial body length not supported",
            ));
        };

        Ok((Self { tag, length }, 1 + length_bytes))
    }
}

/// A complete packet with header and body
#[derive(Debug, Clone)]
pub struct Packet {
    /// Packet header
    pub header: PacketHeader,
    /// Packet body data
    pub body: Vec<u8>,
}

impl Packet {
    /// Create a new packet around a body
    pub fn new(tag: PacketTag, body: Vec<u8>) -> Self {
        let header = PacketHeader::new(tag, body.len());
        Self { header, body }
    }

    /// Serialize the packet to bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.header.to_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }

    /// Parse one packet from the front of `data`, returning the packet and
    /// the number of bytes consumed.
    pub fn from_bytes(data: &[u8]) -> Result<(Self, usize)> {
        let (header, header_len) = PacketHeader::from_bytes(data)?;

        if data.len() < header_len + header.length {
            return Err(MailcryptError::packet("Incomplete packet body"));
        }

        let body = data[header_len..header_len + header.length].to_vec();
        let consumed = header_len + header.length;

        Ok((Self { header, body }, consumed))
    }

    /// Parse a full packet stream.
    pub fn parse_all(data: &[u8]) -> Result<Vec<Packet>> {
        Validator::validate_message_size(data)?;

        let mut packets = Vec::new();
        let mut offset = 0;

        while offset < data.len() {
            let (packet, consumed) = Packet::from_bytes(&data[offset..])?;
            offset += consumed;
            packets.push(packet);
            Validator::validate_packet_count(packets.len())?;
        }

        if packets.is_empty() {
            return Err(MailcryptError::packet("Empty packet stream"));
        }

        Ok(packets)
    }

    /// Serialize a sequence of packets into one stream.
    pub fn write_all(packets: &[Packet]) -> Vec<u8> {
        let mut out = Vec::new();
        for packet in packets {
            out.extend_from_slice(&packet.to_bytes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_conversion() {
        assert_eq!(PacketTag::PublicKey.to_byte(), 6);
        assert_eq!(PacketTag::from_byte(6), Some(PacketTag::PublicKey));
        assert_eq!(PacketTag::from_byte(18), Some(PacketTag::SymEncryptedIntegrityProtectedData));
        assert_eq!(PacketTag::from_byte(63), None);
    }

    #[test]
    fn test_header_roundtrip() {
        let header = PacketHeader::new(PacketTag::LiteralData, 100);
        let bytes = header.to_bytes();

        let (parsed, consumed) = PacketHeader::from_bytes(&bytes).unwrap();
        assert_eq!(parsed.tag, PacketTag::LiteralData);
        assert_eq!(parsed.length, 100);
        assert_eq!(consumed, bytes.len());
    }

    #[test]
    fn test_header_length_encodings() {
        for length in [0usize, 50, 191, 192, 200, 8383, 8384, 100_000] {
            let header = PacketHeader::new(PacketTag::LiteralData, length);
            let (parsed, _) = PacketHeader::from_bytes(&header.to_bytes()).unwrap();
            assert_eq!(parsed.length, length, "length {} did not roundtrip", length);
        }
    }

    #[test]
    fn test_packet_roundtrip() {
        let body = vec![1, 2, 3, 4, 5];
        let packet = Packet::new(PacketTag::LiteralData, body.clone());

        let (parsed, consumed) = Packet::from_bytes(&packet.to_bytes()).unwrap();
        assert_eq!(parsed.header.tag, PacketTag::LiteralData);
        assert_eq!(parsed.body, body);
        assert_eq!(consumed, packet.to_bytes().len());
    }

    #[test]
    fn test_packet_stream_roundtrip() {
        let packets = vec![
            Packet::new(PacketTag::Signature, vec![9; 64]),
            Packet::new(PacketTag::LiteralData, b"hello".to_vec()),
        ];
        let stream = Packet::write_all(&packets);

        let parsed = Packet::parse_all(&stream).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].header.tag, PacketTag::Signature);
        assert_eq!(parsed[1].body, b"hello");
    }

    #[test]
    fn test_truncated_body_rejected() {
        let packet = Packet::new(PacketTag::LiteralData, vec![0; 32]);
        let mut bytes = packet.to_bytes();
        bytes.truncate(bytes.len() - 1);
        assert!(Packet::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_old_format_rejected() {
        // Old format: MSB set, bit 6 clear.
        assert!(PacketHeader::from_bytes(&[0x84, 0x01]).is_err());
    }

    #[test]
    fn test_non_packet_rejected() {
        assert!(PacketHeader::from_bytes(&[0x41]).is_err());
        assert!(Packet::parse_all(&[]).is_err());
    }
}
