//! Frame layout and codec.
//!
//! One frame is one UDP datagram:
//!
//! ```text
//! [magic "BSTwifi1": 8][crc: 2][command: 1][payload ...]
//! ```
//!
//! Header, CRC field and command byte stay in clear so peers can recognize
//! protocol frames before committing to a decryption attempt; only the
//! payload region is enciphered. The CRC is computed over the *plaintext*
//! payload, so on an inbound frame it can only be checked after the payload
//! has been deciphered - that ordering is what lets it double as the
//! key-trial oracle.

use crate::{checksum, cipher};

/// Magic bytes opening every protocol frame.
pub const HEADER: [u8; 8] = *b"BSTwifi1";

/// Size of the checksum field on the wire.
pub const CHECKSUM_SIZE: usize = 2;

/// Offset of the checksum field.
pub const CRC_OFFSET: usize = HEADER.len();

/// Offset of the command byte.
pub const COMMAND_OFFSET: usize = HEADER.len() + CHECKSUM_SIZE;

/// Offset of the (enciphered) payload; also the minimum frame length.
pub const PAYLOAD_OFFSET: usize = COMMAND_OFFSET + 1;

/// Commands sent by the controller. 0 is reserved so decrypt garbage never
/// aliases a real command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SendCommand {
    /// Discovery broadcast carrying the current app nonce, in clear.
    Hello = 1,
    /// Hands a freshly seen device this controller's key.
    Bind = 2,
    /// Pushes the provisioning payload to a bound device.
    SetData = 3,
}

impl SendCommand {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(SendCommand::Hello),
            2 => Some(SendCommand::Bind),
            3 => Some(SendCommand::SetData),
            _ => None,
        }
    }
}

/// Commands received from devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReceiveCommand {
    /// Any command byte outside the known range. The frame validated, but
    /// there is nothing to do with it.
    Unknown = 0,
    /// Periodic status report with the device's scanned network list.
    WifiList = 1,
}

impl ReceiveCommand {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => ReceiveCommand::WifiList,
            _ => ReceiveCommand::Unknown,
        }
    }
}

/// Builds a frame around `payload`.
///
/// The checksum is computed over the plaintext payload before the payload
/// region is enciphered under `cipher_key`; pass `None` for frames that go
/// out in clear (HELLO).
pub fn encode(command: u8, payload: &[u8], cipher_key: Option<(&[u8], &[u8])>) -> Vec<u8> {
    let mut frame = Vec::with_capacity(PAYLOAD_OFFSET + payload.len());
    frame.extend_from_slice(&HEADER);
    frame.extend_from_slice(&checksum::as_bytes(checksum::crc16(payload)));
    frame.push(command);
    frame.extend_from_slice(payload);
    if let Some((key, nonce)) = cipher_key {
        cipher::encrypt(key, nonce, &mut frame[PAYLOAD_OFFSET..]);
    }
    frame
}

/// Checks length and magic. Cheap; run before any decryption attempt.
pub fn is_header_valid(data: &[u8]) -> bool {
    data.len() >= PAYLOAD_OFFSET && data[..HEADER.len()] == HEADER
}

/// Extracts the checksum field. No decryption needed - it sits in clear.
pub fn extract_crc(data: &[u8]) -> Option<[u8; 2]> {
    if data.len() < COMMAND_OFFSET {
        return None;
    }
    Some([data[CRC_OFFSET], data[CRC_OFFSET + 1]])
}

/// The command byte from its fixed offset.
pub fn command_byte(data: &[u8]) -> Option<u8> {
    data.get(COMMAND_OFFSET).copied()
}

/// The payload region after the clear prefix.
pub fn payload(data: &[u8]) -> Option<&[u8]> {
    data.get(PAYLOAD_OFFSET..)
}

/// Recomputes the payload checksum and compares it with the stored field.
///
/// The payload must be plaintext; on a freshly received frame this is only
/// meaningful after [`cipher::decrypt`] has run over the payload region.
pub fn verify_checksum(data: &[u8]) -> bool {
    match (extract_crc(data), payload(data)) {
        (Some(field), Some(body)) => field == checksum::as_bytes(checksum::crc16(body)),
        _ => false,
    }
}
