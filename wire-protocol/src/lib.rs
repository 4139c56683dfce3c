// SPDX-FileCopyrightText: 2026 The uart-bootloader Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Wire protocol spoken between the bootloader and the host updater.
//!
//! Every frame on the link is exactly [`PACKET_LENGTH`] bytes: one header
//! byte, [`PACKET_DATA_LENGTH`] payload bytes, one CRC8 trailer. Control
//! packets carry a code in the first payload byte and pad the rest with
//! `0xFF`; firmware data packets encode `chunk length - 1` in the low nibble
//! of the header byte. The CRC covers the header and payload only.

#![no_std]

use crc::{Crc, CRC_8_SMBUS};

/// Payload bytes carried by every frame.
pub const PACKET_DATA_LENGTH: usize = 16;

/// Total frame size on the wire: header + payload + CRC trailer.
pub const PACKET_LENGTH: usize = PACKET_DATA_LENGTH + 2;

/// Fill value for unused payload bytes.
pub const PACKET_PADDING: u8 = 0xFF;

/// CRC-8 with polynomial `x^8 + x^2 + x + 1` (0x07), zero init, unreflected.
const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);

/// Control codes carried in the first payload byte of a control packet.
pub mod codes {
    /// Link-level: receiver detected a corrupt frame, asks for a resend.
    pub const RETX: u8 = 0x19;
    /// Link-level: frame received intact.
    pub const ACK: u8 = 0x15;

    /// Bootloader saw the sync sequence on the raw byte stream.
    pub const SYNC_OBSERVED: u8 = 0x20;
    /// Host requests a firmware update session.
    pub const FW_UPDATE_REQ: u8 = 0x31;
    /// Bootloader accepts the update session.
    pub const FW_UPDATE_RES: u8 = 0x37;
    /// Bootloader asks the host for the target device id.
    pub const DEVICE_ID_REQ: u8 = 0x3C;
    /// Host answers with the device id (two-byte payload).
    pub const DEVICE_ID_RES: u8 = 0x3F;
    /// Bootloader asks for the image length.
    pub const FW_LENGTH_REQ: u8 = 0x42;
    /// Host answers with a little-endian `u32` length (five-byte payload).
    pub const FW_LENGTH_RES: u8 = 0x45;
    /// Bootloader is ready for the next firmware chunk.
    pub const READY_FOR_DATA: u8 = 0x48;
    /// Bootloader received the whole image.
    pub const UPDATE_SUCCESSFUL: u8 = 0x54;
    /// Session aborted; the host should give up.
    pub const NACK: u8 = 0x59;
}

/// Errors produced when decoding a frame from raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FrameError {
    /// Fewer than [`PACKET_LENGTH`] bytes were supplied.
    Truncated,
    /// The stored CRC trailer does not match the header + payload.
    CrcMismatch,
}

impl core::fmt::Display for FrameError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            FrameError::Truncated => write!(f, "frame shorter than {} bytes", PACKET_LENGTH),
            FrameError::CrcMismatch => write!(f, "frame CRC mismatch"),
        }
    }
}

/// One frame on the wire.
///
/// `length` is the raw header byte: the payload length for control packets,
/// `chunk length - 1` (low nibble) for firmware data packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Packet {
    pub length: u8,
    pub data: [u8; PACKET_DATA_LENGTH],
    pub crc: u8,
}

impl Packet {
    /// Build a packet from a header byte and payload prefix; the remaining
    /// payload bytes are padded with `0xFF` and the CRC is filled in.
    pub fn new(length: u8, payload: &[u8]) -> Self {
        debug_assert!(payload.len() <= PACKET_DATA_LENGTH);
        let mut data = [PACKET_PADDING; PACKET_DATA_LENGTH];
        data[..payload.len()].copy_from_slice(payload);
        let mut packet = Packet { length, data, crc: 0 };
        packet.crc = packet.compute_crc();
        packet
    }

    /// Build a single-byte control packet for `code`.
    pub fn single(code: u8) -> Self {
        Self::new(1, &[code])
    }

    /// Build a firmware data packet from a chunk of 1..=16 bytes.
    ///
    /// Returns `None` for an empty or oversized chunk.
    pub fn firmware_chunk(chunk: &[u8]) -> Option<Self> {
        if chunk.is_empty() || chunk.len() > PACKET_DATA_LENGTH {
            return None;
        }
        Some(Self::new((chunk.len() - 1) as u8, chunk))
    }

    /// Chunk length encoded in the header low nibble of a data packet.
    pub fn chunk_len(&self) -> usize {
        (self.length & 0x0F) as usize + 1
    }

    /// CRC over the header byte and the full payload.
    pub fn compute_crc(&self) -> u8 {
        let mut digest = CRC8.digest();
        digest.update(&[self.length]);
        digest.update(&self.data);
        digest.finalize()
    }

    /// Whether the stored CRC trailer matches the contents.
    pub fn crc_is_valid(&self) -> bool {
        self.crc == self.compute_crc()
    }

    /// Whether this is the single-byte control packet for `code`: header of
    /// 1, the code, and nothing but `0xFF` padding after it. A corrupted
    /// padding byte makes the frame an ordinary data packet instead.
    pub fn is_single(&self, code: u8) -> bool {
        self.length == 1
            && self.data[0] == code
            && self.data[1..].iter().all(|&b| b == PACKET_PADDING)
    }

    pub fn is_ack(&self) -> bool {
        self.is_single(codes::ACK)
    }

    pub fn is_retx(&self) -> bool {
        self.is_single(codes::RETX)
    }

    /// Serialize to wire order: header, payload, CRC.
    pub fn to_bytes(&self) -> [u8; PACKET_LENGTH] {
        let mut out = [0u8; PACKET_LENGTH];
        out[0] = self.length;
        out[1..1 + PACKET_DATA_LENGTH].copy_from_slice(&self.data);
        out[PACKET_LENGTH - 1] = self.crc;
        out
    }

    /// Decode a frame from raw bytes, verifying the CRC trailer.
    pub fn from_bytes(raw: &[u8]) -> Result<Self, FrameError> {
        if raw.len() < PACKET_LENGTH {
            return Err(FrameError::Truncated);
        }
        let mut data = [0u8; PACKET_DATA_LENGTH];
        data.copy_from_slice(&raw[1..1 + PACKET_DATA_LENGTH]);
        let packet = Packet {
            length: raw[0],
            data,
            crc: raw[PACKET_LENGTH - 1],
        };
        if !packet.crc_is_valid() {
            return Err(FrameError::CrcMismatch);
        }
        Ok(packet)
    }
}
