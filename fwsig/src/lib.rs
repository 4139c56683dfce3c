// SPDX-FileCopyrightText: 2026 The uart-bootloader Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Firmware image signing and verification.
//!
//! An application image carries a 16-byte `firmware_info` header block at a
//! fixed offset past the vector table, followed immediately by a 16-byte
//! CBC-MAC signature block. The tag covers the header block first, then the
//! image bytes before the header, then everything after the signature, so
//! the stored signature never authenticates itself.
//!
//! Key material is obtained through the [`KeyProvider`] capability. Note
//! the residual limitation for integrators: a key that ships compiled into
//! a binary can be extracted from that binary; provisioning a per-device
//! key is outside the scope of this crate.

#![no_std]

pub mod aes;
pub mod mac;

#[cfg(test)]
mod tests;

use aes::BLOCK_SIZE;
use mac::CbcMac;

/// Value of [`FirmwareInfo::sentinel`] in any valid header.
pub const SENTINEL: u32 = 0xDEAD_C0DE;

/// Bytes in the stored signature block.
pub const SIGNATURE_LENGTH: usize = 16;

/// Source of the 16-byte MAC key.
pub trait KeyProvider {
    fn mac_key(&self) -> [u8; BLOCK_SIZE];
}

/// A key baked into the firmware at build time.
pub struct StaticKey(pub [u8; BLOCK_SIZE]);

impl KeyProvider for StaticKey {
    fn mac_key(&self) -> [u8; BLOCK_SIZE] {
        self.0
    }
}

/// Verification outcome.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u32)]
pub enum VerificationResult {
    // The values are arbitrary, but chosen to be different by more than one
    // bit to make glitching attacks more difficult.
    Valid = 0xcafebabe,
    Invalid = 0xdeadbeef,
}

/// Errors raised when a slice does not hold a signable image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The image ends before the header and signature blocks do.
    ImageTooShort,
    /// The sentinel word is missing, so there is no header to sign.
    MissingSentinel,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::ImageTooShort => write!(f, "image too short for header and signature"),
            Error::MissingSentinel => write!(f, "firmware_info sentinel missing"),
        }
    }
}

/// The `firmware_info` header block: one cipher block of little-endian
/// words identifying the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FirmwareInfo {
    pub sentinel: u32,
    pub device_id: u32,
    pub version: u32,
    pub length: u32,
}

impl FirmwareInfo {
    pub const SIZE: usize = 16;

    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let word = |i: usize| u32::from_le_bytes(bytes[4 * i..4 * i + 4].try_into().unwrap());
        FirmwareInfo {
            sentinel: word(0),
            device_id: word(1),
            version: word(2),
            length: word(3),
        }
    }

    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        for (i, word) in [self.sentinel, self.device_id, self.version, self.length]
            .iter()
            .enumerate()
        {
            out[4 * i..4 * i + 4].copy_from_slice(&word.to_le_bytes());
        }
        out
    }

    /// Whether the sentinel marks this block as a header at all.
    pub fn is_present(&self) -> bool {
        self.sentinel == SENTINEL
    }
}

/// Offsets within the header + signature gap.
const fn signature_offset(fwinfo_offset: usize) -> usize {
    fwinfo_offset + FirmwareInfo::SIZE
}

const fn covered_resume_offset(fwinfo_offset: usize) -> usize {
    fwinfo_offset + FirmwareInfo::SIZE + SIGNATURE_LENGTH
}

/// Compute the tag for `image`, whose `firmware_info` header sits at
/// `fwinfo_offset`. The covered region is the header block, then
/// `[0, fwinfo_offset)`, then `[fwinfo_offset + 32, image.len())`.
pub fn image_tag(
    image: &[u8],
    fwinfo_offset: usize,
    key: &impl KeyProvider,
) -> Result<[u8; SIGNATURE_LENGTH], Error> {
    if image.len() < covered_resume_offset(fwinfo_offset) {
        return Err(Error::ImageTooShort);
    }
    let mut mac = CbcMac::new(&key.mac_key());
    mac.update(&image[fwinfo_offset..signature_offset(fwinfo_offset)]);
    mac.update(&image[..fwinfo_offset]);
    mac.update(&image[covered_resume_offset(fwinfo_offset)..]);
    Ok(mac.finalize())
}

/// Patch the header's version and length fields, compute the tag and store
/// it in the signature block. Returns the stored tag.
pub fn sign_image(
    image: &mut [u8],
    fwinfo_offset: usize,
    version: u32,
    key: &impl KeyProvider,
) -> Result<[u8; SIGNATURE_LENGTH], Error> {
    if image.len() < covered_resume_offset(fwinfo_offset) {
        return Err(Error::ImageTooShort);
    }
    if !read_info(image, fwinfo_offset)?.is_present() {
        return Err(Error::MissingSentinel);
    }
    let length = image.len() as u32;
    image[fwinfo_offset + 8..fwinfo_offset + 12].copy_from_slice(&version.to_le_bytes());
    image[fwinfo_offset + 12..fwinfo_offset + 16].copy_from_slice(&length.to_le_bytes());

    let tag = image_tag(image, fwinfo_offset, key)?;
    image[signature_offset(fwinfo_offset)..covered_resume_offset(fwinfo_offset)]
        .copy_from_slice(&tag);
    Ok(tag)
}

/// Read the header block out of an image slice.
pub fn read_info(image: &[u8], fwinfo_offset: usize) -> Result<FirmwareInfo, Error> {
    let end = signature_offset(fwinfo_offset);
    if image.len() < end {
        return Err(Error::ImageTooShort);
    }
    let block: &[u8; FirmwareInfo::SIZE] = image[fwinfo_offset..end].try_into().unwrap();
    Ok(FirmwareInfo::from_bytes(block))
}

/// Verify an image slice against its stored signature.
///
/// Succeeds only when the sentinel is present, the device id matches, the
/// header length equals the slice length, and the recomputed tag equals the
/// stored signature byte for byte.
pub fn verify_image(
    image: &[u8],
    fwinfo_offset: usize,
    expected_device_id: u32,
    key: &impl KeyProvider,
) -> VerificationResult {
    let Ok(info) = read_info(image, fwinfo_offset) else {
        return VerificationResult::Invalid;
    };
    if !info.is_present() || info.device_id != expected_device_id {
        return VerificationResult::Invalid;
    }
    if info.length as usize != image.len() {
        return VerificationResult::Invalid;
    }
    let Ok(tag) = image_tag(image, fwinfo_offset, key) else {
        return VerificationResult::Invalid;
    };
    let stored = &image[signature_offset(fwinfo_offset)..covered_resume_offset(fwinfo_offset)];
    if stored == tag.as_slice() {
        VerificationResult::Valid
    } else {
        VerificationResult::Invalid
    }
}
