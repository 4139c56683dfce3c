// SPDX-FileCopyrightText: 2026 The uart-bootloader Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Streaming authentication of the flashed application image.
//!
//! Walks the image straight out of flash, never buffering more than one
//! small chunk, and recomputes the CBC-MAC tag over the covered region:
//! the `firmware_info` block first, then the bytes before it, then
//! everything after the signature block. The stored signature is never part
//! of its own input.

use embedded_storage::nor_flash::ReadNorFlash;
use fwsig::mac::CbcMac;
use fwsig::{FirmwareInfo, KeyProvider, VerificationResult, SIGNATURE_LENGTH};

use crate::flash::FlashLayout;
use crate::log;

/// Bytes read from flash per step while feeding the MAC.
const CHUNK: usize = 64;

/// Authenticate the image described by the `firmware_info` block in flash.
///
/// Returns `Ok(Valid)` only when the sentinel is present, the device id
/// matches, the length field is sane and the recomputed tag equals the
/// stored signature byte for byte. Flash read failures propagate.
pub fn authenticate_image<F: ReadNorFlash>(
    flash: &mut F,
    layout: &FlashLayout,
    keys: &impl KeyProvider,
    expected_device_id: u32,
) -> Result<VerificationResult, F::Error> {
    let mut info_block = [0u8; FirmwareInfo::SIZE];
    flash.read(layout.fwinfo_addr(), &mut info_block)?;
    let info = FirmwareInfo::from_bytes(&info_block);

    if !info.is_present() {
        log::info!("no firmware_info sentinel, image rejected");
        return Ok(VerificationResult::Invalid);
    }
    if info.device_id != expected_device_id {
        log::warn!("image built for another device id, rejected");
        return Ok(VerificationResult::Invalid);
    }
    // The image must at least reach past its own signature block, and must
    // fit next to the bootloader.
    let covered_resume = layout.fwinfo_offset + (FirmwareInfo::SIZE + SIGNATURE_LENGTH) as u32;
    if info.length < covered_resume || info.length > layout.max_fw_length() {
        log::warn!("firmware_info length field out of bounds, image rejected");
        return Ok(VerificationResult::Invalid);
    }

    let mut signature = [0u8; SIGNATURE_LENGTH];
    flash.read(layout.signature_addr(), &mut signature)?;

    let mut mac = CbcMac::new(&keys.mac_key());
    mac.update(&info_block);
    feed_range(flash, &mut mac, layout.app_start(), layout.fwinfo_addr())?;
    feed_range(
        flash,
        &mut mac,
        layout.app_start() + covered_resume,
        layout.app_start() + info.length,
    )?;
    let tag = mac.finalize();

    Ok(if tag == signature {
        VerificationResult::Valid
    } else {
        log::warn!("signature mismatch, image rejected");
        VerificationResult::Invalid
    })
}

fn feed_range<F: ReadNorFlash>(
    flash: &mut F,
    mac: &mut CbcMac,
    mut from: u32,
    to: u32,
) -> Result<(), F::Error> {
    let mut buf = [0u8; CHUNK];
    while from < to {
        let take = ((to - from) as usize).min(CHUNK);
        flash.read(from, &mut buf[..take])?;
        mac.update(&buf[..take]);
        from += take as u32;
    }
    Ok(())
}
