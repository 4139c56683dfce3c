// SPDX-FileCopyrightText: 2026 The uart-bootloader Authors
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]

/// Size of the flash region reserved for the bootloader itself.
/// The application image starts immediately after this region, so the
/// bootloader must always fit in (and be padded to) exactly this many bytes.
pub const BOOTLOADER_SIZE: u32 = 0x8000;

/// Total size of the on-chip flash.
pub const FLASH_SIZE: u32 = 1024 * 512;

/// Offset of the application image within flash.
pub const MAIN_APP_START: u32 = BOOTLOADER_SIZE;

/// Largest application image the device will accept during an update.
/// Anything longer cannot fit next to the bootloader and is rejected at the
/// firmware-length handshake stage.
pub const MAX_FW_LENGTH: u32 = FLASH_SIZE - BOOTLOADER_SIZE;

/// Identity of this board. The updater must present the same value during
/// the handshake, and the `firmware_info` header of a signed image must
/// carry it as well.
pub const DEVICE_ID: u8 = 0x42;

/// Size in bytes of the interrupt vector table at the start of the
/// application image.
pub const VECTOR_TABLE_SIZE: u32 = 0x1AC;

/// Offset of the `firmware_info` header block within the application image:
/// the first 16-byte-aligned address after the vector table. The 16-byte
/// CBC-MAC signature block sits immediately after the header.
pub const FWINFO_OFFSET: u32 = align16(VECTOR_TABLE_SIZE);

/// Magic byte sequence the updater streams to establish byte alignment on
/// the wire before any framed traffic. Matched against a sliding window of
/// the raw receive stream.
pub const SYNC_SEQ: [u8; 4] = [0xC4, 0x55, 0x7E, 0x10];

/// Ticks (milliseconds) the bootloader waits in any handshake state before
/// giving up on the session.
pub const DEFAULT_TIMEOUT_TICKS: u64 = 5000;

/// Serial link speed. The link is 8-N-1 at this rate.
pub const UART_BAUDRATE: u32 = 115_200;

/// Round `value` up to the next multiple of 16.
pub const fn align16(value: u32) -> u32 {
    (value + 15) & !15
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fwinfo_offset_is_aligned() {
        assert_eq!(FWINFO_OFFSET, 0x1B0);
        assert_eq!(FWINFO_OFFSET % 16, 0);
    }

    #[test]
    fn align16_boundaries() {
        assert_eq!(align16(0x10), 0x10);
        assert_eq!(align16(0x11), 0x20);
        assert_eq!(align16(0x1F), 0x20);
    }
}
