// SPDX-FileCopyrightText: 2026 The uart-bootloader Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Flash layout and the application-region programmer.

use embedded_storage::nor_flash::NorFlash;

use crate::log;

/// Named offsets of the flash map, computed once. All region access goes
/// through these accessors instead of ad hoc address arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashLayout {
    pub bootloader_size: u32,
    pub flash_size: u32,
    /// Offset of the `firmware_info` block within the application image.
    pub fwinfo_offset: u32,
}

impl FlashLayout {
    /// The board's production layout.
    pub const fn standard() -> Self {
        FlashLayout {
            bootloader_size: consts::BOOTLOADER_SIZE,
            flash_size: consts::FLASH_SIZE,
            fwinfo_offset: consts::FWINFO_OFFSET,
        }
    }

    /// First byte of the application region.
    pub const fn app_start(&self) -> u32 {
        self.bootloader_size
    }

    /// One past the last byte of the application region.
    pub const fn app_end(&self) -> u32 {
        self.flash_size
    }

    /// Longest image that fits next to the bootloader.
    pub const fn max_fw_length(&self) -> u32 {
        self.flash_size - self.bootloader_size
    }

    /// Absolute offset of the `firmware_info` block.
    pub const fn fwinfo_addr(&self) -> u32 {
        self.app_start() + self.fwinfo_offset
    }

    /// Absolute offset of the stored signature block.
    pub const fn signature_addr(&self) -> u32 {
        self.fwinfo_addr() + fwsig::FirmwareInfo::SIZE as u32
    }

    /// Whether `[address, address + length)` lies inside the application
    /// region.
    pub fn contains_app_range(&self, address: u32, length: u32) -> bool {
        address >= self.app_start()
            && length <= self.app_end()
            && address <= self.app_end() - length
    }
}

/// Programming failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError<E> {
    /// The requested write falls outside the application region.
    OutOfBounds,
    /// The storage primitive failed.
    Storage(E),
}

/// Thin sequencing wrapper over the platform's NOR-flash primitive.
///
/// The caller guarantees writes land in the already-erased region,
/// non-overlapping and monotonically increasing; nothing here re-reads or
/// rolls back. A power loss mid-transfer leaves a partial image for
/// authentication to reject on the next boot.
pub struct FlashProgrammer<'a, F> {
    flash: &'a mut F,
    layout: &'a FlashLayout,
}

impl<'a, F: NorFlash> FlashProgrammer<'a, F> {
    pub fn new(flash: &'a mut F, layout: &'a FlashLayout) -> Self {
        FlashProgrammer { flash, layout }
    }

    /// Erase every sector spanning the application area, unconditionally.
    pub fn erase_application_region(&mut self) -> Result<(), FlashError<F::Error>> {
        log::info!("erasing application region");
        self.flash
            .erase(self.layout.app_start(), self.layout.app_end())
            .map_err(FlashError::Storage)
    }

    /// Program `data` at `address` (absolute flash offset).
    pub fn write(&mut self, address: u32, data: &[u8]) -> Result<(), FlashError<F::Error>> {
        if !self.layout.contains_app_range(address, data.len() as u32) {
            return Err(FlashError::OutOfBounds);
        }
        self.flash.write(address, data).map_err(FlashError::Storage)
    }
}
