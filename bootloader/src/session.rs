// SPDX-FileCopyrightText: 2026 The uart-bootloader Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! The firmware-update session state machine.
//!
//! One session exists per boot. It hunts the raw byte stream for the sync
//! sequence, then walks the handshake: update request, device id check,
//! image length, erase, chunked receive. Every coordinated transition emits
//! exactly one response frame. A timeout or an unexpected packet is fatal
//! to the session: NACK, then `Done`; there is no retry short of a reset.
//! After the loop the serial link is released and the flashed image is
//! authenticated; the resulting [`BootDecision`] is the caller's to
//! execute.

use embedded_io::{Read, ReadReady, Write};
use embedded_storage::nor_flash::{NorFlash, ReadNorFlash};
use fwsig::{KeyProvider, VerificationResult};
use wire_protocol::{codes, Packet, PACKET_PADDING};

use crate::auth::authenticate_image;
use crate::flash::{FlashLayout, FlashProgrammer};
use crate::log;
use crate::platform::{BootDecision, Clock};
use crate::timer::SimpleTimer;
use crate::transport::{Transport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum State {
    Sync,
    WaitForUpdateReq,
    DeviceIdReq,
    DeviceIdRes,
    FwLengthReq,
    FwLengthRes,
    EraseApplication,
    ReceiveFirmware,
    Done,
}

/// Sliding four-byte window over the raw receive stream, used to
/// re-establish byte alignment: framed parsing is useless until the magic
/// sequence pins down where a frame starts.
struct SyncWindow([u8; 4]);

impl SyncWindow {
    fn new() -> Self {
        SyncWindow([0; 4])
    }

    /// Shift in one byte; true when the window holds the sync sequence.
    fn push(&mut self, byte: u8) -> bool {
        self.0.rotate_left(1);
        self.0[3] = byte;
        self.0 == consts::SYNC_SEQ
    }
}

/// Session parameters. `device_id` is the compiled-in identity the peer
/// must echo during the handshake.
#[derive(Debug, Clone, Copy)]
pub struct Config {
    pub device_id: u8,
    pub timeout_ticks: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            device_id: consts::DEVICE_ID,
            timeout_ticks: consts::DEFAULT_TIMEOUT_TICKS,
        }
    }
}

/// One firmware-update attempt. Owns the transport, the flash device and
/// the session bookkeeping; never outlives the boot.
pub struct BootSession<S, C, F, K> {
    transport: Transport<S>,
    clock: C,
    flash: F,
    keys: K,
    config: Config,
    layout: FlashLayout,
    state: State,
    fw_length: u32,
    bytes_written: u32,
    sync: SyncWindow,
    timer: SimpleTimer,
}

impl<S, C, F, K> BootSession<S, C, F, K>
where
    S: Read + Write + ReadReady,
    C: Clock,
    F: NorFlash + ReadNorFlash,
    K: KeyProvider,
{
    pub fn new(serial: S, clock: C, flash: F, keys: K, config: Config) -> Self {
        let timer = SimpleTimer::start(&clock, config.timeout_ticks, false);
        BootSession {
            transport: Transport::new(serial),
            clock,
            flash,
            keys,
            config,
            layout: FlashLayout::standard(),
            state: State::Sync,
            fw_length: 0,
            bytes_written: 0,
            sync: SyncWindow::new(),
            timer,
        }
    }

    /// Use a non-standard flash map (mostly for testing against small
    /// in-memory flash devices).
    pub fn with_layout(mut self, layout: FlashLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Run the session to completion and decide how this boot ends.
    ///
    /// The serial link is dropped before authentication runs, so a failed
    /// check is silent on the wire: the peer only observes the reset.
    pub fn run(mut self) -> BootDecision {
        while self.state != State::Done {
            if self.state == State::Sync {
                self.step_sync();
            } else {
                self.step_update();
            }
        }

        // Teardown before touching the image: nothing transmits past this
        // point.
        drop(self.transport.release());

        match authenticate_image(
            &mut self.flash,
            &self.layout,
            &self.keys,
            self.config.device_id as u32,
        ) {
            Ok(VerificationResult::Valid) => {
                log::info!("image authenticated, handing off");
                BootDecision::Launch
            }
            Ok(VerificationResult::Invalid) => BootDecision::Reset,
            Err(_) => {
                log::warn!("flash read failed during authentication");
                BootDecision::Reset
            }
        }
    }

    /// Hunt the raw stream for the sync sequence. A quiet link ends the
    /// session without a NACK (there is no synchronized peer to address)
    /// and the boot proceeds to authenticate whatever image is present.
    fn step_sync(&mut self) {
        if self.timer.has_elapsed(&self.clock) {
            log::info!("no sync within the window, booting existing image");
            self.state = State::Done;
            return;
        }
        match self.transport.recv_raw_byte() {
            Ok(Some(byte)) => {
                if self.sync.push(byte) {
                    self.respond(codes::SYNC_OBSERVED);
                    self.state = State::WaitForUpdateReq;
                }
            }
            Ok(None) => {}
            Err(_) => {
                log::warn!("serial failure during sync, ending session");
                self.state = State::Done;
            }
        }
    }

    fn step_update(&mut self) {
        match self.transport.poll() {
            Ok(()) => {}
            Err(TransportError::QueueOverflow) => {
                // Recoverable: the frame was dropped unacknowledged and the
                // peer's retry timer will offer it again.
            }
            Err(TransportError::Serial(_)) => {
                log::warn!("serial failure, ending session");
                self.state = State::Done;
                return;
            }
        }
        if self.timer.has_elapsed(&self.clock) {
            log::warn!("session timed out");
            self.fail();
            return;
        }

        match self.state {
            State::WaitForUpdateReq => {
                if let Some(packet) = self.transport.read() {
                    if packet.is_single(codes::FW_UPDATE_REQ) {
                        self.respond(codes::FW_UPDATE_RES);
                        self.state = State::DeviceIdReq;
                    } else {
                        self.fail();
                    }
                }
            }
            State::DeviceIdReq => {
                self.respond(codes::DEVICE_ID_REQ);
                self.state = State::DeviceIdRes;
            }
            State::DeviceIdRes => {
                if let Some(packet) = self.transport.read() {
                    if is_device_id_response(&packet, self.config.device_id) {
                        self.timer.reset(&self.clock);
                        self.state = State::FwLengthReq;
                    } else {
                        log::warn!("device id mismatch or malformed response");
                        self.fail();
                    }
                }
            }
            State::FwLengthReq => {
                self.respond(codes::FW_LENGTH_REQ);
                self.state = State::FwLengthRes;
            }
            State::FwLengthRes => {
                if let Some(packet) = self.transport.read() {
                    match parse_fw_length(&packet) {
                        Some(length) if length <= self.layout.max_fw_length() => {
                            self.fw_length = length;
                            self.timer.reset(&self.clock);
                            self.state = State::EraseApplication;
                        }
                        _ => {
                            log::warn!("firmware length rejected");
                            self.fail();
                        }
                    }
                }
            }
            State::EraseApplication => {
                let mut programmer = FlashProgrammer::new(&mut self.flash, &self.layout);
                if programmer.erase_application_region().is_err() {
                    self.fail();
                    return;
                }
                self.respond(codes::READY_FOR_DATA);
                self.state = State::ReceiveFirmware;
            }
            State::ReceiveFirmware => {
                if let Some(packet) = self.transport.read() {
                    self.receive_chunk(&packet);
                }
            }
            // Both handled before the match.
            State::Sync | State::Done => {}
        }
    }

    fn receive_chunk(&mut self, packet: &Packet) {
        let chunk_len = packet.chunk_len();
        let address = self.layout.app_start() + self.bytes_written;
        let mut programmer = FlashProgrammer::new(&mut self.flash, &self.layout);
        if programmer.write(address, &packet.data[..chunk_len]).is_err() {
            log::warn!("chunk write rejected");
            self.fail();
            return;
        }
        self.bytes_written += chunk_len as u32;

        if self.bytes_written >= self.fw_length {
            log::info!("firmware image received");
            self.respond(codes::UPDATE_SUCCESSFUL);
            self.state = State::Done;
        } else {
            self.respond(codes::READY_FOR_DATA);
        }
    }

    /// Emit one single-byte response and re-arm the session timer; every
    /// coordinated transition goes through here.
    fn respond(&mut self, code: u8) {
        if self.transport.write(&Packet::single(code)).is_err() {
            log::warn!("serial failure while responding, ending session");
            self.state = State::Done;
            return;
        }
        self.timer.reset(&self.clock);
    }

    /// Session-fatal failure: one NACK, then `Done`.
    fn fail(&mut self) {
        let _ = self.transport.write(&Packet::single(codes::NACK));
        self.state = State::Done;
    }
}

/// `DeviceIDRes`: header of 2, the code, the id byte, `0xFF` padding.
fn is_device_id_response(packet: &Packet, device_id: u8) -> bool {
    packet.length == 2
        && packet.data[0] == codes::DEVICE_ID_RES
        && packet.data[1] == device_id
        && packet.data[2..].iter().all(|&b| b == PACKET_PADDING)
}

/// `FWLengthRes`: header of 5, the code, a little-endian `u32`, padding.
fn parse_fw_length(packet: &Packet) -> Option<u32> {
    if packet.length != 5
        || packet.data[0] != codes::FW_LENGTH_RES
        || !packet.data[5..].iter().all(|&b| b == PACKET_PADDING)
    {
        return None;
    }
    Some(u32::from_le_bytes(packet.data[1..5].try_into().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_window_matches_first_complete_occurrence() {
        let mut stream = Vec::new();
        // Shifted and truncated near-matches, then the real thing.
        stream.extend_from_slice(&[0xC4, 0x55, 0x7E]);
        stream.extend_from_slice(&[0xC4, 0x55, 0x7E]);
        stream.extend_from_slice(&consts::SYNC_SEQ);
        stream.extend_from_slice(&consts::SYNC_SEQ);

        let mut window = SyncWindow::new();
        let hits: Vec<usize> = stream
            .iter()
            .enumerate()
            .filter(|(_, &byte)| window.push(byte))
            .map(|(i, _)| i)
            .collect();

        // First hit is at the last byte of the first complete sequence;
        // the session leaves Sync there, so later hits never matter.
        assert_eq!(hits[0], 9);
    }

    #[test]
    fn sync_window_ignores_embedded_prefixes() {
        let mut window = SyncWindow::new();
        for &byte in &[0xC4, 0xC4, 0x55, 0x7E, 0xFF, 0x10] {
            assert!(!window.push(byte));
        }
    }

    #[test]
    fn device_id_response_validation() {
        let good = Packet::new(2, &[codes::DEVICE_ID_RES, 0x42]);
        assert!(is_device_id_response(&good, 0x42));
        assert!(!is_device_id_response(&good, 0x43));

        let wrong_len = Packet::new(1, &[codes::DEVICE_ID_RES]);
        assert!(!is_device_id_response(&wrong_len, 0x42));

        let mut dirty = good;
        dirty.data[9] = 0;
        assert!(!is_device_id_response(&dirty, 0x42));
    }

    #[test]
    fn fw_length_parsing() {
        let good = Packet::new(5, &[codes::FW_LENGTH_RES, 0x20, 0x00, 0x01, 0x00]);
        assert_eq!(parse_fw_length(&good), Some(0x10020));

        let wrong_code = Packet::new(5, &[codes::FW_LENGTH_REQ, 0x20, 0x00, 0x00, 0x00]);
        assert_eq!(parse_fw_length(&wrong_code), None);

        let wrong_len = Packet::new(4, &[codes::FW_LENGTH_RES, 0x20, 0x00, 0x00]);
        assert_eq!(parse_fw_length(&wrong_len), None);
    }
}
