// SPDX-FileCopyrightText: 2026 The uart-bootloader Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Reliable framed transport over the raw serial link.
//!
//! [`poll`](Transport::poll) drains whatever bytes the link has ready
//! through a Length → Data → CRC frame parser, one byte at a time, without
//! blocking. A corrupt frame is answered with a RETX request and framing
//! restarts at the length byte; there is no mid-stream realignment, and the
//! session's sync sequence is what re-establishes byte alignment after
//! noise. Delivery is stateless ARQ: every transmitted frame is cached, and
//! an incoming RETX resends the cache verbatim. No sequence numbers.

use embedded_io::{Read, ReadReady, Write};
use heapless::Deque;
use wire_protocol::{Packet, PACKET_DATA_LENGTH};

use crate::log;

/// Validated non-control packets the session has not consumed yet.
pub const PACKET_QUEUE_DEPTH: usize = 8;

/// Transport failures surfaced to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError<E> {
    /// The packet queue is full. The offending frame was dropped and its
    /// ACK withheld, so the peer's retry timer provides backpressure.
    QueueOverflow,
    /// The serial link itself failed.
    Serial(E),
}

enum FrameState {
    Length,
    Data,
    Crc,
}

/// Frame parser, ARQ cache and validated-packet queue around a serial link.
pub struct Transport<S> {
    serial: S,
    state: FrameState,
    building: Packet,
    data_count: usize,
    last_transmitted: Packet,
    queue: Deque<Packet, PACKET_QUEUE_DEPTH>,
}

impl<S> Transport<S>
where
    S: Read + Write + ReadReady,
{
    pub fn new(serial: S) -> Self {
        Transport {
            serial,
            state: FrameState::Length,
            building: Packet::new(0, &[]),
            data_count: 0,
            last_transmitted: Packet::new(0, &[]),
            queue: Deque::new(),
        }
    }

    /// Pull one raw byte off the link, bypassing the frame parser.
    ///
    /// Used by the session while hunting for the sync sequence, before any
    /// byte alignment exists; mixing this with [`poll`](Transport::poll)
    /// mid-frame would corrupt framing.
    pub fn recv_raw_byte(&mut self) -> Result<Option<u8>, TransportError<S::Error>> {
        if !self.serial.read_ready().map_err(TransportError::Serial)? {
            return Ok(None);
        }
        let mut byte = [0u8; 1];
        let n = self
            .serial
            .read(&mut byte)
            .map_err(TransportError::Serial)?;
        Ok((n == 1).then_some(byte[0]))
    }

    /// Drain available input and advance the frame parser.
    ///
    /// Completed frames are dispatched: CRC failures trigger a RETX, RETX
    /// requests resend the cache, ACKs are dropped, anything else is
    /// queued and acknowledged. Returns on the first error; parsing state
    /// survives, so the caller may keep polling.
    pub fn poll(&mut self) -> Result<(), TransportError<S::Error>> {
        while let Some(byte) = self.recv_raw_byte()? {
            match self.state {
                FrameState::Length => {
                    self.building.length = byte;
                    self.data_count = 0;
                    self.state = FrameState::Data;
                }
                FrameState::Data => {
                    self.building.data[self.data_count] = byte;
                    self.data_count += 1;
                    if self.data_count == PACKET_DATA_LENGTH {
                        self.state = FrameState::Crc;
                    }
                }
                FrameState::Crc => {
                    self.building.crc = byte;
                    self.state = FrameState::Length;
                    self.dispatch()?;
                }
            }
        }
        Ok(())
    }

    fn dispatch(&mut self) -> Result<(), TransportError<S::Error>> {
        let packet = self.building;

        if !packet.crc_is_valid() {
            log::warn!("frame CRC mismatch, requesting retransmit");
            return self.write(&Packet::single(wire_protocol::codes::RETX));
        }
        if packet.is_retx() {
            let cached = self.last_transmitted;
            return self.write(&cached);
        }
        if packet.is_ack() {
            return Ok(());
        }
        if self.queue.push_back(packet).is_err() {
            // The ACK is withheld: the peer times out and resends once the
            // consumer has drained the queue.
            log::warn!("packet queue full, dropping frame without ACK");
            return Err(TransportError::QueueOverflow);
        }
        self.write(&Packet::single(wire_protocol::codes::ACK))
    }

    /// Send one frame and cache it for a later RETX.
    pub fn write(&mut self, packet: &Packet) -> Result<(), TransportError<S::Error>> {
        self.serial
            .write_all(&packet.to_bytes())
            .map_err(TransportError::Serial)?;
        self.last_transmitted = *packet;
        Ok(())
    }

    /// Whether a validated packet is waiting.
    pub fn packets_available(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Pop the oldest validated packet.
    pub fn read(&mut self) -> Option<Packet> {
        self.queue.pop_front()
    }

    /// Give the serial link back for teardown.
    pub fn release(self) -> S {
        self.serial
    }
}
