// SPDX-FileCopyrightText: 2026 The uart-bootloader Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Host-side firmware updater.
//!
//! Streams the sync sequence until the bootloader answers, then walks the
//! handshake and pumps the signed image up in 16-byte chunks, one per
//! ReadyForData. Link-level recovery mirrors the device: corrupt frames are
//! answered with RETX, and an incoming RETX resends the last transmitted
//! frame from cache.

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use log::{error, info};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use wire_protocol::{codes, FrameError, Packet, PACKET_DATA_LENGTH, PACKET_LENGTH};

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);
const SYNC_RETRY_DELAY: Duration = Duration::from_millis(500);

#[derive(Debug, Parser)]
#[command(name = "fw-updater", about = "Send a signed firmware image to the bootloader")]
struct Args {
    /// List available serial ports and exit.
    #[arg(short, long)]
    list_ports: bool,
    #[arg(short, long, default_value_t = String::from("/dev/ttyUSB0"))]
    port: String,
    #[arg(short, long, default_value_t = consts::UART_BAUDRATE)]
    baudrate: u32,
    /// Signed application image to send.
    image: Option<PathBuf>,
}

#[derive(Debug)]
enum Error {
    Io(std::io::Error),
    Serial(tokio_serial::Error),
    LinkClosed,
    Timeout(&'static str),
    Nack,
    UnexpectedPacket { expected: u8, got: Packet },
    ImageTooShort,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "serial I/O: {e}"),
            Error::Serial(e) => write!(f, "serial port: {e}"),
            Error::LinkClosed => write!(f, "serial link closed"),
            Error::Timeout(what) => write!(f, "timed out waiting for {what}"),
            Error::Nack => write!(f, "bootloader sent NACK, session aborted"),
            Error::UnexpectedPacket { expected, got } => write!(
                f,
                "expected single-byte packet 0x{expected:02x}, got header 0x{:02x} code 0x{:02x}",
                got.length, got.data[0]
            ),
            Error::ImageTooShort => write!(f, "image too short to carry a firmware_info header"),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<tokio_serial::Error> for Error {
    fn from(e: tokio_serial::Error) -> Self {
        Error::Serial(e)
    }
}

/// Framed, ARQ-recovered view of the serial link.
struct Link {
    serial: SerialStream,
    rx: VecDeque<u8>,
    packets: VecDeque<Packet>,
    last_sent: Packet,
}

impl Link {
    fn new(serial: SerialStream) -> Self {
        Link {
            serial,
            rx: VecDeque::new(),
            packets: VecDeque::new(),
            last_sent: Packet::single(codes::ACK),
        }
    }

    async fn send_raw(&mut self, packet: &Packet) -> Result<(), Error> {
        self.serial.write_all(&packet.to_bytes()).await?;
        self.serial.flush().await?;
        Ok(())
    }

    /// Send a frame and cache it for a later RETX.
    async fn write_packet(&mut self, packet: &Packet) -> Result<(), Error> {
        self.send_raw(packet).await?;
        self.last_sent = *packet;
        Ok(())
    }

    /// Read whatever the link has (briefly), then process complete frames.
    async fn pump(&mut self) -> Result<(), Error> {
        let mut buf = [0u8; 256];
        match tokio::time::timeout(Duration::from_millis(10), self.serial.read(&mut buf)).await {
            Ok(Ok(0)) => return Err(Error::LinkClosed),
            Ok(Ok(n)) => self.rx.extend(&buf[..n]),
            Ok(Err(e)) => return Err(Error::Io(e)),
            Err(_) => {}
        }

        while self.rx.len() >= PACKET_LENGTH {
            let raw: Vec<u8> = self.rx.drain(..PACKET_LENGTH).collect();
            match Packet::from_bytes(&raw) {
                Err(FrameError::CrcMismatch) => {
                    info!("corrupt frame from device, requesting retransmit");
                    self.send_raw(&Packet::single(codes::RETX)).await?;
                }
                Err(FrameError::Truncated) => unreachable!("frame length is fixed"),
                Ok(packet) if packet.is_retx() => {
                    info!("device requested retransmit");
                    let cached = self.last_sent;
                    self.send_raw(&cached).await?;
                }
                Ok(packet) if packet.is_ack() => {}
                Ok(packet) if packet.is_single(codes::NACK) => return Err(Error::Nack),
                Ok(packet) => self.packets.push_back(packet),
            }
        }
        Ok(())
    }

    async fn wait_packet(&mut self, what: &'static str) -> Result<Packet, Error> {
        let deadline = Instant::now() + DEFAULT_TIMEOUT;
        loop {
            if let Some(packet) = self.packets.pop_front() {
                return Ok(packet);
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout(what));
            }
            self.pump().await?;
        }
    }

    async fn wait_single(&mut self, code: u8, what: &'static str) -> Result<(), Error> {
        let packet = self.wait_packet(what).await?;
        if packet.is_single(code) {
            Ok(())
        } else {
            Err(Error::UnexpectedPacket {
                expected: code,
                got: packet,
            })
        }
    }

    /// Stream the sync sequence until the bootloader reports it observed.
    async fn sync(&mut self) -> Result<(), Error> {
        let deadline = Instant::now() + DEFAULT_TIMEOUT;
        loop {
            self.serial.write_all(&consts::SYNC_SEQ).await?;
            self.serial.flush().await?;

            let settle = Instant::now() + SYNC_RETRY_DELAY;
            while Instant::now() < settle {
                self.pump().await?;
                if let Some(packet) = self.packets.pop_front() {
                    return if packet.is_single(codes::SYNC_OBSERVED) {
                        Ok(())
                    } else {
                        Err(Error::UnexpectedPacket {
                            expected: codes::SYNC_OBSERVED,
                            got: packet,
                        })
                    };
                }
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout("sync observed"));
            }
        }
    }
}

async fn update(mut link: Link, image: Vec<u8>) -> Result<(), Error> {
    let device_id = *image
        .get(consts::FWINFO_OFFSET as usize + 4)
        .ok_or(Error::ImageTooShort)?;
    let length = image.len() as u32;

    info!("syncing with the bootloader");
    link.sync().await?;
    info!("synced");

    link.write_packet(&Packet::single(codes::FW_UPDATE_REQ)).await?;
    link.wait_single(codes::FW_UPDATE_RES, "update acceptance").await?;
    info!("update session accepted");

    link.wait_single(codes::DEVICE_ID_REQ, "device id request").await?;
    link.write_packet(&Packet::new(2, &[codes::DEVICE_ID_RES, device_id])).await?;
    info!("sent device id 0x{device_id:02x}");

    link.wait_single(codes::FW_LENGTH_REQ, "length request").await?;
    let mut payload = [0u8; 5];
    payload[0] = codes::FW_LENGTH_RES;
    payload[1..5].copy_from_slice(&length.to_le_bytes());
    link.write_packet(&Packet::new(5, &payload)).await?;
    info!("sent image length ({length} bytes)");

    let mut sent = 0usize;
    for chunk in image.chunks(PACKET_DATA_LENGTH) {
        link.wait_single(codes::READY_FOR_DATA, "ready for data").await?;
        let packet = Packet::firmware_chunk(chunk).expect("chunks are 1..=16 bytes");
        link.write_packet(&packet).await?;
        sent += chunk.len();
        info!("wrote {} bytes ({sent}/{length})", chunk.len());
    }

    link.wait_single(codes::UPDATE_SUCCESSFUL, "update confirmation").await?;
    info!("firmware update complete");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    pretty_env_logger::init();
    let args = Args::parse();

    if args.list_ports {
        match tokio_serial::available_ports() {
            Ok(ports) => {
                println!("Available serial ports:");
                for port in ports {
                    println!("- {}", port.port_name);
                }
                return ExitCode::SUCCESS;
            }
            Err(e) => {
                error!("listing ports: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    let Some(image_path) = args.image else {
        error!("no image given; nothing to do");
        return ExitCode::FAILURE;
    };

    let result: Result<(), Error> = async {
        let image = tokio::fs::read(&image_path).await?;
        info!("read {} ({} bytes)", image_path.display(), image.len());
        let serial = tokio_serial::new(&args.port, args.baudrate).open_native_async()?;
        update(Link::new(serial), image).await
    }
    .await;

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
