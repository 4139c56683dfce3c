// SPDX-FileCopyrightText: 2026 The uart-bootloader Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Signs application images for the bootloader.
//!
//! `sign` patches the version and length fields of the `firmware_info`
//! block, computes the CBC-MAC tag and stores it in the signature block.
//! `verify` recomputes the tag the way the bootloader does, and `dump`
//! prints the header of an image.

use std::fmt;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use fwsig::{read_info, sign_image, verify_image, StaticKey, VerificationResult};

#[derive(Debug, Parser)]
#[command(name = "fw-signer", about = "Sign and inspect bootloader application images")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Patch firmware_info and store the image signature.
    Sign {
        /// Unsigned application image.
        input: PathBuf,
        /// Where to write the signed image.
        #[arg(short, long)]
        output: PathBuf,
        /// Version number, hex (e.g. 0x010203).
        #[arg(short, long)]
        version: String,
        /// 16-byte signing key, 32 hex characters.
        #[arg(short, long)]
        key: String,
        /// The input is a whole-flash image; skip the bootloader region.
        #[arg(long)]
        with_bootloader: bool,
    },
    /// Check an image signature the way the bootloader does.
    Verify {
        /// Signed application image.
        input: PathBuf,
        /// 16-byte signing key, 32 hex characters.
        #[arg(short, long)]
        key: String,
        /// Device id the image must be built for.
        #[arg(short, long, default_value_t = consts::DEVICE_ID as u32)]
        device_id: u32,
    },
    /// Print the firmware_info header of an image.
    Dump {
        /// Application image.
        input: PathBuf,
    },
}

#[derive(Debug)]
enum Error {
    ReadInput(std::io::Error),
    WriteOutput(std::io::Error),
    BadKey,
    BadVersion,
    Image(fwsig::Error),
    SignatureInvalid,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ReadInput(e) => write!(f, "reading input image: {e}"),
            Error::WriteOutput(e) => write!(f, "writing output image: {e}"),
            Error::BadKey => write!(f, "key must be exactly 32 hex characters"),
            Error::BadVersion => write!(f, "version must be a hex number, e.g. 0x010203"),
            Error::Image(e) => write!(f, "{e}"),
            Error::SignatureInvalid => write!(f, "signature does not match the image"),
        }
    }
}

impl From<fwsig::Error> for Error {
    fn from(e: fwsig::Error) -> Self {
        Error::Image(e)
    }
}

fn main() -> ExitCode {
    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Error> {
    match args.command {
        Command::Sign {
            input,
            output,
            version,
            key,
            with_bootloader,
        } => {
            let key = parse_key(&key)?;
            let version = parse_version(&version)?;
            let raw = std::fs::read(&input).map_err(Error::ReadInput)?;
            let skip = if with_bootloader {
                consts::BOOTLOADER_SIZE as usize
            } else {
                0
            };
            let mut image = raw.get(skip..).ok_or(fwsig::Error::ImageTooShort)?.to_vec();

            let tag = sign_image(&mut image, consts::FWINFO_OFFSET as usize, version, &key)?;
            std::fs::write(&output, &image).map_err(Error::WriteOutput)?;

            println!("signed {} ({} bytes)", output.display(), image.len());
            println!("version   = 0x{version:08x}");
            println!("signature = {}", hex::encode(tag));
            Ok(())
        }
        Command::Verify {
            input,
            key,
            device_id,
        } => {
            let key = parse_key(&key)?;
            let image = std::fs::read(&input).map_err(Error::ReadInput)?;
            match verify_image(&image, consts::FWINFO_OFFSET as usize, device_id, &key) {
                VerificationResult::Valid => {
                    println!("signature valid");
                    Ok(())
                }
                VerificationResult::Invalid => Err(Error::SignatureInvalid),
            }
        }
        Command::Dump { input } => {
            let image = std::fs::read(&input).map_err(Error::ReadInput)?;
            let info = read_info(&image, consts::FWINFO_OFFSET as usize)?;
            println!("sentinel  = 0x{:08x}{}", info.sentinel, if info.is_present() { "" } else { " (missing!)" });
            println!("device id = 0x{:08x}", info.device_id);
            println!("version   = 0x{:08x}", info.version);
            println!("length    = {} bytes", info.length);
            Ok(())
        }
    }
}

fn parse_key(key: &str) -> Result<StaticKey, Error> {
    let bytes = hex::decode(key).map_err(|_| Error::BadKey)?;
    let key: [u8; 16] = bytes.try_into().map_err(|_| Error::BadKey)?;
    Ok(StaticKey(key))
}

fn parse_version(version: &str) -> Result<u32, Error> {
    let digits = version.trim_start_matches("0x");
    u32::from_str_radix(digits, 16).map_err(|_| Error::BadVersion)
}
