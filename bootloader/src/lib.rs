// SPDX-FileCopyrightText: 2026 The uart-bootloader Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Serial firmware-update bootloader core.
//!
//! The core is hardware-free: it talks to the outside world through the
//! blocking [`embedded_io`] traits for the serial link, the
//! [`embedded_storage`] NOR-flash traits for the application region, a
//! [`Clock`](platform::Clock) tick source for timeouts, and a
//! [`Boot`](platform::Boot) capability for the final jump or reset. One
//! [`BootSession`](session::BootSession) runs per power-up: it hunts for
//! the sync sequence, drives the update handshake, programs the received
//! image into flash, authenticates it with AES-128 CBC-MAC and returns a
//! [`BootDecision`](platform::BootDecision).

#![cfg_attr(not(test), no_std)]

pub mod auth;
pub mod flash;
pub mod platform;
pub mod ring;
pub mod session;
pub mod timer;
pub mod transport;

#[cfg(feature = "defmt")]
pub(crate) use defmt as log;

#[cfg(not(feature = "defmt"))]
pub(crate) mod log {
    macro_rules! info {
        ( $( $x:tt )* ) => {};
    }
    pub(crate) use info;
    macro_rules! warner {
        ( $( $x:tt )* ) => {};
    }
    pub(crate) use warner as warn;
}
