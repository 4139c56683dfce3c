// SPDX-FileCopyrightText: 2026 The uart-bootloader Authors
// SPDX-License-Identifier: GPL-3.0-or-later

//! Raw CBC-MAC over AES-128.
//!
//! Chaining state starts at all-zero and every block is folded in as
//! `state = E(state XOR block)`. There is no IV randomization and no keyed
//! outer hash; the tag authenticates fixed-length firmware images under a
//! single device key, nothing more.

use crate::aes::{Aes128, BLOCK_SIZE};

/// Streaming CBC-MAC computation.
///
/// Arbitrary-length input is accepted through [`update`](CbcMac::update);
/// partial blocks are buffered until 16 bytes are available.
/// [`finalize`](CbcMac::finalize) applies the PKCS#7-style tail padding and
/// returns the tag.
pub struct CbcMac {
    cipher: Aes128,
    state: [u8; BLOCK_SIZE],
    pending: [u8; BLOCK_SIZE],
    pending_len: usize,
}

impl CbcMac {
    pub fn new(key: &[u8; BLOCK_SIZE]) -> Self {
        CbcMac {
            cipher: Aes128::new(key),
            state: [0; BLOCK_SIZE],
            pending: [0; BLOCK_SIZE],
            pending_len: 0,
        }
    }

    /// Fold `data` into the chaining state.
    pub fn update(&mut self, mut data: &[u8]) {
        if self.pending_len > 0 {
            let take = data.len().min(BLOCK_SIZE - self.pending_len);
            self.pending[self.pending_len..self.pending_len + take]
                .copy_from_slice(&data[..take]);
            self.pending_len += take;
            data = &data[take..];
            if self.pending_len == BLOCK_SIZE {
                let block = self.pending;
                self.absorb(&block);
                self.pending_len = 0;
            }
        }
        while data.len() >= BLOCK_SIZE {
            let block: [u8; BLOCK_SIZE] = data[..BLOCK_SIZE].try_into().unwrap();
            self.absorb(&block);
            data = &data[BLOCK_SIZE..];
        }
        if !data.is_empty() {
            self.pending[..data.len()].copy_from_slice(data);
            self.pending_len = data.len();
        }
    }

    /// Pad the tail and return the tag.
    ///
    /// Pad value = number of pad bytes (1..=16); an input that is an exact
    /// multiple of the block size gets one entire block of `0x10`.
    pub fn finalize(mut self) -> [u8; BLOCK_SIZE] {
        let pad = (BLOCK_SIZE - self.pending_len) as u8;
        for byte in self.pending[self.pending_len..].iter_mut() {
            *byte = pad;
        }
        let block = self.pending;
        self.absorb(&block);
        self.state
    }

    fn absorb(&mut self, block: &[u8; BLOCK_SIZE]) {
        for (state_byte, block_byte) in self.state.iter_mut().zip(block.iter()) {
            *state_byte ^= block_byte;
        }
        self.cipher.encrypt_block(&mut self.state);
    }
}
