// SPDX-FileCopyrightText: 2026 The uart-bootloader Authors
// SPDX-License-Identifier: GPL-3.0-or-later

use super::*;
use crate::aes::Aes128;

const KEY: StaticKey = StaticKey([
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E,
    0x0F,
]);

const FWINFO_OFFSET: usize = 0x40;
const DEVICE_ID: u32 = 0x42;

/// A minimal image: fake vector table, header at `FWINFO_OFFSET`, zeroed
/// signature block, then a body pattern.
fn sample_image<const N: usize>() -> [u8; N] {
    let mut image = [0u8; N];
    for (i, byte) in image.iter_mut().enumerate().take(FWINFO_OFFSET) {
        *byte = i as u8;
    }
    let info = FirmwareInfo {
        sentinel: SENTINEL,
        device_id: DEVICE_ID,
        version: 0,
        length: 0,
    };
    image[FWINFO_OFFSET..FWINFO_OFFSET + FirmwareInfo::SIZE].copy_from_slice(&info.to_bytes());
    for (i, byte) in image.iter_mut().enumerate().skip(FWINFO_OFFSET + 32) {
        *byte = (i * 7) as u8;
    }
    image
}

#[test]
fn aes128_fips197_block_vector() {
    // FIPS-197 appendix C.1.
    let cipher = Aes128::new(&KEY.0);
    let mut block = [
        0x00, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66, 0x77, 0x88, 0x99, 0xAA, 0xBB, 0xCC, 0xDD,
        0xEE, 0xFF,
    ];
    cipher.encrypt_block(&mut block);
    assert_eq!(
        block,
        [
            0x69, 0xC4, 0xE0, 0xD8, 0x6A, 0x7B, 0x04, 0x30, 0xD8, 0xCD, 0xB7, 0x80, 0x70, 0xB4,
            0xC5, 0x5A,
        ]
    );
}

#[test]
fn aes128_all_zero_block() {
    let cipher = Aes128::new(&KEY.0);
    let mut block = [0u8; 16];
    cipher.encrypt_block(&mut block);
    assert_eq!(
        block,
        [
            0xC6, 0xA1, 0x3B, 0x37, 0x87, 0x8F, 0x5B, 0x82, 0x6F, 0x4F, 0x81, 0x62, 0xA1, 0xC8,
            0xD8, 0x79,
        ]
    );
}

#[test]
fn cbc_mac_empty_message_is_one_pad_block() {
    // openssl enc -aes-128-cbc on the empty message: the tag is the
    // encryption of a single block of 0x10 bytes.
    let mac = mac::CbcMac::new(&KEY.0);
    assert_eq!(
        mac.finalize(),
        [
            0x95, 0x4F, 0x64, 0xF2, 0xE4, 0xE8, 0x6E, 0x9E, 0xEE, 0x82, 0xD2, 0x02, 0x16, 0x68,
            0x48, 0x99,
        ]
    );
}

#[test]
fn cbc_mac_partial_tail_padding() {
    // 20-byte message 00..13, pad value 0x0C; reference tag from openssl.
    let mut message = [0u8; 20];
    for (i, byte) in message.iter_mut().enumerate() {
        *byte = i as u8;
    }
    let mut mac = mac::CbcMac::new(&KEY.0);
    mac.update(&message);
    assert_eq!(
        mac.finalize(),
        [
            0x2F, 0x90, 0x82, 0xD8, 0xF9, 0x6C, 0x9D, 0x7B, 0xC6, 0x0F, 0x47, 0xE6, 0x23, 0x79,
            0xA4, 0xB3,
        ]
    );
}

#[test]
fn cbc_mac_exact_blocks_get_full_pad_block() {
    // 32 zero bytes: two message blocks plus one whole block of 0x10.
    let mut mac = mac::CbcMac::new(&KEY.0);
    mac.update(&[0u8; 32]);
    assert_eq!(
        mac.finalize(),
        [
            0x81, 0xF9, 0x3D, 0xE6, 0x17, 0xAC, 0xC4, 0x7F, 0x8C, 0xA9, 0x68, 0x24, 0x2C, 0xEE,
            0x1D, 0x99,
        ]
    );
}

#[test]
fn cbc_mac_split_updates_match_one_shot() {
    let mut message = [0u8; 61];
    for (i, byte) in message.iter_mut().enumerate() {
        *byte = (i * 13) as u8;
    }
    let mut one_shot = mac::CbcMac::new(&KEY.0);
    one_shot.update(&message);
    let mut split = mac::CbcMac::new(&KEY.0);
    split.update(&message[..7]);
    split.update(&message[7..40]);
    split.update(&message[40..]);
    assert_eq!(one_shot.finalize(), split.finalize());
}

#[test]
fn cbc_mac_avalanche() {
    let mut message = [0x5Au8; 48];
    let mut mac = mac::CbcMac::new(&KEY.0);
    mac.update(&message);
    let tag = mac.finalize();

    message[0] ^= 0x01;
    let mut mac = mac::CbcMac::new(&KEY.0);
    mac.update(&message);
    let flipped_tag = mac.finalize();

    assert_ne!(tag, flipped_tag);
    let differing = tag
        .iter()
        .zip(flipped_tag.iter())
        .filter(|(a, b)| a != b)
        .count();
    assert!(differing >= 4, "only {differing} tag bytes changed");
}

#[test]
fn sign_then_verify_round_trips() {
    let mut image: [u8; 0x140] = sample_image();
    let tag = sign_image(&mut image, FWINFO_OFFSET, 7, &KEY).unwrap();
    assert_eq!(
        &image[FWINFO_OFFSET + 16..FWINFO_OFFSET + 32],
        tag.as_slice()
    );

    let info = read_info(&image, FWINFO_OFFSET).unwrap();
    assert_eq!(info.version, 7);
    assert_eq!(info.length, image.len() as u32);

    assert_eq!(
        verify_image(&image, FWINFO_OFFSET, DEVICE_ID, &KEY),
        VerificationResult::Valid
    );
}

#[test]
fn signature_block_is_not_self_referential() {
    // Scribbling over the signature block before signing must not change
    // the tag: the two-block gap is excluded from the covered region.
    let mut image: [u8; 0x140] = sample_image();
    let tag = sign_image(&mut image, FWINFO_OFFSET, 1, &KEY).unwrap();

    let mut scribbled: [u8; 0x140] = sample_image();
    scribbled[FWINFO_OFFSET + 16..FWINFO_OFFSET + 32].fill(0xA5);
    let scribbled_tag = sign_image(&mut scribbled, FWINFO_OFFSET, 1, &KEY).unwrap();
    assert_eq!(tag, scribbled_tag);
}

#[test]
fn tampering_is_rejected() {
    let mut image: [u8; 0x140] = sample_image();
    sign_image(&mut image, FWINFO_OFFSET, 3, &KEY).unwrap();

    let mut body_flip = image;
    *body_flip.last_mut().unwrap() ^= 0x80;
    assert_eq!(
        verify_image(&body_flip, FWINFO_OFFSET, DEVICE_ID, &KEY),
        VerificationResult::Invalid
    );

    let mut sig_flip = image;
    sig_flip[FWINFO_OFFSET + 20] ^= 0x01;
    assert_eq!(
        verify_image(&sig_flip, FWINFO_OFFSET, DEVICE_ID, &KEY),
        VerificationResult::Invalid
    );

    let mut bad_sentinel = image;
    bad_sentinel[FWINFO_OFFSET] ^= 0xFF;
    assert_eq!(
        verify_image(&bad_sentinel, FWINFO_OFFSET, DEVICE_ID, &KEY),
        VerificationResult::Invalid
    );

    assert_eq!(
        verify_image(&image, FWINFO_OFFSET, DEVICE_ID + 1, &KEY),
        VerificationResult::Invalid
    );

    // Truncated slice: length field no longer matches.
    assert_eq!(
        verify_image(&image[..image.len() - 4], FWINFO_OFFSET, DEVICE_ID, &KEY),
        VerificationResult::Invalid
    );
}

#[test]
fn vector_table_bytes_are_covered() {
    let mut image: [u8; 0x140] = sample_image();
    sign_image(&mut image, FWINFO_OFFSET, 3, &KEY).unwrap();
    image[4] ^= 0x10;
    assert_eq!(
        verify_image(&image, FWINFO_OFFSET, DEVICE_ID, &KEY),
        VerificationResult::Invalid
    );
}

#[test]
fn signing_requires_a_header() {
    let mut image = [0u8; 0x140];
    assert_eq!(
        sign_image(&mut image, FWINFO_OFFSET, 1, &KEY),
        Err(Error::MissingSentinel)
    );
    let mut short = [0u8; 0x20];
    assert_eq!(
        sign_image(&mut short, FWINFO_OFFSET, 1, &KEY),
        Err(Error::ImageTooShort)
    );
}
