//! Double 3DES-EDE (CBC and ECB)
//!
//! Blocks are 8 bytes but plaintext is zero-padded to 16.

use super::{CipherError, check_blocks, mode, strip_zeros, zero_pad};
use cipher::KeyInit;
use cipher::generic_array::GenericArray;
use des::TdesEde3;

const BLOCK: usize = 8;
const PAD_TO: usize = 16;

const CBC_KEY1: [u8; 24] = [
    0x5E, 0x67, 0x72, 0x79, 0x28, 0x50, 0x47, 0x75, 0x6D, 0x48, 0x63, 0x74, 0x5D, 0x29, 0x21, 0x3C,
    0x7E, 0x6B, 0x56, 0x29, 0x4F, 0x21, 0x52, 0x40,
];
const CBC_KEY2: [u8; 24] = [
    0x63, 0x73, 0x63, 0x26, 0x72, 0x5C, 0x5E, 0x73, 0x6B, 0x60, 0x74, 0x51, 0x7B, 0x74, 0x76, 0x7D,
    0x3F, 0x59, 0x2E, 0x6D, 0x6F, 0x64, 0x3E, 0x69,
];
const CBC_IV: [u8; 8] = [0x77, 0x2D, 0x56, 0x51, 0x28, 0x49, 0x7E, 0x57];

const ECB_KEY1: [u8; 24] = [
    0x25, 0x6A, 0x63, 0x5A, 0x46, 0x3F, 0x26, 0x64, 0x53, 0x7A, 0x2E, 0x5B, 0x24, 0x4C, 0x62, 0x67,
    0x2B, 0x2D, 0x67, 0x68, 0x43, 0x74, 0x69, 0x51,
];
const ECB_KEY2: [u8; 24] = [
    0x59, 0x28, 0x5B, 0x7E, 0x7D, 0x26, 0x74, 0x49, 0x48, 0x76, 0x59, 0x58, 0x62, 0x75, 0x51, 0x55,
    0x26, 0x73, 0x55, 0x5C, 0x67, 0x52, 0x2E, 0x6C,
];

fn tdes(key: [u8; 24]) -> TdesEde3 {
    TdesEde3::new(&GenericArray::from(key))
}

pub(super) fn cbc_encrypt(plaintext: &[u8]) -> Vec<u8> {
    let mut data = zero_pad(plaintext, PAD_TO);
    mode::cbc_encrypt(&tdes(CBC_KEY1), &CBC_IV, &mut data);
    mode::cbc_encrypt(&tdes(CBC_KEY2), &CBC_IV, &mut data);
    data
}

pub(super) fn cbc_decrypt(mut ciphertext: Vec<u8>) -> Result<Vec<u8>, CipherError> {
    check_blocks(&ciphertext, BLOCK)?;
    mode::cbc_decrypt(&tdes(CBC_KEY2), &CBC_IV, &mut ciphertext);
    mode::cbc_decrypt(&tdes(CBC_KEY1), &CBC_IV, &mut ciphertext);
    Ok(strip_zeros(ciphertext))
}

pub(super) fn ecb_encrypt(plaintext: &[u8]) -> Vec<u8> {
    let mut data = zero_pad(plaintext, PAD_TO);
    mode::ecb_encrypt(&tdes(ECB_KEY1), &mut data);
    mode::ecb_encrypt(&tdes(ECB_KEY2), &mut data);
    data
}

pub(super) fn ecb_decrypt(mut ciphertext: Vec<u8>) -> Result<Vec<u8>, CipherError> {
    check_blocks(&ciphertext, BLOCK)?;
    mode::ecb_decrypt(&tdes(ECB_KEY2), &mut ciphertext);
    mode::ecb_decrypt(&tdes(ECB_KEY1), &mut ciphertext);
    Ok(strip_zeros(ciphertext))
}
