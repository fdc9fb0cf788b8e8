//! Double AES-128 (CBC and ECB)

use super::{CipherError, check_blocks, mode, strip_zeros, zero_pad};
use aes::Aes128;
use cipher::KeyInit;
use cipher::generic_array::GenericArray;

const BLOCK: usize = 16;

const CBC_KEY1: [u8; 16] = [
    0x55, 0x48, 0x5B, 0x7A, 0x7C, 0x6D, 0x3E, 0x2A, 0x6C, 0x56, 0x4D, 0x2D, 0x22, 0x67, 0x56, 0x4D,
];
const CBC_KEY2: [u8; 16] = [
    0x4E, 0x25, 0x53, 0x71, 0x5F, 0x7A, 0x5A, 0x5C, 0x60, 0x45, 0x63, 0x48, 0x66, 0x24, 0x65, 0x50,
];
const CBC_IV: [u8; 16] = [
    0x54, 0x67, 0x70, 0x75, 0x60, 0x73, 0x5A, 0x5C, 0x69, 0x40, 0x42, 0x66, 0x73, 0x5A, 0x7D, 0x5E,
];

const ECB_KEY1: [u8; 16] = [
    0x3A, 0x71, 0x7C, 0x4C, 0x51, 0x4F, 0x3C, 0x6A, 0x2E, 0x43, 0x7A, 0x43, 0x3B, 0x56, 0x57, 0x59,
];
const ECB_KEY2: [u8; 16] = [
    0x72, 0x6E, 0x25, 0x41, 0x45, 0x2F, 0x41, 0x54, 0x27, 0x4B, 0x3B, 0x3B, 0x59, 0x25, 0x52, 0x24,
];

fn aes128(key: [u8; 16]) -> Aes128 {
    Aes128::new(&GenericArray::from(key))
}

/// Inner CBC layer, then the IV is prepended and the whole thing goes
/// through the outer layer, and the IV is prepended once more.
pub(super) fn cbc_encrypt(plaintext: &[u8]) -> Vec<u8> {
    let mut inner = zero_pad(plaintext, BLOCK);
    mode::cbc_encrypt(&aes128(CBC_KEY1), &CBC_IV, &mut inner);

    let mut outer = Vec::with_capacity(inner.len() + 2 * BLOCK);
    outer.extend_from_slice(&CBC_IV);
    outer.extend_from_slice(&inner);
    mode::cbc_encrypt(&aes128(CBC_KEY2), &CBC_IV, &mut outer);

    let mut output = Vec::with_capacity(outer.len() + BLOCK);
    output.extend_from_slice(&CBC_IV);
    output.extend_from_slice(&outer);
    output
}

pub(super) fn cbc_decrypt(ciphertext: Vec<u8>) -> Result<Vec<u8>, CipherError> {
    let mut outer = strip_block(ciphertext)?;
    check_blocks(&outer, BLOCK)?;
    mode::cbc_decrypt(&aes128(CBC_KEY2), &CBC_IV, &mut outer);

    let mut inner = strip_block(outer)?;
    mode::cbc_decrypt(&aes128(CBC_KEY1), &CBC_IV, &mut inner);

    Ok(strip_zeros(inner))
}

/// Drop the leading IV block
fn strip_block(mut data: Vec<u8>) -> Result<Vec<u8>, CipherError> {
    if data.len() < BLOCK {
        return Err(CipherError::InvalidLength {
            len: data.len(),
            block: BLOCK,
        });
    }
    data.drain(..BLOCK);
    Ok(data)
}

pub(super) fn ecb_encrypt(plaintext: &[u8]) -> Vec<u8> {
    let mut data = zero_pad(plaintext, BLOCK);
    mode::ecb_encrypt(&aes128(ECB_KEY1), &mut data);
    mode::ecb_encrypt(&aes128(ECB_KEY2), &mut data);
    data
}

pub(super) fn ecb_decrypt(mut ciphertext: Vec<u8>) -> Result<Vec<u8>, CipherError> {
    check_blocks(&ciphertext, BLOCK)?;
    mode::ecb_decrypt(&aes128(ECB_KEY2), &mut ciphertext);
    mode::ecb_decrypt(&aes128(ECB_KEY1), &mut ciphertext);
    Ok(strip_zeros(ciphertext))
}
