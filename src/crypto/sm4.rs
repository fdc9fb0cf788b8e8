use super::{CipherError, check_blocks, mode, pkcs7_pad, pkcs7_unpad};
use cipher::KeyInit;
use cipher::generic_array::GenericArray;
use sm4::Sm4;

const BLOCK: usize = 16;

const CBC_KEY: [u8; 16] = [
    0x28, 0x2f, 0x29, 0x25, 0x6f, 0x3c, 0x75, 0x48, 0x6d, 0x4c, 0x2e, 0x51, 0x55, 0x27, 0x22, 0x2d,
];
const CBC_IV: [u8; 16] = [
    0x68, 0x3c, 0x42, 0x51, 0x5a, 0x46, 0x3a, 0x52, 0x67, 0x77, 0x7e, 0x6e, 0x69, 0x70, 0x48, 0x5e,
];
const ECB_KEY: [u8; 16] = [
    0x53, 0x2f, 0x79, 0x4a, 0x4e, 0x79, 0x74, 0x4d, 0x67, 0x66, 0x57, 0x5a, 0x2d, 0x44, 0x5c, 0x57,
];

fn block_cipher(key: [u8; 16]) -> Sm4 {
    Sm4::new(&GenericArray::from(key))
}

pub(super) fn cbc_encrypt(plaintext: &[u8]) -> Vec<u8> {
    let mut data = pkcs7_pad(plaintext, BLOCK);
    mode::cbc_encrypt(&block_cipher(CBC_KEY), &CBC_IV, &mut data);
    data
}

pub(super) fn cbc_decrypt(mut ciphertext: Vec<u8>) -> Result<Vec<u8>, CipherError> {
    check_blocks(&ciphertext, BLOCK)?;
    mode::cbc_decrypt(&block_cipher(CBC_KEY), &CBC_IV, &mut ciphertext);
    pkcs7_unpad(ciphertext, BLOCK)
}

pub(super) fn ecb_encrypt(plaintext: &[u8]) -> Vec<u8> {
    let mut data = pkcs7_pad(plaintext, BLOCK);
    mode::ecb_encrypt(&block_cipher(ECB_KEY), &mut data);
    data
}

pub(super) fn ecb_decrypt(mut ciphertext: Vec<u8>) -> Result<Vec<u8>, CipherError> {
    check_blocks(&ciphertext, BLOCK)?;
    mode::ecb_decrypt(&block_cipher(ECB_KEY), &mut ciphertext);
    pkcs7_unpad(ciphertext, BLOCK)
}
