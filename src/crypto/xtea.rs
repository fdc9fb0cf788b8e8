//! Triple XTEA, plain and chained
//!
//! The round function mixes `sum` into the key schedule a little
//! differently from reference XTEA; it is reproduced here as the portal
//! computes it. Blocks are two big-endian words.

use super::{CipherError, check_blocks, strip_zeros, zero_pad};

const BLOCK: usize = 8;
const DELTA: u32 = 0x9E37_79B9;
const ROUNDS: u32 = 32;

type Key = [u32; 4];

const KEYS: [Key; 3] = [
    [0x7a7a676a, 0x277e4a73, 0x3e43296c, 0x577d7d7a],
    [0x3d3c695f, 0x71797a74, 0x445f5763, 0x6f692765],
    [0x5b5a683d, 0x2e572a77, 0x4a474465, 0x663d7e5c],
];

const CHAINED_KEYS: [Key; 3] = [
    [0x796d7855, 0x297b2355, 0x587d726e, 0x4d3d4423],
    [0x7c70525d, 0x5a585d3d, 0x413e4029, 0x28755d6a],
    [0x425e5f6e, 0x46754e24, 0x507b233d, 0x2d644641],
];
const CHAINED_IV: [u32; 2] = [0x544c2f3f, 0x6f485121];

fn mix(v: u32, sum: u32, k: u32) -> u32 {
    (v ^ sum)
        .wrapping_add(k)
        .wrapping_add((v << 4) ^ (v >> 5))
}

fn encipher([mut v0, mut v1]: [u32; 2], key: &Key) -> [u32; 2] {
    let mut sum: u32 = 0;
    for _ in 0..ROUNDS {
        v0 = v0.wrapping_add(mix(v1, sum, key[(sum & 3) as usize]));
        sum = sum.wrapping_add(DELTA);
        v1 = v1.wrapping_add(mix(v0, sum, key[((sum >> 11) & 3) as usize]));
    }
    [v0, v1]
}

fn decipher([mut v0, mut v1]: [u32; 2], key: &Key) -> [u32; 2] {
    let mut sum = DELTA.wrapping_mul(ROUNDS);
    for _ in 0..ROUNDS {
        v1 = v1.wrapping_sub(mix(v0, sum, key[((sum >> 11) & 3) as usize]));
        sum = sum.wrapping_sub(DELTA);
        v0 = v0.wrapping_sub(mix(v1, sum, key[(sum & 3) as usize]));
    }
    [v0, v1]
}

fn read_block(chunk: &[u8]) -> [u32; 2] {
    let (hi, lo) = chunk.split_at(4);
    [
        u32::from_be_bytes([hi[0], hi[1], hi[2], hi[3]]),
        u32::from_be_bytes([lo[0], lo[1], lo[2], lo[3]]),
    ]
}

fn write_block(chunk: &mut [u8], [v0, v1]: [u32; 2]) {
    chunk[..4].copy_from_slice(&v0.to_be_bytes());
    chunk[4..].copy_from_slice(&v1.to_be_bytes());
}

pub(super) fn encrypt(plaintext: &[u8]) -> Vec<u8> {
    let mut data = zero_pad(plaintext, BLOCK);
    for chunk in data.chunks_exact_mut(BLOCK) {
        let block = KEYS
            .iter()
            .fold(read_block(chunk), |block, key| encipher(block, key));
        write_block(chunk, block);
    }
    data
}

pub(super) fn decrypt(mut ciphertext: Vec<u8>) -> Result<Vec<u8>, CipherError> {
    check_blocks(&ciphertext, BLOCK)?;
    for chunk in ciphertext.chunks_exact_mut(BLOCK) {
        let block = KEYS
            .iter()
            .rev()
            .fold(read_block(chunk), |block, key| decipher(block, key));
        write_block(chunk, block);
    }
    Ok(strip_zeros(ciphertext))
}

/// Each block is XORed with the previous ciphertext block (the IV for the
/// first) and then run through the keys in reverse order.
pub(super) fn chained_encrypt(plaintext: &[u8]) -> Vec<u8> {
    let mut data = zero_pad(plaintext, BLOCK);
    let mut register = CHAINED_IV;
    for chunk in data.chunks_exact_mut(BLOCK) {
        let [v0, v1] = read_block(chunk);
        let block = CHAINED_KEYS
            .iter()
            .rev()
            .fold([v0 ^ register[0], v1 ^ register[1]], |block, key| {
                encipher(block, key)
            });
        write_block(chunk, block);
        register = block;
    }
    data
}

pub(super) fn chained_decrypt(mut ciphertext: Vec<u8>) -> Result<Vec<u8>, CipherError> {
    check_blocks(&ciphertext, BLOCK)?;
    let mut register = CHAINED_IV;
    for chunk in ciphertext.chunks_exact_mut(BLOCK) {
        let current = read_block(chunk);
        let [v0, v1] = CHAINED_KEYS
            .iter()
            .fold(current, |block, key| decipher(block, key));
        write_block(chunk, [v0 ^ register[0], v1 ^ register[1]]);
        register = current;
    }
    Ok(strip_zeros(ciphertext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decipher_inverts_encipher() {
        let blocks = [[0, 0], [0xFFFF_FFFF, 1], [0x0123_4567, 0x89AB_CDEF]];
        for block in blocks {
            for key in KEYS.iter().chain(CHAINED_KEYS.iter()) {
                assert_eq!(decipher(encipher(block, key), key), block);
            }
        }
    }

    #[test]
    fn test_round_function_is_not_identity() {
        let block = [0x6865_6c6c, 0x6f00_0000];
        assert_ne!(encipher(block, &KEYS[0]), block);
        assert_ne!(encipher(block, &KEYS[0]), encipher(block, &KEYS[1]));
    }

    #[test]
    fn test_chained_first_block_uses_iv() {
        let plaintext = [0u8; 8];
        let expected = CHAINED_KEYS
            .iter()
            .rev()
            .fold(CHAINED_IV, |block, key| encipher(block, key));

        let mut encoded = [0u8; 8];
        write_block(&mut encoded, expected);
        assert_eq!(chained_encrypt(&plaintext), encoded.to_vec());
    }
}
