//! ECB and CBC over any RustCrypto block cipher
//!
//! Callers check that `data` is a whole number of blocks first.

use cipher::generic_array::GenericArray;
use cipher::{BlockDecrypt, BlockEncrypt};

pub(super) fn ecb_encrypt<C: BlockEncrypt>(cipher: &C, data: &mut [u8]) {
    for chunk in data.chunks_exact_mut(C::block_size()) {
        cipher.encrypt_block(GenericArray::from_mut_slice(chunk));
    }
}

pub(super) fn ecb_decrypt<C: BlockDecrypt>(cipher: &C, data: &mut [u8]) {
    for chunk in data.chunks_exact_mut(C::block_size()) {
        cipher.decrypt_block(GenericArray::from_mut_slice(chunk));
    }
}

pub(super) fn cbc_encrypt<C: BlockEncrypt>(cipher: &C, iv: &[u8], data: &mut [u8]) {
    let mut previous = iv.to_vec();
    for chunk in data.chunks_exact_mut(C::block_size()) {
        xor_in_place(chunk, &previous);
        cipher.encrypt_block(GenericArray::from_mut_slice(chunk));
        previous.copy_from_slice(chunk);
    }
}

pub(super) fn cbc_decrypt<C: BlockDecrypt>(cipher: &C, iv: &[u8], data: &mut [u8]) {
    let mut previous = iv.to_vec();
    for chunk in data.chunks_exact_mut(C::block_size()) {
        let current = chunk.to_vec();
        cipher.decrypt_block(GenericArray::from_mut_slice(chunk));
        xor_in_place(chunk, &previous);
        previous = current;
    }
}

fn xor_in_place(block: &mut [u8], mask: &[u8]) {
    for (b, m) in block.iter_mut().zip(mask) {
        *b ^= m;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aes::Aes128;
    use cipher::KeyInit;

    // FIPS-197 appendix C.1
    #[test]
    fn test_ecb_matches_fips_vector() {
        let key: Vec<u8> = (0u8..16).collect();
        let cipher = Aes128::new(GenericArray::from_slice(&key));
        let mut block = hex::decode("00112233445566778899aabbccddeeff").unwrap();

        ecb_encrypt(&cipher, &mut block);
        assert_eq!(hex::encode(&block), "69c4e0d86a7b0430d8cdb78070b4c55a");

        ecb_decrypt(&cipher, &mut block);
        assert_eq!(hex::encode(&block), "00112233445566778899aabbccddeeff");
    }

    // NIST SP 800-38A F.2.1, first two blocks
    #[test]
    fn test_cbc_matches_nist_vector() {
        let key = hex::decode("2b7e151628aed2a6abf7158809cf4f3c").unwrap();
        let iv = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap();
        let cipher = Aes128::new(GenericArray::from_slice(&key));
        let mut data = hex::decode(
            "6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51",
        )
        .unwrap();

        cbc_encrypt(&cipher, &iv, &mut data);
        assert_eq!(
            hex::encode(&data),
            "7649abac8119b246cee98e9b12e9197d5086cb9b507219ee95db113a917678b2"
        );

        cbc_decrypt(&cipher, &iv, &mut data);
        assert_eq!(
            hex::encode(&data),
            "6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e51"
        );
    }
}
