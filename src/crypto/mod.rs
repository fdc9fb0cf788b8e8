//! Payload ciphers negotiated with the portal
//!
//! After algorithm negotiation the server names one of nine legacy
//! constructions, and every XML payload from then on travels through it.
//! The constructions are reproduced bit-for-bit, including their quirks:
//!
//! | Algorithm | Padding | Construction |
//! |-----------|---------|--------------|
//! | AES-CBC   | zero, 16 | CBC(key1) → prefix IV → CBC(key2) → prefix IV |
//! | AES-ECB   | zero, 16 | ECB(key1) → ECB(key2) |
//! | 3DES-CBC  | zero, 16 | CBC(key1) → CBC(key2), 8-byte blocks |
//! | 3DES-ECB  | zero, 16 | ECB(key1) → ECB(key2), 8-byte blocks |
//! | SM4-CBC   | PKCS#7, 16 | CBC |
//! | SM4-ECB   | PKCS#7, 16 | ECB |
//! | XTEA      | zero, 8 | key1 → key2 → key3 per block |
//! | XTEA-IV   | zero, 8 | chained, key3 → key2 → key1 per block |
//! | ZUC       | zero, 4 | ZUC-128 keystream XOR |
//!
//! Ciphertext goes on the wire as uppercase hex (the "envelope").
//!
//! The 3DES variants pad to 16 bytes even though their block size is 8.
//! Zero padding is removed by stripping every trailing NUL, so plaintext
//! that really ends in NUL bytes loses them. The server expects both.

mod aes;
mod des;
mod mode;
mod sm4;
mod xtea;
mod zuc;

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while decoding or decrypting an envelope
#[derive(Error, Debug)]
pub enum CipherError {
    #[error("Malformed hex envelope: {0}")]
    Decode(#[from] hex::FromHexError),

    #[error("Invalid ciphertext length {len} for block size {block}")]
    InvalidLength { len: usize, block: usize },

    #[error("Invalid padding")]
    InvalidPadding,

    #[error("Unsupported algorithm id: {0}")]
    UnsupportedAlgorithm(String),
}

/// Algorithm id sent before the server has assigned one
pub const PLACEHOLDER_ALGORITHM_ID: &str = "00000000-0000-0000-0000-000000000000";

/// One of the nine cipher constructions the portal can assign
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Algorithm {
    AesCbc,
    AesEcb,
    DesEdeCbc,
    DesEdeEcb,
    Zuc,
    Sm4Cbc,
    Sm4Ecb,
    Xtea,
    XteaIv,
}

impl Algorithm {
    pub const ALL: [Algorithm; 9] = [
        Algorithm::AesCbc,
        Algorithm::AesEcb,
        Algorithm::DesEdeCbc,
        Algorithm::DesEdeEcb,
        Algorithm::Zuc,
        Algorithm::Sm4Cbc,
        Algorithm::Sm4Ecb,
        Algorithm::Xtea,
        Algorithm::XteaIv,
    ];

    /// Identifier the server uses for this algorithm
    pub fn id(self) -> &'static str {
        match self {
            Algorithm::AesCbc => "CAFBCBAD-B6E7-4CAB-8A67-14D39F00CE1E",
            Algorithm::AesEcb => "A474B1C2-3DE0-4EA2-8C5F-7093409CE6C4",
            Algorithm::DesEdeCbc => "5BFBA864-BBA9-42DB-8EAD-49B5F412BD81",
            Algorithm::DesEdeEcb => "6E0B65FF-0B5B-459C-8FCE-EC7F2BEA9FF5",
            Algorithm::Zuc => "B809531F-0007-4B5B-923B-4BD560398113",
            Algorithm::Sm4Cbc => "F3974434-C0DD-4C20-9E87-DDB6814A1C48",
            Algorithm::Sm4Ecb => "ED382482-F72C-4C41-A76D-28EEA0F1F2AF",
            Algorithm::Xtea => "B3047D4E-67DF-4864-A6A5-DF9B9E525C79",
            Algorithm::XteaIv => "C32C68F9-CA81-4260-A329-BBAFD1A9CCD1",
        }
    }

    /// Encrypt a payload into its wire envelope
    pub fn encrypt(self, plaintext: &[u8]) -> String {
        let ciphertext = match self {
            Algorithm::AesCbc => aes::cbc_encrypt(plaintext),
            Algorithm::AesEcb => aes::ecb_encrypt(plaintext),
            Algorithm::DesEdeCbc => des::cbc_encrypt(plaintext),
            Algorithm::DesEdeEcb => des::ecb_encrypt(plaintext),
            Algorithm::Zuc => zuc::encrypt(plaintext),
            Algorithm::Sm4Cbc => sm4::cbc_encrypt(plaintext),
            Algorithm::Sm4Ecb => sm4::ecb_encrypt(plaintext),
            Algorithm::Xtea => xtea::encrypt(plaintext),
            Algorithm::XteaIv => xtea::chained_encrypt(plaintext),
        };
        encode_envelope(&ciphertext)
    }

    /// Decrypt a wire envelope back into the payload
    pub fn decrypt(self, envelope: &[u8]) -> Result<Vec<u8>, CipherError> {
        let ciphertext = decode_envelope(envelope)?;
        match self {
            Algorithm::AesCbc => aes::cbc_decrypt(ciphertext),
            Algorithm::AesEcb => aes::ecb_decrypt(ciphertext),
            Algorithm::DesEdeCbc => des::cbc_decrypt(ciphertext),
            Algorithm::DesEdeEcb => des::ecb_decrypt(ciphertext),
            Algorithm::Zuc => Ok(zuc::decrypt(ciphertext)),
            Algorithm::Sm4Cbc => sm4::cbc_decrypt(ciphertext),
            Algorithm::Sm4Ecb => sm4::ecb_decrypt(ciphertext),
            Algorithm::Xtea => xtea::decrypt(ciphertext),
            Algorithm::XteaIv => xtea::chained_decrypt(ciphertext),
        }
    }
}

impl FromStr for Algorithm {
    type Err = CipherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Algorithm::ALL
            .into_iter()
            .find(|algorithm| algorithm.id() == s)
            .ok_or_else(|| CipherError::UnsupportedAlgorithm(s.to_string()))
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::AesCbc => "AES-CBC",
            Algorithm::AesEcb => "AES-ECB",
            Algorithm::DesEdeCbc => "3DES-CBC",
            Algorithm::DesEdeEcb => "3DES-ECB",
            Algorithm::Zuc => "ZUC",
            Algorithm::Sm4Cbc => "SM4-CBC",
            Algorithm::Sm4Ecb => "SM4-ECB",
            Algorithm::Xtea => "XTEA",
            Algorithm::XteaIv => "XTEA-IV",
        };
        f.write_str(name)
    }
}

/// Resolve a server-assigned algorithm id
pub fn lookup(id: &str) -> Result<Algorithm, CipherError> {
    id.parse()
}

/// Uppercase hex, the only form the portal sends or accepts
pub fn encode_envelope(ciphertext: &[u8]) -> String {
    hex::encode_upper(ciphertext)
}

/// Hex decoding, either case
pub fn decode_envelope(envelope: &[u8]) -> Result<Vec<u8>, CipherError> {
    Ok(hex::decode(envelope)?)
}

fn zero_pad(data: &[u8], block: usize) -> Vec<u8> {
    let mut padded = data.to_vec();
    let remainder = data.len() % block;
    if remainder != 0 {
        padded.resize(data.len() + block - remainder, 0);
    }
    padded
}

fn strip_zeros(mut data: Vec<u8>) -> Vec<u8> {
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    data.truncate(end);
    data
}

fn pkcs7_pad(data: &[u8], block: usize) -> Vec<u8> {
    let padding = block - data.len() % block;
    let mut padded = Vec::with_capacity(data.len() + padding);
    padded.extend_from_slice(data);
    padded.resize(data.len() + padding, padding as u8);
    padded
}

// Only the final byte is checked.
fn pkcs7_unpad(mut data: Vec<u8>, block: usize) -> Result<Vec<u8>, CipherError> {
    let padding = *data.last().ok_or(CipherError::InvalidPadding)? as usize;
    if padding == 0 || padding > block || padding > data.len() {
        return Err(CipherError::InvalidPadding);
    }
    data.truncate(data.len() - padding);
    Ok(data)
}

fn check_blocks(data: &[u8], block: usize) -> Result<(), CipherError> {
    if data.len() % block != 0 {
        return Err(CipherError::InvalidLength {
            len: data.len(),
            block,
        });
    }
    Ok(())
}
