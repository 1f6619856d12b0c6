// BitBox HWW Driver
// Written in 2026 by
//   The bbhww developers
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the CC0 Public Domain Dedication
// along with this software.
// If not, see <http://creativecommons.org/publicdomain/zero/1.0/>.
//

//! # AES-256-CBC
//!
//! Used by the legacy device channel and by the mobile relay. Ciphertexts
//! are laid out as `iv || ciphertext`, with an HMAC-SHA256 tag appended in
//! the authenticated variant.
//!

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use miniscript::bitcoin::hashes::{sha256, Hash, HashEngine, Hmac, HmacEngine};
use rand::RngCore;

use crate::Error;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

const IV_LEN: usize = 16;
const MAC_LEN: usize = 32;

/// Encrypts with a fresh random IV, returning `iv || ciphertext`
pub fn encrypt(plaintext: &[u8], key: &[u8; 32]) -> Vec<u8> {
    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    encrypt_with_iv(plaintext, key, &iv)
}

fn encrypt_with_iv(plaintext: &[u8], key: &[u8; 32], iv: &[u8; IV_LEN]) -> Vec<u8> {
    let cipher = Aes256CbcEnc::new(key.into(), iv.into());
    let mut ret = iv.to_vec();
    ret.extend(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext));
    ret
}

/// Decrypts `iv || ciphertext`
pub fn decrypt(data: &[u8], key: &[u8; 32]) -> Result<Vec<u8>, Error> {
    if data.len() < 2 * IV_LEN || data.len() % IV_LEN != 0 {
        return Err(Error::ChannelDecrypt);
    }
    let (iv, ciphertext) = data.split_at(IV_LEN);
    let cipher = Aes256CbcDec::new_from_slices(key, iv).map_err(|_| Error::ChannelDecrypt)?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| Error::ChannelDecrypt)
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; MAC_LEN] {
    let mut engine = HmacEngine::<sha256::Hash>::new(key);
    engine.input(data);
    Hmac::<sha256::Hash>::from_engine(engine).to_byte_array()
}

/// Encrypts, then appends an HMAC over `iv || ciphertext`
pub fn encrypt_then_mac(plaintext: &[u8], enc_key: &[u8; 32], auth_key: &[u8; 32]) -> Vec<u8> {
    let mut ret = encrypt(plaintext, enc_key);
    let mac = hmac_sha256(auth_key, &ret);
    ret.extend_from_slice(&mac);
    ret
}

/// Checks the HMAC of `iv || ciphertext || mac`, then decrypts
pub fn check_mac_then_decrypt(
    data: &[u8],
    enc_key: &[u8; 32],
    auth_key: &[u8; 32],
) -> Result<Vec<u8>, Error> {
    if data.len() < MAC_LEN {
        return Err(Error::ChannelDecrypt);
    }
    let (body, mac) = data.split_at(data.len() - MAC_LEN);
    let expected = hmac_sha256(auth_key, body);
    // constant-time comparison
    let diff = expected
        .iter()
        .zip(mac.iter())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b));
    if diff != 0 {
        return Err(Error::Verification("channel MAC"));
    }
    decrypt(body, enc_key)
}
