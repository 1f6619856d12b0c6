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

//! # Cryptographic Helpers
//!
//! Small pieces shared by both device generations. Hashes come from the
//! `bitcoin_hashes` crate re-exported through miniscript; AES from RustCrypto.
//!

pub mod aes;

use miniscript::bitcoin::hashes::{sha256, sha256d, Hash, HashEngine};

/// SHA256(SHA256(tag) || SHA256(tag) || msg)
pub fn tagged_sha256(tag: &[u8], msg: &[u8]) -> [u8; 32] {
    let tag_hash = sha256::Hash::hash(tag);
    let mut engine = sha256::Hash::engine();
    engine.input(tag_hash.as_ref());
    engine.input(tag_hash.as_ref());
    engine.input(msg);
    sha256::Hash::from_engine(engine).to_byte_array()
}

/// SHA256(SHA256(data))
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    sha256d::Hash::hash(data).to_byte_array()
}

/// Order of the secp256k1 group, big-endian
const CURVE_ORDER: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe,
    0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c, 0xd0, 0x36, 0x41, 0x41,
];

/// Reduces a 256-bit big-endian number modulo the curve order
///
/// Field elements are below 2n, so one subtraction is enough.
pub fn reduce_mod_order(mut x: [u8; 32]) -> [u8; 32] {
    if x < CURVE_ORDER {
        return x;
    }
    let mut borrow = 0u16;
    for i in (0..32).rev() {
        let sub = u16::from(CURVE_ORDER[i]) + borrow;
        let val = u16::from(x[i]);
        if val >= sub {
            x[i] = (val - sub) as u8;
            borrow = 0;
        } else {
            x[i] = (val + 0x100 - sub) as u8;
            borrow = 1;
        }
    }
    x
}
