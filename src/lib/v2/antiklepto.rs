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

//! # Anti-Klepto
//!
//! Sign-to-contract for ECDSA nonces. The host commits to a random nonce,
//! the device commits to its own nonce point `R1`, the host reveals its
//! nonce, and the device must then sign with `R = R1 + t·G` where `t`
//! commits to both. The device thus cannot choose `R` on its own and has no
//! covert channel through the signature.
//!

use miniscript::bitcoin::secp256k1::{PublicKey, Scalar, Secp256k1};
use rand::RngCore;

use crate::crypto::{reduce_mod_order, tagged_sha256};
use crate::Error;

const TAG_DATA: &[u8] = b"s2c/ecdsa/data";
const TAG_POINT: &[u8] = b"s2c/ecdsa/point";

/// Draws a fresh host nonce
pub fn host_nonce() -> [u8; 32] {
    let mut nonce = [0; 32];
    rand::thread_rng().fill_bytes(&mut nonce);
    nonce
}

/// The commitment sent to the device before it commits to its nonce
pub fn host_commit(host_nonce: &[u8; 32]) -> [u8; 32] {
    tagged_sha256(TAG_DATA, host_nonce)
}

/// Checks that `signature` was made with the nonce both sides committed to
///
/// `signer_commitment` is the device's compressed nonce point and
/// `signature` its compact 64-byte signature (a trailing recovery id is
/// ignored).
pub fn verify(host_nonce: &[u8; 32], signer_commitment: &[u8], signature: &[u8]) -> Result<(), Error> {
    if signature.len() < 64 {
        return Err(Error::invalid(
            "signature",
            format!("expected 64 bytes, got {}", signature.len()),
        ));
    }
    if signer_commitment.len() != 33 {
        return Err(Error::invalid(
            "signer commitment",
            format!("expected 33 bytes, got {}", signer_commitment.len()),
        ));
    }
    let r1 = PublicKey::from_slice(signer_commitment)?;

    let mut data = Vec::with_capacity(33 + 32);
    data.extend_from_slice(&r1.serialize());
    data.extend_from_slice(host_nonce);
    let tweak = Scalar::from_be_bytes(tagged_sha256(TAG_POINT, &data))
        .map_err(|_| Error::Verification("anti-klepto tweak"))?;

    let secp = Secp256k1::verification_only();
    let r = r1.add_exp_tweak(&secp, &tweak)?;
    let mut r_x = [0; 32];
    r_x.copy_from_slice(&r.serialize()[1..]);
    if reduce_mod_order(r_x)[..] != signature[..32] {
        log::error!("anti-klepto: device did not sign with the committed nonce");
        return Err(Error::Verification("anti-klepto signature nonce"));
    }
    Ok(())
}
