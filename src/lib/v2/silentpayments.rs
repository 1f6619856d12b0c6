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

//! # Silent Payments
//!
//! When paying to a BIP-352 silent payment address the device derives the
//! output script itself. It proves with a DLEQ proof that it used the sum
//! of the input keys against the recipient's scan key, so we can recompute
//! the output and compare.
//!

use miniscript::bitcoin::bech32::{self, FromBase32};
use miniscript::bitcoin::secp256k1::{PublicKey, Scalar, Secp256k1, SecretKey, Verification};

use super::btc::Transaction;
use crate::crypto::tagged_sha256;
use crate::Error;

/// Length of the device's proof: the shared point `C` and the DLEQ proof
pub const PROOF_LEN: usize = 33 + 64;

/// A decoded silent payment address
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Address {
    /// Recipient scan key
    pub scan: PublicKey,
    /// Recipient spend key
    pub spend: PublicKey,
}

impl Address {
    /// Decodes a version-0 bech32m silent payment address
    pub fn decode(address: &str) -> Result<Address, Error> {
        let (_hrp, data, variant) = bech32::decode(address)
            .map_err(|e| Error::invalid("silent payment address", e.to_string()))?;
        if variant != bech32::Variant::Bech32m {
            return Err(Error::invalid("silent payment address", "not bech32m"));
        }
        match data.first() {
            Some(v) if v.to_u8() == 0 => {}
            _ => return Err(Error::invalid("silent payment address", "unknown version")),
        }
        let payload = Vec::<u8>::from_base32(&data[1..])
            .map_err(|e| Error::invalid("silent payment address", e.to_string()))?;
        if payload.len() != 66 {
            return Err(Error::invalid(
                "silent payment address",
                format!("payload of {} bytes", payload.len()),
            ));
        }
        Ok(Address {
            scan: PublicKey::from_slice(&payload[..33])?,
            spend: PublicKey::from_slice(&payload[33..])?,
        })
    }
}

fn scalar(bytes: &[u8]) -> Result<Scalar, Error> {
    let mut arr = [0; 32];
    arr.copy_from_slice(bytes);
    Scalar::from_be_bytes(arr).map_err(|_| Error::Verification("scalar out of range"))
}

/// `s·G - e·A` without going through secret keys for `s`
fn sub_mul<C: Verification>(
    secp: &Secp256k1<C>,
    base: &PublicKey,
    s: &Scalar,
    e: &Scalar,
    point: &PublicKey,
) -> Result<PublicKey, Error> {
    let s_base = base.mul_tweak(secp, s)?;
    let e_point = point.mul_tweak(secp, e)?.negate(secp);
    Ok(s_base.combine(&e_point)?)
}

/// The secp256k1 generator
fn generator() -> PublicKey {
    let mut one = [0; 32];
    one[31] = 1;
    let secp = Secp256k1::signing_only();
    PublicKey::from_secret_key(&secp, &SecretKey::from_slice(&one).expect("1 is a valid key"))
}

/// Verifies a proof that `log_G(A) == log_B(C)`
///
/// The proof is `e || s` with `e = H_DLEQ(A || B || C || R1 || R2)`,
/// `R1 = s·G - e·A` and `R2 = s·B - e·C`.
pub fn dleq_verify(proof: &[u8], a: &PublicKey, b: &PublicKey, c: &PublicKey) -> Result<(), Error> {
    if proof.len() != 64 {
        return Err(Error::invalid("DLEQ proof", format!("{} bytes", proof.len())));
    }
    let secp = Secp256k1::verification_only();
    let e = scalar(&proof[..32])?;
    let s = scalar(&proof[32..])?;

    let r1 = sub_mul(&secp, &generator(), &s, &e, a)?;
    let r2 = sub_mul(&secp, b, &s, &e, c)?;

    let mut data = Vec::with_capacity(5 * 33);
    for point in &[a, b, c, &r1, &r2] {
        data.extend_from_slice(&point.serialize());
    }
    if tagged_sha256(b"DLEQ", &data)[..] != proof[..32] {
        return Err(Error::Verification("DLEQ proof"));
    }
    Ok(())
}

fn bip352_pubkey(bytes: &[u8]) -> Result<PublicKey, Error> {
    match bytes.len() {
        33 => Ok(PublicKey::from_slice(bytes)?),
        32 => {
            // x-only keys have even y
            let mut full = [0x02; 33];
            full[1..].copy_from_slice(bytes);
            Ok(PublicKey::from_slice(&full)?)
        }
        _ => Err(Error::invalid(
            "input",
            "every input needs a 33-byte or x-only BIP-352 pubkey",
        )),
    }
}

/// Sum of the BIP-352 pubkeys of all inputs
fn input_sum(tx: &Transaction) -> Result<PublicKey, Error> {
    let keys = tx
        .inputs
        .iter()
        .map(|input| bip352_pubkey(&input.bip352_pubkey))
        .collect::<Result<Vec<_>, _>>()?;
    let refs: Vec<&PublicKey> = keys.iter().collect();
    if refs.is_empty() {
        return Err(Error::invalid("transaction", "no inputs"));
    }
    Ok(PublicKey::combine_keys(&refs)?)
}

/// hash_BIP0352/Inputs(smallest outpoint || A)
fn inputs_hash(tx: &Transaction, a_sum: &PublicKey) -> [u8; 32] {
    let smallest = tx
        .inputs
        .iter()
        .map(|input| {
            let mut outpoint = input.input.prev_out_hash.clone();
            outpoint.extend_from_slice(&input.input.prev_out_index.to_le_bytes());
            outpoint
        })
        .min()
        .unwrap_or_default();
    let mut data = smallest;
    data.extend_from_slice(&a_sum.serialize());
    tagged_sha256(b"BIP0352/Inputs", &data)
}

/// Recomputes the silent payment output at `output_index` and compares it
/// against the script the device generated
pub fn verify_output(
    tx: &Transaction,
    output_index: usize,
    proof: &[u8],
    generated_pkscript: &[u8],
) -> Result<(), Error> {
    if proof.len() != PROOF_LEN {
        return Err(Error::invalid("silent payment proof", format!("{} bytes", proof.len())));
    }
    let c = PublicKey::from_slice(&proof[..33])?;
    let address = match tx.outputs.get(output_index).and_then(|o| o.silent_payment.as_ref()) {
        Some(sp) => Address::decode(&sp.address)?,
        None => return Err(Error::invalid("output", "silent payment address missing")),
    };

    let a_sum = input_sum(tx)?;
    dleq_verify(&proof[33..], &a_sum, &address.scan, &c)?;

    let secp = Secp256k1::verification_only();
    let ecdh = c.mul_tweak(&secp, &scalar(&inputs_hash(tx, &a_sum))?)?;
    let mut tk_data = ecdh.serialize().to_vec();
    tk_data.extend_from_slice(&0u32.to_le_bytes());
    let tk = scalar(&tagged_sha256(b"BIP0352/SharedSecret", &tk_data))?;
    let output_key = address.spend.add_exp_tweak(&secp, &tk)?;

    let mut expected = vec![0x51, 0x20];
    expected.extend_from_slice(&output_key.x_only_public_key().0.serialize());
    if expected != generated_pkscript {
        log::error!(
            "silent payment output {} mismatch: expected {}, device generated {}",
            output_index,
            hex::encode(&expected),
            hex::encode(generated_pkscript)
        );
        return Err(Error::Verification("silent payment output"));
    }
    Ok(())
}
