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

//! # Attestation
//!
//! Every genuine BitBox02 carries a P-256 attestation key whose public half
//! is certified by one of the manufacturer's secp256k1 root keys, together
//! with the hash of the bootloader it was produced with. The host sends a
//! random challenge; the device answers with the certificate and a signature
//! over the challenge.
//!
//! A failed check is reported, never fatal: the application is expected to
//! warn the user before they enter a PIN.
//!

use miniscript::bitcoin::hashes::{sha256, Hash};
use miniscript::bitcoin::secp256k1::{self, ecdsa, Message, Secp256k1};
use p256::ecdsa::signature::Verifier as _;

use crate::constants::v2::RESPONSE_SUCCESS;

/// A manufacturer root key
pub struct RootKey {
    /// Identifier the device reports, hex
    pub id: &'static str,
    /// Uncompressed secp256k1 public key, hex
    pub pubkey: &'static str,
    /// If set, only devices with this bootloader hash are accepted, hex
    pub accepted_bootloader_hash: Option<&'static str>,
}

/// Root keys of production devices
pub const ROOT_KEYS: [RootKey; 10] = [
    RootKey {
        id: "f36581299c784acfe26d735c1f937f7e397ee471a02983906a29660f3eee2004",
        pubkey: "04074ff1273b36c24e80fe3d59e0e897a81732d3f8e9cd07e17e9fc06319cd16b25cf74255674477b3ac9cbac2d12f0dc27a662681fcbc12955b0bccdcbbdcfd01",
        accepted_bootloader_hash: None,
    },
    RootKey {
        id: "4c2b7ec9399038da906633173db24f017cdba1a63fe2a84548319701a0b42039",
        pubkey: "044c53a84f41fa7301b378bb3c260fc9b2ff1cbea7a78181279a8566797a736f12cea25fa2b1c27a844392fe9b37547dc6fbd00a2676b816e7d2d3562be2a0cbbd",
        accepted_bootloader_hash: None,
    },
    RootKey {
        id: "f24b6ffaae3cd4905ab07734afeb4d179a6b6954d28e710c98ddab9a53b91f44",
        pubkey: "04e9c8dc929796aac65af5084eb54dc1ee482d5e0b5c58e2c93f243c5b70b21523324bdb78d7395317da165ef1138826c3ca3c91ca95e6f490c340cf5508a4a3ec",
        accepted_bootloader_hash: None,
    },
    RootKey {
        id: "0d39866fb5b0f81cdd559447ef3378a1f3e3e45e40b307a5fcbc5e02c67a967c",
        pubkey: "04c2fb05889b9dff5a9fb22a59ee1d16bfc2863f0400ddcb69566e2abe8a15fa0ba1240254ca45aa310d170e724e1310ce5f611cada76c12e3c24a926a390ca4be",
        accepted_bootloader_hash: None,
    },
    RootKey {
        id: "10cecd28b7ed38fd08406728d149762007abd694a358f06448d3ee1dcd9d908a",
        pubkey: "04c4e82d6d1b91e7853eba96a871ad31fc62620b826b0b8acf815c03de31b792a98e05bb34d3b9e0df1040eac485f03ff8bbbf7a857ef1cf2a49a60ac084efb88f",
        accepted_bootloader_hash: None,
    },
    RootKey {
        id: "62a321078b3d0affb6b6b4dace9333b89263c85052c63dc6570294f9994bf105",
        pubkey: "040526f5b8348a8d55e7b1cac043ce98c55bbdb3311b4d1bb2d654281edf8aeb21f018fb027a6b08e4ddc62c919e648690722d00c6f54c668c9bd8224a1d82423a",
        accepted_bootloader_hash: Some(
            "e8fa0bd5fc80b86b9f1ea983664df33b27f6f95855d79fb43248ee4c3d3e6be6",
        ),
    },
    RootKey {
        id: "bc1b9b196839e029458b86456c222641a2a681570a52a5637f8d34ad6ab8b643",
        pubkey: "0422491e19766bd96a56e3f2f3926a6c57b89209ff47bd10e523b223ff65ab9af11c0a5f62c187514f2117ce772de90f9901ee122af78e69bbc4d29eec811be8ec",
        accepted_bootloader_hash: None,
    },
    RootKey {
        id: "fa077dc3d0caea63d8a2a7ba0392560b76041001e3ba3af9655423ff457b9d1e",
        pubkey: "049f1b7180014b6de60d41f16a3c0a37b20146585e4884960249d30f3cd68c74d04420d0cedef5719d6b1529b085ecd534fa6c1690be5eb1b3331bc57b5db224dc",
        accepted_bootloader_hash: None,
    },
    RootKey {
        id: "e00da42fea5ae884fcfb351b62b6ca4e64a94cde155164fad83f44732c51a844",
        pubkey: "04adaa011a4ced11310728abb64f09636267ce0b05782da6d3eeaf987cec7c64f279ad55327184f9e5b4a1e53089b31bcc65032dad7205325f41ed3d9fdfba1f88",
        accepted_bootloader_hash: None,
    },
    RootKey {
        id: "e1295cbb22e3ab5479b2be728f9b6899b509295beecab93c42b24f8f0a620c9c",
        pubkey: "044a70e663d7fe5fe0d4cbbb752883e35222b8d7d7bffdaa8d591995d1252528a4e9a3e4d5220d485021728b3cdad4fccc681a6ddeea8e2f7c55b4acde8d53573d",
        accepted_bootloader_hash: None,
    },
];

const BOOTLOADER_HASH_LEN: usize = 32;
const DEVICE_PUBKEY_LEN: usize = 64;
const CERT_LEN: usize = 64;
const ROOT_ID_LEN: usize = 32;
const CHALLENGE_SIG_LEN: usize = 64;
/// Length of a well-formed attestation reply
pub const RESPONSE_LEN: usize =
    1 + BOOTLOADER_HASH_LEN + DEVICE_PUBKEY_LEN + CERT_LEN + ROOT_ID_LEN + CHALLENGE_SIG_LEN;

/// Checks the device's answer to an attestation challenge against `roots`
pub fn verify(challenge: &[u8; 32], response: &[u8], roots: &[RootKey]) -> bool {
    if response.len() < RESPONSE_LEN || response[0] != RESPONSE_SUCCESS {
        log::warn!("attestation: malformed response of length {}", response.len());
        return false;
    }
    let rest = &response[1..];
    let (bootloader_hash, rest) = rest.split_at(BOOTLOADER_HASH_LEN);
    let (device_pubkey, rest) = rest.split_at(DEVICE_PUBKEY_LEN);
    let (cert, rest) = rest.split_at(CERT_LEN);
    let (root_id, rest) = rest.split_at(ROOT_ID_LEN);
    let challenge_sig = &rest[..CHALLENGE_SIG_LEN];

    let root_id = hex::encode(root_id);
    let root = match roots.iter().find(|root| root.id == root_id) {
        Some(root) => root,
        None => {
            log::warn!("attestation: unknown root {}", root_id);
            return false;
        }
    };
    if let Some(accepted) = root.accepted_bootloader_hash {
        if hex::encode(bootloader_hash) != accepted {
            log::warn!(
                "attestation: bootloader hash {} not accepted for root {}",
                hex::encode(bootloader_hash),
                root_id
            );
            return false;
        }
    }

    match verify_cert(root, bootloader_hash, device_pubkey, cert) {
        Ok(true) => {}
        Ok(false) => {
            log::warn!("attestation: certificate does not verify");
            return false;
        }
        Err(e) => {
            log::warn!("attestation: bad certificate data: {}", e);
            return false;
        }
    }

    let mut sec1 = Vec::with_capacity(1 + DEVICE_PUBKEY_LEN);
    sec1.push(0x04);
    sec1.extend_from_slice(device_pubkey);
    let verified = p256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
        .and_then(|key| {
            let sig = p256::ecdsa::Signature::from_slice(challenge_sig)?;
            key.verify(&challenge[..], &sig)
        })
        .is_ok();
    if !verified {
        log::warn!("attestation: challenge signature does not verify");
    }
    verified
}

fn verify_cert(
    root: &RootKey,
    bootloader_hash: &[u8],
    device_pubkey: &[u8],
    cert: &[u8],
) -> Result<bool, crate::Error> {
    let root_pubkey = secp256k1::PublicKey::from_slice(&hex::decode(root.pubkey)?)?;
    let mut data = Vec::with_capacity(BOOTLOADER_HASH_LEN + DEVICE_PUBKEY_LEN);
    data.extend_from_slice(bootloader_hash);
    data.extend_from_slice(device_pubkey);
    let msg = Message::from_slice(&sha256::Hash::hash(&data).to_byte_array())?;
    let mut sig = ecdsa::Signature::from_compact(cert)?;
    sig.normalize_s();
    Ok(Secp256k1::verification_only()
        .verify_ecdsa(&msg, &sig, &root_pubkey)
        .is_ok())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use p256::ecdsa::signature::Signer as _;

    pub const TEST_ROOT_SECRET: [u8; 32] = [0x5a; 32];
    pub const TEST_DEVICE_SECRET: [u8; 32] = [0x17; 32];
    pub const TEST_ROOT_ID: [u8; 32] = [0xaa; 32];

    /// A root table containing only a root we hold the secret key for
    pub fn test_roots() -> Vec<RootKey> {
        let secp = Secp256k1::new();
        let sk = secp256k1::SecretKey::from_slice(&TEST_ROOT_SECRET).unwrap();
        let pk = secp256k1::PublicKey::from_secret_key(&secp, &sk);
        // leaked so the table can hold &'static str like the production one
        let pubkey: &'static str = Box::leak(hex::encode(pk.serialize_uncompressed()).into_boxed_str());
        let id: &'static str = Box::leak(hex::encode(TEST_ROOT_ID).into_boxed_str());
        vec![RootKey {
            id,
            pubkey,
            accepted_bootloader_hash: None,
        }]
    }

    /// What a genuine device answers to `challenge`
    pub fn attestation_response(challenge: &[u8]) -> Vec<u8> {
        let secp = Secp256k1::new();
        let bootloader_hash = [0x42u8; 32];
        let device_key = p256::ecdsa::SigningKey::from_slice(&TEST_DEVICE_SECRET).unwrap();
        let device_point = device_key.verifying_key().to_encoded_point(false);
        let device_pubkey = &device_point.as_bytes()[1..];

        let mut data = bootloader_hash.to_vec();
        data.extend_from_slice(device_pubkey);
        let msg = Message::from_slice(&sha256::Hash::hash(&data).to_byte_array()).unwrap();
        let root_sk = secp256k1::SecretKey::from_slice(&TEST_ROOT_SECRET).unwrap();
        let cert = secp.sign_ecdsa(&msg, &root_sk).serialize_compact();

        let challenge_sig: p256::ecdsa::Signature = device_key.sign(challenge);

        let mut ret = vec![RESPONSE_SUCCESS];
        ret.extend_from_slice(&bootloader_hash);
        ret.extend_from_slice(device_pubkey);
        ret.extend_from_slice(&cert);
        ret.extend_from_slice(&TEST_ROOT_ID);
        ret.extend_from_slice(&challenge_sig.to_bytes());
        ret
    }

    #[test]
    fn genuine_device() {
        let challenge = [9u8; 32];
        let response = attestation_response(&challenge);
        assert_eq!(response.len(), RESPONSE_LEN);
        assert!(verify(&challenge, &response, &test_roots()));
    }

    #[test]
    fn tampered_responses() {
        let challenge = [9u8; 32];
        let roots = test_roots();
        let response = attestation_response(&challenge);

        // wrong challenge
        assert!(!verify(&[8u8; 32], &response, &roots));
        // unknown root
        assert!(!verify(&challenge, &response, &ROOT_KEYS));
        // short, or failure status
        assert!(!verify(&challenge, &response[..RESPONSE_LEN - 1], &roots));
        let mut bad = response.clone();
        bad[0] = 0x01;
        assert!(!verify(&challenge, &bad, &roots));
        // any flipped bit in the bootloader hash, device key or cert
        for i in &[1usize, 40, 100, 130, 200] {
            let mut bad = response.clone();
            bad[*i] ^= 0x01;
            assert!(!verify(&challenge, &bad, &roots), "byte {}", i);
        }
    }

    #[test]
    fn production_roots_parse() {
        for root in ROOT_KEYS.iter() {
            let bytes = hex::decode(root.pubkey).unwrap();
            secp256k1::PublicKey::from_slice(&bytes).unwrap();
            assert_eq!(hex::decode(root.id).unwrap().len(), 32);
        }
    }
}
