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

//! # Noise Channel
//!
//! Noise_XX_25519_ChaChaPoly_SHA256, with the host as initiator.
//!

use noise_protocol::patterns::noise_xx;
use noise_protocol::{CipherState, HandshakeState, DH};
use noise_rust_crypto::sensitive::Sensitive;
use noise_rust_crypto::{ChaCha20Poly1305, Sha256, X25519};
use zeroize::Zeroizing;

use crate::constants::v2::NOISE_PROTOCOL;
use crate::pairing_db::AppKeypair;
use crate::Error;

/// Handshake state for our cipher suite
pub type Handshake = HandshakeState<X25519, ChaCha20Poly1305, Sha256>;
type Cipher = CipherState<ChaCha20Poly1305>;

/// Generates a fresh static keypair for the application
pub fn generate_keypair() -> AppKeypair {
    let private = X25519::genkey();
    let public = X25519::pubkey(&private);
    let mut ret = AppKeypair {
        private: [0; 32],
        public,
    };
    ret.private.copy_from_slice(&private[..]);
    ret
}

fn handshake(initiator: bool, keypair: &AppKeypair) -> Handshake {
    HandshakeState::new(
        noise_xx(),
        initiator,
        NOISE_PROTOCOL,
        Some(Sensitive::from(Zeroizing::new(keypair.private))),
        None,
        None,
        None,
    )
}

/// Starts a handshake with the host as initiator
pub fn initiator(keypair: &AppKeypair) -> Handshake {
    handshake(true, keypair)
}

/// Starts a handshake as the responder; only devices do this
#[cfg(test)]
pub fn responder(keypair: &AppKeypair) -> Handshake {
    handshake(false, keypair)
}

/// Writes the next handshake message, with an empty payload
pub fn write_message(hs: &mut Handshake) -> Result<Vec<u8>, Error> {
    hs.write_message_vec(b"")
        .map_err(|e| Error::Noise(format!("writing handshake message: {:?}", e)))
}

/// Reads the peer's next handshake message
pub fn read_message(hs: &mut Handshake, msg: &[u8]) -> Result<(), Error> {
    hs.read_message_vec(msg)
        .map(|_| ())
        .map_err(|e| Error::Noise(format!("reading handshake message: {:?}", e)))
}

/// The human-comparable form of a handshake hash
///
/// The first 100 bits, base32 encoded, in four groups of five characters.
pub fn format_channel_hash(hash: &[u8]) -> String {
    let encoded = base32::encode(base32::Alphabet::RFC4648 { padding: true }, hash);
    format!(
        "{} {}\n{} {}",
        &encoded[0..5],
        &encoded[5..10],
        &encoded[10..15],
        &encoded[15..20]
    )
}

/// Transport ciphers of an established channel
pub struct Ciphers {
    send: Cipher,
    recv: Cipher,
}

impl Ciphers {
    /// Splits a finished handshake into transport ciphers
    pub fn from_handshake(hs: &Handshake) -> Result<Self, Error> {
        if !hs.completed() {
            return Err(Error::Noise("handshake not finished".into()));
        }
        let (initiator_to_responder, responder_to_initiator) = hs.get_ciphers();
        Ok(if hs.get_is_initiator() {
            Ciphers {
                send: initiator_to_responder,
                recv: responder_to_initiator,
            }
        } else {
            Ciphers {
                send: responder_to_initiator,
                recv: initiator_to_responder,
            }
        })
    }

    /// Encrypts the next outgoing message
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Vec<u8> {
        self.send.encrypt_vec(plaintext)
    }

    /// Decrypts the next incoming message
    pub fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, Error> {
        self.recv
            .decrypt_vec(ciphertext)
            .map_err(|_| Error::ChannelDecrypt)
    }
}
