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

//! # PIN Channel
//!
//! Commands travel as JSON text. Everything except `ping` and the initial
//! `password` is encrypted under keys derived from the PIN and sent as a
//! base64 string; the device answers with `{"ciphertext": ...}`.
//!
//! Firmware 5.0.0 and later use encrypt-then-MAC with keys split from
//! `sha512(sha256d(pin))`; older firmware uses plain AES-CBC keyed with
//! `sha256d(pin)`.
//!

use base64::Engine as _;
use miniscript::bitcoin::hashes::{sha512, Hash};
use serde_json::Value;
use zeroize::Zeroize;

use super::messages::DeviceError;
use crate::constants::u2fhid::CMD_HWW;
use crate::crypto::{self, aes};
use crate::dongle::{ReadWrite, U2fHid};
use crate::{Error, Version};

/// Channel keys derived from a PIN
pub(crate) enum Keys {
    /// Firmware 5.0.0 and later
    Authenticated { enc: [u8; 32], auth: [u8; 32] },
    /// Older firmware
    Plain([u8; 32]),
}

impl Drop for Keys {
    fn drop(&mut self) {
        match *self {
            Keys::Authenticated {
                ref mut enc,
                ref mut auth,
            } => {
                enc.zeroize();
                auth.zeroize();
            }
            Keys::Plain(ref mut key) => key.zeroize(),
        }
    }
}

impl Keys {
    pub(crate) fn derive(pin: &str, version: Version) -> Keys {
        let mut secret = crypto::sha256d(pin.as_bytes());
        let keys = if version.at_least(Version::new(5, 0, 0)) {
            let mut h = sha512::Hash::hash(&secret).to_byte_array();
            let mut enc = [0u8; 32];
            let mut auth = [0u8; 32];
            enc.copy_from_slice(&h[..32]);
            auth.copy_from_slice(&h[32..]);
            h.zeroize();
            Keys::Authenticated { enc, auth }
        } else {
            Keys::Plain(secret)
        };
        secret.zeroize();
        keys
    }

    pub(crate) fn encrypt(&self, plaintext: &[u8]) -> Vec<u8> {
        match *self {
            Keys::Authenticated { ref enc, ref auth } => aes::encrypt_then_mac(plaintext, enc, auth),
            Keys::Plain(ref key) => aes::encrypt(plaintext, key),
        }
    }

    pub(crate) fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, Error> {
        match *self {
            Keys::Authenticated { ref enc, ref auth } => aes::check_mac_then_decrypt(data, enc, auth),
            Keys::Plain(ref key) => aes::decrypt(data, key),
        }
    }
}

/// Replaces every leaf value by `"****"`
pub(crate) fn censor(value: &mut Value) {
    match *value {
        Value::Object(ref mut map) => {
            for v in map.values_mut() {
                censor(v);
            }
        }
        ref mut leaf => *leaf = Value::String("****".into()),
    }
}

fn log_censored(id: &str, direction: &str, msg: &[u8]) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    match serde_json::from_slice::<Value>(msg) {
        Ok(mut value) => {
            censor(&mut value);
            log::debug!("{}: {} {}", id, direction, value);
        }
        Err(_) => log::debug!("{}: {} non-JSON message ({} bytes)", id, direction, msg.len()),
    }
}

/// Turns an `{"error": {...}}` reply into an error
fn check_error(reply: Value) -> Result<Value, Error> {
    match reply.get("error") {
        Some(err) => match serde_json::from_value::<DeviceError>(err.clone()) {
            Ok(err) => Err(err.into()),
            Err(_) => Err(Error::reply("error", reply.to_string().as_bytes())),
        },
        None => Ok(reply),
    }
}

/// The JSON transport to a Digital BitBox in firmware mode
pub struct Comm<T> {
    id: String,
    hid: U2fHid<T>,
    version: Version,
}

impl<T: ReadWrite> Comm<T> {
    /// Wraps an opened device handle
    pub fn new(id: String, dev: T, version: Version) -> Self {
        Comm {
            id,
            hid: U2fHid::new(dev, CMD_HWW),
            version,
        }
    }

    /// Closes the device handle
    pub fn close(&mut self) {
        self.hid.close()
    }

    /// Sends a message as is and parses the JSON reply
    pub fn send_plain(&mut self, msg: &str) -> Result<Value, Error> {
        log_censored(&self.id, "sending", msg.as_bytes());
        let mut reply = self.hid.query(msg.as_bytes())?;
        while let Some(&last) = reply.last() {
            if last == 0 || (last as char).is_ascii_whitespace() {
                reply.pop();
            } else {
                break;
            }
        }
        log_censored(&self.id, "received", &reply);
        let value: Value =
            serde_json::from_slice(&reply).map_err(|_| Error::reply("plain query", &reply))?;
        check_error(value)
    }

    /// Encrypts a message under `pin`, sends it and decrypts the reply
    pub fn send_encrypt(&mut self, msg: &str, pin: &str) -> Result<Value, Error> {
        log_censored(&self.id, "sending (encrypted)", msg.as_bytes());
        let keys = Keys::derive(pin, self.version);
        let ciphertext = base64::engine::general_purpose::STANDARD.encode(keys.encrypt(msg.as_bytes()));
        let reply = self.send_plain(&ciphertext)?;
        let reply = match reply.get("ciphertext").and_then(|c| c.as_str()) {
            Some(ciphertext) => {
                let data = base64::engine::general_purpose::STANDARD.decode(ciphertext)?;
                let plaintext = keys.decrypt(&data)?;
                log_censored(&self.id, "received (decrypted)", &plaintext);
                serde_json::from_slice(&plaintext)
                    .map_err(|_| Error::reply("encrypted query", &plaintext))?
            }
            None => reply,
        };
        check_error(reply)
    }
}
