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

//! # Mobile Relay
//!
//! A paired Digital BitBox can use a companion app as a second screen.
//! The desktop and the app never talk directly; both push JSON messages
//! to, and pull them from, a relay server. Messages are encrypted and
//! authenticated with keys only the two parties know, which the app
//! learns by scanning a code shown on the desktop.
//!

#[cfg(feature = "relay")]
mod http;
#[cfg(feature = "relay")]
pub use self::http::HttpServer;

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use std::{fmt, fs, thread};

use base64::Engine as _;
use miniscript::bitcoin::base58;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use zeroize::Zeroize;

use crate::constants::v1::relay::*;
use crate::crypto::aes;
use crate::{lock, Error};

/// Something which stores and forwards messages between the two parties
pub trait RelayServer: Send + Sync {
    /// Queues a message for the mobile
    fn push(&self, channel_id: &str, payload: &str) -> Result<(), Error>;

    /// Takes the oldest message the mobile sent, if any
    fn pull(&self, channel_id: &str) -> Result<Option<String>, Error>;
}

/// On-disk and on-screen form of a channel
#[derive(Serialize, Deserialize)]
struct StoredChannel {
    id: String,
    key: String,
    mac: String,
}

/// An encrypted channel to the paired mobile
pub struct Channel {
    id: String,
    encryption_key: [u8; 32],
    authentication_key: [u8; 32],
    buffer: Mutex<Vec<Value>>,
    server: Arc<dyn RelayServer>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Channel").field("id", &self.id).finish()
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.encryption_key.zeroize();
        self.authentication_key.zeroize();
    }
}

fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

fn key32(s: &str) -> Result<[u8; 32], Error> {
    let bytes = b64().decode(s)?;
    if bytes.len() != 32 {
        return Err(Error::invalid("channel key", format!("{} bytes", bytes.len())));
    }
    let mut ret = [0u8; 32];
    ret.copy_from_slice(&bytes);
    Ok(ret)
}

impl Channel {
    /// Creates a channel from known parts
    pub fn new(
        id: String,
        encryption_key: [u8; 32],
        authentication_key: [u8; 32],
        server: Arc<dyn RelayServer>,
    ) -> Channel {
        Channel {
            id,
            encryption_key,
            authentication_key,
            buffer: Mutex::new(vec![]),
            server,
        }
    }

    /// Creates a channel with a random identifier and random keys
    ///
    /// The identifier is base58 since the relay does not accept `=`.
    pub fn with_random_key(server: Arc<dyn RelayServer>) -> Channel {
        let mut rng = rand::thread_rng();
        let mut id = [0u8; 32];
        let mut encryption_key = [0u8; 32];
        let mut authentication_key = [0u8; 32];
        rng.fill_bytes(&mut id);
        rng.fill_bytes(&mut encryption_key);
        rng.fill_bytes(&mut authentication_key);
        Channel::new(base58::encode(&id), encryption_key, authentication_key, server)
    }

    /// Loads the channel stored in `dir`, if there is one
    pub fn load<P: AsRef<Path>>(dir: P, server: Arc<dyn RelayServer>) -> Result<Option<Channel>, Error> {
        let path = dir.as_ref().join(CONFIG_FILE_NAME);
        let contents = match fs::read(&path) {
            Ok(contents) => contents,
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let stored: StoredChannel = serde_json::from_slice(&contents)?;
        Ok(Some(Channel::new(
            stored.id,
            key32(&stored.key)?,
            key32(&stored.mac)?,
            server,
        )))
    }

    fn stored(&self) -> StoredChannel {
        StoredChannel {
            id: self.id.clone(),
            key: b64().encode(self.encryption_key),
            mac: b64().encode(self.authentication_key),
        }
    }

    /// Persists the channel in `dir`
    pub fn store<P: AsRef<Path>>(&self, dir: P) -> Result<(), Error> {
        fs::create_dir_all(dir.as_ref())?;
        let path = dir.as_ref().join(CONFIG_FILE_NAME);
        let tmp = dir.as_ref().join(format!("{}.tmp", CONFIG_FILE_NAME));
        fs::write(&tmp, serde_json::to_vec(&self.stored())?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Deletes the channel stored in `dir`
    pub fn remove<P: AsRef<Path>>(dir: P) -> Result<(), Error> {
        match fs::remove_file(dir.as_ref().join(CONFIG_FILE_NAME)) {
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other.map_err(Error::from),
        }
    }

    /// The channel identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// What the app has to scan to join the channel
    pub fn pairing_code(&self) -> String {
        serde_json::to_string(&self.stored()).expect("serializing strings cannot fail")
    }

    pub(crate) fn encrypt_message(&self, message: &Value) -> String {
        let ciphertext = aes::encrypt_then_mac(
            message.to_string().as_bytes(),
            &self.encryption_key,
            &self.authentication_key,
        );
        b64().encode(ciphertext)
    }

    pub(crate) fn decrypt_message(&self, payload: &str) -> Result<Value, Error> {
        let data = b64().decode(payload)?;
        let plaintext =
            aes::check_mac_then_decrypt(&data, &self.encryption_key, &self.authentication_key)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    fn push(&self, message: Value) -> Result<(), Error> {
        self.server.push(&self.id, &self.encrypt_message(&message))
    }

    fn pull(&self) -> Result<Option<Value>, Error> {
        match self.server.pull(&self.id) {
            Ok(Some(payload)) => self.decrypt_message(&payload).map(Some),
            Ok(None) => Ok(None),
            Err(e) => {
                log::error!("pulling from relay channel {} failed: {}", self.id, e);
                Err(Error::Relay(format!("pull failed: {}", e)))
            }
        }
    }

    /// Waits for a message carrying the string field `name`
    ///
    /// Messages carrying something else are kept for later waits.
    fn wait_for_value(&self, timeout: Duration, name: &str) -> Result<String, Error> {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let mut buffer = lock(&self.buffer);
                let found = buffer
                    .iter()
                    .position(|msg| msg.get(name).and_then(Value::as_str).is_some());
                if let Some(idx) = found {
                    let msg = buffer.remove(idx);
                    log::debug!("using buffered relay message for {:?}", name);
                    return Ok(msg[name].as_str().unwrap_or_default().to_owned());
                }
            }
            match self.pull()? {
                Some(msg) => {
                    if let Some(value) = msg.get(name).and_then(Value::as_str) {
                        return Ok(value.to_owned());
                    }
                    log::debug!("buffering relay message while waiting for {:?}", name);
                    lock(&self.buffer).push(msg);
                }
                None => {
                    if Instant::now() >= deadline {
                        return Err(Error::Timeout("mobile response"));
                    }
                    thread::sleep(Duration::from_millis(PULL_RETRY_MS));
                }
            }
        }
    }

    /// Waits until the app scanned the pairing code
    pub fn wait_for_scanning_success(&self, timeout: Duration) -> Result<bool, Error> {
        Ok(self.wait_for_value(timeout, "id")? == "success")
    }

    /// Waits for the hash of the app's ECDH public key
    pub fn wait_for_mobile_public_key_hash(&self, timeout: Duration) -> Result<String, Error> {
        self.wait_for_value(timeout, "hash_ecdh_pubkey")
    }

    /// Waits for the app's ECDH public key
    pub fn wait_for_mobile_public_key(&self, timeout: Duration) -> Result<String, Error> {
        self.wait_for_value(timeout, "ecdh_pubkey")
    }

    /// Waits for the app's next pairing command (`challenge`, `finish`, `abort`)
    pub fn wait_for_command(&self, timeout: Duration) -> Result<String, Error> {
        self.wait_for_value(timeout, "ecdh")
    }

    /// Forwards the device's reply to an ECDH step
    pub fn send_ecdh(&self, reply: Value) -> Result<(), Error> {
        self.push(json!({ "ecdh": reply }))
    }

    /// Asks the app to answer with a pong
    pub fn send_ping(&self) -> Result<(), Error> {
        self.push(json!({"action": "ping"}))
    }

    /// Waits for the app's pong
    pub fn wait_for_pong(&self, timeout: Duration) -> Result<(), Error> {
        match self.wait_for_value(timeout, "action")?.as_str() {
            "pong" => Ok(()),
            _ => Err(Error::Relay("unexpected response to ping".into())),
        }
    }

    /// Clears the app's screen
    pub fn send_clear(&self) -> Result<(), Error> {
        self.push(json!({"action": "clear"}))
    }

    /// Forwards an encrypted xpub echo so the app can show an address
    pub fn send_xpub_echo(&self, echo: &str, typ: &str) -> Result<(), Error> {
        self.push(json!({"echo": echo, "type": typ}))
    }

    /// Forwards an encrypted signing echo so the app can show the transaction
    pub fn send_signing_echo(
        &self,
        echo: &str,
        coin: &str,
        script_type: &str,
        transaction: &str,
    ) -> Result<(), Error> {
        self.push(json!({
            "echo": echo,
            "coin": coin,
            "inputAndChangeType": script_type,
            "tx": transaction,
        }))
    }

    /// Waits for the signing PIN the user confirms on the app, or `"abort"`
    pub fn wait_for_signing_pin(&self, timeout: Duration) -> Result<String, Error> {
        self.wait_for_value(timeout, "pin")
    }

    /// Forwards an encrypted random number echo
    pub fn send_random_number_echo(&self, echo: &str) -> Result<(), Error> {
        self.push(json!({ "echo": echo }))
    }

    /// Waits until the app cleared the random number
    pub fn wait_for_random_number_clear(&self, timeout: Duration) -> Result<(), Error> {
        match self.wait_for_value(timeout, "random")?.as_str() {
            "clear" => Ok(()),
            _ => Err(Error::Relay("unexpected response for random".into())),
        }
    }
}
