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

//! In-memory Digital BitBox firmware for tests
//!
//! Speaks the plain and PIN-encrypted JSON protocol, counts failed logins
//! the way the device does and keeps an SD card of backup files. State
//! survives across sessions, so a test can reconnect to the same simulated
//! device.

use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use base64::Engine as _;
use miniscript::bitcoin::bip32::{ChildNumber, DerivationPath, ExtendedPrivKey, ExtendedPubKey};
use miniscript::bitcoin::secp256k1::{Message, Secp256k1};
use miniscript::bitcoin::Network;
use rand::RngCore;
use serde_json::{json, Value};

use super::comm::Keys;
use super::{Config, Device};
use crate::constants::u2fhid::CMD_HWW;
use crate::constants::v1::error::*;
use crate::dongle::mock::{MockDevice, Responder};
use crate::{PasswordPolicy, Version};

const SEED: [u8; 32] = [0x42; 32];
const MAX_ATTEMPTS: u32 = 15;
const LONG_TOUCH_AFTER: u32 = 10;
const DEFAULT_NAME: &str = "Digital Bitbox";

#[derive(Default)]
struct State {
    version: Version,
    pin: Option<String>,
    failed: u32,
    bootlock: bool,
    name: String,
    sdcard: bool,
    seeded: bool,
    /// Stretched recovery password of the current wallet
    seed_key: Option<String>,
    /// Files on the SD card with the key they were written with
    backups: Vec<(String, Option<String>)>,
    new_hidden_wallet: bool,
    pairing: bool,
    locked: bool,

    booting: usize,
    abort_next: bool,
    abort_next_ecdh: bool,
    fail_ecdh_pubkey: bool,
    flaky_xpub: bool,
    xpub_queries: usize,
    fail_backup_list: bool,

    sign_pending: Option<Vec<(String, String)>>,
    sign_rounds: Vec<usize>,
    ecdh_challenges: usize,

    plain_requests: Vec<Value>,
    commands: Vec<Value>,
}

/// Handle to a simulated device; clones share the device
#[derive(Clone)]
pub struct Simulator {
    state: Arc<Mutex<State>>,
}

/// Session settings for tests: relaxed policies, nothing on disk, no relay
pub fn config() -> Config {
    Config {
        pin_policy: PasswordPolicy::testing(),
        recovery_password_policy: PasswordPolicy::testing(),
        channel_dir: None,
        relay: None,
        mobile_ping_interval: None,
    }
}

/// Opens a session on the simulator with the given settings
pub fn open_with(sim: &Simulator, config: Config) -> Device<MockDevice> {
    let version = sim.lock().version;
    let dev = MockDevice::u2f_with(CMD_HWW, sim.clone());
    Device::open("simulator", dev, version, config).unwrap()
}

/// Opens a session on the simulator
pub fn open(sim: &Simulator) -> Device<MockDevice> {
    open_with(sim, config())
}

fn error(code: i64, message: &str) -> Value {
    json!({"error": {"code": code, "message": message}})
}

fn random_hex(n: usize) -> String {
    let mut bytes = vec![0; n];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn master() -> ExtendedPrivKey {
    ExtendedPrivKey::new_master(Network::Bitcoin, &SEED).unwrap()
}

impl Simulator {
    /// A fresh device without PIN running firmware `version`
    pub fn new(version: Version) -> Self {
        Simulator {
            state: Arc::new(Mutex::new(State {
                version,
                bootlock: true,
                name: DEFAULT_NAME.into(),
                ..Default::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<State> {
        self.state.lock().unwrap()
    }

    pub fn pin(&self) -> Option<String> {
        self.lock().pin.clone()
    }

    /// Sets a PIN, as if a previous session had
    pub fn set_pin(&self, pin: &str) {
        self.lock().pin = Some(pin.to_owned());
    }

    pub fn bootlock(&self) -> bool {
        self.lock().bootlock
    }

    pub fn set_bootlock(&self, locked: bool) {
        self.lock().bootlock = locked;
    }

    pub fn set_failed_attempts(&self, failed: u32) {
        self.lock().failed = failed;
    }

    /// Answers the next encrypted command as if the user aborted
    pub fn abort_next_request(&self) {
        self.lock().abort_next = true;
    }

    /// Answers the next `hash_pubkey` round as if the user aborted
    pub fn abort_next_ecdh(&self) {
        self.lock().abort_next_ecdh = true;
    }

    pub fn fail_ecdh_pubkey(&self, fail: bool) {
        self.lock().fail_ecdh_pubkey = fail;
    }

    /// Makes every second xpub query answer for another path
    pub fn set_flaky_xpub(&self, flaky: bool) {
        self.lock().flaky_xpub = flaky;
    }

    pub fn set_sdcard(&self, inserted: bool) {
        self.lock().sdcard = inserted;
    }

    /// Answers the first `pings` pings with "initializing"
    pub fn set_booting(&self, pings: usize) {
        self.lock().booting = pings;
    }

    pub fn set_paired(&self, paired: bool) {
        self.lock().pairing = paired;
    }

    /// Makes listing backups fail as on firmware without the command
    pub fn fail_backup_list(&self, fail: bool) {
        self.lock().fail_backup_list = fail;
    }

    pub fn name(&self) -> String {
        self.lock().name.clone()
    }

    pub fn seeded(&self) -> bool {
        self.lock().seeded
    }

    pub fn paired(&self) -> bool {
        self.lock().pairing
    }

    /// Puts a foreign file on the SD card
    pub fn add_backup(&self, filename: &str) {
        self.lock().backups.push((filename.to_owned(), None));
    }

    pub fn backups(&self) -> Vec<String> {
        self.lock().backups.iter().map(|(f, _)| f.clone()).collect()
    }

    /// Erases the device but keeps the SD card
    pub fn wipe(&self) {
        self.lock().wipe();
    }

    /// Every decrypted command received
    pub fn commands(&self) -> Vec<Value> {
        self.lock().commands.clone()
    }

    /// Every request received in the clear
    pub fn plain_requests(&self) -> Vec<Value> {
        self.lock().plain_requests.clone()
    }

    /// Number of hashes in each signing round
    pub fn sign_rounds(&self) -> Vec<usize> {
        self.lock().sign_rounds.clone()
    }

    pub fn ecdh_challenges(&self) -> usize {
        self.lock().ecdh_challenges
    }

    /// What the device answers to the app's public key hash
    pub fn ecdh_hash(&self) -> String {
        hex::encode([0xaa; 32])
    }

    /// What the device answers to the app's public key
    pub fn ecdh_pubkey(&self) -> String {
        format!("02{}", hex::encode([0xbb; 32]))
    }

    /// The xpub the device reports at `path`
    pub fn xpub(&self, path: &DerivationPath) -> ExtendedPubKey {
        let secp = Secp256k1::new();
        let xpriv = master().derive_priv(&secp, path).unwrap();
        ExtendedPubKey::from_priv(&secp, &xpriv)
    }
}

impl State {
    fn wipe(&mut self) {
        self.pin = None;
        self.failed = 0;
        self.seeded = false;
        self.seed_key = None;
        self.name = DEFAULT_NAME.into();
        self.new_hidden_wallet = false;
        self.pairing = false;
        self.locked = false;
        self.sign_pending = None;
    }

    fn plain(&mut self, request: &Value) -> Value {
        if request.get("ping").is_some() {
            if self.booting > 0 {
                self.booting -= 1;
                return error(INITIALIZING, "initializing");
            }
            let ping = if self.pin.is_some() { "password" } else { "" };
            return json!({ "ping": ping });
        }
        match request.get("password").and_then(Value::as_str) {
            Some(_) if self.pin.is_some() => error(101, "a password is already set"),
            Some(pin) => {
                self.pin = Some(pin.to_owned());
                self.failed = 0;
                json!({"password": "success"})
            }
            None => error(101, "unknown command"),
        }
    }

    fn login_failed(&mut self) -> Value {
        self.failed += 1;
        let remaining = MAX_ATTEMPTS.saturating_sub(self.failed);
        let mut message = format!(
            "Incorrect password. {} attempts remain before the device is reset.",
            remaining
        );
        if self.failed >= LONG_TOUCH_AFTER {
            message.push_str(" Long-touch the button on the next login.");
        }
        if remaining == 0 {
            self.wipe();
        }
        error(102, &message)
    }

    fn device_info(&self) -> Value {
        json!({"device": {
            "version": format!("v{}", self.version),
            "serial": format!("dbb.fw:v{}", self.version),
            "id": "simulator",
            "TFA": "",
            "bootlock": self.bootlock,
            "name": self.name,
            "sdcard": self.sdcard,
            "lock": self.locked,
            "U2F": true,
            "U2F_hijack": true,
            "seeded": self.seeded,
            "new_hidden_wallet": self.new_hidden_wallet,
            "pairing": self.pairing,
        }})
    }

    fn has_backup(&self, filename: &str, key: &str) -> bool {
        self.backups
            .iter()
            .any(|(f, k)| f == filename && k.as_deref() == Some(key))
    }

    fn seed(&mut self, request: &Value) -> Value {
        if !self.sdcard {
            return error(SD_CARD, "please insert SD card");
        }
        let (source, key, filename) = match (
            request["source"].as_str(),
            request["key"].as_str(),
            request["filename"].as_str(),
        ) {
            (Some(s), Some(k), Some(f)) => (s, k.to_owned(), f.to_owned()),
            _ => return error(101, "invalid seed command"),
        };
        match source {
            "create" => self.backups.push((filename, Some(key.clone()))),
            "backup" if self.has_backup(&filename, &key) => {}
            "backup" => return error(SD_NO_MATCH, "backup does not match"),
            _ => return error(101, "invalid seed source"),
        }
        self.seed_key = Some(key);
        self.seeded = true;
        json!({"seed": "success"})
    }

    fn backup(&mut self, request: &Value) -> Value {
        if request.as_str() == Some("list") {
            if self.fail_backup_list {
                return error(SD_CARD, "could not list backups");
            }
            if !self.sdcard {
                return error(SD_OPEN_DIR, "could not open directory");
            }
            let files: Vec<&String> = self.backups.iter().map(|(f, _)| f).collect();
            return json!({ "backup": files });
        }
        if !self.sdcard {
            return error(SD_CARD, "please insert SD card");
        }
        if let Some(filename) = request["erase"].as_str() {
            let before = self.backups.len();
            self.backups.retain(|(f, _)| f != filename);
            if self.backups.len() == before {
                return error(SD_CARD, "could not erase backup");
            }
            return json!({"backup": "success"});
        }
        let key = match request["key"].as_str() {
            Some(key) => key.to_owned(),
            None => return error(101, "invalid backup command"),
        };
        let matches = self.seed_key.as_deref() == Some(key.as_str());
        if let Some(filename) = request["check"].as_str() {
            if matches && self.has_backup(filename, &key) {
                return json!({"backup": "success"});
            }
            return error(SD_NO_MATCH, "backup does not match");
        }
        if let Some(filename) = request["filename"].as_str() {
            self.backups.push((filename.to_owned(), Some(key)));
            if matches {
                return json!({"backup": "success"});
            }
            return error(SD_NO_MATCH, "backup does not match the wallet");
        }
        error(101, "invalid backup command")
    }

    fn xpub(&mut self, path: &str) -> Value {
        let mut path = match DerivationPath::from_str(path) {
            Ok(path) => path,
            Err(_) => return error(101, "invalid keypath"),
        };
        self.xpub_queries += 1;
        if self.flaky_xpub && self.xpub_queries % 2 == 0 {
            path = path.child(ChildNumber::Normal { index: 0 });
        }
        let secp = Secp256k1::new();
        let xpub = match master().derive_priv(&secp, &path) {
            Ok(xpriv) => ExtendedPubKey::from_priv(&secp, &xpriv),
            Err(_) => return error(101, "invalid keypath"),
        };
        json!({"xpub": xpub.to_string(), "echo": random_hex(16)})
    }

    fn sign(&mut self, request: &Value) -> Value {
        if let Some(data) = request.get("data").and_then(Value::as_array) {
            let pending: Option<Vec<(String, String)>> = data
                .iter()
                .map(|d| Some((d["hash"].as_str()?.to_owned(), d["keypath"].as_str()?.to_owned())))
                .collect();
            return match pending {
                Some(pending) => {
                    self.sign_rounds.push(pending.len());
                    self.sign_pending = Some(pending);
                    json!({"echo": random_hex(16)})
                }
                None => error(101, "invalid sign data"),
            };
        }
        if self.pairing && request.get("pin").is_none() {
            return error(101, "signing pin missing");
        }
        let pending = match self.sign_pending.take() {
            Some(pending) => pending,
            None => return error(101, "nothing to sign"),
        };
        let secp = Secp256k1::new();
        let mut sigs = vec![];
        for (hash, keypath) in pending {
            let signed = hex::decode(&hash).ok().and_then(|hash| {
                let msg = Message::from_slice(&hash).ok()?;
                let path = DerivationPath::from_str(&keypath).ok()?;
                let key = master().derive_priv(&secp, &path).ok()?.private_key;
                Some(secp.sign_ecdsa(&msg, &key).serialize_compact())
            });
            // the host does not check the recovery id
            match signed {
                Some(sig) => sigs.push(json!({"sig": hex::encode(sig), "recid": "00"})),
                None => return error(101, "invalid hash or keypath"),
            }
        }
        json!({ "sign": sigs })
    }

    fn ecdh(&mut self, request: &Value) -> Value {
        if request.get("hash_pubkey").is_some() {
            if self.abort_next_ecdh {
                self.abort_next_ecdh = false;
                return error(TOUCH_ABORT, "aborted by user");
            }
            return json!({"ecdh": {"hash_pubkey": hex::encode([0xaa; 32])}});
        }
        if request.get("pubkey").is_some() {
            if self.fail_ecdh_pubkey {
                return error(101, "invalid pubkey");
            }
            return json!({"ecdh": {"pubkey": format!("02{}", hex::encode([0xbb; 32]))}});
        }
        if request.get("challenge").is_some() {
            self.ecdh_challenges += 1;
            return json!({"ecdh": "success"});
        }
        error(101, "invalid ecdh command")
    }

    /// Answers one decrypted command
    fn handle(&mut self, command: &Value) -> Value {
        let (key, value) = match command.as_object().and_then(|o| o.iter().next()) {
            Some(entry) => entry,
            None => return error(101, "invalid command"),
        };
        match (key.as_str(), value) {
            ("device", v) if v == "info" => self.device_info(),
            ("device", v) if v == "lock" => {
                self.locked = true;
                json!({"device": {"lock": true}})
            }
            ("led", _) => json!({"led": "success"}),
            ("name", v) => {
                self.name = v.as_str().unwrap_or_default().to_owned();
                json!({"name": self.name})
            }
            ("password", v) => {
                self.pin = v.as_str().map(str::to_owned);
                json!({"password": "success"})
            }
            ("seed", v) => self.seed(v),
            ("backup", v) => self.backup(v),
            ("hidden_password", _) => json!({"hidden_password": "success"}),
            ("reset", _) => {
                self.wipe();
                json!({"reset": "success"})
            }
            ("xpub", v) => self.xpub(v.as_str().unwrap_or_default()),
            ("random", _) => json!({"random": random_hex(16), "echo": random_hex(16)}),
            ("bootloader", v) => {
                self.bootlock = v == "lock";
                json!({ "bootloader": v })
            }
            ("feature_set", v) => {
                if let Some(enabled) = v["new_hidden_wallet"].as_bool() {
                    self.new_hidden_wallet = enabled;
                }
                if let Some(enabled) = v["pairing"].as_bool() {
                    self.pairing = enabled;
                }
                json!({"feature_set": "success"})
            }
            ("sign", v) => self.sign(v),
            ("ecdh", v) => self.ecdh(v),
            _ => error(101, "unknown command"),
        }
    }

    fn encrypted(&mut self, request: &[u8]) -> Value {
        let pin = match self.pin.clone() {
            Some(pin) => pin,
            None => return error(101, "please set a password"),
        };
        let keys = Keys::derive(&pin, self.version);
        let command = base64::engine::general_purpose::STANDARD
            .decode(request)
            .ok()
            .and_then(|data| keys.decrypt(&data).ok())
            .and_then(|plaintext| serde_json::from_slice::<Value>(&plaintext).ok());
        let command = match command {
            Some(command) => command,
            None => return self.login_failed(),
        };
        self.failed = 0;
        self.commands.push(command.clone());

        let reply = if self.abort_next {
            self.abort_next = false;
            error(TOUCH_ABORT, "aborted by user")
        } else {
            self.handle(&command)
        };
        let ciphertext = keys.encrypt(reply.to_string().as_bytes());
        json!({ "ciphertext": base64::engine::general_purpose::STANDARD.encode(ciphertext) })
    }
}

impl Responder for Simulator {
    fn respond(&mut self, request: &[u8]) -> Option<Vec<u8>> {
        let mut state = self.lock();
        let reply = match serde_json::from_slice::<Value>(request) {
            Ok(request) if request.is_object() => {
                state.plain_requests.push(request.clone());
                state.plain(&request)
            }
            _ => state.encrypted(request),
        };
        Some(reply.to_string().into_bytes())
    }
}
