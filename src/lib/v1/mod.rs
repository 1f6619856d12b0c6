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

//! # Digital BitBox
//!
//! A session with one legacy Digital BitBox running firmware. Opening a
//! session pings the device to learn whether a PIN is set; the user then
//! either sets a PIN on a fresh device or logs in. The host caches the PIN
//! for the lifetime of the session since every further command is
//! encrypted under keys derived from it.
//!
//! Status is derived from three facts: whether the device has a PIN
//! (`initialized`), whether we know it (logged in) and whether a wallet
//! exists (`seeded`).
//!

mod backup;
pub mod bootloader;
pub mod comm;
pub mod messages;
mod pairing;
pub mod relay;
mod sign;
#[cfg(test)]
pub(crate) mod simulator;

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use miniscript::bitcoin::bip32;
use regex::Regex;
use serde_json::{json, Value};
use zeroize::Zeroizing;

use self::comm::Comm;
use self::messages::{DeviceInfoReply, LockReply, NameReply, Ping, RandomReply, XPubReply, SUCCESS};
use self::relay::{Channel, RelayServer};
use crate::constants::v1::error::{INITIALIZING, PIN_INCORRECT, REPLACE_PIN_FAILED, TOUCH_TIMEOUT};
use crate::constants::v1::relay::PING_INTERVAL_SECS;
use crate::constants::v1::{PING_ATTEMPTS, PING_RETRY_MS};
use crate::dongle::ReadWrite;
use crate::policy::validate_device_name;
use crate::{lock, Error, Event, EventSlot, PasswordPolicy, Status, Version};

pub use self::backup::{stretch_key, BackupEntry};
pub use self::messages::{DeviceInfo, FeatureSet};
pub use self::sign::{Signature, TxProposal};

/// Oldest firmware we talk to once logged in
pub const LOWEST_SUPPORTED_FIRMWARE: Version = Version::new(7, 0, 4);
/// First firmware version too new for this library
pub const LOWEST_NON_SUPPORTED_FIRMWARE: Version = Version::new(8, 0, 0);

/// Session settings
#[derive(Clone)]
pub struct Config {
    /// Policy for device PINs
    pub pin_policy: PasswordPolicy,
    /// Policy for backup recovery passwords
    pub recovery_password_policy: PasswordPolicy,
    /// Where the mobile channel is stored; `None` keeps it in memory only
    pub channel_dir: Option<PathBuf>,
    /// Relay used to reach the paired mobile; `None` disables mobile pairing
    pub relay: Option<Arc<dyn RelayServer>>,
    /// How often to ping the paired mobile; `None` disables the pings
    pub mobile_ping_interval: Option<Duration>,
}

#[cfg(feature = "relay")]
fn default_relay() -> Option<Arc<dyn RelayServer>> {
    Some(Arc::new(relay::HttpServer::default()))
}

#[cfg(not(feature = "relay"))]
fn default_relay() -> Option<Arc<dyn RelayServer>> {
    None
}

impl Config {
    fn with_policy(policy: PasswordPolicy) -> Config {
        Config {
            pin_policy: policy.clone(),
            recovery_password_policy: policy,
            channel_dir: home::home_dir().map(|home| home.join(crate::constants::CONFIG_DIR)),
            relay: default_relay(),
            mobile_ping_interval: Some(Duration::from_secs(PING_INTERVAL_SECS)),
        }
    }

    /// Settings for real use
    pub fn production() -> Config {
        Config::with_policy(PasswordPolicy::production())
    }

    /// Settings for testnet use, with relaxed password policies
    pub fn testing() -> Config {
        Config::with_policy(PasswordPolicy::testing())
    }
}

impl Default for Config {
    fn default() -> Self {
        Config::production()
    }
}

/// What the host knows about the device
#[derive(Default)]
struct State {
    /// The device has a PIN
    initialized: bool,
    /// The PIN, once the user logged in
    pin: Option<Zeroizing<String>>,
    /// A wallet exists
    seeded: bool,
}

/// Status from what the host knows
///
/// Once a PIN is set, firmware below 7.0.4 needs an upgrade before the
/// session can be used, and 8.0.0 or later needs a newer library.
fn derive_status(version: Version, state: &State) -> Status {
    if state.seeded || state.pin.is_some() {
        if !version.at_least(LOWEST_SUPPORTED_FIRMWARE) {
            return Status::RequireFirmwareUpgrade;
        }
        if version.at_least(LOWEST_NON_SUPPORTED_FIRMWARE) {
            return Status::RequireAppUpgrade;
        }
    }
    if state.seeded {
        Status::Seeded
    } else if state.pin.is_some() {
        Status::LoggedIn
    } else if state.initialized {
        Status::Initialized
    } else {
        Status::Uninitialized
    }
}

/// Why a login attempt failed, as far as the device tells
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoginFailure {
    /// The next attempt must be confirmed with a long touch
    pub needs_long_touch: bool,
    /// Attempts left before the device wipes itself
    pub remaining_attempts: Option<u32>,
}

impl LoginFailure {
    /// Reads the failure details out of a device error
    pub fn from_error(error: &Error) -> Option<LoginFailure> {
        let message = match *error {
            Error::Device { ref message, .. } => message,
            _ => return None,
        };
        let re = Regex::new(r"(\d+) attempts remain before").expect("static regex");
        Some(LoginFailure {
            needs_long_touch: message.contains("next"),
            remaining_attempts: re
                .captures(message)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse().ok()),
        })
    }
}

/// Source of random numbers on the device
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RandomKind {
    /// Hardware random number generator
    True,
    /// Pseudo random number generator
    Pseudo,
}

impl RandomKind {
    fn as_str(self) -> &'static str {
        match self {
            RandomKind::True => "true",
            RandomKind::Pseudo => "pseudo",
        }
    }
}

/// A Digital BitBox session
pub struct Device<T> {
    id: String,
    version: Version,
    config: Config,
    events: EventSlot,
    api_lock: Mutex<()>,
    comm: Mutex<Comm<T>>,
    state: Mutex<State>,
    mobile: Arc<Mutex<Option<Arc<Channel>>>>,
    closed: Arc<AtomicBool>,
}

impl<T: ReadWrite> Device<T> {
    /// Opens a session on a device in firmware mode
    ///
    /// `version` comes from the USB serial number. Blocks while the device
    /// finishes booting.
    pub fn open<S: Into<String>>(id: S, dev: T, version: Version, config: Config) -> Result<Self, Error> {
        let id = id.into();
        log::info!("{}: digital bitbox running firmware {}", id, version);
        let device = Device {
            comm: Mutex::new(Comm::new(id.clone(), dev, version)),
            id,
            version,
            config,
            events: EventSlot::new(),
            api_lock: Mutex::new(()),
            state: Mutex::new(State::default()),
            mobile: Arc::new(Mutex::new(None)),
            closed: Arc::new(AtomicBool::new(false)),
        };

        if !version.at_least(Version::new(3, 0, 0)) {
            // commands sent too early run into the PIN retry check
            thread::sleep(Duration::from_secs(1));
        }
        let mut attempt = 0;
        let initialized = loop {
            attempt += 1;
            match device.ping() {
                Ok(initialized) => break initialized,
                Err(ref e) if e.is_code(INITIALIZING) && attempt < PING_ATTEMPTS => {
                    log::debug!("{}: device still booting", device.id);
                    thread::sleep(Duration::from_millis(PING_RETRY_MS));
                }
                Err(e) => return Err(e),
            }
        };
        log::debug!("{}: initialized: {}", device.id, initialized);
        lock(&device.state).initialized = initialized;

        if let (Some(dir), Some(server)) = (&device.config.channel_dir, &device.config.relay) {
            match Channel::load(dir, server.clone()) {
                Ok(Some(channel)) => {
                    log::info!("{}: found mobile channel {}", device.id, channel.id());
                    let channel = Arc::new(channel);
                    *lock(&device.mobile) = Some(channel.clone());
                    device.spawn_mobile_listener(channel);
                }
                Ok(None) => {}
                Err(e) => log::warn!("{}: could not load the mobile channel: {}", device.id, e),
            }
        }
        Ok(device)
    }

    /// The slot to install an event handler into
    pub fn events(&self) -> &EventSlot {
        &self.events
    }

    /// Identifier given at open
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Firmware version
    pub fn version(&self) -> Version {
        self.version
    }

    /// Current session status
    pub fn status(&self) -> Status {
        derive_status(self.version, &lock(&self.state))
    }

    /// Closes the device handle and stops talking to the mobile
    pub fn close(&self) {
        log::debug!("{}: closing", self.id);
        self.closed.store(true, Ordering::SeqCst);
        lock(&self.comm).close();
    }

    fn status_changed(&self) {
        let status = self.status();
        log::info!("{}: status {:?}", self.id, status);
        self.events.fire(Event::StatusChanged(status));
        match status {
            Status::Seeded => self.events.fire(Event::KeystoreAvailable),
            Status::Uninitialized => self.events.fire(Event::KeystoreGone),
            _ => {}
        }
    }

    /// Runs a series of commands without interleaving other callers' commands
    pub fn atomic_queries<R, F>(&self, run: F) -> Result<R, Error>
    where
        F: FnOnce(&Self) -> Result<R, Error>,
    {
        let _api = lock(&self.api_lock);
        run(self)
    }

    fn pin(&self) -> Result<Zeroizing<String>, Error> {
        let state = lock(&self.state);
        match state.pin {
            Some(ref pin) => Ok(pin.clone()),
            None => Err(Error::State(derive_status(self.version, &state))),
        }
    }

    fn send_with_pin(&self, command: &Value, pin: &str) -> Result<Value, Error> {
        lock(&self.comm).send_encrypt(&command.to_string(), pin)
    }

    /// Sends one encrypted command under the cached PIN
    pub(crate) fn non_atomic_send(&self, command: Value) -> Result<Value, Error> {
        let pin = self.pin()?;
        self.send_with_pin(&command, &pin)
    }

    fn send(&self, command: Value) -> Result<Value, Error> {
        self.atomic_queries(|device| device.non_atomic_send(command))
    }

    /// Whether the device has a PIN set
    pub fn ping(&self) -> Result<bool, Error> {
        let reply = lock(&self.comm).send_plain(&json!({"ping": ""}).to_string())?;
        let ping: Ping = messages::parse("ping", reply)?;
        Ok(ping.ping == "password")
    }

    fn device_info_with_pin(&self, pin: &str) -> Result<DeviceInfo, Error> {
        let reply = self.send_with_pin(&json!({"device": "info"}), pin)?;
        Ok(messages::parse::<DeviceInfoReply>("device info", reply)?.device)
    }

    pub(crate) fn non_atomic_device_info(&self) -> Result<DeviceInfo, Error> {
        let pin = self.pin()?;
        self.device_info_with_pin(&pin)
    }

    /// Retrieves name, seed state and settings
    pub fn device_info(&self) -> Result<DeviceInfo, Error> {
        self.atomic_queries(|device| device.non_atomic_device_info())
    }

    /// Whether an SD card is inserted
    pub fn check_sd_card(&self) -> Result<bool, Error> {
        Ok(self.device_info()?.sdcard)
    }

    /// Sets the PIN of a fresh device
    pub fn set_password(&self, pin: &str) -> Result<(), Error> {
        let _api = lock(&self.api_lock);
        self.config.pin_policy.validate(pin)?;
        let status = self.status();
        if status != Status::Uninitialized {
            return Err(Error::State(status));
        }
        let reply = lock(&self.comm).send_plain(&json!({ "password": pin }).to_string())?;
        messages::expect_str("set password", &reply, "password", SUCCESS)?;
        log::debug!("{}: PIN set", self.id);
        {
            let mut state = lock(&self.state);
            state.initialized = true;
            state.pin = Some(Zeroizing::new(pin.to_owned()));
        }
        self.status_changed();
        Ok(())
    }

    /// Replaces the PIN; `old_pin` must be the one we logged in with
    pub fn change_password(&self, old_pin: &str, new_pin: &str) -> Result<(), Error> {
        let _api = lock(&self.api_lock);
        self.config.pin_policy.validate(new_pin)?;
        let pin = self.pin()?;
        if *pin != old_pin {
            return Err(Error::Device {
                code: PIN_INCORRECT,
                message: "current PIN incorrect".into(),
            });
        }
        let reply = match self.send_with_pin(&json!({ "password": new_pin }), &pin) {
            Ok(reply) => reply,
            Err(e) => {
                log::error!("{}: replacing the PIN failed: {}", self.id, e);
                return Err(Error::Device {
                    code: REPLACE_PIN_FAILED,
                    message: "failed to replace PIN".into(),
                });
            }
        };
        messages::expect_str("change password", &reply, "password", SUCCESS)?;
        log::debug!("{}: PIN replaced", self.id);
        lock(&self.state).pin = Some(Zeroizing::new(new_pin.to_owned()));
        self.status_changed();
        Ok(())
    }

    /// Validates the PIN and caches it for the session
    ///
    /// On a wrong PIN, [`LoginFailure::from_error`] tells how many attempts
    /// remain. Locks the bootloader if it was left unlocked.
    pub fn login(&self, pin: &str) -> Result<(), Error> {
        let _api = lock(&self.api_lock);
        if !lock(&self.state).initialized {
            return Err(Error::State(self.status()));
        }
        let info = match self.device_info_with_pin(pin) {
            Ok(info) => info,
            Err(e) => {
                if let Some(failure) = LoginFailure::from_error(&e) {
                    log::debug!("{}: login failed: {:?}", self.id, failure);
                    if failure.needs_long_touch && failure.remaining_attempts == Some(0) {
                        // the device may have wiped itself
                        if let Ok(false) = self.ping() {
                            log::warn!("{}: device was reset after too many attempts", self.id);
                            *lock(&self.state) = State::default();
                            self.status_changed();
                        }
                    }
                }
                return Err(e);
            }
        };
        {
            let mut state = lock(&self.state);
            state.pin = Some(Zeroizing::new(pin.to_owned()));
            state.seeded = info.seeded;
        }
        self.status_changed();
        log::debug!("{}: logged in", self.id);
        if !info.bootlock {
            log::debug!("{}: bootloader is unlocked; locking now", self.id);
            self.non_atomic_lock_bootloader()?;
        }
        Ok(())
    }

    pub(crate) fn non_atomic_set_name(&self, name: &str) -> Result<(), Error> {
        validate_device_name(name)?;
        let reply = self.non_atomic_send(json!({ "name": name }))?;
        let reply: NameReply = messages::parse("set name", reply)?;
        if reply.name != name {
            return Err(Error::reply("set name", reply.name.as_bytes()));
        }
        Ok(())
    }

    /// Sets the device name
    pub fn set_name(&self, name: &str) -> Result<(), Error> {
        self.atomic_queries(|device| device.non_atomic_set_name(name))
    }

    /// Flashes the LED
    pub fn blink(&self) -> Result<(), Error> {
        self.send(json!({"led": "blink"}))?;
        Ok(())
    }

    /// Wipes the device. Returns false if the user aborted.
    pub fn reset(&self, pin: &str) -> Result<bool, Error> {
        let _api = lock(&self.api_lock);
        let cached = self.pin()?;
        if *cached != pin {
            return Err(Error::Device {
                code: PIN_INCORRECT,
                message: "current PIN incorrect".into(),
            });
        }
        let reply = match self.non_atomic_send(json!({"reset": "__ERASE__"})) {
            Err(ref e) if is_abort(e) => return Ok(false),
            other => other?,
        };
        messages::expect_str("reset", &reply, "reset", SUCCESS)?;
        log::info!("{}: device reset", self.id);
        *lock(&self.state) = State::default();
        self.status_changed();
        Ok(true)
    }

    fn non_atomic_xpub(&self, path: &str) -> Result<(bip32::ExtendedPubKey, Option<String>), Error> {
        let reply = self.non_atomic_send(json!({ "xpub": path }))?;
        let reply: XPubReply = messages::parse("xpub", reply)?;
        let xpub = bip32::ExtendedPubKey::from_str(&reply.xpub)
            .map_err(|_| Error::reply("xpub", reply.xpub.as_bytes()))?;
        Ok((xpub, reply.echo))
    }

    /// The extended public key at `path`
    ///
    /// The device is asked twice and both answers must agree.
    pub fn xpub(&self, path: &bip32::DerivationPath) -> Result<bip32::ExtendedPubKey, Error> {
        let path = path.to_string();
        log::info!("{}: xpub at {}", self.id, path);
        self.atomic_queries(|device| {
            let (first, _) = device.non_atomic_xpub(&path)?;
            let (second, _) = device.non_atomic_xpub(&path)?;
            if first != second {
                log::error!("{}: inconsistent xpubs at {}", device.id, path);
                return Err(Error::Critical("the device returned inconsistent xpubs"));
            }
            Ok(first)
        })
    }

    /// Shows the address at `path` on the paired mobile
    ///
    /// Does nothing without a mobile channel. `typ` names the address type
    /// the app should derive.
    pub fn display_address(&self, path: &bip32::DerivationPath, typ: &str) -> Result<(), Error> {
        let channel = match self.mobile_channel() {
            Some(channel) => channel,
            None => {
                log::debug!("{}: no mobile paired, not displaying the address", self.id);
                return Ok(());
            }
        };
        let (_, echo) = self.atomic_queries(|device| device.non_atomic_xpub(&path.to_string()))?;
        let echo = echo.ok_or(Error::Unsupported("xpub reply without echo"))?;
        channel.send_xpub_echo(&echo, typ)
    }

    /// 16 random bytes, hex-encoded
    ///
    /// With a paired mobile, the echo is forwarded so the user can compare.
    pub fn random(&self, kind: RandomKind) -> Result<String, Error> {
        let reply = self.send(json!({ "random": kind.as_str() }))?;
        let reply: RandomReply = messages::parse("random", reply)?;
        if reply.random.len() != 32 || hex::decode(&reply.random).is_err() {
            return Err(Error::reply("random", reply.random.as_bytes()));
        }
        if let Some(channel) = self.mobile_channel() {
            let echo = reply.echo.ok_or(Error::Unsupported("random reply without echo"))?;
            channel.send_random_number_echo(&echo)?;
        }
        Ok(reply.random)
    }

    /// Unlocks the bootloader. Returns false if the user aborted.
    pub fn unlock_bootloader(&self) -> Result<bool, Error> {
        let reply = match self.send(json!({"bootloader": "unlock"})) {
            Err(ref e) if is_abort(e) => return Ok(false),
            other => other?,
        };
        messages::expect_str("unlock bootloader", &reply, "bootloader", "unlock")?;
        Ok(true)
    }

    fn non_atomic_lock_bootloader(&self) -> Result<(), Error> {
        let reply = self.non_atomic_send(json!({"bootloader": "lock"}))?;
        messages::expect_str("lock bootloader", &reply, "bootloader", "lock")
    }

    /// Locks the bootloader
    pub fn lock_bootloader(&self) -> Result<(), Error> {
        log::info!("{}: locking bootloader", self.id);
        self.atomic_queries(|device| device.non_atomic_lock_bootloader())
    }

    /// Locks the device for two-factor authentication with the paired
    /// mobile. Returns false if the user aborted.
    pub fn lock_device(&self) -> Result<bool, Error> {
        let reply = match self.send(json!({"device": "lock"})) {
            Err(ref e) if is_abort(e) => return Ok(false),
            other => other?,
        };
        let reply: LockReply = messages::parse("lock", reply)?;
        if !reply.device.lock {
            return Err(Error::reply("lock", b"device not locked"));
        }
        Ok(true)
    }

    pub(crate) fn non_atomic_feature_set(&self, features: &FeatureSet) -> Result<(), Error> {
        let reply = self.non_atomic_send(json!({ "feature_set": features }))?;
        messages::expect_str("feature set", &reply, "feature_set", SUCCESS)
    }

    /// Toggles device features
    pub fn feature_set(&self, features: &FeatureSet) -> Result<(), Error> {
        self.atomic_queries(|device| device.non_atomic_feature_set(features))
    }

    /// Whether a mobile is paired
    pub fn has_mobile_channel(&self) -> bool {
        self.mobile_channel().is_some()
    }

    pub(crate) fn mobile_channel(&self) -> Option<Arc<Channel>> {
        lock(&self.mobile).clone()
    }
}

/// Whether the user aborted or let the touch button time out
pub(crate) fn is_abort(e: &Error) -> bool {
    e.is_user_abort() || e.is_code(TOUCH_TIMEOUT)
}
