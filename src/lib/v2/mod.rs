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

//! # BitBox02
//!
//! A session with one BitBox02 running firmware. Opening a session reads
//! the device's version and product; [`Device::init`] then checks
//! attestation, waits for the user to unlock the device and runs the Noise
//! handshake. After both sides confirmed the channel hash, protobuf queries
//! travel encrypted.
//!
//! There are two locks. The query lock covers the transport and the
//! cipher states for one encrypt/send/receive/decrypt exchange, so that
//! nonces never run out of step. The api lock covers a whole series of
//! queries which must not be interleaved with another caller's, such as
//! the signing protocol.
//!

pub mod antiklepto;
pub mod attestation;
pub mod bootloader;
pub mod btc;
pub mod firmware;
pub mod messages;
pub mod noise;
pub mod query;
pub mod silentpayments;
#[cfg(test)]
pub(crate) mod simulator;
mod system;

use std::sync::{Arc, Mutex};

use prost::Message as _;
use rand::RngCore;

use self::messages::{request, response};
use self::noise::Ciphers;
use self::query::{HwwTransport, SleepInhibitor};
use crate::constants::u2fhid::CMD_HWW;
use crate::constants::v2::{op, PAIRING_REQUIRED, RESPONSE_SUCCESS};
use crate::dongle::{ReadWrite, U2fHid};
use crate::lock;
use crate::{Edition, Error, Event, EventSlot, PairingDatabase, Platform, Product, Status, Version};

pub use self::system::DeviceInfo;

/// Oldest firmware we talk to after pairing
pub const LOWEST_SUPPORTED_FIRMWARE: Version = Version::new(9, 0, 0);
/// First firmware version too new for this library
pub const LOWEST_NON_SUPPORTED_FIRMWARE: Version = Version::new(10, 0, 0);

/// What the device tells about itself before any channel exists
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Info {
    /// Firmware version
    pub version: Version,
    /// Hardware platform
    pub platform: Platform,
    /// Firmware edition
    pub edition: Edition,
    /// Whether the device is already unlocked
    pub unlocked: bool,
}

impl Info {
    /// The product this info describes
    pub fn product(&self) -> Product {
        Product::new(self.platform, self.edition)
    }

    fn decode(reply: &[u8]) -> Result<Info, Error> {
        let (&len, rest) = reply
            .split_first()
            .ok_or_else(|| Error::reply("info", reply))?;
        let len = usize::from(len);
        if rest.len() < len + 3 {
            return Err(Error::reply("info", reply));
        }
        let version = String::from_utf8(rest[..len].to_vec())?.parse()?;
        let platform = match rest[len] {
            0x00 => Platform::BitBox02,
            0x02 => Platform::BitBox02Plus,
            _ => return Err(Error::reply("info platform", reply)),
        };
        let edition = match rest[len + 1] {
            0x00 => Edition::Multi,
            0x01 => Edition::BtcOnly,
            _ => return Err(Error::reply("info edition", reply)),
        };
        Ok(Info {
            version,
            platform,
            edition,
            unlocked: rest[len + 2] == 0x01,
        })
    }
}

/// Reads version and product with the `info` opcode
///
/// This bypasses the query framing so that it works on all firmware.
pub fn read_info<T: ReadWrite>(hid: &mut U2fHid<T>) -> Result<Info, Error> {
    let reply = hid.query(&[op::INFO])?;
    Info::decode(&reply)
}

/// The query-lock half of a session
struct Channel<T> {
    transport: HwwTransport<T>,
    ciphers: Option<Ciphers>,
}

impl<T: ReadWrite> Channel<T> {
    /// Encrypts, sends, receives and decrypts one message
    ///
    /// The ciphers are dropped if anything fails after encrypting, since
    /// the nonces can no longer be in step with the device.
    fn exchange(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        let version = self.transport.version();
        let result = {
            let ciphers = self.ciphers.as_mut().ok_or(Error::HandshakeFirst)?;
            let mut msg = Vec::with_capacity(plaintext.len() + 17);
            if version.at_least(Version::new(4, 0, 0)) {
                msg.push(op::NOISE_MSG);
            }
            msg.extend_from_slice(&ciphers.encrypt(plaintext));
            let transport = &mut self.transport;
            transport.query(&msg).and_then(|reply| {
                let payload = if version.at_least(Version::new(7, 0, 0)) {
                    match reply.split_first() {
                        Some((&RESPONSE_SUCCESS, payload)) => payload,
                        _ => return Err(Error::reply("noise message", &reply)),
                    }
                } else {
                    &reply[..]
                };
                ciphers.decrypt(payload)
            })
        };
        if let Err(ref e) = result {
            log::error!("dropping the noise channel after a failed query: {}", e);
            self.ciphers = None;
        }
        result
    }

    fn handshake_query(&mut self, msg: &[u8]) -> Result<Vec<u8>, Error> {
        if !self.transport.version().at_least(Version::new(7, 0, 0)) {
            return self.transport.query(msg);
        }
        let mut framed = Vec::with_capacity(msg.len() + 1);
        framed.push(op::HER_COMES_HANDSHAKE);
        framed.extend_from_slice(msg);
        let mut reply = self.transport.query(&framed)?;
        if reply.first() != Some(&RESPONSE_SUCCESS) {
            return Err(Error::reply("handshake", &reply));
        }
        Ok(reply.split_off(1))
    }
}

/// Pairing progress of the current channel
#[derive(Default)]
struct Pairing {
    device_pubkey: Option<[u8; 32]>,
    channel_hash: String,
    device_verified: bool,
    app_verified: bool,
}

/// A BitBox02 session
pub struct Device<T> {
    id: String,
    version: Version,
    product: Product,
    db: Arc<PairingDatabase>,
    events: EventSlot,
    attestation_roots: &'static [attestation::RootKey],
    api_lock: Mutex<()>,
    channel: Mutex<Channel<T>>,
    pairing: Mutex<Pairing>,
    status: Mutex<Status>,
    attestation: Mutex<Option<bool>>,
}

impl<T: ReadWrite> Device<T> {
    /// Opens a session on a device in firmware mode
    ///
    /// `id` names the device in log messages.
    pub fn open<S: Into<String>>(id: S, dev: T, db: Arc<PairingDatabase>) -> Result<Self, Error> {
        let mut hid = U2fHid::new(dev, CMD_HWW);
        let info = read_info(&mut hid)?;
        Ok(Device::new(id, hid, info.version, info.product(), db))
    }

    /// Creates a session for a device whose version and product are known
    pub fn new<S: Into<String>>(
        id: S,
        hid: U2fHid<T>,
        version: Version,
        product: Product,
        db: Arc<PairingDatabase>,
    ) -> Self {
        let id = id.into();
        log::info!("{}: bitbox02 {} running firmware {}", id, product, version);
        Device {
            id,
            version,
            product,
            db,
            events: EventSlot::new(),
            attestation_roots: &attestation::ROOT_KEYS,
            api_lock: Mutex::new(()),
            channel: Mutex::new(Channel {
                transport: HwwTransport::new(hid, version),
                ciphers: None,
            }),
            pairing: Mutex::new(Pairing::default()),
            status: Mutex::new(Status::Connected),
            attestation: Mutex::new(None),
        }
    }

    #[cfg(test)]
    pub(crate) fn set_attestation_roots(&mut self, roots: &'static [attestation::RootKey]) {
        self.attestation_roots = roots;
    }

    /// Installs a power-management hook used during long-running queries
    pub fn set_sleep_inhibitor(&self, inhibitor: Arc<dyn SleepInhibitor>) {
        lock(&self.channel).transport.set_sleep_inhibitor(inhibitor);
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

    /// Product
    pub fn product(&self) -> Product {
        self.product
    }

    /// Current session status
    pub fn status(&self) -> Status {
        *lock(&self.status)
    }

    /// Result of the attestation check, once it ran
    pub fn attestation(&self) -> Option<bool> {
        *lock(&self.attestation)
    }

    /// The channel hash to show the user, and whether the device confirmed it
    pub fn channel_hash(&self) -> (String, bool) {
        let pairing = lock(&self.pairing);
        (pairing.channel_hash.clone(), pairing.device_verified)
    }

    /// Closes the device handle
    pub fn close(&self) {
        let mut channel = lock(&self.channel);
        channel.ciphers = None;
        channel.transport.close();
    }

    fn set_status(&self, status: Status) {
        let old = {
            let mut current = lock(&self.status);
            let old = *current;
            *current = status;
            old
        };
        log::info!("{}: status {:?} -> {:?}", self.id, old, status);
        self.events.fire(Event::StatusChanged(status));
        if status == Status::Initialized && old != Status::Initialized {
            self.events.fire(Event::KeystoreAvailable);
        } else if old == Status::Initialized && status != Status::Initialized {
            self.events.fire(Event::KeystoreGone);
        }
    }

    /// Runs a series of queries without interleaving other callers' queries
    pub fn atomic_queries<R, F>(&self, run: F) -> Result<R, Error>
    where
        F: FnOnce(&Self) -> Result<R, Error>,
    {
        let _api = lock(&self.api_lock);
        run(self)
    }

    /// Sends one request over the Noise channel
    ///
    /// Callers running multi-step protocols hold the api lock through
    /// [`Device::atomic_queries`].
    pub(crate) fn non_atomic_query(
        &self,
        request: request::Request,
    ) -> Result<response::Response, Error> {
        let mut channel = lock(&self.channel);
        {
            let pairing = lock(&self.pairing);
            if channel.ciphers.is_none() || !pairing.device_verified || !pairing.app_verified {
                return match self.status() {
                    Status::Connected => Err(Error::HandshakeFirst),
                    status => Err(Error::State(status)),
                };
            }
        }
        let plaintext = messages::Request {
            request: Some(request),
        }
        .encode_to_vec();
        let decrypted = channel.exchange(&plaintext)?;
        drop(channel);

        match messages::Response::decode(&decrypted[..])?.response {
            Some(response::Response::Error(messages::Error { code, message })) => {
                log::debug!("{}: device error {}: {}", self.id, code, message);
                Err(Error::Device {
                    code: i64::from(code),
                    message,
                })
            }
            Some(response) => Ok(response),
            None => Err(Error::reply("protobuf response", &decrypted)),
        }
    }

    /// Sends one request, holding the api lock
    pub(crate) fn query(&self, request: request::Request) -> Result<response::Response, Error> {
        self.atomic_queries(|device| device.non_atomic_query(request))
    }

    /// Runs the connection workflow: version check, attestation, unlock
    /// and pairing
    ///
    /// Blocks while the device waits for the user to enter the password
    /// and to confirm the pairing code.
    pub fn init(&self) -> Result<(), Error> {
        let _api = lock(&self.api_lock);
        *lock(&self.pairing) = Pairing::default();
        lock(&self.channel).ciphers = None;
        *lock(&self.attestation) = None;
        self.set_status(Status::Connected);

        if self.version.at_least(LOWEST_NON_SUPPORTED_FIRMWARE) {
            self.set_status(Status::RequireAppUpgrade);
            return Ok(());
        }

        if self.version.at_least(Version::new(2, 0, 0)) {
            let attested = self.perform_attestation()?;
            log::info!("{}: attestation check result: {}", self.id, attested);
            *lock(&self.attestation) = Some(attested);
            self.events.fire(Event::AttestationCheckDone(attested));

            let reply = lock(&self.channel).transport.query(&[op::UNLOCK])?;
            if reply.first() != Some(&RESPONSE_SUCCESS) {
                log::warn!("{}: unexpected unlock reply {:02x?}", self.id, reply);
            }
        } else {
            *lock(&self.attestation) = Some(true);
        }
        self.pair()
    }

    fn perform_attestation(&self) -> Result<bool, Error> {
        let mut challenge = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut challenge);
        let mut msg = Vec::with_capacity(33);
        msg.push(op::ATTESTATION);
        msg.extend_from_slice(&challenge);
        let reply = lock(&self.channel).transport.query(&msg)?;
        Ok(attestation::verify(&challenge, &reply, self.attestation_roots))
    }

    fn app_keypair(&self) -> crate::pairing_db::AppKeypair {
        if let Some(keypair) = self.db.app_static_keypair() {
            return keypair;
        }
        let keypair = noise::generate_keypair();
        log::info!("{}: noise static keypair created", self.id);
        if let Err(e) = self.db.set_app_static_keypair(&keypair) {
            log::error!("could not store app noise static keypair: {}", e);
        }
        keypair
    }

    fn pair(&self) -> Result<(), Error> {
        let keypair = self.app_keypair();
        let mut handshake = noise::initiator(&keypair);

        let mut channel = lock(&self.channel);
        let reply = channel.transport.query(&[op::I_CAN_HAS_HANDSHAKE])?;
        if reply != [RESPONSE_SUCCESS] {
            return Err(Error::reply("handshake request", &reply));
        }
        let msg = noise::write_message(&mut handshake)?;
        let reply = channel.handshake_query(&msg)?;
        noise::read_message(&mut handshake, &reply)?;
        let msg = noise::write_message(&mut handshake)?;
        let reply = channel.handshake_query(&msg)?;

        let device_pubkey = handshake
            .get_rs()
            .ok_or_else(|| Error::Noise("device sent no static key".into()))?;
        channel.ciphers = Some(Ciphers::from_handshake(&handshake)?);
        lock(&self.pairing).device_pubkey = Some(device_pubkey);

        let required_by_app = !self.db.contains_device_static_pubkey(&device_pubkey);
        let required_by_device = reply == [PAIRING_REQUIRED];
        if !required_by_app && !required_by_device {
            lock(&self.pairing).device_verified = true;
            drop(channel);
            return self.finish_pairing(true);
        }

        log::info!(
            "{}: pairing required, by device: {}, by app: {}",
            self.id,
            required_by_device,
            required_by_app
        );
        lock(&self.pairing).channel_hash = noise::format_channel_hash(handshake.get_hash());
        self.events.fire(Event::ChannelHashChanged);
        self.set_status(Status::Unpaired);

        let reply = channel.transport.query(&[op::I_CAN_HAS_PAIRIN_VERIFICASHUN])?;
        if reply == [RESPONSE_SUCCESS] {
            lock(&self.pairing).device_verified = true;
            drop(channel);
            self.events.fire(Event::ChannelHashChanged);
        } else {
            channel.ciphers = None;
            drop(channel);
            lock(&self.pairing).channel_hash.clear();
            self.set_status(Status::PairingFailed);
        }
        Ok(())
    }

    /// Records the user's comparison of the channel hash
    ///
    /// Confirming has no effect until the device confirmed as well. Once
    /// both did, the device is trusted from now on and the status moves on
    /// according to the firmware version and seed state. Rejecting drops
    /// the channel.
    pub fn channel_hash_verify(&self, ok: bool) -> Result<(), Error> {
        let _api = lock(&self.api_lock);
        self.finish_pairing(ok)
    }

    fn finish_pairing(&self, ok: bool) -> Result<(), Error> {
        log::info!("{}: channel hash verified by app: {}", self.id, ok);
        let device_pubkey = {
            let mut pairing = lock(&self.pairing);
            if ok && !pairing.device_verified {
                return Ok(());
            }
            pairing.app_verified = ok;
            if !ok {
                pairing.device_verified = false;
            }
            pairing.device_pubkey
        };
        if !ok {
            lock(&self.channel).ciphers = None;
            self.set_status(Status::PairingFailed);
            return Ok(());
        }

        if let Some(pubkey) = device_pubkey {
            if let Err(e) = self.db.add_device_static_pubkey(&pubkey) {
                log::error!("could not persist the device pairing: {}", e);
            }
        }
        if !self.version.at_least(LOWEST_SUPPORTED_FIRMWARE) {
            self.set_status(Status::RequireFirmwareUpgrade);
            return Ok(());
        }
        let info = self.non_atomic_device_info()?;
        self.set_status(if info.initialized {
            Status::Initialized
        } else {
            Status::Uninitialized
        });
        Ok(())
    }

    /// Fails unless a feature introduced in `required` is available
    pub(crate) fn require_version(&self, feature: &'static str, required: Version) -> Result<(), Error> {
        if self.version.at_least(required) {
            Ok(())
        } else {
            Err(Error::FirmwareTooOld { feature, required })
        }
    }
}
