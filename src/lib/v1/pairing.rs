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

//! # Mobile Pairing
//!
//! The user scans a code shown by the desktop app with the mobile app,
//! which then runs an ECDH key exchange with the device through the relay.
//! The desktop only forwards: it hands the app's messages to the device and
//! the device's replies back to the app. Once paired, a background thread
//! pings the app to report whether it is reachable.
//!

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::{json, Value};

use super::messages::{self, EcdhReply, FeatureSet};
use super::relay::Channel;
use super::Device;
use crate::constants::v1::relay::*;
use crate::dongle::ReadWrite;
use crate::{lock, Error, Event};

/// How a pairing attempt went wrong, as reported to the application
fn failure_event(e: &Error) -> Event {
    match *e {
        Error::Timeout(_) => Event::PairingTimedout,
        Error::Relay(_) => Event::PairingPullMessageFailed,
        _ => Event::PairingError,
    }
}

/// Pings the app and waits shortly for the pong
fn ping(channel: &Channel) -> bool {
    let pong = channel
        .send_ping()
        .and_then(|_| channel.wait_for_pong(Duration::from_secs(PONG_TIMEOUT_SECS)));
    match pong {
        Ok(()) => true,
        Err(e) => {
            log::debug!("mobile {} did not answer the ping: {}", channel.id(), e);
            false
        }
    }
}

impl<T: ReadWrite> Device<T> {
    fn non_atomic_ecdh(&self, request: Value) -> Result<Value, Error> {
        let reply = self.non_atomic_send(json!({ "ecdh": request }))?;
        Ok(messages::parse::<EcdhReply>("ecdh", reply)?.ecdh)
    }

    /// Hands the hash of the app's public key to the device
    pub fn ecdh_hash_pubkey(&self, hash: &str) -> Result<Value, Error> {
        self.atomic_queries(|device| device.non_atomic_ecdh(json!({ "hash_pubkey": hash })))
    }

    /// Hands the app's public key to the device
    pub fn ecdh_pubkey(&self, pubkey: &str) -> Result<Value, Error> {
        self.atomic_queries(|device| device.non_atomic_ecdh(json!({ "pubkey": pubkey })))
    }

    /// Makes the device blink the verification code for the app
    pub fn ecdh_challenge(&self) -> Result<(), Error> {
        let reply = self.atomic_queries(|device| device.non_atomic_ecdh(json!({"challenge": true})))?;
        if reply.as_str() != Some(messages::SUCCESS) {
            return Err(Error::reply("ecdh challenge", reply.to_string().as_bytes()));
        }
        Ok(())
    }

    /// Whether the paired app answers a ping
    pub fn ping_mobile(&self) -> Result<bool, Error> {
        let channel = self
            .mobile_channel()
            .ok_or(Error::Unsupported("no mobile is paired"))?;
        Ok(ping(&channel))
    }

    /// Starts the thread which reports whether `channel` is reachable
    ///
    /// The thread ends when the session closes or the channel is replaced.
    pub(crate) fn spawn_mobile_listener(&self, channel: Arc<Channel>) {
        let interval = match self.config.mobile_ping_interval {
            Some(interval) => interval,
            None => return,
        };
        let closed = self.closed.clone();
        let current = self.mobile.clone();
        let events = self.events.clone();
        let id = self.id.clone();
        log::debug!("{}: listening to mobile {}", id, channel.id());
        thread::spawn(move || loop {
            if closed.load(Ordering::SeqCst) {
                break;
            }
            match *lock(&current) {
                Some(ref c) if Arc::ptr_eq(c, &channel) => {}
                _ => break,
            }
            if ping(&channel) {
                events.fire(Event::MobileConnected);
            } else {
                events.fire(Event::MobileDisconnected);
            }
            thread::sleep(interval);
        });
    }

    fn finish_pairing(&self, channel: Arc<Channel>) -> Result<(), Error> {
        if let Some(ref dir) = self.config.channel_dir {
            channel.store(dir)?;
        }
        self.feature_set(&FeatureSet {
            pairing: Some(true),
            ..Default::default()
        })?;
        *lock(&self.mobile) = Some(channel.clone());
        self.spawn_mobile_listener(channel);
        log::info!("{}: mobile paired", self.id);
        self.events.fire(Event::PairingSuccess);
        Ok(())
    }

    /// Drives the key exchange between app and device
    fn process_pairing(&self, channel: Arc<Channel>) -> Result<(), Error> {
        if !channel.wait_for_scanning_success(Duration::from_secs(SCAN_TIMEOUT_SECS))? {
            log::info!("{}: the app did not scan the pairing code", self.id);
            self.events.fire(Event::PairingScanningFailed);
            return Ok(());
        }
        if self.device_info()?.lock {
            log::debug!("{}: device is locked, reusing its pairing", self.id);
            return self.finish_pairing(channel);
        }
        self.events.fire(Event::PairingStarted);

        let key_exchange = Duration::from_secs(KEY_EXCHANGE_TIMEOUT_SECS);
        let hash = channel.wait_for_mobile_public_key_hash(key_exchange)?;
        match self.ecdh_hash_pubkey(&hash) {
            Ok(reply) => channel.send_ecdh(reply)?,
            Err(e) => {
                log::info!("{}: pairing aborted on the device: {}", self.id, e);
                self.events.fire(Event::PairingAborted);
                return Ok(());
            }
        }

        let pubkey = channel.wait_for_mobile_public_key(key_exchange)?;
        channel.send_ecdh(self.ecdh_pubkey(&pubkey)?)?;

        let command_timeout = Duration::from_secs(COMMAND_TIMEOUT_SECS);
        let mut command = channel.wait_for_command(command_timeout)?;
        while command == "challenge" {
            self.ecdh_challenge()?;
            command = channel.wait_for_command(command_timeout)?;
        }
        if command == "finish" {
            self.finish_pairing(channel)
        } else {
            log::info!("{}: the app aborted pairing ({})", self.id, command);
            self.events.fire(Event::PairingAborted);
            Ok(())
        }
    }
}

impl<T: ReadWrite + 'static> Device<T> {
    /// Starts pairing with a mobile app
    ///
    /// Any previous pairing is dropped. The returned channel's
    /// [`Channel::pairing_code`] is what the app scans; the key exchange then
    /// runs in the background and reports through pairing events.
    pub fn start_pairing(self: &Arc<Self>) -> Result<Arc<Channel>, Error> {
        let server = match self.config.relay {
            Some(ref server) => server.clone(),
            None => return Err(Error::Unsupported("no relay server configured")),
        };
        if lock(&self.mobile).take().is_some() {
            if let Some(ref dir) = self.config.channel_dir {
                Channel::remove(dir)?;
            }
            log::info!("{}: removed the previous mobile pairing", self.id);
            self.events.fire(Event::PairingRemoved);
        }

        let channel = Arc::new(Channel::with_random_key(server));
        log::info!("{}: pairing over channel {}", self.id, channel.id());
        let device = self.clone();
        let pairing = channel.clone();
        thread::spawn(move || {
            if let Err(e) = device.process_pairing(pairing) {
                log::error!("{}: pairing failed: {}", device.id, e);
                device.events.fire(failure_event(&e));
            }
        });
        Ok(channel)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::super::relay::tests::MemoryServer;
    use super::super::simulator::{self, Simulator};
    use super::super::Config;
    use super::*;
    use crate::dongle::mock::MockDevice;
    use crate::Version;

    fn scratch_dir(name: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("bbhww-pairing-{}-{}", std::process::id(), name));
        let _ = std::fs::remove_dir_all(&path);
        path
    }

    fn setup(dir: Option<std::path::PathBuf>) -> (Simulator, Arc<MemoryServer>, Arc<Device<MockDevice>>) {
        let sim = Simulator::new(Version::new(7, 0, 4));
        let server = Arc::new(MemoryServer::default());
        let config = Config {
            channel_dir: dir,
            relay: Some(server.clone()),
            ..simulator::config()
        };
        let device = simulator::open_with(&sim, config);
        device.set_password("4321").unwrap();
        (sim, server, Arc::new(device))
    }

    /// Waits for the first event which ends a pairing attempt
    fn outcome(events: &mpsc::Receiver<Event>) -> Event {
        loop {
            let event = events.recv_timeout(Duration::from_secs(10)).unwrap();
            match event {
                Event::PairingStarted | Event::StatusChanged(_) => continue,
                other => return other,
            }
        }
    }

    #[test]
    fn full_pairing() {
        let dir = scratch_dir("full");
        let (sim, server, device) = setup(Some(dir.clone()));
        let events = device.events().channel(16);
        let channel = device.start_pairing().unwrap();
        assert!(!device.has_mobile_channel());

        server.mobile_send(&channel, json!({"id": "success"}));
        server.mobile_send(&channel, json!({"hash_ecdh_pubkey": "aabb"}));
        server.mobile_send(&channel, json!({"ecdh_pubkey": "02ccdd"}));
        server.mobile_send(&channel, json!({"ecdh": "challenge"}));
        server.mobile_send(&channel, json!({"ecdh": "challenge"}));
        server.mobile_send(&channel, json!({"ecdh": "finish"}));
        assert_eq!(outcome(&events), Event::PairingSuccess);

        assert!(device.has_mobile_channel());
        assert!(sim.paired());
        assert_eq!(sim.ecdh_challenges(), 2);
        let received = server.mobile_received(&channel);
        assert_eq!(received[0], json!({"ecdh": {"hash_pubkey": sim.ecdh_hash()}}));
        assert_eq!(received[1], json!({"ecdh": {"pubkey": sim.ecdh_pubkey()}}));

        let stored = Channel::load(&dir, server.clone()).unwrap().unwrap();
        assert_eq!(stored.id(), channel.id());

        // a second pairing drops the first
        let events = device.events().channel(16);
        let again = device.start_pairing().unwrap();
        assert_eq!(events.recv_timeout(Duration::from_secs(10)).unwrap(), Event::PairingRemoved);
        assert!(!device.has_mobile_channel());
        assert!(Channel::load(&dir, server.clone()).unwrap().is_none());
        server.mobile_send(&again, json!({"id": "nope"}));
        assert_eq!(outcome(&events), Event::PairingScanningFailed);
    }

    #[test]
    fn aborts() {
        let (sim, server, device) = setup(None);

        // the app gives up after the key exchange
        let events = device.events().channel(16);
        let channel = device.start_pairing().unwrap();
        server.mobile_send(&channel, json!({"id": "success"}));
        server.mobile_send(&channel, json!({"hash_ecdh_pubkey": "aabb"}));
        server.mobile_send(&channel, json!({"ecdh_pubkey": "02ccdd"}));
        server.mobile_send(&channel, json!({"ecdh": "abort"}));
        assert_eq!(outcome(&events), Event::PairingAborted);
        assert!(!device.has_mobile_channel());

        // the user rejects on the device
        sim.abort_next_ecdh();
        let channel = device.start_pairing().unwrap();
        server.mobile_send(&channel, json!({"id": "success"}));
        server.mobile_send(&channel, json!({"hash_ecdh_pubkey": "aabb"}));
        assert_eq!(outcome(&events), Event::PairingAborted);

        // the device fails the second round
        sim.fail_ecdh_pubkey(true);
        let channel = device.start_pairing().unwrap();
        server.mobile_send(&channel, json!({"id": "success"}));
        server.mobile_send(&channel, json!({"hash_ecdh_pubkey": "aabb"}));
        server.mobile_send(&channel, json!({"ecdh_pubkey": "02ccdd"}));
        assert_eq!(outcome(&events), Event::PairingError);
        assert!(!sim.paired());
    }

    #[test]
    fn failure_events() {
        assert_eq!(failure_event(&Error::Timeout("x")), Event::PairingTimedout);
        assert_eq!(failure_event(&Error::Relay("x".into())), Event::PairingPullMessageFailed);
        assert_eq!(failure_event(&Error::QueryBusy), Event::PairingError);
    }

    #[test]
    fn without_relay() {
        let sim = Simulator::new(Version::new(7, 0, 4));
        let device = Arc::new(simulator::open(&sim));
        match device.start_pairing() {
            Err(Error::Unsupported(_)) => {}
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
        assert!(device.ping_mobile().is_err());
    }

    #[test]
    fn listener_reports_reachability() {
        let sim = Simulator::new(Version::new(7, 0, 4));
        let server = Arc::new(MemoryServer::default());
        let config = Config {
            relay: Some(server.clone()),
            mobile_ping_interval: Some(Duration::from_millis(10)),
            ..simulator::config()
        };
        let device = simulator::open_with(&sim, config);
        let events = device.events().channel(64);
        let channel = Arc::new(Channel::with_random_key(server.clone()));
        *lock(&device.mobile) = Some(channel.clone());

        server.mobile_send(&channel, json!({"action": "pong"}));
        device.spawn_mobile_listener(channel.clone());
        assert_eq!(events.recv_timeout(Duration::from_secs(10)).unwrap(), Event::MobileConnected);
        assert_eq!(events.recv_timeout(Duration::from_secs(10)).unwrap(), Event::MobileDisconnected);
        assert_eq!(server.mobile_received(&channel)[0], json!({"action": "ping"}));

        // a ping in flight may still finish after the close
        device.close();
        thread::sleep(Duration::from_millis(1200));
        while events.try_recv().is_ok() {}
        thread::sleep(Duration::from_millis(100));
        assert!(events.try_recv().is_err());
    }
}
