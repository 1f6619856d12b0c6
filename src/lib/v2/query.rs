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

//! # Request Framing
//!
//! From firmware 7.0.0 every query is wrapped in a one-byte request opcode
//! and every reply starts with a status byte. Long-running requests (those
//! waiting on the user) answer "not ready" until done, and we poll.
//!

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::constants::v2::{hww, timing};
use crate::dongle::{ReadWrite, U2fHid};
use crate::{Error, Version};

/// Hook into the OS power management
///
/// Polling a device which waits for user input can take minutes; the host
/// should not go to sleep meanwhile.
pub trait SleepInhibitor: Send + Sync {
    /// Called once a query turns out to be long-running
    fn prevent_sleep(&self);
    /// Called when the long-running query finished
    fn allow_sleep(&self);
}

/// Power management hook which does nothing
#[derive(Copy, Clone, Debug, Default)]
pub struct NoSleepInhibitor;

impl SleepInhibitor for NoSleepInhibitor {
    fn prevent_sleep(&self) {}
    fn allow_sleep(&self) {}
}

/// A framed channel to BitBox02 firmware
pub struct HwwTransport<T> {
    hid: U2fHid<T>,
    version: Version,
    inhibitor: Arc<dyn SleepInhibitor>,
    timestamps: VecDeque<Instant>,
}

impl<T: ReadWrite> HwwTransport<T> {
    /// Wraps a packet-framed device speaking firmware `version`
    pub fn new(hid: U2fHid<T>, version: Version) -> Self {
        HwwTransport {
            hid,
            version,
            inhibitor: Arc::new(NoSleepInhibitor),
            timestamps: VecDeque::with_capacity(timing::TIMESTAMP_RING),
        }
    }

    /// Installs a power-management hook
    pub fn set_sleep_inhibitor(&mut self, inhibitor: Arc<dyn SleepInhibitor>) {
        self.inhibitor = inhibitor;
    }

    /// The firmware version this transport was opened for
    pub fn version(&self) -> Version {
        self.version
    }

    /// Closes the device handle
    pub fn close(&mut self) {
        self.hid.close()
    }

    fn send(&mut self, msg: &[u8]) -> Result<Vec<u8>, Error> {
        if self.timestamps.len() == timing::TIMESTAMP_RING {
            self.timestamps.pop_front();
        }
        self.timestamps.push_back(Instant::now());
        self.hid.query(msg)
    }

    /// Sends a message and returns the reply payload, polling as needed
    pub fn query(&mut self, msg: &[u8]) -> Result<Vec<u8>, Error> {
        if !self.version.at_least(Version::new(7, 0, 0)) {
            return self.hid.query(msg);
        }

        let mut request = Vec::with_capacity(msg.len() + 1);
        request.push(hww::REQ_NEW);
        request.extend_from_slice(msg);

        self.timestamps.clear();
        let mut response = loop {
            let response = self.send(&request)?;
            if response.first() != Some(&hww::RSP_BUSY) {
                break response;
            }
            // the device dropped our request; resubmit it verbatim
            log::debug!("device busy, retrying in {}ms", timing::BUSY_RETRY_MS);
            thread::sleep(Duration::from_millis(timing::BUSY_RETRY_MS));
        };

        let mut long_running = false;
        let result = loop {
            match response.first() {
                None => break Err(Error::QueryEmpty),
                Some(&hww::RSP_ACK) => break Ok(response.split_off(1)),
                Some(&hww::RSP_BUSY) => break Err(Error::QueryBusy),
                Some(&hww::RSP_NACK) => {
                    let start = self.timestamps.front().copied();
                    let offsets: Vec<u128> = self
                        .timestamps
                        .iter()
                        .filter_map(|t| start.map(|s| t.duration_since(s).as_millis()))
                        .collect();
                    log::error!("device nacked the request; send offsets (ms): {:?}", offsets);
                    break Err(Error::QueryNack);
                }
                Some(&hww::RSP_NOT_READY) => {
                    if !long_running {
                        long_running = true;
                        self.inhibitor.prevent_sleep();
                    }
                    thread::sleep(Duration::from_millis(timing::NOT_READY_POLL_MS));
                    response = match self.send(&[hww::REQ_RETRY]) {
                        Ok(response) => response,
                        Err(e) => break Err(e),
                    };
                }
                Some(_) => break Err(Error::reply("hww query", &response)),
            }
        };
        if long_running {
            self.inhibitor.allow_sleep();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::u2fhid::CMD_HWW;
    use crate::dongle::mock::MockDevice;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn transport<F>(f: F) -> (HwwTransport<MockDevice>, Arc<std::sync::Mutex<Vec<Vec<u8>>>>)
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        let dev = MockDevice::u2f(CMD_HWW, f);
        let requests = dev.requests();
        let t = HwwTransport::new(U2fHid::new(dev, CMD_HWW), Version::new(9, 21, 0));
        (t, requests)
    }

    #[derive(Default)]
    struct CountingInhibitor(AtomicUsize, AtomicUsize);

    impl SleepInhibitor for CountingInhibitor {
        fn prevent_sleep(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
        fn allow_sleep(&self) {
            self.1.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn direct_ack() {
        let (mut t, requests) = transport(|req: &[u8]| {
            assert_eq!(req, b"\x00hello");
            Some(b"\x00world".to_vec())
        });
        assert_eq!(t.query(b"hello").unwrap(), b"world");
        assert_eq!(requests.lock().unwrap().len(), 1);
    }

    #[test]
    fn not_ready_polling() {
        let mut n = 0;
        let (mut t, requests) = transport(move |_: &[u8]| {
            n += 1;
            Some(if n <= 2 {
                vec![hww::RSP_NOT_READY]
            } else {
                b"\x00payload".to_vec()
            })
        });
        let inhibitor = Arc::new(CountingInhibitor::default());
        t.set_sleep_inhibitor(inhibitor.clone());

        let start = Instant::now();
        assert_eq!(t.query(b"long").unwrap(), b"payload");
        assert!(start.elapsed() >= Duration::from_millis(400));

        let requests = requests.lock().unwrap();
        assert_eq!(
            *requests,
            vec![b"\x00long".to_vec(), vec![hww::REQ_RETRY], vec![hww::REQ_RETRY]]
        );
        assert_eq!(inhibitor.0.load(Ordering::SeqCst), 1);
        assert_eq!(inhibitor.1.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn busy_resends_identical_bytes() {
        let mut n = 0;
        let (mut t, requests) = transport(move |_: &[u8]| {
            n += 1;
            Some(if n == 1 {
                vec![hww::RSP_BUSY]
            } else {
                b"\x00ok".to_vec()
            })
        });
        assert_eq!(t.query(b"msg").unwrap(), b"ok");
        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], b"\x00msg");
        assert_eq!(requests[1], requests[0]);
    }

    #[test]
    fn nack_and_empty() {
        let (mut t, _) = transport(|_: &[u8]| Some(vec![hww::RSP_NACK]));
        match t.query(b"x") {
            Err(Error::QueryNack) => {}
            other => panic!("unexpected {:?}", other),
        }
        let (mut t, _) = transport(|_: &[u8]| Some(vec![]));
        match t.query(b"x") {
            Err(Error::QueryEmpty) => {}
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn old_firmware_is_unframed() {
        let dev = MockDevice::u2f(CMD_HWW, |req: &[u8]| Some(req.to_vec()));
        let mut t = HwwTransport::new(U2fHid::new(dev, CMD_HWW), Version::new(6, 0, 0));
        assert_eq!(t.query(b"raw").unwrap(), b"raw");
    }
}
