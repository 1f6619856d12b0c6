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

//! # Digital BitBox Bootloader
//!
//! The bootloader takes fixed-size raw requests, without the packet
//! framing of the firmware: a command byte and its arguments, zero-padded
//! to [`SEND_LEN`] bytes. Replies are [`READ_LEN`] bytes of ASCII starting
//! with the command byte and `'0'` on success.
//!
//! A signed firmware file is the concatenation of [`NUM_SIGNATURES`]
//! 64-byte signatures and the firmware itself.
//!

use std::convert::TryFrom;
use std::sync::Mutex;

use crate::constants::v1::bootloader::*;
use crate::dongle::{write_all, ReadWrite};
use crate::{lock, BootloaderStatus, Error, Event, EventSlot, Status, Version};

const OP_ERASE: u8 = b'e';
const OP_WRITE_CHUNK: u8 = b'w';
const OP_WRITE_SIGNATURE: u8 = b's';

/// (write, read) report sizes of a bootloader version
fn report_sizes(version: Version) -> (usize, usize) {
    if version.at_least(Version::new(3, 0, 0)) {
        (REPORT_SIZE, REPORT_SIZE)
    } else {
        LEGACY_REPORT_SIZES
    }
}

/// A Digital BitBox in bootloader mode
pub struct Device<T> {
    id: String,
    version: Version,
    dev: Mutex<T>,
    status: Mutex<BootloaderStatus>,
    events: EventSlot,
}

impl<T: ReadWrite> Device<T> {
    /// Opens a bootloader session
    ///
    /// `version` is the bootloader version from the USB serial number.
    pub fn new(id: String, dev: T, version: Version) -> Self {
        log::info!("{}: digital bitbox bootloader {}", id, version);
        Device {
            id,
            version,
            dev: Mutex::new(dev),
            status: Mutex::new(BootloaderStatus::default()),
            events: EventSlot::new(),
        }
    }

    /// Device identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Bootloader version
    pub fn version(&self) -> Version {
        self.version
    }

    /// Session status, which never changes
    pub fn status(&self) -> Status {
        Status::Bootloader
    }

    /// Snapshot of the current upgrade
    pub fn bootloader_status(&self) -> BootloaderStatus {
        lock(&self.status).clone()
    }

    /// Event slot of this session
    pub fn events(&self) -> &EventSlot {
        &self.events
    }

    /// Closes the device handle
    pub fn close(&self) {
        lock(&self.dev).close();
    }

    fn query_locked(&self, dev: &mut T, cmd: u8, data: &[u8]) -> Result<Vec<u8>, Error> {
        if data.len() >= SEND_LEN {
            return Err(Error::FrameMessageTooLong(data.len()));
        }
        let (write_size, read_size) = report_sizes(self.version);
        let mut msg = vec![0u8; SEND_LEN];
        msg[0] = cmd;
        msg[1..=data.len()].copy_from_slice(data);
        for report in msg.chunks(write_size) {
            write_all(dev, report)?;
        }

        let mut reply = Vec::with_capacity(READ_LEN);
        let mut buf = vec![0u8; read_size];
        while reply.len() < READ_LEN {
            let n = dev.read(&mut buf)?;
            if n == 0 {
                return Err(Error::UnexpectedEof);
            }
            reply.extend_from_slice(&buf[..n]);
        }
        reply.truncate(READ_LEN);
        while let Some(&last) = reply.last() {
            match last {
                b'\0' | b'\t' | b'\r' | b'\n' => {
                    reply.pop();
                }
                _ => break,
            }
        }

        if reply.first() != Some(&cmd) {
            return Err(Error::reply("bootloader", &reply));
        }
        if reply.len() > 1 && reply[1] != b'0' {
            return Err(Error::Device {
                code: i64::from(reply[1]),
                message: String::from_utf8_lossy(&reply[1..]).into_owned(),
            });
        }
        Ok(reply)
    }

    fn update_status<F: FnOnce(&mut BootloaderStatus)>(&self, f: F) {
        let snapshot = {
            let mut status = lock(&self.status);
            f(&mut status);
            status.clone()
        };
        self.events.fire(Event::BootloaderStatusChanged(snapshot));
    }

    fn flash(&self, sigs: &[u8], firmware: &[u8]) -> Result<(), Error> {
        let total_chunks = (firmware.len() + CHUNK_SIZE - 1) / CHUNK_SIZE;
        let mut dev = lock(&self.dev);
        self.query_locked(&mut dev, OP_ERASE, &[])?;

        let mut msg = Vec::with_capacity(1 + CHUNK_SIZE);
        for (n, chunk) in firmware.chunks(CHUNK_SIZE).enumerate() {
            let chunk_num = u8::try_from(n).map_err(|_| Error::FirmwareTooBig(firmware.len()))?;
            msg.clear();
            msg.push(chunk_num);
            msg.extend_from_slice(chunk);
            msg.resize(1 + CHUNK_SIZE, PAD);
            self.query_locked(&mut dev, OP_WRITE_CHUNK, &msg)?;
            self.update_status(|status| status.progress = (n + 1) as f64 / total_chunks as f64);
        }

        let mut sig_msg = b"0".to_vec();
        sig_msg.extend_from_slice(hex::encode(sigs).as_bytes());
        self.query_locked(&mut dev, OP_WRITE_SIGNATURE, &sig_msg)
            .map_err(|e| match e {
                Error::Device { .. } => Error::FirmwareSignature,
                e => e,
            })?;
        Ok(())
    }

    /// Erases the flash, writes a signed firmware and uploads its
    /// signatures
    ///
    /// Progress and the outcome are reported as
    /// [`Event::BootloaderStatusChanged`]. The device reboots on its own.
    pub fn upgrade_firmware(&self, signed: &[u8]) -> Result<(), Error> {
        if signed.len() <= SIGS_LEN {
            return Err(Error::FirmwareTooSmall(signed.len()));
        }
        let (sigs, firmware) = signed.split_at(SIGS_LEN);
        {
            let mut status = lock(&self.status);
            if status.upgrading {
                return Err(Error::UpgradeInProgress);
            }
            *status = BootloaderStatus {
                upgrading: true,
                ..Default::default()
            };
        }
        self.events
            .fire(Event::BootloaderStatusChanged(self.bootloader_status()));
        log::info!("{}: flashing {} bytes of firmware", self.id, firmware.len());

        if let Err(e) = self.flash(sigs, firmware) {
            log::error!("{}: firmware upgrade failed: {}", self.id, e);
            self.update_status(|status| {
                status.upgrading = false;
                status.error_message = e.to_string();
            });
            return Err(e);
        }
        self.update_status(|status| {
            status.progress = 0.0;
            status.upgrade_successful = true;
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dongle::mock::MockDevice;
    use crate::event::tests::recorder;

    fn ok_reply(cmd: u8) -> Vec<u8> {
        let mut reply = vec![0u8; READ_LEN];
        reply[0] = cmd;
        reply[1] = b'0';
        reply
    }

    #[test]
    fn upgrade() {
        let firmware: Vec<u8> = (0..2 * CHUNK_SIZE + 100).map(|i| (i % 253) as u8).collect();
        let mut signed = vec![0x5a; SIGS_LEN];
        signed.extend_from_slice(&firmware);

        let dev = MockDevice::raw(SEND_LEN, |req: &[u8]| Some(ok_reply(req[0])));
        let requests = dev.requests();
        let writes = dev.write_sizes();
        let device = Device::new("bl".into(), dev, Version::new(3, 0, 0));
        let events = recorder(device.events());
        device.upgrade_firmware(&signed).unwrap();

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 1 + 3 + 1);
        assert!(requests.iter().all(|r| r.len() == SEND_LEN));
        assert_eq!(requests[0][0], OP_ERASE);
        assert!(requests[0][1..].iter().all(|&b| b == 0));
        for n in 0..3 {
            let req = &requests[1 + n];
            assert_eq!(req[0], OP_WRITE_CHUNK);
            assert_eq!(usize::from(req[1]), n);
        }
        assert_eq!(&requests[1][2..2 + CHUNK_SIZE], &firmware[..CHUNK_SIZE]);
        let last = &requests[3][2..2 + CHUNK_SIZE];
        assert_eq!(&last[..100], &firmware[2 * CHUNK_SIZE..]);
        assert!(last[100..].iter().all(|&b| b == PAD));
        let sig = &requests[4];
        assert_eq!(sig[0], OP_WRITE_SIGNATURE);
        assert_eq!(sig[1], b'0');
        assert_eq!(&sig[2..2 + 2 * SIGS_LEN], hex::encode(&signed[..SIGS_LEN]).as_bytes());

        // 64-byte reports from bootloader 3.0.0 on
        assert!(writes.lock().unwrap().iter().all(|&n| n <= REPORT_SIZE));

        let statuses: Vec<BootloaderStatus> = events
            .lock()
            .unwrap()
            .iter()
            .map(|e| match e {
                Event::BootloaderStatusChanged(s) => s.clone(),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(statuses.len(), 1 + 3 + 1);
        assert!(statuses[0].upgrading);
        let progress: Vec<f64> = statuses[1..4].iter().map(|s| s.progress).collect();
        assert!((progress[0] - 1.0 / 3.0).abs() < 1e-9);
        assert!((progress[2] - 1.0).abs() < 1e-9);
        let last = statuses.last().unwrap();
        assert!(last.upgrade_successful);
        assert_eq!(last.progress, 0.0);
    }

    #[test]
    fn legacy_report_sizes() {
        let dev = MockDevice::raw(SEND_LEN, |req: &[u8]| Some(ok_reply(req[0])));
        let writes = dev.write_sizes();
        let device = Device::new("bl".into(), dev, Version::new(2, 0, 0));
        let mut signed = vec![0; SIGS_LEN];
        signed.extend_from_slice(&[1; 10]);
        device.upgrade_firmware(&signed).unwrap();
        assert_eq!(*writes.lock().unwrap(), vec![SEND_LEN; 3]);
    }

    #[test]
    fn failures() {
        let dev = MockDevice::raw(SEND_LEN, |req: &[u8]| {
            let mut reply = ok_reply(req[0]);
            if req[0] == OP_WRITE_SIGNATURE {
                reply[1] = b'1';
            }
            Some(reply)
        });
        let device = Device::new("bl".into(), dev, Version::new(3, 0, 0));
        assert!(matches!(
            device.upgrade_firmware(&[0; SIGS_LEN]),
            Err(Error::FirmwareTooSmall(_))
        ));
        assert!(!device.bootloader_status().upgrading);

        let mut signed = vec![0; SIGS_LEN];
        signed.extend_from_slice(&[1; 10]);
        match device.upgrade_firmware(&signed) {
            Err(Error::FirmwareSignature) => {}
            other => panic!("unexpected {:?}", other),
        }
        let status = device.bootloader_status();
        assert!(!status.upgrading);
        assert!(!status.upgrade_successful);
        assert!(!status.error_message.is_empty());

        // 257 chunks do not fit the one-byte chunk number
        let mut signed = vec![0; SIGS_LEN];
        signed.resize(SIGS_LEN + 256 * CHUNK_SIZE + 1, 0);
        assert!(matches!(device.upgrade_firmware(&signed), Err(Error::FirmwareTooBig(_))));
    }

    #[test]
    fn garbled_reply() {
        let dev = MockDevice::raw(SEND_LEN, |_: &[u8]| {
            let mut reply = ok_reply(b'x');
            reply[2] = b'\n';
            Some(reply)
        });
        let device = Device::new("bl".into(), dev, Version::new(3, 0, 0));
        let mut signed = vec![0; SIGS_LEN];
        signed.push(0);
        assert!(device.upgrade_firmware(&signed).is_err());
    }
}
