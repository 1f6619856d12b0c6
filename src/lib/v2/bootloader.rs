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

//! # BitBox02 Bootloader
//!
//! In bootloader mode the device speaks a plain request/reply protocol
//! with one-byte opcodes and no encryption. Every reply echoes the opcode
//! followed by a zero status byte.
//!

use std::convert::TryFrom;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

use super::firmware::{self, Bundle, SignedFirmware};
use crate::constants::u2fhid::CMD_BOOTLOADER;
use crate::constants::v2::bootloader::*;
use crate::dongle::{ReadWrite, U2fHid};
use crate::lock;
use crate::{BootloaderStatus, Error, Event, EventSlot, Product, Status, Version};

/// Secure chip found on the device
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecureChipModel {
    /// Microchip ATECC608A/B
    #[serde(rename = "ATECC")]
    Atecc,
    /// Infineon Optiga Trust M V3
    #[serde(rename = "Optiga")]
    Optiga,
}

/// A BitBox02 in bootloader mode
pub struct Device<T> {
    id: String,
    version: Version,
    product: Product,
    hid: Mutex<U2fHid<T>>,
    status: Mutex<BootloaderStatus>,
    events: EventSlot,
    reboot_tick: Duration,
}

impl<T: ReadWrite> Device<T> {
    /// Opens a bootloader session
    ///
    /// `version` is the bootloader version from the USB serial number.
    pub fn new(id: String, dev: T, version: Version, product: Product) -> Self {
        log::info!("{}: bootloader {} for {}", id, version, product);
        Device {
            id,
            version,
            product,
            hid: Mutex::new(U2fHid::new(dev, CMD_BOOTLOADER)),
            status: Mutex::new(BootloaderStatus::default()),
            events: EventSlot::new(),
            reboot_tick: Duration::from_secs(1),
        }
    }

    #[cfg(test)]
    pub(crate) fn set_reboot_tick(&mut self, tick: Duration) {
        self.reboot_tick = tick;
    }

    /// Device identifier
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Bootloader version
    pub fn version(&self) -> Version {
        self.version
    }

    /// Product the bootloader accepts firmware for
    pub fn product(&self) -> Product {
        self.product
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
        lock(&self.hid).close();
    }

    fn query_locked(hid: &mut U2fHid<T>, cmd: u8, data: &[u8]) -> Result<Vec<u8>, Error> {
        let mut msg = Vec::with_capacity(1 + data.len());
        msg.push(cmd);
        msg.extend_from_slice(data);
        let reply = hid.query(&msg)?;
        if reply.len() < 2 || reply[0] != cmd {
            return Err(Error::reply("bootloader", &reply));
        }
        if reply[1] != 0x00 {
            return Err(Error::Device {
                code: i64::from(reply[1]),
                message: format!("bootloader opcode {:?} failed", cmd as char),
            });
        }
        Ok(reply[2..].to_vec())
    }

    fn query(&self, cmd: u8, data: &[u8]) -> Result<Vec<u8>, Error> {
        Device::query_locked(&mut lock(&self.hid), cmd, data)
    }

    /// Monotonic firmware version and signing pubkeys version
    pub fn versions(&self) -> Result<(u32, u32), Error> {
        let reply = self.query(OP_VERSIONS, &[])?;
        if reply.len() < 8 {
            return Err(Error::reply("versions", &reply));
        }
        Ok((
            LittleEndian::read_u32(&reply[0..4]),
            LittleEndian::read_u32(&reply[4..8]),
        ))
    }

    /// Firmware hash and signing key data hash, optionally shown on screen
    pub fn get_hashes(
        &self,
        display_firmware_hash: bool,
        display_signing_keydata_hash: bool,
    ) -> Result<([u8; 32], [u8; 32]), Error> {
        let reply = self.query(
            OP_HASHES,
            &[display_firmware_hash as u8, display_signing_keydata_hash as u8],
        )?;
        if reply.len() < 64 {
            return Err(Error::reply("hashes", &reply));
        }
        let mut firmware_hash = [0u8; 32];
        let mut keydata_hash = [0u8; 32];
        firmware_hash.copy_from_slice(&reply[..32]);
        keydata_hash.copy_from_slice(&reply[32..64]);
        Ok((firmware_hash, keydata_hash))
    }

    /// Whether the bootloader shows the firmware hash at every boot
    pub fn show_firmware_hash_enabled(&self) -> Result<bool, Error> {
        let reply = self.query(OP_SHOW_FIRMWARE_HASH, &[0xff])?;
        match reply.first() {
            Some(&flag) => Ok(flag == 0x01),
            None => Err(Error::reply("show firmware hash", &reply)),
        }
    }

    /// Turns showing the firmware hash at boot on or off
    pub fn set_show_firmware_hash_enabled(&self, enabled: bool) -> Result<(), Error> {
        self.query(OP_SHOW_FIRMWARE_HASH, &[enabled as u8]).map(|_| ())
    }

    /// Rotates the screen by 180 degrees
    pub fn screen_rotate(&self) -> Result<(), Error> {
        self.query(OP_SCREEN_ROTATE, &[]).map(|_| ())
    }

    /// Boots the firmware; the device does not answer
    pub fn reboot(&self) -> Result<(), Error> {
        log::info!("{}: rebooting into firmware", self.id);
        lock(&self.hid).send_frame(&[OP_REBOOT])
    }

    /// The secure chip on the device
    ///
    /// Bootloaders before 1.1.0 cannot tell, but those only shipped with
    /// the ATECC.
    pub fn hardware(&self) -> Result<SecureChipModel, Error> {
        if !self.version.at_least(Version::new(1, 1, 0)) {
            return Ok(SecureChipModel::Atecc);
        }
        let reply = self.query(OP_HARDWARE, &[])?;
        match reply.first() {
            Some(0x00) => Ok(SecureChipModel::Atecc),
            Some(0x01) => Ok(SecureChipModel::Optiga),
            _ => Err(Error::reply("hardware", &reply)),
        }
    }

    /// Whether no firmware is installed
    pub fn erased(&self) -> Result<bool, Error> {
        let (version, _) = self.versions()?;
        let (firmware_hash, _) = self.get_hashes(false, false)?;
        Ok(firmware_hash == firmware::hash_firmware(version, &[]))
    }

    /// Whether the bundle holds something newer than the installed firmware
    pub fn upgrade_required(&self, bundle: &Bundle) -> Result<bool, Error> {
        let (version, _) = self.versions()?;
        Ok(bundle.upgrade_required(version))
    }

    fn update_status<F: FnOnce(&mut BootloaderStatus)>(&self, f: F) {
        let snapshot = {
            let mut status = lock(&self.status);
            f(&mut status);
            status.clone()
        };
        self.events.fire(Event::BootloaderStatusChanged(snapshot));
    }

    /// Erases the flash, writes the binary chunk by chunk and uploads the
    /// signature block
    fn flash<F: FnMut(f64)>(&self, firmware: &SignedFirmware, mut progress: F) -> Result<(), Error> {
        let binary = firmware.binary();
        if binary.len() > MAX_FIRMWARE_SIZE {
            return Err(Error::FirmwareTooBig(binary.len()));
        }
        let total_chunks = (binary.len() + CHUNK_SIZE - 1) / CHUNK_SIZE;
        let mut hid = lock(&self.hid);
        Device::query_locked(&mut hid, OP_ERASE, &[total_chunks as u8])?;

        let mut msg = Vec::with_capacity(1 + CHUNK_SIZE);
        for (n, chunk) in binary.chunks(CHUNK_SIZE).enumerate() {
            let chunk_num =
                u8::try_from(n).map_err(|_| Error::FirmwareTooBig(binary.len()))?;
            msg.clear();
            msg.push(chunk_num);
            msg.extend_from_slice(chunk);
            msg.resize(1 + CHUNK_SIZE, PAD);
            Device::query_locked(&mut hid, OP_WRITE_CHUNK, &msg)?;
            progress((n + 1) as f64 / total_chunks as f64);
        }
        Device::query_locked(&mut hid, OP_WRITE_SIGNATURE, firmware.sig_data())?;
        Ok(())
    }

    /// Flashes a signed firmware file and reboots into it
    ///
    /// The file must carry this product's magic; otherwise nothing is sent
    /// to the device. Progress, failure and the reboot countdown are
    /// reported as [`Event::BootloaderStatusChanged`].
    pub fn upgrade_firmware(&self, signed: &[u8]) -> Result<(), Error> {
        let firmware = SignedFirmware::parse(signed)?;
        firmware.check_product(self.product)?;
        self.flash_and_reboot(&firmware)
    }

    /// Flashes the next firmware of a bundle and reboots into it
    ///
    /// Returns whether this was an intermediate step; in that case the
    /// device must boot it once and come back to the bootloader, where
    /// [`Device::upgrade_required`] will still be true.
    pub fn upgrade_from_bundle(&self, bundle: &Bundle) -> Result<bool, Error> {
        if bundle.product() != self.product {
            return Err(Error::FirmwareWrongMagic {
                expected: self.product.firmware_magic().unwrap_or(0),
                found: bundle.product().firmware_magic().unwrap_or(0),
            });
        }
        let (current, _) = self.versions()?;
        let next = bundle.next(current);
        let intermediate = next.monotonic_version() < bundle.latest().monotonic_version();
        log::info!(
            "{}: upgrading from monotonic version {} to {}{}",
            self.id,
            current,
            next.version,
            if intermediate { " (intermediate)" } else { "" }
        );
        self.flash_and_reboot(&next.firmware)?;
        Ok(intermediate)
    }

    fn flash_and_reboot(&self, firmware: &SignedFirmware) -> Result<(), Error> {
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

        let result = self.flash(firmware, |progress| {
            self.update_status(|status| {
                status.upgrading = true;
                status.progress = progress;
            })
        });
        if let Err(e) = result {
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

        for seconds in (1..=REBOOT_SECONDS).rev() {
            self.update_status(|status| status.reboot_seconds = seconds);
            thread::sleep(self.reboot_tick);
        }
        self.reboot()
    }
}
