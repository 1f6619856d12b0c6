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

//! # USB Discovery
//!
//! Thin dispatch over USB descriptors: which plugged-in devices are
//! BitBoxes, which generation, and whether they sit in the bootloader.
//!

use std::ffi::CString;
use std::time::Duration;

use regex::Regex;

use crate::constants;
use crate::dongle::ReadWrite;
use crate::{hid, Error, Product, Version};

/// Device generation, which decides the protocol stack to use
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Generation {
    /// The legacy Digital BitBox
    V1,
    /// The BitBox02 family
    V2,
}

/// What we learned about a device from its USB descriptors alone
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Descriptor {
    /// OS path used to open the device
    pub path: CString,
    /// Protocol generation
    pub generation: Generation,
    /// Product, as far as the descriptors tell
    pub product: Product,
    /// Whether the device is in bootloader mode
    pub bootloader: bool,
    /// Firmware (or bootloader) version encoded in the serial number
    pub version: Option<Version>,
    /// USB serial number string
    pub serial: String,
}

/// Extracts the `vX.Y.Z` version the devices embed in their serial number
pub fn version_from_serial(serial: &str) -> Option<Version> {
    let re = Regex::new(r"v([0-9]+\.[0-9]+\.[0-9]+)").expect("static regex");
    re.captures(serial)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Classifies a single HID interface, if it belongs to a BitBox
pub fn classify(
    vendor_id: u16,
    product_id: u16,
    usage_page: u16,
    interface: i32,
    product_string: &str,
    serial: &str,
) -> Option<(Generation, Product, bool)> {
    if vendor_id != constants::hid::VENDOR_ID {
        return None;
    }
    if product_id == constants::hid::v1::PRODUCT_ID
        && (usage_page == constants::hid::v1::USAGE_PAGE || interface == 0)
    {
        let bootloader = constants::hid::v1::BOOTLOADER_PRODUCTS.contains(&product_string);
        return Some((Generation::V1, Product::DigitalBitbox, bootloader));
    }
    if product_id == constants::hid::v2::PRODUCT_ID
        && (usage_page == constants::hid::v2::USAGE_PAGE || interface == 0)
    {
        if let Some((product, bootloader)) = Product::from_usb_product(product_string) {
            return Some((Generation::V2, product, bootloader));
        }
        log::warn!(
            "unrecognized BitBox02 product string {:?} (serial {})",
            product_string,
            serial
        );
    }
    None
}

/// Lists all BitBox devices currently plugged in
pub fn enumerate(api: &hid::Api) -> Vec<Descriptor> {
    let mut ret = vec![];
    for info in api.device_list() {
        let product_string = info.product_string().unwrap_or("");
        let serial = info.serial_number().unwrap_or("");
        if let Some((generation, product, bootloader)) = classify(
            info.vendor_id(),
            info.product_id(),
            info.usage_page(),
            info.interface_number(),
            product_string,
            serial,
        ) {
            ret.push(Descriptor {
                path: info.path().to_owned(),
                generation,
                product,
                bootloader,
                version: version_from_serial(serial),
                serial: serial.to_owned(),
            });
        }
    }
    ret
}

/// Finds the single plugged-in BitBox. Errors out if there is none or if
/// there are several.
pub fn get_unique(api: &hid::Api) -> Result<Descriptor, Error> {
    let mut found = None;
    for desc in enumerate(api) {
        if found.is_some() {
            return Err(Error::DongleNotUnique);
        }
        found = Some(desc);
    }
    found.ok_or(Error::DongleNotFound)
}

/// An opened hidapi device
pub struct HidTransport {
    hid_dev: hid::Device,
    timeout: Option<Duration>,
}

impl HidTransport {
    /// Opens the device described by `desc`
    pub fn open(api: &hid::Api, desc: &Descriptor) -> Result<Self, Error> {
        Ok(HidTransport {
            hid_dev: api.open_path(&desc.path)?,
            timeout: None,
        })
    }

    /// Sets a read timeout; by default reads block until the device answers
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }
}

impl ReadWrite for HidTransport {
    fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
        // hidapi wants the report id in front
        let mut report = Vec::with_capacity(data.len() + 1);
        report.push(0);
        report.extend_from_slice(data);
        let n = self.hid_dev.write(&report)?;
        Ok(n.saturating_sub(1).min(data.len()))
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let timeout_ms = match self.timeout {
            Some(t) => t.as_millis() as i32,
            None => -1,
        };
        let n = self.hid_dev.read_timeout(buf, timeout_ms)?;
        if n == 0 {
            return Err(Error::Timeout("device read"));
        }
        Ok(n)
    }
}
