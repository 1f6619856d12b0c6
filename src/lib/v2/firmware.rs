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

//! # Signed Firmware
//!
//! A signed BitBox02 firmware file is laid out as
//!
//! ```text
//! magic[4] || signing pubkeys data[388] || firmware data[196] || binary
//! ```
//!
//! where the firmware data starts with the little-endian monotonic version
//! of the binary. Bundles of such files are provisioned from outside; we
//! only parse them and pick which one to flash next.
//!

use std::path::Path;
use std::{fmt, fs};

use byteorder::{ByteOrder, LittleEndian};
use regex::Regex;

use crate::constants::v2::bootloader::{MAGIC_LEN, MAX_FIRMWARE_SIZE, PAD, SIG_DATA_LEN};
use crate::{crypto, Error, Product, Version};

/// Length of the signing pubkeys data: version and two sets of three keys/signatures
pub const SIGNING_PUBKEYS_DATA_LEN: usize = 4 + 3 * 64 + 3 * 64;
/// Length of the firmware data: version and three signatures
pub const FIRMWARE_DATA_LEN: usize = 4 + 3 * 64;

/// Products whose firmware carries a magic
const MAGIC_PRODUCTS: [Product; 4] = [
    Product::BitBox02Multi,
    Product::BitBox02BtcOnly,
    Product::BitBox02PlusMulti,
    Product::BitBox02PlusBtcOnly,
];

/// Double-sha256 of a firmware binary padded to full flash size, prefixed
/// with its monotonic version. The bootloader reports the same hash.
pub fn hash_firmware(monotonic_version: u32, binary: &[u8]) -> [u8; 32] {
    let mut data = Vec::with_capacity(4 + MAX_FIRMWARE_SIZE);
    let mut version = [0u8; 4];
    LittleEndian::write_u32(&mut version, monotonic_version);
    data.extend_from_slice(&version);
    data.extend_from_slice(binary);
    data.resize(4 + MAX_FIRMWARE_SIZE, PAD);
    crypto::sha256d(&data)
}

/// A parsed signed firmware file
#[derive(Clone, PartialEq, Eq)]
pub struct SignedFirmware {
    product: Product,
    sig_data: Vec<u8>,
    binary: Vec<u8>,
}

impl fmt::Debug for SignedFirmware {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SignedFirmware")
            .field("product", &self.product)
            .field("monotonic_version", &self.monotonic_version())
            .field("binary_len", &self.binary.len())
            .finish()
    }
}

impl SignedFirmware {
    /// Splits a signed firmware file into its parts
    pub fn parse(data: &[u8]) -> Result<SignedFirmware, Error> {
        if data.len() < MAGIC_LEN + SIG_DATA_LEN {
            return Err(Error::FirmwareTooSmall(data.len()));
        }
        let magic = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let product = MAGIC_PRODUCTS
            .iter()
            .cloned()
            .find(|p| p.firmware_magic() == Some(magic))
            .ok_or(Error::FirmwareWrongMagic {
                expected: 0,
                found: magic,
            })?;
        let binary = &data[MAGIC_LEN + SIG_DATA_LEN..];
        if binary.len() > MAX_FIRMWARE_SIZE {
            return Err(Error::FirmwareTooBig(binary.len()));
        }
        Ok(SignedFirmware {
            product,
            sig_data: data[MAGIC_LEN..MAGIC_LEN + SIG_DATA_LEN].to_vec(),
            binary: binary.to_vec(),
        })
    }

    /// Product the firmware was built for
    pub fn product(&self) -> Product {
        self.product
    }

    /// Signature block uploaded after the binary
    pub fn sig_data(&self) -> &[u8] {
        &self.sig_data
    }

    /// The firmware binary
    pub fn binary(&self) -> &[u8] {
        &self.binary
    }

    /// Monotonic version the bootloader will report once this is flashed
    pub fn monotonic_version(&self) -> u32 {
        LittleEndian::read_u32(&self.sig_data[SIGNING_PUBKEYS_DATA_LEN..SIGNING_PUBKEYS_DATA_LEN + 4])
    }

    /// The hash the bootloader reports once this is flashed
    pub fn hash(&self) -> [u8; 32] {
        hash_firmware(self.monotonic_version(), &self.binary)
    }

    /// Errors out unless this firmware was built for `product`
    pub fn check_product(&self, product: Product) -> Result<(), Error> {
        if self.product == product {
            return Ok(());
        }
        Err(Error::FirmwareWrongMagic {
            expected: product.firmware_magic().unwrap_or(0),
            found: self.product.firmware_magic().unwrap_or(0),
        })
    }
}

/// One firmware of a bundle
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FirmwareInfo {
    /// Semantic version shown to the user
    pub version: Version,
    /// The signed file
    pub firmware: SignedFirmware,
}

impl FirmwareInfo {
    /// Monotonic version of the signed file
    pub fn monotonic_version(&self) -> u32 {
        self.firmware.monotonic_version()
    }
}

/// The firmwares available for one product, ordered by monotonic version
///
/// Some firmwares must be booted once before a later one can be installed.
/// Those stay in the bundle as intermediate steps and are flashed one at a
/// time; the last entry is the latest firmware.
#[derive(Clone, Debug)]
pub struct Bundle {
    product: Product,
    firmwares: Vec<FirmwareInfo>,
}

impl Bundle {
    /// Builds a bundle, checking products and sorting by monotonic version
    pub fn new(product: Product, mut firmwares: Vec<FirmwareInfo>) -> Result<Bundle, Error> {
        if firmwares.is_empty() {
            return Err(Error::invalid("firmware bundle", "no firmware"));
        }
        for fw in &firmwares {
            fw.firmware.check_product(product)?;
        }
        firmwares.sort_by_key(FirmwareInfo::monotonic_version);
        Ok(Bundle { product, firmwares })
    }

    /// Loads every `*.v<X.Y.Z>.signed.bin` file for `product` from a directory
    ///
    /// Files built for other products are skipped.
    pub fn load_dir<P: AsRef<Path>>(product: Product, dir: P) -> Result<Bundle, Error> {
        let re = Regex::new(r"\.v([0-9]+\.[0-9]+\.[0-9]+)\.signed\.bin$").expect("static regex");
        let mut firmwares = vec![];
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let name = match path.file_name().and_then(|n| n.to_str()) {
                Some(name) => name.to_owned(),
                None => continue,
            };
            let version: Version = match re.captures(&name).and_then(|c| c.get(1)) {
                Some(m) => m.as_str().parse()?,
                None => continue,
            };
            let firmware = SignedFirmware::parse(&fs::read(&path)?)?;
            if firmware.product() != product {
                log::debug!("skipping {} built for {}", name, firmware.product());
                continue;
            }
            log::debug!(
                "found firmware {} (monotonic {}) for {}",
                version,
                firmware.monotonic_version(),
                product
            );
            firmwares.push(FirmwareInfo { version, firmware });
        }
        Bundle::new(product, firmwares)
    }

    /// Product of the bundle
    pub fn product(&self) -> Product {
        self.product
    }

    /// The newest firmware
    pub fn latest(&self) -> &FirmwareInfo {
        self.firmwares.last().expect("bundle is never empty")
    }

    /// The firmware to flash on top of `current`: the first one newer than
    /// it, which may be an intermediate step, or the latest if none is
    pub fn next(&self, current: u32) -> &FirmwareInfo {
        self.firmwares
            .iter()
            .find(|fw| fw.monotonic_version() > current)
            .unwrap_or_else(|| self.latest())
    }

    /// Whether a device running monotonic version `current` should be upgraded
    pub fn upgrade_required(&self, current: u32) -> bool {
        current < self.latest().monotonic_version()
    }
}
