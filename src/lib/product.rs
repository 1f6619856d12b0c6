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

//! # Products
//!
//! Every hardware product is a platform (the physical device) combined
//! with an edition (which coins the firmware supports). The BitBox02
//! bootloader refuses firmware built for a different product; we check
//! the same magic on the host before touching the device.
//!

use std::fmt;

use serde::{Deserialize, Serialize};

/// Hardware platform
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// The legacy Digital BitBox
    BitBox01,
    /// The BitBox02
    BitBox02,
    /// The BitBox02 Nova (BitBox02 Plus)
    BitBox02Plus,
}

/// Firmware edition
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edition {
    /// All supported coins
    Multi,
    /// Bitcoin only
    BtcOnly,
}

/// A {platform, edition} pair
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Product {
    /// Digital BitBox
    #[serde(rename = "bitbox")]
    DigitalBitbox,
    /// BitBox02 multi edition
    #[serde(rename = "bitbox02-multi")]
    BitBox02Multi,
    /// BitBox02 Bitcoin-only edition
    #[serde(rename = "bitbox02-btconly")]
    BitBox02BtcOnly,
    /// BitBox02 Plus multi edition
    #[serde(rename = "bitbox02-plus-multi")]
    BitBox02PlusMulti,
    /// BitBox02 Plus Bitcoin-only edition
    #[serde(rename = "bitbox02-plus-btconly")]
    BitBox02PlusBtcOnly,
}

/// USB product strings of the BitBox02 family: (string, product, is bootloader)
const V2_USB_PRODUCTS: [(&str, Product, bool); 8] = [
    ("BitBox02", Product::BitBox02Multi, false),
    ("BitBox02BTC", Product::BitBox02BtcOnly, false),
    ("bb02-bootloader", Product::BitBox02Multi, true),
    ("bb02btc-bootloader", Product::BitBox02BtcOnly, true),
    ("bb02p-multi", Product::BitBox02PlusMulti, false),
    ("bb02p-btconly", Product::BitBox02PlusBtcOnly, false),
    ("bb02p-bl-multi", Product::BitBox02PlusMulti, true),
    ("bb02p-bl-btconly", Product::BitBox02PlusBtcOnly, true),
];

impl Product {
    /// Assemble a product from its parts
    pub fn new(platform: Platform, edition: Edition) -> Product {
        match (platform, edition) {
            (Platform::BitBox01, _) => Product::DigitalBitbox,
            (Platform::BitBox02, Edition::Multi) => Product::BitBox02Multi,
            (Platform::BitBox02, Edition::BtcOnly) => Product::BitBox02BtcOnly,
            (Platform::BitBox02Plus, Edition::Multi) => Product::BitBox02PlusMulti,
            (Platform::BitBox02Plus, Edition::BtcOnly) => Product::BitBox02PlusBtcOnly,
        }
    }

    /// The hardware platform
    pub fn platform(self) -> Platform {
        match self {
            Product::DigitalBitbox => Platform::BitBox01,
            Product::BitBox02Multi | Product::BitBox02BtcOnly => Platform::BitBox02,
            Product::BitBox02PlusMulti | Product::BitBox02PlusBtcOnly => Platform::BitBox02Plus,
        }
    }

    /// The firmware edition
    pub fn edition(self) -> Edition {
        match self {
            Product::DigitalBitbox | Product::BitBox02Multi | Product::BitBox02PlusMulti => {
                Edition::Multi
            }
            Product::BitBox02BtcOnly | Product::BitBox02PlusBtcOnly => Edition::BtcOnly,
        }
    }

    /// Magic number at the start of signed firmware for this product
    ///
    /// The legacy device does not use one.
    pub fn firmware_magic(self) -> Option<u32> {
        match self {
            Product::DigitalBitbox => None,
            Product::BitBox02Multi => Some(0x653f_362b),
            Product::BitBox02BtcOnly => Some(0x1123_3b0b),
            Product::BitBox02PlusMulti => Some(0x5b64_8ceb),
            Product::BitBox02PlusBtcOnly => Some(0x4871_4774),
        }
    }

    /// Looks up a BitBox02-family USB product string
    ///
    /// Returns the product and whether the device is in bootloader mode.
    pub fn from_usb_product(s: &str) -> Option<(Product, bool)> {
        V2_USB_PRODUCTS
            .iter()
            .find(|entry| entry.0 == s)
            .map(|entry| (entry.1, entry.2))
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Product::DigitalBitbox => "bitbox",
            Product::BitBox02Multi => "bitbox02-multi",
            Product::BitBox02BtcOnly => "bitbox02-btconly",
            Product::BitBox02PlusMulti => "bitbox02-plus-multi",
            Product::BitBox02PlusBtcOnly => "bitbox02-plus-btconly",
        })
    }
}
