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

//! # Legacy Replies
//!
//! The Digital BitBox answers every command with a JSON object keyed by
//! the command name. Each reply shape we rely on gets its own type here;
//! anything that fails to match is reported with the raw reply attached.
//!

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::Error;

/// The string most commands answer with
pub const SUCCESS: &str = "success";

/// Deserializes a reply into the shape the caller expects
pub fn parse<R: DeserializeOwned>(context: &'static str, reply: serde_json::Value) -> Result<R, Error> {
    match serde_json::from_value::<R>(reply.clone()) {
        Ok(r) => Ok(r),
        Err(e) => {
            log::debug!("unexpected {} reply: {}", context, e);
            Err(Error::reply(context, reply.to_string().as_bytes()))
        }
    }
}

/// Checks that `reply[key] == expected`
pub fn expect_str(context: &'static str, reply: &serde_json::Value, key: &str, expected: &str) -> Result<(), Error> {
    if reply.get(key).and_then(|v| v.as_str()) == Some(expected) {
        Ok(())
    } else {
        Err(Error::reply(context, reply.to_string().as_bytes()))
    }
}

/// Error object embedded in a reply
#[derive(Clone, Debug, Deserialize)]
pub struct DeviceError {
    /// Human readable message
    pub message: String,
    /// Numeric code; see [`crate::constants::v1::error`]
    pub code: serde_json::Number,
}

impl From<DeviceError> for Error {
    fn from(e: DeviceError) -> Error {
        let code = e
            .code
            .as_i64()
            .or_else(|| e.code.as_f64().map(|f| f as i64))
            .unwrap_or(0);
        Error::Device {
            code,
            message: e.message,
        }
    }
}

/// Reply to `{"ping": ""}`
#[derive(Clone, Debug, Deserialize)]
pub struct Ping {
    /// `"password"` once a PIN is set
    #[serde(default)]
    pub ping: String,
}

/// What `{"device": "info"}` reports
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Firmware version string
    pub version: String,
    /// Serial number
    pub serial: String,
    /// Device id
    pub id: String,
    /// 2FA pubkey, if locked
    #[serde(rename = "TFA")]
    pub tfa: String,
    /// Whether the bootloader is locked
    pub bootlock: bool,
    /// Device (wallet) name
    pub name: String,
    /// Whether an SD card is inserted
    pub sdcard: bool,
    /// Whether the device is locked for 2FA
    pub lock: bool,
    /// Whether U2F is enabled
    #[serde(rename = "U2F")]
    pub u2f: bool,
    /// Whether U2F hijack is enabled (2.2.0 and later)
    #[serde(rename = "U2F_hijack", default)]
    pub u2f_hijack: bool,
    /// Whether a wallet exists
    pub seeded: bool,
    /// Whether the hidden wallet uses the newer derivation (5.0.0 and later)
    #[serde(default)]
    pub new_hidden_wallet: bool,
    /// Whether a mobile app is paired (6.0.0 and later)
    #[serde(default)]
    pub pairing: bool,
}

#[derive(Deserialize)]
pub(crate) struct DeviceInfoReply {
    pub device: DeviceInfo,
}

#[derive(Deserialize)]
pub(crate) struct LockReply {
    pub device: LockState,
}

#[derive(Deserialize)]
pub(crate) struct LockState {
    pub lock: bool,
}

#[derive(Deserialize)]
pub(crate) struct NameReply {
    pub name: String,
}

#[derive(Deserialize)]
pub(crate) struct XPubReply {
    pub xpub: String,
    #[serde(default)]
    pub echo: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct RandomReply {
    pub random: String,
    #[serde(default)]
    pub echo: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct BackupListReply {
    pub backup: Vec<String>,
}

#[derive(Deserialize)]
pub(crate) struct EchoReply {
    #[serde(default)]
    pub echo: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct SignReply {
    pub sign: Vec<SignedHash>,
}

#[derive(Deserialize)]
pub(crate) struct SignedHash {
    pub sig: String,
    #[serde(default)]
    pub recid: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct EcdhReply {
    pub ecdh: serde_json::Value,
}

/// Device features which can be toggled with `feature_set`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSet {
    /// Use the newer hidden wallet derivation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_hidden_wallet: Option<bool>,
    /// Allow pairing with a mobile app
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairing: Option<bool>,
}
