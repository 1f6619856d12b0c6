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

//! # Error Handling

use crate::{constants, Status, Version};
use miniscript::bitcoin;
use std::{io, string};
use thiserror::Error;

/// BitBox driver error
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum Error {
    #[error("base64")]
    Base64(#[from] base64::DecodeError),
    #[error("channel decryption failed")]
    ChannelDecrypt,
    #[error("critical: {0}")]
    Critical(&'static str),
    #[error("device error {code}: {message}")]
    Device { code: i64, message: String },
    #[error("no device detected")]
    DongleNotFound,
    #[error("more than one device detected")]
    DongleNotUnique,
    #[error("the device firmware is too old for {feature} (requires {required})")]
    FirmwareTooOld {
        feature: &'static str,
        required: Version,
    },
    #[error("firmware too big ({0} bytes)")]
    FirmwareTooBig(usize),
    #[error("firmware too small ({0} bytes)")]
    FirmwareTooSmall(usize),
    #[error("firmware did not pass the signature verification")]
    FirmwareSignature,
    #[error("firmware magic {found:08x} does not match this product ({expected:08x})")]
    FirmwareWrongMagic { expected: u32, found: u32 },
    #[error("packet for wrong channel (expected {expected:08x}, found {found:08x})")]
    FrameWrongChannel { expected: u32, found: u32 },
    #[error("packet for wrong command (expected {expected:02x}, found {found:02x})")]
    FrameWrongCommand { expected: u8, found: u8 },
    #[error("packet out of order (expected {expected}, found {found})")]
    FrameWrongSequence { expected: u8, found: u8 },
    #[error("packet too short ({0} bytes)")]
    FrameTooShort(usize),
    #[error("message too long to be framed ({0} bytes)")]
    FrameMessageTooLong(usize),
    #[error("utf8")]
    FromUtf8(#[from] string::FromUtf8Error),
    #[error("handshake must come first")]
    HandshakeFirst,
    #[error("hex")]
    Hex(#[from] hex::FromHexError),
    #[error("hidapi")]
    Hid(#[from] hidapi::HidError),
    #[error("invalid {what}: {reason}")]
    InvalidInput {
        what: &'static str,
        reason: String,
    },
    #[error("io")]
    Io(#[from] io::Error),
    #[error("json")]
    Json(#[from] serde_json::Error),
    #[error("noise: {0}")]
    Noise(String),
    #[error("protobuf")]
    Protobuf(#[from] prost::DecodeError),
    #[error("device is busy")]
    QueryBusy,
    #[error("device rejected the request (nack)")]
    QueryNack,
    #[error("empty reply from device")]
    QueryEmpty,
    #[error("mobile relay: {0}")]
    Relay(String),
    #[cfg(feature = "relay")]
    #[error("http")]
    Http(#[from] reqwest::Error),
    #[error("secp256k1")]
    Secp256k1(#[from] bitcoin::secp256k1::Error),
    #[error("p256")]
    P256(#[from] p256::ecdsa::Error),
    #[error("operation not allowed in status {0:?}")]
    State(Status),
    #[error("timed out waiting for {0}")]
    Timeout(&'static str),
    #[error("unexpected reply to {context}: {reply:02x?}")]
    UnexpectedReply {
        context: &'static str,
        reply: Vec<u8>,
    },
    #[error("unexpected end-of-data")]
    UnexpectedEof,
    #[error("device did something we do not support: {0}")]
    Unsupported(&'static str),
    #[error("an upgrade is already in progress")]
    UpgradeInProgress,
    #[error("verification of {0} failed")]
    Verification(&'static str),
}

impl Error {
    /// Shorthand for an unexpected reply
    pub(crate) fn reply(context: &'static str, reply: &[u8]) -> Self {
        Error::UnexpectedReply {
            context,
            reply: reply.to_vec(),
        }
    }

    /// Shorthand for an invalid input
    pub(crate) fn invalid<S: Into<String>>(what: &'static str, reason: S) -> Self {
        Error::InvalidInput {
            what,
            reason: reason.into(),
        }
    }

    /// Whether this is an error reported by the device with the given code
    pub fn is_code(&self, code: i64) -> bool {
        match *self {
            Error::Device { code: c, .. } => c == code,
            _ => false,
        }
    }

    /// Whether the user aborted the operation on the device
    pub fn is_user_abort(&self) -> bool {
        self.is_code(constants::v2::error::USER_ABORT) || self.is_code(constants::v1::error::TOUCH_ABORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_codes() {
        let e = Error::Device {
            code: 104,
            message: "aborted".into(),
        };
        assert!(e.is_code(104));
        assert!(e.is_user_abort());
        assert!(!Error::QueryBusy.is_user_abort());
        assert_eq!(e.to_string(), "device error 104: aborted");
    }
}
