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

//! # Input Policies
//!
//! Host-side checks on PINs, passwords and names, applied before anything
//! is sent to a device.
//!

use regex::Regex;

use crate::Error;

const PRODUCTION_PATTERN: &str = "^[[:print:]]{4,}$";
const TESTING_PATTERN: &str = "^.{4,}$";
const DEVICE_NAME_PATTERN: &str = "^[0-9a-zA-Z_-]{1,31}$";
const WALLET_NAME_PATTERN: &str = "^[0-9a-zA-Z_.-]{1,31}$";

/// A regex any candidate PIN or backup password must match
#[derive(Clone, Debug)]
pub struct PasswordPolicy {
    regex: Regex,
}

impl PasswordPolicy {
    /// Compiles a custom policy
    pub fn new(pattern: &str) -> Result<Self, Error> {
        Ok(PasswordPolicy {
            regex: Regex::new(pattern).map_err(|e| Error::invalid("policy", e.to_string()))?,
        })
    }

    /// The policy used with real devices: at least four printable characters
    pub fn production() -> Self {
        PasswordPolicy::new(PRODUCTION_PATTERN).expect("static regex")
    }

    /// The policy used in testing mode
    pub fn testing() -> Self {
        PasswordPolicy::new(TESTING_PATTERN).expect("static regex")
    }

    /// Checks a candidate password
    pub fn validate(&self, password: &str) -> Result<(), Error> {
        if self.regex.is_match(password) {
            Ok(())
        } else {
            Err(Error::invalid(
                "password",
                format!("does not match {}", self.regex.as_str()),
            ))
        }
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        PasswordPolicy::production()
    }
}

fn validate_name(what: &'static str, pattern: &str, name: &str) -> Result<(), Error> {
    let regex = Regex::new(pattern).expect("static regex");
    if regex.is_match(name) {
        Ok(())
    } else {
        Err(Error::invalid(what, format!("{:?} does not match {}", name, pattern)))
    }
}

/// Device names: 1 to 31 of `[0-9a-zA-Z_-]`
pub(crate) fn validate_device_name(name: &str) -> Result<(), Error> {
    validate_name("device name", DEVICE_NAME_PATTERN, name)
}

/// Wallet (backup) names: like device names, but dots are allowed too
pub(crate) fn validate_wallet_name(name: &str) -> Result<(), Error> {
    validate_name("wallet name", WALLET_NAME_PATTERN, name)
}
