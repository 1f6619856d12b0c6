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

//! `info`
//!
//! Shows what the device reports about itself
//!

use crate::session::Session;
use anyhow::Context;
use serde::Deserialize;

/// Shows device information
pub struct Info;

/// Shows device information
#[derive(Deserialize)]
pub struct Options {}

impl super::Command for Info {
    type Options = Options;

    fn execute(_: Self::Options, session: &Session) -> anyhow::Result<()> {
        match *session {
            Session::V1(ref dev) => {
                let info = dev.device_info().context("getting device info")?;
                println!("{}", serde_json::to_string_pretty(&info)?);
                println!("Mobile channel: {}", dev.has_mobile_channel());
            }
            Session::V1Bootloader(ref dev) => {
                println!("Bootloader version {}", dev.version());
            }
            Session::V2(ref dev) => {
                let info = dev.device_info().context("getting device info")?;
                println!("{}", serde_json::to_string_pretty(&info)?);
                match dev.attestation() {
                    Some(true) => println!("Attestation: passed"),
                    Some(false) => println!("Attestation: FAILED"),
                    None => println!("Attestation: not checked"),
                }
                let fingerprint = dev.root_fingerprint().context("getting root fingerprint")?;
                println!("Root fingerprint: {}", hex::encode(fingerprint));
            }
            Session::V2Bootloader(ref dev) => {
                let (firmware, signing_keys) = dev.versions().context("getting versions")?;
                println!("Product: {}", dev.product());
                println!("Bootloader version: {}", dev.version());
                println!("Firmware version: {}", firmware);
                println!("Signing keys version: {}", signing_keys);
                println!("Secure chip: {:?}", dev.hardware()?);
                println!("Erased: {}", dev.erased()?);
            }
        }
        Ok(())
    }
}
