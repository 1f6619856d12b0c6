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

//! Sessions
//!
//! One opened device, in whichever of its four guises it showed up.
//!

use anyhow::{self, Context};
use bbhww::dongle::hid::{Descriptor, Generation, HidTransport};
use bbhww::dongle::WriteShim;
use bbhww::{hid, v1, v2, PairingDatabase, Status};
use std::io::{self, BufRead, Write};
use std::{env, sync::Arc};

/// Environment variable holding the PIN of a legacy device
const PIN_VAR: &str = "BITBOX_PIN";

/// An opened device
pub enum Session {
    /// Digital BitBox firmware
    V1(Arc<v1::Device<HidTransport>>),
    /// Digital BitBox bootloader
    V1Bootloader(v1::bootloader::Device<HidTransport>),
    /// BitBox02 firmware, after the connection workflow ran
    V2(v2::Device<WriteShim<HidTransport>>),
    /// BitBox02 bootloader
    V2Bootloader(v2::bootloader::Device<WriteShim<HidTransport>>),
}

/// Prompt the user for some string data
pub fn user_prompt(prompt: &str) -> anyhow::Result<String> {
    print!("{}: ", prompt);
    io::stdout().flush().context("flushing stdout")?;
    let stdin = io::stdin();
    let line = stdin
        .lock()
        .lines()
        .next()
        .ok_or_else(|| anyhow::Error::msg("stdin closed"))?;
    Ok(line.context("reading from stdin")?)
}

impl Session {
    /// Opens the device behind `desc`, logging in or pairing as needed
    pub fn open(api: &hid::Api, desc: &Descriptor) -> anyhow::Result<Session> {
        let dev = HidTransport::open(api, desc)?;
        let id = desc.serial.clone();
        match (desc.generation, desc.bootloader) {
            (Generation::V1, false) => {
                let version = desc
                    .version
                    .ok_or_else(|| anyhow::Error::msg("no version in the USB serial number"))?;
                let device = v1::Device::open(id, dev, version, v1::Config::default())?;
                if let Ok(pin) = env::var(PIN_VAR) {
                    device.login(&pin).context("logging in")?;
                }
                println!("Status: {:?}", device.status());
                Ok(Session::V1(Arc::new(device)))
            }
            (Generation::V1, true) => {
                let version = desc.version.unwrap_or_default();
                Ok(Session::V1Bootloader(v1::bootloader::Device::new(id, dev, version)))
            }
            (Generation::V2, false) => {
                let db = match PairingDatabase::default_path() {
                    Some(path) => PairingDatabase::open(&path)
                        .with_context(|| format!("opening pairing database {}", path.display()))?,
                    None => PairingDatabase::in_memory(),
                };
                let device = v2::Device::open(id, WriteShim::for_platform(dev), Arc::new(db))?;
                device.init().context("connecting")?;
                if device.status() == Status::Unpaired {
                    let (hash, _) = device.channel_hash();
                    println!("Pairing code:");
                    println!("{}", hash);
                    let answer = user_prompt("Does the device show the same code? [y/N]")?;
                    device.channel_hash_verify(answer.trim().eq_ignore_ascii_case("y"))?;
                }
                println!("Status: {:?}", device.status());
                Ok(Session::V2(device))
            }
            (Generation::V2, true) => {
                let version = desc.version.unwrap_or_default();
                Ok(Session::V2Bootloader(v2::bootloader::Device::new(
                    id,
                    WriteShim::for_platform(dev),
                    version,
                    desc.product,
                )))
            }
        }
    }

    /// Name of the device in log messages
    pub fn id(&self) -> &str {
        match *self {
            Session::V1(ref dev) => dev.id(),
            Session::V1Bootloader(ref dev) => dev.id(),
            Session::V2(ref dev) => dev.id(),
            Session::V2Bootloader(ref dev) => dev.id(),
        }
    }

    /// Releases the device
    pub fn close(&self) {
        match *self {
            Session::V1(ref dev) => dev.close(),
            Session::V1Bootloader(ref dev) => dev.close(),
            Session::V2(ref dev) => dev.close(),
            Session::V2Bootloader(ref dev) => dev.close(),
        }
    }
}
