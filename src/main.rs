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

//! # bbhww
//!
//! Command-line front end for the BitBox hardware wallet library. It opens
//! the single plugged-in BitBox, whatever its generation or mode, and runs
//! one command against it. Options are passed as a JSON object.
//!
//! The PIN of a legacy Digital BitBox is read from `BITBOX_PIN`. A BitBox02
//! asks for its password on the device itself.
//!

mod commands;
mod session;

use anyhow::Context;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let api = bbhww::hid::Api::new().context("initializing hidapi")?;
    let desc = bbhww::dongle::hid::get_unique(&api).context("finding a BitBox")?;
    println!(
        "Found {} ({}) version {}",
        desc.product,
        if desc.bootloader { "bootloader" } else { "firmware" },
        desc.version.map(|v| v.to_string()).unwrap_or_else(|| "unknown".into()),
    );

    let session = session::Session::open(&api, &desc).context("opening session")?;
    let result = commands::execute_from_args(&session);
    session.close();
    result
}
