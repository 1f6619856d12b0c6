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

//! `upgrade`
//!
//! Upgrades the firmware. In firmware mode this only reboots the device
//! into its bootloader; run the command again from there with a file.
//!

use crate::session::Session;
use anyhow::Context;
use bbhww::v2::firmware::Bundle;
use bbhww::{Event, EventSlot};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

/// Upgrades firmware
pub struct Upgrade;

/// Upgrades firmware
#[derive(Deserialize)]
pub struct Options {
    /// A signed firmware file
    #[serde(default)]
    file: Option<PathBuf>,
    /// A directory of signed firmware files, BitBox02 only
    #[serde(default)]
    dir: Option<PathBuf>,
}

fn show_progress(events: &EventSlot) {
    events.set(|event| {
        if let Event::BootloaderStatusChanged(status) = event {
            if !status.error_message.is_empty() {
                println!("Upgrade failed: {}", status.error_message);
            } else if status.reboot_seconds > 0 {
                println!("Rebooting in {}s", status.reboot_seconds);
            } else if status.upgrading {
                println!("{:5.1}%", status.progress * 100.0);
            }
        }
    });
}

fn read_file(options: &Options) -> anyhow::Result<Vec<u8>> {
    let path = options
        .file
        .as_ref()
        .ok_or_else(|| anyhow::Error::msg("need a firmware \"file\""))?;
    fs::read(path).with_context(|| format!("reading {}", path.display()))
}

impl super::Command for Upgrade {
    type Options = Options;

    fn execute(options: Self::Options, session: &Session) -> anyhow::Result<()> {
        match *session {
            Session::V1(ref dev) => {
                if dev.unlock_bootloader().context("unlocking bootloader")? {
                    println!("Bootloader unlocked. Replug the device while holding its button.");
                } else {
                    println!("Aborted on the device.");
                }
            }
            Session::V1Bootloader(ref dev) => {
                let firmware = read_file(&options)?;
                show_progress(dev.events());
                dev.upgrade_firmware(&firmware).context("flashing firmware")?;
                println!("Done. The device restarts on its own.");
            }
            Session::V2(ref dev) => {
                dev.upgrade_firmware().context("rebooting into the bootloader")?;
                println!("The device is rebooting into its bootloader.");
            }
            Session::V2Bootloader(ref dev) => {
                show_progress(dev.events());
                if let Some(ref dir) = options.dir {
                    let bundle = Bundle::load_dir(dev.product(), dir)
                        .with_context(|| format!("loading firmware from {}", dir.display()))?;
                    if !dev.upgrade_required(&bundle)? {
                        println!("Firmware is up to date.");
                    } else if dev.upgrade_from_bundle(&bundle).context("flashing firmware")? {
                        println!("Intermediate upgrade done. Run again once the device is back in its bootloader.");
                    }
                } else {
                    let firmware = read_file(&options)?;
                    dev.upgrade_firmware(&firmware).context("flashing firmware")?;
                }
            }
        }
        Ok(())
    }
}
