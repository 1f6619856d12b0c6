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

//! `backups`
//!
//! Lists the backups on the SD card
//!

use crate::session::Session;
use anyhow::Context;
use serde::Deserialize;

/// Lists backups
pub struct Backups;

/// Lists backups
#[derive(Deserialize)]
pub struct Options {}

impl super::Command for Backups {
    type Options = Options;

    fn execute(_: Self::Options, session: &Session) -> anyhow::Result<()> {
        match *session {
            Session::V1(ref dev) => {
                let list = dev.backup_list().context("listing backups")?;
                println!("{}", serde_json::to_string_pretty(&list)?);
            }
            Session::V2(ref dev) => {
                if !dev.check_sdcard().context("checking for SD card")? {
                    println!("No SD card inserted.");
                    return Ok(());
                }
                let list = dev.list_backups().context("listing backups")?;
                println!("{}", serde_json::to_string_pretty(&list)?);
            }
            _ => super::wrong_mode("backups")?,
        }
        Ok(())
    }
}
