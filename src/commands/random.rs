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

//! `random`
//!
//! Draws random bytes from the device
//!

use crate::session::Session;
use anyhow::Context;
use bbhww::v1::RandomKind;
use serde::Deserialize;

/// Gets random bytes
pub struct Random;

/// Gets random bytes
#[derive(Deserialize)]
pub struct Options {
    #[serde(default)]
    pseudo: bool,
}

impl super::Command for Random {
    type Options = Options;

    fn execute(options: Self::Options, session: &Session) -> anyhow::Result<()> {
        match *session {
            Session::V1(ref dev) => {
                let kind = if options.pseudo {
                    RandomKind::Pseudo
                } else {
                    RandomKind::True
                };
                println!("{}", dev.random(kind).context("getting random number")?);
            }
            Session::V2(ref dev) => {
                let bytes = dev.random_number().context("getting random number")?;
                println!("{}", hex::encode(bytes));
            }
            _ => super::wrong_mode("random")?,
        }
        Ok(())
    }
}
