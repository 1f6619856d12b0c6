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

//! `pair`
//!
//! Pairs a Digital BitBox with the mobile app
//!

use crate::session::Session;
use anyhow::Context;
use bbhww::Event;
use serde::Deserialize;

/// Pairs with the mobile app
pub struct Pair;

/// Pairs with the mobile app
#[derive(Deserialize)]
pub struct Options {}

impl super::Command for Pair {
    type Options = Options;

    fn execute(_: Self::Options, session: &Session) -> anyhow::Result<()> {
        let dev = match *session {
            Session::V1(ref dev) => dev,
            _ => return super::wrong_mode("pair"),
        };
        let events = dev.events().channel(16);
        let channel = dev.start_pairing().context("starting pairing")?;
        println!("Scan this code with the mobile app:");
        println!("{}", channel.pairing_code());

        for event in events {
            match event {
                Event::PairingStarted => println!("Mobile found, confirm on the device."),
                Event::PairingSuccess => {
                    println!("Paired.");
                    return Ok(());
                }
                Event::PairingError
                | Event::PairingTimedout
                | Event::PairingAborted
                | Event::PairingScanningFailed
                | Event::PairingPullMessageFailed => {
                    return Err(anyhow::Error::msg(format!("pairing failed: {:?}", event)));
                }
                _ => {}
            }
        }
        Ok(())
    }
}
