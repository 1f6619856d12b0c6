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

//! `xpub`
//!
//! Gets an extended public key
//!

use crate::session::Session;
use anyhow::Context;
use bbhww::v2::messages::{btc_pub_request::XPubType, BtcCoin};
use miniscript::bitcoin::bip32;
use serde::Deserialize;

/// Gets an xpub
pub struct Xpub;

/// Gets an xpub
#[derive(Deserialize)]
pub struct Options {
    path: String,
    #[serde(default)]
    testnet: bool,
    #[serde(default)]
    display: bool,
}

impl super::Command for Xpub {
    type Options = Options;

    fn execute(options: Self::Options, session: &Session) -> anyhow::Result<()> {
        let path: bip32::DerivationPath = options
            .path
            .parse()
            .with_context(|| format!("parsing keypath {}", options.path))?;
        match *session {
            Session::V1(ref dev) => {
                let xpub = dev.xpub(&path).context("getting xpub")?;
                println!("{}", xpub);
            }
            Session::V2(ref dev) => {
                let keypath: Vec<u32> = (&path).into_iter().map(|c| u32::from(*c)).collect();
                let (coin, xpub_type) = if options.testnet {
                    (BtcCoin::Tbtc, XPubType::Tpub)
                } else {
                    (BtcCoin::Btc, XPubType::Xpub)
                };
                let xpub = dev
                    .btc_xpub(coin, &keypath, xpub_type, options.display)
                    .context("getting xpub")?;
                println!("{}", xpub);
            }
            _ => super::wrong_mode("xpub")?,
        }
        Ok(())
    }
}
