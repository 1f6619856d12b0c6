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

//! Argument Parsing
//!
//! Different subcommands supported by the command-line utility
//!

mod backups;
mod info;
mod pair;
mod random;
mod upgrade;
mod xpub;

use crate::session::Session;
use anyhow::{self, Context};
use serde::de::DeserializeOwned;
use std::{borrow::Cow, env};

pub trait Command {
    type Options: DeserializeOwned;

    fn execute(options: Self::Options, session: &Session) -> anyhow::Result<()>;
}

macro_rules! register_commands {
    ($($cmd_name:ident, $type_name:ident, $help:expr;)*) => {
        $(use $cmd_name::$type_name;)*

        fn usage<T>(name: &str) -> anyhow::Result<T> {
            eprintln!("Usage: {} <command> [json options]", name);
            eprintln!("");
            eprintln!("Commands:");
            $(eprintln!("    {:12} {}", stringify!($cmd_name), $help);)*
            eprintln!("");
            eprintln!("Set BITBOX_PIN to log in to a Digital BitBox.");
            Err(anyhow::Error::msg("bad invocation"))
        }

        /// Parse command-line arguments and run the command on `session`
        pub fn execute_from_args(session: &Session) -> anyhow::Result<()> {
            let args: Vec<_> = env::args_os().collect();
            let name = args
                .first()
                .map(|name| name.to_string_lossy())
                .unwrap_or(Cow::Borrowed("bbhww"));
            let (cmd, options) = match args.len() {
                2 => (args[1].to_string_lossy(), Cow::Borrowed("{}")),
                3 => (args[1].to_string_lossy(), args[2].to_string_lossy()),
                _ => return usage(&name),
            };

            match cmd.as_ref() {
                $(stringify!($cmd_name) => {
                    let opts: <$type_name as Command>::Options = serde_json::from_str(&options)
                        .with_context(|| format!(
                            "deserializing options for {}",
                             stringify!($cmd_name),
                        ))?;
                    log::debug!("running {} on {}", stringify!($cmd_name), session.id());
                    $type_name::execute(opts, session)
                }),*
                _ => usage(&name),
            }
        }
    }
}

register_commands! {
    backups, Backups, "";
    info, Info, "";
    pair, Pair, "";
    random, Random, "{ \"pseudo\": bool (optional) }";
    upgrade, Upgrade, "{ \"file\": string (optional), \"dir\": string (optional) }";
    xpub, Xpub, "{ \"path\": string, \"testnet\": bool (optional), \"display\": bool (optional) }";
}

/// Error out for a command the device cannot run in its current mode
fn wrong_mode<T>(cmd: &str) -> anyhow::Result<T> {
    Err(anyhow::Error::msg(format!(
        "{} is not available with the device in this mode",
        cmd
    )))
}
