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

//! # BitBox Hardware Wallet Library
//!
//! Host-side driver for the BitBox family of USB hardware wallets. Two
//! generations are supported: the legacy Digital BitBox ([`v1`]), which
//! speaks JSON over a PIN-keyed AES channel, and the BitBox02 ([`v2`]),
//! which speaks protobuf over a Noise channel. Both ride on the same
//! U2F-HID style packet layer in [`dongle`].
//!
//! The library never enumerates USB devices on its own behalf beyond the
//! thin helpers in [`dongle::hid`]; callers hand it an opened handle that
//! implements [`dongle::ReadWrite`].
//!

// Coding conventions
#![deny(non_upper_case_globals)]
#![deny(non_camel_case_types)]
#![deny(non_snake_case)]
#![deny(unused_mut)]
#![deny(missing_docs)]

pub mod constants;
mod crypto;
pub mod dongle;
mod error;
mod event;
pub mod pairing_db;
mod policy;
mod product;
mod status;
pub mod v1;
pub mod v2;
mod version;

pub use error::Error;
pub use event::{Event, EventSlot};
pub use pairing_db::PairingDatabase;
pub use policy::PasswordPolicy;
pub use product::{Edition, Platform, Product};
pub use status::{BootloaderStatus, Status};
pub use version::Version;

use std::sync::{Mutex, MutexGuard};

/// Locks a mutex, carrying on with the data if a previous holder panicked
pub(crate) fn lock<X>(mutex: &Mutex<X>) -> MutexGuard<X> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Re-exports of types from `hidapi` with shorter names
pub mod hid {
    pub use hidapi::DeviceInfo as Info;
    pub use hidapi::HidApi as Api;
    pub use hidapi::HidDevice as Device;
    pub use hidapi::HidError as Error;
}
