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

//! # Device Status

use serde::{Deserialize, Serialize};

/// Lifecycle status of a device session
///
/// The BitBox02 moves through `Connected`, then `Unpaired` while the user
/// compares the channel hash, then one of `PairingFailed`, `Uninitialized`,
/// `Initialized` or one of the upgrade-required states. The legacy device
/// moves between `Uninitialized`, `Initialized`, `LoggedIn` and `Seeded`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Status {
    /// Device in bootloader mode
    Bootloader,
    /// USB connection is up, nothing else is known yet
    Connected,
    /// Channel established but not yet confirmed by both sides
    Unpaired,
    /// Pairing was rejected or failed; the channel has been dropped
    PairingFailed,
    /// Paired, but no seed on the device
    Uninitialized,
    /// Paired and seeded (BitBox02), or a PIN is set (legacy)
    Initialized,
    /// Legacy only: the cached PIN was accepted
    LoggedIn,
    /// Legacy only: logged in and a wallet exists
    Seeded,
    /// Firmware is older than this library supports
    RequireFirmwareUpgrade,
    /// Firmware is newer than this library supports
    RequireAppUpgrade,
}

/// Snapshot of a running or finished firmware upgrade
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootloaderStatus {
    /// Whether an upgrade is running
    pub upgrading: bool,
    /// Progress between 0 and 1
    pub progress: f64,
    /// Whether the last upgrade succeeded
    pub upgrade_successful: bool,
    /// Error message of the last failed upgrade
    pub error_message: String,
    /// Seconds until the device reboots after a successful upgrade
    pub reboot_seconds: u8,
}
