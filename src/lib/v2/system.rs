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

//! # System Requests
//!
//! Seed lifecycle, backups, SD card and device settings.
//!

use rand::RngCore;
use serde::Serialize;

use super::messages::{self, insert_remove_sd_card_request::SdCardAction, reboot_request::Purpose};
use super::messages::{request::Request, response::Response};
use super::Device;
use crate::dongle::ReadWrite;
use crate::{Error, Event, Status, Version};

/// Longest device name the firmware accepts
const MAX_NAME_LEN: usize = 64;

/// What the firmware reports about itself
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// User-chosen name
    pub name: String,
    /// Whether a seed is present and backed up
    pub initialized: bool,
    /// Firmware version string
    pub version: String,
    /// Whether the passphrase prompt is enabled
    pub mnemonic_passphrase_enabled: bool,
    /// Secure chip model, empty on old firmware
    pub securechip_model: String,
}

/// Metadata of one backup on the SD card
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Backup {
    /// Identifier to pass to [`Device::restore_backup`]
    pub id: String,
    /// Name of the backed-up wallet
    pub name: String,
    /// Creation time, seconds since the epoch
    pub timestamp: u32,
}

/// Current time and local UTC offset, as the firmware wants them
fn now() -> (u32, i32) {
    let timestamp = time::get_time().sec;
    let offset = time::now().tm_utcoff;
    (timestamp as u32, offset)
}

fn expect_success(response: Response, context: &'static str) -> Result<(), Error> {
    match response {
        Response::Success(_) => Ok(()),
        _ => Err(Error::Unsupported(context)),
    }
}

impl<T: ReadWrite> Device<T> {
    pub(super) fn non_atomic_device_info(&self) -> Result<DeviceInfo, Error> {
        match self.non_atomic_query(Request::DeviceInfo(messages::DeviceInfoRequest {}))? {
            Response::DeviceInfo(info) => Ok(DeviceInfo {
                name: info.name,
                initialized: info.initialized,
                version: info.version,
                mnemonic_passphrase_enabled: info.mnemonic_passphrase_enabled,
                securechip_model: info.securechip_model,
            }),
            _ => Err(Error::Unsupported("unexpected reply to device info")),
        }
    }

    /// Retrieves name, seed state and settings
    pub fn device_info(&self) -> Result<DeviceInfo, Error> {
        self.atomic_queries(|device| device.non_atomic_device_info())
    }

    /// 32 random bytes from the device's generator
    pub fn random_number(&self) -> Result<Vec<u8>, Error> {
        match self.query(Request::RandomNumber(messages::RandomNumberRequest {}))? {
            Response::RandomNumber(r) => Ok(r.number),
            _ => Err(Error::Unsupported("unexpected reply to random number")),
        }
    }

    /// Renames the device; the user confirms on the device
    pub fn set_device_name(&self, name: &str) -> Result<(), Error> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(Error::invalid(
                "device name",
                format!("must be 1 to {} bytes long", MAX_NAME_LEN),
            ));
        }
        let response = self.query(Request::DeviceName(messages::SetDeviceNameRequest {
            name: name.to_owned(),
        }))?;
        expect_success(response, "unexpected reply to set device name")
    }

    /// Runs the set-password workflow, creating a new seed
    ///
    /// `seed_len` is 16 or 32 bytes (12 or 24 recovery words). Host entropy
    /// of the same length is mixed into the device's own.
    pub fn set_password(&self, seed_len: usize) -> Result<(), Error> {
        if seed_len != 16 && seed_len != 32 {
            return Err(Error::invalid("seed length", format!("{} is not 16 or 32", seed_len)));
        }
        if seed_len == 16 {
            self.require_version("12-word seeds", Version::new(9, 6, 0))?;
        }
        self.atomic_queries(|device| {
            let status = device.status();
            if status != Status::Uninitialized {
                return Err(Error::State(status));
            }
            let mut entropy = vec![0; seed_len];
            rand::thread_rng().fill_bytes(&mut entropy);
            let response =
                device.non_atomic_query(Request::SetPassword(messages::SetPasswordRequest { entropy }))?;
            expect_success(response, "unexpected reply to set password")?;
            device.set_status(Status::Seeded);
            Ok(())
        })
    }

    /// Writes a backup of the current seed to the SD card
    pub fn create_backup(&self) -> Result<(), Error> {
        self.atomic_queries(|device| {
            let status = device.status();
            if status != Status::Seeded && status != Status::Initialized {
                return Err(Error::State(status));
            }
            let (timestamp, timezone_offset) = now();
            let response = device.non_atomic_query(Request::CreateBackup(messages::CreateBackupRequest {
                timestamp,
                timezone_offset,
            }))?;
            expect_success(response, "unexpected reply to create backup")?;
            device.set_status(Status::Initialized);
            Ok(())
        })
    }

    /// Shows the recovery words on the device
    ///
    /// A freshly seeded device counts as backed up afterwards.
    pub fn show_mnemonic(&self) -> Result<(), Error> {
        self.atomic_queries(|device| {
            let response = device.non_atomic_query(Request::ShowMnemonic(messages::ShowMnemonicRequest {}))?;
            expect_success(response, "unexpected reply to show mnemonic")?;
            if device.status() == Status::Seeded {
                device.set_status(Status::Initialized);
            }
            Ok(())
        })
    }

    /// Runs the recovery-words import workflow
    pub fn restore_from_mnemonic(&self) -> Result<(), Error> {
        self.atomic_queries(|device| {
            let (timestamp, timezone_offset) = now();
            let response = device.non_atomic_query(Request::RestoreFromMnemonic(
                messages::RestoreFromMnemonicRequest {
                    timestamp,
                    timezone_offset,
                },
            ))?;
            expect_success(response, "unexpected reply to restore from mnemonic")?;
            device.set_status(Status::Initialized);
            Ok(())
        })
    }

    /// Lists the backups on the SD card
    pub fn list_backups(&self) -> Result<Vec<Backup>, Error> {
        match self.query(Request::ListBackups(messages::ListBackupsRequest {}))? {
            Response::ListBackups(list) => Ok(list
                .info
                .into_iter()
                .map(|info| Backup {
                    id: info.id,
                    name: info.name,
                    timestamp: info.timestamp,
                })
                .collect()),
            _ => Err(Error::Unsupported("unexpected reply to list backups")),
        }
    }

    /// Returns the id of the backup matching the current seed
    ///
    /// With `silent` the device does not show the result.
    pub fn check_backup(&self, silent: bool) -> Result<String, Error> {
        match self.query(Request::CheckBackup(messages::CheckBackupRequest { silent }))? {
            Response::CheckBackup(backup) => Ok(backup.id),
            _ => Err(Error::Unsupported("unexpected reply to check backup")),
        }
    }

    /// Restores the backup with the given id
    pub fn restore_backup(&self, id: &str) -> Result<(), Error> {
        self.atomic_queries(|device| {
            let (timestamp, timezone_offset) = now();
            let response = device.non_atomic_query(Request::RestoreBackup(messages::RestoreBackupRequest {
                id: id.to_owned(),
                timestamp,
                timezone_offset,
            }))?;
            expect_success(response, "unexpected reply to restore backup")?;
            device.set_status(Status::Initialized);
            Ok(())
        })
    }

    /// Whether an SD card is inserted
    pub fn check_sdcard(&self) -> Result<bool, Error> {
        match self.query(Request::CheckSdcard(messages::CheckSdCardRequest {}))? {
            Response::CheckSdcard(sd) => Ok(sd.inserted),
            _ => Err(Error::Unsupported("unexpected reply to check sdcard")),
        }
    }

    /// Prompts the user to insert (`true`) or remove the SD card
    pub fn insert_remove_sdcard(&self, insert: bool) -> Result<(), Error> {
        let action = if insert {
            SdCardAction::InsertCard
        } else {
            SdCardAction::RemoveCard
        };
        let response = self.query(Request::InsertRemoveSdcard(messages::InsertRemoveSdCardRequest {
            action: action as i32,
        }))?;
        expect_success(response, "unexpected reply to insert/remove sdcard")
    }

    /// Enables or disables the passphrase prompt after unlock
    pub fn set_mnemonic_passphrase_enabled(&self, enabled: bool) -> Result<(), Error> {
        let response = self.query(Request::SetMnemonicPassphraseEnabled(
            messages::SetMnemonicPassphraseEnabledRequest { enabled },
        ))?;
        expect_success(response, "unexpected reply to set mnemonic passphrase")
    }

    /// The 4-byte fingerprint of the root key
    pub fn root_fingerprint(&self) -> Result<[u8; 4], Error> {
        match self.query(Request::Fingerprint(messages::RootFingerprintRequest {}))? {
            Response::Fingerprint(fp) if fp.fingerprint.len() == 4 => {
                let mut ret = [0; 4];
                ret.copy_from_slice(&fp.fingerprint);
                Ok(ret)
            }
            _ => Err(Error::Unsupported("unexpected reply to root fingerprint")),
        }
    }

    /// Sends a request which makes the device reboot
    ///
    /// The device usually goes away before answering, so only errors the
    /// device reported are returned.
    fn query_rebooting(&self, request: Request) -> Result<(), Error> {
        match self.query(request) {
            Err(e @ Error::Device { .. }) => Err(e),
            Err(e) => {
                log::debug!("{}: ignoring error during reboot: {}", self.id, e);
                Ok(())
            }
            Ok(_) => Ok(()),
        }
    }

    /// Reboots into the bootloader for a firmware upgrade
    pub fn upgrade_firmware(&self) -> Result<(), Error> {
        self.query_rebooting(Request::Reboot(messages::RebootRequest {
            purpose: Purpose::Upgrade as i32,
        }))
    }

    /// Reboots into the bootloader's startup settings
    pub fn goto_startup_settings(&self) -> Result<(), Error> {
        self.query_rebooting(Request::Reboot(messages::RebootRequest {
            purpose: Purpose::Settings as i32,
        }))
    }

    /// Factory-resets the device
    ///
    /// The device restarts; open a new session and call [`Device::init`].
    pub fn reset(&self) -> Result<(), Error> {
        self.query_rebooting(Request::Reset(messages::ResetRequest {}))?;
        // leaving Initialized already reports the keystore as gone
        let was_seeded = self.status() == Status::Seeded;
        super::lock(&self.channel).ciphers = None;
        self.set_status(Status::Connected);
        if was_seeded {
            self.events.fire(Event::KeystoreGone);
        }
        Ok(())
    }
}
