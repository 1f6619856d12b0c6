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

//! # Wallets and Backups
//!
//! A wallet is created on, or restored from, the SD card. Backup files are
//! named `<name>-YYYY-MM-DD-HH-MM-SS.pdf` and protected by a recovery
//! password which is stretched on the host before it reaches the device.
//!

use regex::Regex;
use serde::Serialize;
use serde_json::json;
use sha2::Sha512;
use zeroize::Zeroizing;

use super::messages::{self, BackupListReply, SUCCESS};
use super::{is_abort, Device};
use crate::constants::v1::error::{SD_NO_MATCH, SD_OPEN_DIR};
use crate::constants::v1::{STRETCH_ITERATIONS, STRETCH_SALT};
use crate::dongle::ReadWrite;
use crate::policy::validate_wallet_name;
use crate::{lock, Error, Version};

const DATE_FORMAT: &str = "%Y-%m-%d-%H-%M-%S";

/// Stretches a recovery password into the hex key the device expects
///
/// The key is derived twice and compared, since a memory error here
/// would produce a backup nobody can restore.
pub fn stretch_key(password: &str) -> Result<String, Error> {
    let derive = || {
        let mut key = Zeroizing::new([0u8; 64]);
        pbkdf2::pbkdf2_hmac::<Sha512>(password.as_bytes(), STRETCH_SALT, STRETCH_ITERATIONS, &mut key[..]);
        hex::encode(&key[..])
    };
    let first = derive();
    if first != derive() {
        return Err(Error::Critical("memory error while stretching the recovery password"));
    }
    Ok(first)
}

fn backup_filename(name: &str) -> Result<String, Error> {
    let date = time::strftime(DATE_FORMAT, &time::now())
        .map_err(|e| Error::invalid("date format", e.to_string()))?;
    Ok(format!("{}-{}.pdf", name, date))
}

/// One file on the SD card
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BackupEntry {
    /// File name, which identifies the backup
    pub id: String,
    /// Wallet name, if the file name follows the backup naming scheme
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Creation date in RFC 3339, if the file name follows the naming scheme
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl BackupEntry {
    fn from_filename(re: &Regex, filename: String) -> Result<BackupEntry, Error> {
        let (name, date) = match re.captures(&filename) {
            Some(caps) => {
                let date = time::strptime(&caps[2], DATE_FORMAT)
                    .map_err(|e| Error::invalid("backup date", e.to_string()))?;
                (Some(caps[1].to_owned()), Some(date.rfc3339().to_string()))
            }
            None => (None, None),
        };
        Ok(BackupEntry {
            id: filename,
            name,
            date,
        })
    }
}

/// Newest first; files without a date go last
fn sort_backups(entries: &mut [BackupEntry]) {
    entries.sort_by(|a, b| match (&a.date, &b.date) {
        (Some(a), Some(b)) => b.cmp(a),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

#[derive(Copy, Clone, Debug)]
enum SeedSource {
    Create,
    Backup,
}

impl SeedSource {
    fn as_str(self) -> &'static str {
        match self {
            SeedSource::Create => "create",
            SeedSource::Backup => "backup",
        }
    }
}

impl<T: ReadWrite> Device<T> {
    /// Seeds the device, then checks the backup it reads or writes
    fn non_atomic_seed(&self, password: &str, source: SeedSource, filename: &str) -> Result<(), Error> {
        if password.is_empty() {
            return Err(Error::invalid("recovery password", "empty"));
        }
        log::debug!("{}: seed from {} ({})", self.id, source.as_str(), filename);
        let key = Zeroizing::new(stretch_key(password)?);
        let reply = self.non_atomic_send(json!({"seed": {
            "source": source.as_str(),
            "key": *key,
            "filename": filename,
        }}))?;
        messages::expect_str("seed", &reply, "seed", SUCCESS)?;

        let reply = self
            .non_atomic_send(json!({"backup": {"key": *key, "check": filename}}))
            .map_err(|e| {
                log::error!("{}: the new wallet does not match its backup: {}", self.id, e);
                Error::Critical("the wallet does not match its backup; do not use it")
            })?;
        if messages::expect_str("backup check", &reply, "backup", SUCCESS).is_err() {
            return Err(Error::Critical("the wallet does not match its backup; do not use it"));
        }
        Ok(())
    }

    /// Names the device and creates a new wallet, backed up to the SD card
    pub fn create_wallet(&self, wallet_name: &str, recovery_password: &str) -> Result<(), Error> {
        validate_wallet_name(wallet_name)?;
        self.config.recovery_password_policy.validate(recovery_password)?;
        log::info!("{}: creating wallet {}", self.id, wallet_name);
        self.atomic_queries(|device| {
            device.non_atomic_set_name(wallet_name)?;
            let filename = backup_filename(wallet_name)?;
            device.non_atomic_seed(recovery_password, SeedSource::Create, &filename)
        })?;
        lock(&self.state).seeded = true;
        self.status_changed();
        Ok(())
    }

    /// Restores the wallet from a backup. Returns false if the user aborted.
    pub fn restore_backup(&self, recovery_password: &str, filename: &str) -> Result<bool, Error> {
        log::info!("{}: restoring backup {}", self.id, filename);
        match self.atomic_queries(|device| device.non_atomic_seed(recovery_password, SeedSource::Backup, filename)) {
            Err(ref e) if is_abort(e) => return Ok(false),
            other => other?,
        }
        lock(&self.state).seeded = true;
        self.status_changed();
        Ok(true)
    }

    /// Whether a backup belongs to the current wallet
    pub fn check_backup(&self, recovery_password: &str, filename: &str) -> Result<bool, Error> {
        if recovery_password.is_empty() {
            return Err(Error::invalid("recovery password", "empty"));
        }
        let key = Zeroizing::new(stretch_key(recovery_password)?);
        let reply = match self.send(json!({"backup": {"key": *key, "check": filename}})) {
            Err(ref e) if e.is_code(SD_NO_MATCH) => return Ok(false),
            other => other?,
        };
        messages::expect_str("backup check", &reply, "backup", SUCCESS)?;
        Ok(true)
    }

    /// Writes another backup of the current wallet to the SD card
    ///
    /// Returns false if the recovery password does not match the wallet;
    /// the file is written anyway.
    pub fn create_backup(&self, backup_name: &str, recovery_password: &str) -> Result<bool, Error> {
        log::info!("{}: creating backup {}", self.id, backup_name);
        let key = Zeroizing::new(stretch_key(recovery_password)?);
        let filename = backup_filename(backup_name)?;
        let reply = match self.send(json!({"backup": {"key": *key, "filename": filename}})) {
            Err(ref e) if e.is_code(SD_NO_MATCH) => return Ok(false),
            other => other?,
        };
        messages::expect_str("create backup", &reply, "backup", SUCCESS)?;
        Ok(true)
    }

    /// Lists the backups on the SD card, newest first
    pub fn backup_list(&self) -> Result<Vec<BackupEntry>, Error> {
        let reply = match self.send(json!({"backup": "list"})) {
            Err(ref e) if e.is_code(SD_OPEN_DIR) => return Ok(vec![]),
            Err(e) => {
                let required = Version::new(7, 1, 0);
                if !self.version.at_least(required) {
                    log::debug!("{}: listing backups failed: {}", self.id, e);
                    return Err(Error::FirmwareTooOld {
                        feature: "backup list",
                        required,
                    });
                }
                return Err(e);
            }
            Ok(reply) => reply,
        };
        let reply: BackupListReply = messages::parse("backup list", reply)?;
        let re = Regex::new(r"(.*)-(\d{4}-\d{2}-\d{2}-\d{2}-\d{2}-\d{2}).pdf").expect("static regex");
        let mut entries = reply
            .backup
            .into_iter()
            .map(|filename| BackupEntry::from_filename(&re, filename))
            .collect::<Result<Vec<_>, _>>()?;
        sort_backups(&mut entries);
        log::debug!("{}: {} backups", self.id, entries.len());
        Ok(entries)
    }

    /// Deletes a backup from the SD card
    pub fn erase_backup(&self, filename: &str) -> Result<(), Error> {
        log::info!("{}: erasing backup {}", self.id, filename);
        let reply = self.send(json!({"backup": {"erase": filename}}))?;
        messages::expect_str("erase backup", &reply, "backup", SUCCESS)
    }

    /// Sets up the hidden wallet. Returns false if the user aborted.
    pub fn set_hidden_password(&self, hidden_pin: &str, hidden_recovery_password: &str) -> Result<bool, Error> {
        self.config.pin_policy.validate(hidden_pin)?;
        self.config
            .recovery_password_policy
            .validate(hidden_recovery_password)?;
        let key = Zeroizing::new(stretch_key(hidden_recovery_password)?);
        let reply = match self.send(json!({"hidden_password": {"key": *key, "password": hidden_pin}})) {
            Err(ref e) if is_abort(e) => return Ok(false),
            other => other?,
        };
        messages::expect_str("hidden password", &reply, "hidden_password", SUCCESS)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::super::simulator::{self, Simulator};
    use super::*;
    use crate::event::tests::recorder;
    use crate::{Event, Status};

    const RECOVERY_PASSWORD: &str = "this is a recovery password";
    const STRETCHED: &str = "e3306aa321df2b4ae9ee131b385c19d73d41b92678c554ba9ec1737e6d141381\
                             465b881e3fec3d4edda3d93609ca5ec4e625a5a56107ab6e0f5019b199aa0fdb";

    #[test]
    fn stretching() {
        assert_eq!(stretch_key(RECOVERY_PASSWORD).unwrap(), STRETCHED);
    }

    #[test]
    fn filenames() {
        let name = backup_filename("wallet").unwrap();
        let re = Regex::new(r"^wallet-\d{4}-\d{2}-\d{2}-\d{2}-\d{2}-\d{2}\.pdf$").unwrap();
        assert!(re.is_match(&name), "{}", name);

        let re = Regex::new(r"(.*)-(\d{4}-\d{2}-\d{2}-\d{2}-\d{2}-\d{2}).pdf").unwrap();
        let entry = BackupEntry::from_filename(&re, "my-wallet-2018-05-14-13-07-07.pdf".into()).unwrap();
        assert_eq!(entry.name.as_deref(), Some("my-wallet"));
        assert_eq!(entry.date.as_deref(), Some("2018-05-14T13:07:07Z"));
        let entry = BackupEntry::from_filename(&re, "notes.txt".into()).unwrap();
        assert_eq!(entry.name, None);

        let mut entries = vec![
            BackupEntry::from_filename(&re, "a.pdf".into()).unwrap(),
            BackupEntry::from_filename(&re, "b-2017-01-01-00-00-00.pdf".into()).unwrap(),
            BackupEntry::from_filename(&re, "c-2019-01-01-00-00-00.pdf".into()).unwrap(),
        ];
        sort_backups(&mut entries);
        let ids: Vec<_> = entries.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["c-2019-01-01-00-00-00.pdf", "b-2017-01-01-00-00-00.pdf", "a.pdf"]);
    }

    fn cold_start(version: Version) -> (Simulator, Device<crate::dongle::mock::MockDevice>) {
        let sim = Simulator::new(version);
        sim.set_sdcard(true);
        let device = simulator::open(&sim);
        assert!(!device.ping().unwrap());
        device.set_password("4321").unwrap();
        device.create_wallet("walletname", RECOVERY_PASSWORD).unwrap();
        (sim, device)
    }

    #[test]
    fn cold_start_to_seeded() {
        let (sim, device) = cold_start(Version::new(7, 0, 4));
        assert_eq!(device.status(), Status::Seeded);
        let seed = sim
            .commands()
            .into_iter()
            .find(|c| c.get("seed").is_some())
            .unwrap();
        assert_eq!(seed["seed"]["source"], "create");
        assert_eq!(seed["seed"]["key"], STRETCHED);
        assert!(seed["seed"]["filename"]
            .as_str()
            .unwrap()
            .starts_with("walletname-"));
        assert_eq!(sim.name(), "walletname");
        assert!(device.device_info().unwrap().seeded);
    }

    #[test]
    fn cold_start_on_old_firmware() {
        let (sim, device) = cold_start(Version::new(3, 0, 2));
        assert_eq!(sim.commands().iter().filter(|c| c.get("seed").is_some()).count(), 1);
        assert!(sim.seeded());
        assert_eq!(device.status(), Status::RequireFirmwareUpgrade);
        // ping at open, our ping, then the PIN in the clear
        assert_eq!(sim.plain_requests()[2], json!({"password": "4321"}));

        // a fresh session on the same device sees a PIN but no login yet
        drop(device);
        let device = simulator::open(&sim);
        assert_eq!(device.status(), Status::Initialized);
    }

    #[test]
    fn create_wallet_events_and_policy() {
        let sim = Simulator::new(Version::new(7, 0, 4));
        sim.set_sdcard(true);
        let device = simulator::open(&sim);
        device.set_password("4321").unwrap();
        let events = recorder(device.events());
        assert!(device.create_wallet("wallet name", RECOVERY_PASSWORD).is_err());
        assert!(device.create_wallet("walletname", "abc").is_err());
        device.create_wallet("walletname", RECOVERY_PASSWORD).unwrap();
        assert_eq!(
            *events.lock().unwrap(),
            vec![Event::StatusChanged(Status::Seeded), Event::KeystoreAvailable]
        );
    }

    #[test]
    fn backups() {
        let (sim, device) = cold_start(Version::new(7, 0, 4));
        let created = device.backup_list().unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].name.as_deref(), Some("walletname"));

        assert!(device.check_backup(RECOVERY_PASSWORD, &created[0].id).unwrap());
        assert!(!device.check_backup("wrong password", &created[0].id).unwrap());

        assert!(!device.create_backup("second", "wrong password").unwrap());
        assert!(device.create_backup("third", RECOVERY_PASSWORD).unwrap());
        sim.add_backup("old-2001-01-01-00-00-00.pdf");
        sim.add_backup("readme.txt");
        let list = device.backup_list().unwrap();
        assert_eq!(list.len(), 5);
        assert_eq!(list[3].id, "old-2001-01-01-00-00-00.pdf");
        assert_eq!(list[4].id, "readme.txt");

        device.erase_backup("readme.txt").unwrap();
        assert_eq!(device.backup_list().unwrap().len(), 4);

        sim.set_sdcard(false);
        assert!(device.backup_list().unwrap().is_empty());
    }

    #[test]
    fn restore_and_hidden_wallet() {
        let (sim, _) = cold_start(Version::new(7, 0, 4));
        let filename = sim.backups()[0].clone();

        // wipe, then restore on a fresh session
        sim.wipe();
        let device = simulator::open(&sim);
        device.set_password("1111").unwrap();
        sim.abort_next_request();
        assert!(!device.restore_backup(RECOVERY_PASSWORD, &filename).unwrap());
        assert_eq!(device.status(), Status::LoggedIn);
        assert!(device.restore_backup(RECOVERY_PASSWORD, &filename).unwrap());
        assert_eq!(device.status(), Status::Seeded);
        assert!(device.restore_backup("", &filename).is_err());

        assert!(device.set_hidden_password("12", RECOVERY_PASSWORD).is_err());
        assert!(device.set_hidden_password("hidden", RECOVERY_PASSWORD).unwrap());
        sim.abort_next_request();
        assert!(!device.set_hidden_password("hidden", RECOVERY_PASSWORD).unwrap());
    }

    #[test]
    fn backup_list_on_old_firmware() {
        let sim = Simulator::new(Version::new(7, 1, 0));
        let device = simulator::open(&sim);
        device.set_password("4321").unwrap();
        sim.fail_backup_list(true);
        assert!(device.backup_list().unwrap_err().is_code(400));

        let sim = Simulator::new(Version::new(6, 0, 0));
        let device = simulator::open(&sim);
        device.set_password("4321").unwrap();
        sim.fail_backup_list(true);
        match device.backup_list() {
            Err(Error::FirmwareTooOld { required, .. }) => assert_eq!(required, Version::new(7, 1, 0)),
            other => panic!("unexpected {:?}", other),
        }
    }
}
