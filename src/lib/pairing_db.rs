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

//! # Pairing Database
//!
//! Remembers which BitBox02 devices the user has confirmed (by their Noise
//! static public key) and the application's own Noise static keypair, so
//! that the channel hash only has to be compared once per device.
//!
//! The on-disk form is a small JSON document which is only ever appended
//! to. A missing file is an empty database.
//!

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::{fmt, fs};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

use crate::Error;

/// A 32-byte key, stored as base64
#[derive(Copy, Clone, PartialEq, Eq)]
struct Key32([u8; 32]);

impl fmt::Debug for Key32 {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Key32({})", hex::encode(&self.0[..4]))
    }
}

impl Serialize for Key32 {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        use base64::Engine as _;
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(self.0))
    }
}

impl<'de> Deserialize<'de> for Key32 {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        use base64::Engine as _;
        let s = String::deserialize(d)?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map_err(de::Error::custom)?;
        if bytes.len() != 32 {
            return Err(de::Error::invalid_length(bytes.len(), &"32 bytes"));
        }
        let mut ret = [0; 32];
        ret.copy_from_slice(&bytes);
        Ok(Key32(ret))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredKeypair {
    private: Key32,
    public: Key32,
}

impl Drop for StoredKeypair {
    fn drop(&mut self) {
        self.private.0.zeroize();
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PairingData {
    #[serde(default)]
    device_noise_static_pubkeys: Vec<Key32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    app_noise_static_keypair: Option<StoredKeypair>,
}

/// The application's Noise static keypair
#[derive(Clone)]
pub struct AppKeypair {
    /// X25519 private key
    pub private: [u8; 32],
    /// X25519 public key
    pub public: [u8; 32],
}

impl Drop for AppKeypair {
    fn drop(&mut self) {
        self.private.zeroize();
    }
}

/// Persistent store of trusted devices, shared by all sessions
#[derive(Debug)]
pub struct PairingDatabase {
    path: Option<PathBuf>,
    data: Mutex<PairingData>,
}

impl PairingDatabase {
    /// The default location, `~/.bitbox-hww/bitbox02.json`
    pub fn default_path() -> Option<PathBuf> {
        home::home_dir().map(|home| home.join(crate::constants::CONFIG_DIR).join("bitbox02.json"))
    }

    /// Loads the database at `path`; a missing file is an empty database
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let data = match fs::read(path) {
            Ok(contents) => serde_json::from_slice(&contents)?,
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => PairingData::default(),
            Err(e) => return Err(e.into()),
        };
        Ok(PairingDatabase {
            path: Some(path.to_owned()),
            data: Mutex::new(data),
        })
    }

    /// A database which is never written to disk
    pub fn in_memory() -> Self {
        PairingDatabase {
            path: None,
            data: Mutex::new(PairingData::default()),
        }
    }

    fn lock(&self) -> MutexGuard<PairingData> {
        match self.data.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Whether a device static pubkey was confirmed before
    pub fn contains_device_static_pubkey(&self, pubkey: &[u8; 32]) -> bool {
        self.lock()
            .device_noise_static_pubkeys
            .iter()
            .any(|k| k.0 == *pubkey)
    }

    /// Adds a confirmed device static pubkey and persists the database
    ///
    /// The key stays trusted for this process even if writing fails.
    pub fn add_device_static_pubkey(&self, pubkey: &[u8; 32]) -> Result<(), Error> {
        let mut data = self.lock();
        if data.device_noise_static_pubkeys.iter().any(|k| k.0 == *pubkey) {
            return Ok(());
        }
        data.device_noise_static_pubkeys.push(Key32(*pubkey));
        self.store(&data)
    }

    /// The application's Noise static keypair, if one was generated before
    pub fn app_static_keypair(&self) -> Option<AppKeypair> {
        self.lock()
            .app_noise_static_keypair
            .as_ref()
            .map(|kp| AppKeypair {
                private: kp.private.0,
                public: kp.public.0,
            })
    }

    /// Replaces the application's Noise static keypair and persists it
    pub fn set_app_static_keypair(&self, keypair: &AppKeypair) -> Result<(), Error> {
        let mut data = self.lock();
        data.app_noise_static_keypair = Some(StoredKeypair {
            private: Key32(keypair.private),
            public: Key32(keypair.public),
        });
        self.store(&data)
    }

    /// Writes the database out, atomically replacing the previous file
    fn store(&self, data: &PairingData) -> Result<(), Error> {
        let path = match self.path {
            Some(ref path) => path,
            None => return Ok(()),
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_name = format!("{}.tmp", path.to_string_lossy());
        fs::write(&tmp_name, serde_json::to_vec_pretty(data)?)?;
        fs::rename(&tmp_name, path)?;
        Ok(())
    }
}
