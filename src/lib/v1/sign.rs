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

//! # Batched Signing
//!
//! The device signs at most [`SIGN_BATCH_SIZE`] hashes per touch. Each
//! batch takes two commands: the first hands over the hashes and returns an
//! echo for the paired mobile, the second (confirmed by touch) returns the
//! signatures. With a paired mobile, the second command carries the PIN the
//! user confirmed on the app.
//!

use std::cmp;
use std::time::Duration;

use miniscript::bitcoin::secp256k1::{ecdsa, PublicKey};
use miniscript::bitcoin::{self, bip32};
use serde_json::{json, Value};

use super::messages::{self, EchoReply, SignReply};
use super::Device;
use crate::constants::v1::error::TOUCH_ABORT;
use crate::constants::v1::relay::SIGNING_PIN_TIMEOUT_SECS;
use crate::constants::v1::SIGN_BATCH_SIZE;
use crate::dongle::ReadWrite;
use crate::{crypto, Error, Event};

/// The transaction being signed, shown on the paired mobile
#[derive(Clone, Debug)]
pub struct TxProposal {
    /// The unsigned transaction
    pub transaction: bitcoin::Transaction,
    /// Coin code, e.g. `btc` or `tbtc`
    pub coin: String,
    /// Script type of the inputs and change, e.g. `p2wpkh`
    pub script_type: String,
    /// Public key and keypath of the change output, if there is one
    pub change: Option<(PublicKey, bip32::DerivationPath)>,
}

/// A signature with its recovery id
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    /// Compact `R || S`
    pub sig: [u8; 64],
    /// Recovery id
    pub recid: u8,
}

impl Signature {
    /// Converts to a secp256k1 signature
    pub fn to_ecdsa(&self) -> Result<ecdsa::Signature, Error> {
        Ok(ecdsa::Signature::from_compact(&self.sig)?)
    }

    fn decode(sig: &messages::SignedHash) -> Result<Signature, Error> {
        let bytes = hex::decode(&sig.sig)?;
        if bytes.len() != 64 {
            return Err(Error::reply("signature", sig.sig.as_bytes()));
        }
        let recid = match sig.recid {
            Some(ref recid) => u8::from_str_radix(recid, 16)
                .map_err(|_| Error::reply("signature recid", recid.as_bytes()))?,
            None => return Err(Error::reply("signature", b"missing recid")),
        };
        let mut ret = Signature { sig: [0; 64], recid };
        ret.sig.copy_from_slice(&bytes);
        Ok(ret)
    }
}

impl<T: ReadWrite> Device<T> {
    fn sign_command(tx: Option<&TxProposal>, hashes: &[[u8; 32]], keypaths: &[bip32::DerivationPath]) -> (Value, String) {
        let data: Vec<Value> = hashes
            .iter()
            .zip(keypaths)
            .map(|(hash, path)| json!({"hash": hex::encode(hash), "keypath": path.to_string()}))
            .collect();
        let mut command = json!({"sign": {"data": data}});
        let mut transaction = String::new();
        if let Some(tx) = tx {
            transaction = bitcoin::consensus::encode::serialize_hex(&tx.transaction);
            command["sign"]["meta"] = json!(hex::encode(crypto::sha256d(transaction.as_bytes())));
            if let Some((ref pubkey, ref path)) = tx.change {
                command["sign"]["checkpub"] = json!([{
                    "pubkey": hex::encode(pubkey.serialize()),
                    "keypath": path.to_string(),
                }]);
            }
        }
        (command, transaction)
    }

    fn non_atomic_sign_batch(
        &self,
        tx: Option<&TxProposal>,
        hashes: &[[u8; 32]],
        keypaths: &[bip32::DerivationPath],
        paired: bool,
    ) -> Result<Vec<Signature>, Error> {
        let (command, transaction) = Self::sign_command(tx, hashes, keypaths);
        let reply = self.non_atomic_send(command)?;
        let echo: EchoReply = messages::parse("sign", reply)?;

        let mut nonce = None;
        if let (Some(tx), true) = (tx, paired) {
            let channel = self
                .mobile_channel()
                .ok_or_else(|| Error::Relay("the device is paired but there is no mobile channel".into()))?;
            let echo = echo.echo.ok_or(Error::Unsupported("sign reply without echo"))?;
            channel.send_signing_echo(&echo, &tx.coin, &tx.script_type, &transaction)?;
            let pin = channel.wait_for_signing_pin(Duration::from_secs(SIGNING_PIN_TIMEOUT_SECS))?;
            if pin == "abort" {
                return Err(Error::Device {
                    code: TOUCH_ABORT,
                    message: "aborted from mobile".into(),
                });
            }
            nonce = Some(pin);
        }

        let pin = match nonce {
            Some(pin) => json!({ "pin": pin }),
            None => json!(""),
        };
        let reply = self.non_atomic_send(json!({ "sign": pin }))?;
        let reply: SignReply = messages::parse("sign", reply)?;
        if reply.sign.len() != hashes.len() {
            log::error!(
                "{}: asked for {} signatures, got {}",
                self.id,
                hashes.len(),
                reply.sign.len()
            );
            return Err(Error::reply("sign", format!("{} signatures", reply.sign.len()).as_bytes()));
        }
        reply.sign.iter().map(Signature::decode).collect()
    }

    /// Signs `hashes`, each with the key at the matching keypath
    ///
    /// Runs one batch per [`SIGN_BATCH_SIZE`] hashes and fires a
    /// [`Event::SignProgress`] before each. If the device is paired with a
    /// mobile and a transaction is given, the mobile must confirm every
    /// batch.
    pub fn sign(
        &self,
        tx: Option<&TxProposal>,
        hashes: &[[u8; 32]],
        keypaths: &[bip32::DerivationPath],
    ) -> Result<Vec<Signature>, Error> {
        if hashes.len() != keypaths.len() {
            return Err(Error::invalid(
                "keypaths",
                format!("{} keypaths for {} hashes", keypaths.len(), hashes.len()),
            ));
        }
        log::info!("{}: signing {} hashes", self.id, hashes.len());
        self.atomic_queries(|device| {
            let paired = device.non_atomic_device_info()?.pairing;
            let steps = cmp::max(1, (hashes.len() + SIGN_BATCH_SIZE - 1) / SIGN_BATCH_SIZE);
            let mut signatures = Vec::with_capacity(hashes.len());
            for step in 0..steps {
                let lo = step * SIGN_BATCH_SIZE;
                let hi = cmp::min(lo + SIGN_BATCH_SIZE, hashes.len());
                device.events.fire(Event::SignProgress { step, steps });
                let batch = device.non_atomic_sign_batch(tx, &hashes[lo..hi], &keypaths[lo..hi], paired)?;
                signatures.extend(batch);
            }
            Ok(signatures)
        })
    }
}
