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

//! # Bitcoin
//!
//! Public keys, addresses, transaction and message signing.
//!
//! Signing is driven by the device: after the init request it asks for
//! inputs, previous transactions and outputs one at a time, in whatever
//! order it needs them, until it is done. Inputs are asked for twice; the
//! second pass returns the signatures. On firmware which supports it, every
//! ECDSA signature of the second pass goes through the anti-klepto
//! exchange.
//!

use std::collections::BTreeMap;

use miniscript::bitcoin::{self, bip32, hashes::Hash};

use super::messages::{
    btc_request, btc_response, btc_sign_next_response::Type as NextType, request::Request,
    response::Response,
};
use super::messages::{
    AntiKleptoHostNonceCommitment, AntiKleptoSignatureRequest, BtcCoin, BtcPrevTxInitRequest,
    BtcPrevTxInputRequest, BtcPrevTxOutputRequest, BtcPubRequest, BtcRequest, BtcScriptConfig,
    BtcScriptConfigWithKeypath, BtcSignInitRequest, BtcSignInputRequest, BtcSignMessageRequest,
    BtcSignNextResponse, BtcSignOutputRequest,
};
use super::messages::{btc_pub_request, btc_sign_init_request::FormatUnit};
use super::{antiklepto, silentpayments, Device};
use crate::dongle::ReadWrite;
use crate::{Error, Version};

/// A previous transaction, needed for every non-taproot input
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PrevTx {
    /// Transaction version
    pub version: u32,
    /// Inputs
    pub inputs: Vec<BtcPrevTxInputRequest>,
    /// Outputs
    pub outputs: Vec<BtcPrevTxOutputRequest>,
    /// Locktime
    pub locktime: u32,
}

impl<'a> From<&'a bitcoin::Transaction> for PrevTx {
    fn from(tx: &'a bitcoin::Transaction) -> PrevTx {
        PrevTx {
            version: tx.version as u32,
            inputs: tx
                .input
                .iter()
                .map(|txin| BtcPrevTxInputRequest {
                    prev_out_hash: txin.previous_output.txid.to_byte_array().to_vec(),
                    prev_out_index: txin.previous_output.vout,
                    signature_script: txin.script_sig.to_bytes(),
                    sequence: txin.sequence.0,
                })
                .collect(),
            outputs: tx
                .output
                .iter()
                .map(|txout| BtcPrevTxOutputRequest {
                    value: txout.value,
                    pubkey_script: txout.script_pubkey.to_bytes(),
                })
                .collect(),
            locktime: tx.lock_time.to_consensus_u32(),
        }
    }
}

/// One input to sign
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TxInput {
    /// The input as sent to the device
    pub input: BtcSignInputRequest,
    /// The transaction creating the spent output; may be `None` when all
    /// inputs are taproot
    pub prev_tx: Option<PrevTx>,
    /// BIP-352 public key of the input: 33 bytes, or the 32-byte x-only
    /// output key for taproot inputs. Only needed for silent payments.
    pub bip352_pubkey: Vec<u8>,
}

/// A transaction to sign
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Transaction {
    /// Transaction version
    pub version: u32,
    /// Inputs, in transaction order
    pub inputs: Vec<TxInput>,
    /// Outputs, in transaction order
    pub outputs: Vec<BtcSignOutputRequest>,
    /// Locktime
    pub locktime: u32,
}

/// Result of signing a transaction
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SignResult {
    /// One 64-byte compact signature per input
    pub signatures: Vec<Vec<u8>>,
    /// Output scripts the device generated for silent payment outputs, by
    /// output index
    pub generated_outputs: BTreeMap<usize, Vec<u8>>,
}

/// Result of signing a message
#[derive(Clone, Debug, PartialEq)]
pub struct SignMessageResult {
    /// 64-byte compact signature
    pub signature: Vec<u8>,
    /// Recovery id
    pub recid: u8,
    /// The 65-byte signature in the format Electrum verifies
    pub electrum_sig65: Vec<u8>,
}

/// Converts a derivation path to the device's keypath format
pub fn keypath(path: &bip32::DerivationPath) -> Vec<u32> {
    path.into_iter().map(|&child| u32::from(child)).collect()
}

/// Whether a signing script config is single-sig taproot
fn is_taproot(config: &BtcScriptConfigWithKeypath) -> bool {
    config
        .script_config
        .as_ref()
        .map(BtcScriptConfig::is_taproot)
        .unwrap_or(false)
}

/// Whether [`TxInput::prev_tx`] must be filled in before signing
///
/// Only taproot inputs commit to the amounts of all spent outputs.
pub fn sign_needs_prev_txs(script_configs: &[BtcScriptConfigWithKeypath]) -> bool {
    script_configs.iter().any(|config| !is_taproot(config))
}

fn sign_next(response: Response) -> Result<BtcSignNextResponse, Error> {
    match response {
        Response::BtcSignNext(next) => Ok(next),
        Response::Btc(btc) => match btc.response {
            Some(btc_response::Response::SignNext(next)) => Ok(next),
            _ => Err(Error::Unsupported("unexpected reply while signing")),
        },
        _ => Err(Error::Unsupported("unexpected reply while signing")),
    }
}

fn out_of_range(what: &'static str, index: u32) -> Error {
    Error::invalid(what, format!("device asked for index {} which does not exist", index))
}

impl<T: ReadWrite> Device<T> {
    fn non_atomic_query_btc(&self, request: btc_request::Request) -> Result<btc_response::Response, Error> {
        let response = self.non_atomic_query(Request::Btc(BtcRequest {
            request: Some(request),
        }))?;
        match response {
            Response::Btc(btc) => btc
                .response
                .ok_or(Error::Unsupported("empty bitcoin reply")),
            _ => Err(Error::Unsupported("unexpected reply to bitcoin request")),
        }
    }

    fn non_atomic_nested_sign(&self, request: btc_request::Request) -> Result<BtcSignNextResponse, Error> {
        match self.non_atomic_query_btc(request)? {
            btc_response::Response::SignNext(next) => Ok(next),
            _ => Err(Error::Unsupported("unexpected reply while signing")),
        }
    }

    fn btc_pub(&self, request: BtcPubRequest) -> Result<String, Error> {
        match self.query(Request::BtcPub(request))? {
            Response::Pub(p) => Ok(p.r#pub),
            _ => Err(Error::Unsupported("unexpected reply to pub request")),
        }
    }

    /// Retrieves an extended public key, optionally showing it on the device
    pub fn btc_xpub(
        &self,
        coin: BtcCoin,
        keypath: &[u32],
        xpub_type: btc_pub_request::XPubType,
        display: bool,
    ) -> Result<String, Error> {
        self.btc_pub(BtcPubRequest {
            coin: coin as i32,
            keypath: keypath.to_vec(),
            display,
            output: Some(btc_pub_request::Output::XpubType(xpub_type as i32)),
        })
    }

    /// Retrieves the address of a script config at `keypath`
    pub fn btc_address(
        &self,
        coin: BtcCoin,
        keypath: &[u32],
        script_config: BtcScriptConfig,
        display: bool,
    ) -> Result<String, Error> {
        if script_config.is_taproot() {
            self.require_version("taproot", Version::new(9, 10, 0))?;
        }
        self.btc_pub(BtcPubRequest {
            coin: coin as i32,
            keypath: keypath.to_vec(),
            display,
            output: Some(btc_pub_request::Output::ScriptConfig(script_config)),
        })
    }

    /// Signs a transaction
    ///
    /// `script_configs` are the accounts the inputs spend from, referenced
    /// by [`BtcSignInputRequest::script_config_index`];
    /// `output_script_configs` are accounts change outputs may pay to.
    pub fn btc_sign(
        &self,
        coin: BtcCoin,
        script_configs: &[BtcScriptConfigWithKeypath],
        output_script_configs: &[BtcScriptConfigWithKeypath],
        tx: &Transaction,
        format_unit: FormatUnit,
    ) -> Result<SignResult, Error> {
        if script_configs.iter().any(is_taproot) {
            self.require_version("taproot", Version::new(9, 10, 0))?;
        }
        let contains_silent_payment_outputs = tx.outputs.iter().any(|o| o.silent_payment.is_some());
        if contains_silent_payment_outputs {
            self.require_version("silent payments", Version::new(9, 21, 0))?;
        }
        if !output_script_configs.is_empty() {
            self.require_version("output script configs", Version::new(9, 22, 0))?;
        }
        self.atomic_queries(|device| {
            device.non_atomic_btc_sign(
                coin,
                script_configs,
                output_script_configs,
                tx,
                format_unit,
                contains_silent_payment_outputs,
            )
        })
    }

    fn non_atomic_btc_sign(
        &self,
        coin: BtcCoin,
        script_configs: &[BtcScriptConfigWithKeypath],
        output_script_configs: &[BtcScriptConfigWithKeypath],
        tx: &Transaction,
        format_unit: FormatUnit,
        contains_silent_payment_outputs: bool,
    ) -> Result<SignResult, Error> {
        let supports_antiklepto = self.version.at_least(Version::new(9, 4, 0));
        let n_inputs = tx.inputs.len();
        let mut signatures = vec![vec![]; n_inputs];
        let mut generated_outputs = BTreeMap::new();

        let mut next = sign_next(self.non_atomic_query(Request::BtcSignInit(BtcSignInitRequest {
            coin: coin as i32,
            script_configs: script_configs.to_vec(),
            version: tx.version,
            num_inputs: n_inputs as u32,
            num_outputs: tx.outputs.len() as u32,
            locktime: tx.locktime,
            format_unit: format_unit as i32,
            contains_silent_payment_outputs,
            output_script_configs: output_script_configs.to_vec(),
        }))?)?;

        let mut pass2 = false;
        loop {
            let prev_tx = |index: u32| {
                tx.inputs
                    .get(index as usize)
                    .and_then(|input| input.prev_tx.as_ref())
                    .ok_or_else(|| out_of_range("previous transaction", index))
            };
            next = match NextType::from_i32(next.r#type) {
                Some(NextType::Input) => {
                    let index = next.index;
                    let mut input = tx
                        .inputs
                        .get(index as usize)
                        .ok_or_else(|| out_of_range("input", index))?
                        .input
                        .clone();
                    let schnorr = script_configs
                        .get(input.script_config_index as usize)
                        .map(is_taproot)
                        .unwrap_or(false);
                    let antiklepto = supports_antiklepto && pass2 && !schnorr;

                    let host_nonce = antiklepto::host_nonce();
                    if antiklepto {
                        input.host_nonce_commitment = Some(AntiKleptoHostNonceCommitment {
                            commitment: antiklepto::host_commit(&host_nonce).to_vec(),
                        });
                    }
                    let mut reply = sign_next(self.non_atomic_query(Request::BtcSignInput(input))?)?;

                    if antiklepto {
                        let signer_commitment = match (
                            NextType::from_i32(reply.r#type),
                            reply.anti_klepto_signer_commitment.take(),
                        ) {
                            (Some(NextType::HostNonce), Some(c)) => c.commitment,
                            _ => return Err(Error::Unsupported("expected signer nonce commitment")),
                        };
                        reply = self.non_atomic_nested_sign(btc_request::Request::AntikleptoSignature(
                            AntiKleptoSignatureRequest {
                                host_nonce: host_nonce.to_vec(),
                            },
                        ))?;
                        antiklepto::verify(&host_nonce, &signer_commitment, &reply.signature)?;
                    }
                    if pass2 {
                        if !reply.has_signature {
                            return Err(Error::Unsupported("expected a signature"));
                        }
                        signatures[index as usize] = reply.signature.clone();
                    }
                    if index as usize + 1 == n_inputs {
                        pass2 = true;
                    }
                    reply
                }
                Some(NextType::PrevtxInit) => {
                    let prev = prev_tx(next.index)?;
                    self.non_atomic_nested_sign(btc_request::Request::PrevtxInit(BtcPrevTxInitRequest {
                        version: prev.version,
                        num_inputs: prev.inputs.len() as u32,
                        num_outputs: prev.outputs.len() as u32,
                        locktime: prev.locktime,
                    }))?
                }
                Some(NextType::PrevtxInput) => {
                    let input = prev_tx(next.index)?
                        .inputs
                        .get(next.prev_index as usize)
                        .ok_or_else(|| out_of_range("previous transaction input", next.prev_index))?;
                    self.non_atomic_nested_sign(btc_request::Request::PrevtxInput(input.clone()))?
                }
                Some(NextType::PrevtxOutput) => {
                    let output = prev_tx(next.index)?
                        .outputs
                        .get(next.prev_index as usize)
                        .ok_or_else(|| out_of_range("previous transaction output", next.prev_index))?;
                    self.non_atomic_nested_sign(btc_request::Request::PrevtxOutput(output.clone()))?
                }
                Some(NextType::Output) => {
                    let index = next.index as usize;
                    let output = tx
                        .outputs
                        .get(index)
                        .ok_or_else(|| out_of_range("output", next.index))?;
                    let reply = sign_next(self.non_atomic_query(Request::BtcSignOutput(output.clone()))?)?;
                    if !reply.generated_output_pkscript.is_empty() {
                        silentpayments::verify_output(
                            tx,
                            index,
                            &reply.silent_payment_dleq_proof,
                            &reply.generated_output_pkscript,
                        )?;
                        generated_outputs.insert(index, reply.generated_output_pkscript.clone());
                    }
                    reply
                }
                Some(NextType::Done) => {
                    return Ok(SignResult {
                        signatures,
                        generated_outputs,
                    })
                }
                Some(NextType::HostNonce) | Some(NextType::PaymentRequest) | None => {
                    log::error!("{}: unexpected sign step {}", self.id, next.r#type);
                    return Err(Error::Unsupported("unexpected signing step"));
                }
            };
        }
    }

    /// Signs a message with the key of a single-sig account
    ///
    /// Taproot accounts cannot sign messages.
    pub fn btc_sign_message(
        &self,
        coin: BtcCoin,
        script_config: BtcScriptConfigWithKeypath,
        msg: &[u8],
    ) -> Result<SignMessageResult, Error> {
        if is_taproot(&script_config) {
            return Err(Error::invalid("script config", "taproot cannot sign messages"));
        }
        self.require_version("message signing", Version::new(9, 2, 0))?;
        let supports_antiklepto = self.version.at_least(Version::new(9, 5, 0));

        self.atomic_queries(|device| {
            let host_nonce = antiklepto::host_nonce();
            let host_nonce_commitment = if supports_antiklepto {
                Some(AntiKleptoHostNonceCommitment {
                    commitment: antiklepto::host_commit(&host_nonce).to_vec(),
                })
            } else {
                None
            };
            let mut reply = device.non_atomic_query_btc(btc_request::Request::SignMessage(
                BtcSignMessageRequest {
                    coin: coin as i32,
                    script_config: Some(script_config),
                    msg: msg.to_vec(),
                    host_nonce_commitment,
                },
            ))?;

            let mut signer_commitment = None;
            if supports_antiklepto {
                signer_commitment = match reply {
                    btc_response::Response::AntikleptoSignerCommitment(c) => Some(c.commitment),
                    _ => return Err(Error::Unsupported("expected signer nonce commitment")),
                };
                reply = device.non_atomic_query_btc(btc_request::Request::AntikleptoSignature(
                    AntiKleptoSignatureRequest {
                        host_nonce: host_nonce.to_vec(),
                    },
                ))?;
            }
            let signature = match reply {
                btc_response::Response::SignMessage(sig) if sig.signature.len() == 65 => sig.signature,
                _ => return Err(Error::Unsupported("unexpected reply to sign message")),
            };
            if let Some(commitment) = signer_commitment {
                antiklepto::verify(&host_nonce, &commitment, &signature[..64])?;
            }

            let recid = signature[64];
            // 27 + 4 marks a compressed key
            let mut electrum_sig65 = vec![27 + 4 + recid];
            electrum_sig65.extend_from_slice(&signature[..64]);
            Ok(SignMessageResult {
                signature: signature[..64].to_vec(),
                recid,
                electrum_sig65,
            })
        })
    }
}
