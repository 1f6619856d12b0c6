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

//! In-memory BitBox02 firmware for tests
//!
//! Speaks the request framing, the Noise responder side of the handshake
//! and enough of the protobuf API to drive every workflow of [`Device`].
//! State survives across sessions, so a test can reconnect to the same
//! simulated device.

use std::sync::{Arc, Mutex, MutexGuard};

use miniscript::bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};
use prost::Message as _;
use rand::RngCore;

use super::antiklepto::tests::{honest_signer, random_key};
use super::attestation::{self, RootKey};
use super::messages::{self, btc_request, btc_response, btc_sign_next_response::Type as NextType};
use super::messages::{request::Request, response::Response};
use super::noise::{self, Ciphers, Handshake};
use super::Device;
use crate::constants::u2fhid::CMD_HWW;
use crate::constants::v2::{hww, op};
use crate::dongle::mock::{MockDevice, Responder};
use crate::pairing_db::AppKeypair;
use crate::{PairingDatabase, Version};

/// Root fingerprint of the simulated seed
pub const FINGERPRINT: [u8; 4] = [0xf4, 0x0b, 0x46, 0x9a];

/// Progress of a transaction signing session
#[derive(Default)]
struct SignSession {
    n_inputs: u32,
    n_outputs: u32,
    needs_prevtx: bool,
    pass2: bool,
    /// Input the device asked for last
    current_input: u32,
    outputs_seen: u32,
    prevtx_counts: (u32, u32),
    prevtx_step: u32,
    /// Nonce secret committed to in the pending anti-klepto round
    nonce_secret: Option<SecretKey>,
}

impl SignSession {
    /// What to ask for once the current input is handled
    fn after_input(&mut self) -> messages::BtcSignNextResponse {
        if self.current_input + 1 < self.n_inputs {
            self.current_input += 1;
            sign_next(NextType::Input, self.current_input)
        } else if self.pass2 {
            sign_next(NextType::Done, 0)
        } else if self.n_outputs > 0 {
            sign_next(NextType::Output, 0)
        } else {
            self.start_pass2()
        }
    }

    fn start_pass2(&mut self) -> messages::BtcSignNextResponse {
        self.pass2 = true;
        self.current_input = 0;
        sign_next(NextType::Input, 0)
    }

    fn after_prevtx(&mut self) -> messages::BtcSignNextResponse {
        let (n_in, n_out) = self.prevtx_counts;
        let step = self.prevtx_step;
        self.prevtx_step += 1;
        if step < n_in {
            let mut next = sign_next(NextType::PrevtxInput, self.current_input);
            next.prev_index = step;
            next
        } else if step < n_in + n_out {
            let mut next = sign_next(NextType::PrevtxOutput, self.current_input);
            next.prev_index = step - n_in;
            next
        } else {
            self.after_input()
        }
    }
}

struct State {
    version: Version,
    static_key: AppKeypair,
    pairing_required: bool,
    user_confirms_pairing: bool,
    handshake: Option<Handshake>,
    handshake_hash: Vec<u8>,
    ciphers: Option<Ciphers>,
    corrupt_next: bool,
    abort_next: bool,
    biased_nonce: bool,
    requests: Vec<Vec<u8>>,

    name: String,
    seed_len: Option<usize>,
    initialized: bool,
    passphrase_enabled: bool,
    sdcard: bool,
    backups: Vec<messages::BackupInfo>,

    sign: Option<SignSession>,
    message_nonce: Option<SecretKey>,
    silent_payment: Option<(Vec<u8>, Vec<u8>)>,
    antiklepto_rounds: usize,
    prevtx_rounds: usize,
}

/// Handle to a simulated device; clones share the device
#[derive(Clone)]
pub struct Simulator {
    state: Arc<Mutex<State>>,
}

/// Opens a session on the simulator, trusting the test attestation root
pub fn open(sim: &Simulator, db: Arc<PairingDatabase>) -> Device<MockDevice> {
    let dev = MockDevice::u2f_with(CMD_HWW, sim.clone());
    let mut device = Device::open("simulator", dev, db).unwrap();
    let roots: &'static [RootKey] = Box::leak(attestation::tests::test_roots().into_boxed_slice());
    device.set_attestation_roots(roots);
    device
}

/// Opens a session and completes pairing, confirming the channel hash
pub fn paired(sim: &Simulator, db: Arc<PairingDatabase>) -> Device<MockDevice> {
    let device = open(sim, db);
    device.init().unwrap();
    if device.status() == crate::Status::Unpaired {
        device.channel_hash_verify(true).unwrap();
    }
    device
}

fn success() -> Response {
    Response::Success(messages::Success {})
}

fn sign_next(r#type: NextType, index: u32) -> messages::BtcSignNextResponse {
    messages::BtcSignNextResponse {
        r#type: r#type as i32,
        index,
        ..Default::default()
    }
}

fn nested(next: messages::BtcSignNextResponse) -> Response {
    Response::Btc(messages::BtcResponse {
        response: Some(btc_response::Response::SignNext(next)),
    })
}

fn random_bytes(n: usize) -> Vec<u8> {
    let mut ret = vec![0; n];
    rand::thread_rng().fill_bytes(&mut ret);
    ret
}

fn device_error(code: i32, message: &str) -> Response {
    Response::Error(messages::Error {
        code,
        message: message.to_owned(),
    })
}

impl Simulator {
    /// A fresh, unseeded device running firmware `version`
    pub fn new(version: Version) -> Self {
        Simulator {
            state: Arc::new(Mutex::new(State {
                version,
                static_key: noise::generate_keypair(),
                pairing_required: true,
                user_confirms_pairing: true,
                handshake: None,
                handshake_hash: vec![],
                ciphers: None,
                corrupt_next: false,
                abort_next: false,
                biased_nonce: false,
                requests: vec![],
                name: "My BitBox".into(),
                seed_len: None,
                initialized: false,
                passphrase_enabled: false,
                sdcard: false,
                backups: vec![],
                sign: None,
                message_nonce: None,
                silent_payment: None,
                antiklepto_rounds: 0,
                prevtx_rounds: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<State> {
        self.state.lock().unwrap()
    }

    pub fn set_pairing_required(&self, required: bool) {
        self.lock().pairing_required = required;
    }

    pub fn set_user_confirms_pairing(&self, confirms: bool) {
        self.lock().user_confirms_pairing = confirms;
    }

    /// Flips a ciphertext bit in the next encrypted reply
    pub fn corrupt_next_reply(&self) {
        self.lock().corrupt_next = true;
    }

    /// Answers the next protobuf request as if the user aborted
    pub fn abort_next_request(&self) {
        self.lock().abort_next = true;
    }

    /// Signs with a nonce other than the committed one
    pub fn set_biased_nonce(&self, biased: bool) {
        self.lock().biased_nonce = biased;
    }

    /// Proof and script to return for silent payment outputs
    pub fn set_silent_payment(&self, proof: Vec<u8>, script: Vec<u8>) {
        self.lock().silent_payment = Some((proof, script));
    }

    pub fn static_pubkey(&self) -> [u8; 32] {
        self.lock().static_key.public
    }

    pub fn channel_hash(&self) -> String {
        noise::format_channel_hash(&self.lock().handshake_hash)
    }

    pub fn seed_len(&self) -> Option<usize> {
        self.lock().seed_len
    }

    /// Every framed request received, without the framing byte
    pub fn requests(&self) -> Vec<Vec<u8>> {
        self.lock().requests.clone()
    }

    pub fn antiklepto_rounds(&self) -> usize {
        self.lock().antiklepto_rounds
    }

    pub fn prevtx_rounds(&self) -> usize {
        self.lock().prevtx_rounds
    }
}

impl State {
    fn info(&self) -> Vec<u8> {
        let version = self.version.to_string();
        let mut ret = vec![version.len() as u8];
        ret.extend_from_slice(version.as_bytes());
        ret.extend_from_slice(&[0x00, 0x00, 0x00]);
        ret
    }

    fn handshake(&mut self, msg: &[u8]) -> Option<Vec<u8>> {
        let hs = self.handshake.as_mut()?;
        noise::read_message(hs, msg).ok()?;
        if !hs.completed() {
            let reply = noise::write_message(hs).ok()?;
            let mut ret = vec![0x00];
            ret.extend_from_slice(&reply);
            return Some(ret);
        }
        self.handshake_hash = hs.get_hash().to_vec();
        self.ciphers = Some(Ciphers::from_handshake(hs).ok()?);
        Some(vec![0x00, self.pairing_required as u8])
    }

    fn noise(&mut self, ciphertext: &[u8]) -> Option<Vec<u8>> {
        let plaintext = self.ciphers.as_mut()?.decrypt(ciphertext).ok()?;
        let request = messages::Request::decode(&plaintext[..]).ok()?.request?;
        let response = if self.abort_next {
            self.abort_next = false;
            device_error(104, "aborted by user")
        } else {
            self.handle(request)?
        };
        let encoded = messages::Response {
            response: Some(response),
        }
        .encode_to_vec();
        let mut ciphertext = self.ciphers.as_mut()?.encrypt(&encoded);
        if self.corrupt_next {
            self.corrupt_next = false;
            ciphertext[0] ^= 1;
        }
        let mut ret = vec![0x00];
        ret.extend_from_slice(&ciphertext);
        Some(ret)
    }

    /// Answers one protobuf request; `None` when the device reboots
    fn handle(&mut self, request: Request) -> Option<Response> {
        Some(match request {
            Request::RandomNumber(_) => Response::RandomNumber(messages::RandomNumberResponse {
                number: random_bytes(32),
            }),
            Request::DeviceInfo(_) => Response::DeviceInfo(messages::DeviceInfoResponse {
                name: self.name.clone(),
                initialized: self.initialized,
                version: format!("v{}", self.version),
                mnemonic_passphrase_enabled: self.passphrase_enabled,
                monotonic_increments_remaining: 1000,
                securechip_model: "ATECC608B".into(),
            }),
            Request::DeviceName(req) => {
                self.name = req.name;
                success()
            }
            Request::SetPassword(req) => {
                self.seed_len = Some(req.entropy.len());
                success()
            }
            Request::CreateBackup(req) => {
                if self.seed_len.is_none() {
                    return Some(device_error(105, "invalid state"));
                }
                self.backups.push(messages::BackupInfo {
                    id: format!("backup-{}", req.timestamp),
                    timestamp: req.timestamp,
                    name: self.name.clone(),
                });
                self.initialized = true;
                success()
            }
            Request::ShowMnemonic(_) => {
                self.initialized = true;
                success()
            }
            Request::RestoreFromMnemonic(_) | Request::RestoreBackup(_) => {
                self.seed_len = Some(32);
                self.initialized = true;
                success()
            }
            Request::ListBackups(_) => Response::ListBackups(messages::ListBackupsResponse {
                info: self.backups.clone(),
            }),
            Request::CheckBackup(_) => match self.backups.first() {
                Some(backup) => Response::CheckBackup(messages::CheckBackupResponse {
                    id: backup.id.clone(),
                }),
                None => device_error(103, "no matching backup"),
            },
            Request::CheckSdcard(_) => Response::CheckSdcard(messages::CheckSdCardResponse {
                inserted: self.sdcard,
            }),
            Request::InsertRemoveSdcard(req) => {
                self.sdcard = req.action == messages::insert_remove_sd_card_request::SdCardAction::InsertCard as i32;
                success()
            }
            Request::SetMnemonicPassphraseEnabled(req) => {
                self.passphrase_enabled = req.enabled;
                success()
            }
            Request::Fingerprint(_) => Response::Fingerprint(messages::RootFingerprintResponse {
                fingerprint: FINGERPRINT.to_vec(),
            }),
            Request::Reboot(_) => return None,
            Request::Reset(_) => {
                self.seed_len = None;
                self.initialized = false;
                self.backups.clear();
                self.ciphers = None;
                return None;
            }
            Request::BtcPub(req) => Response::Pub(messages::PubResponse {
                r#pub: match req.output {
                    Some(messages::btc_pub_request::Output::XpubType(_)) => {
                        "xpub6CatWdiZiodmUeTDp8LT5or8nmbKNcuyvz7WyksVFkKB4RHwCD3XyuvPEbvqAQY3rAPshWcMLoP2fMFMKHPJ4ZeZXYVUhLv1VMrjPC7PW6V".into()
                    }
                    _ => "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq".into(),
                },
            }),
            Request::BtcSignInit(req) => {
                let needs_prevtx = req
                    .script_configs
                    .iter()
                    .any(|c| !c.script_config.as_ref().map(|s| s.is_taproot()).unwrap_or(false));
                self.sign = Some(SignSession {
                    n_inputs: req.num_inputs,
                    n_outputs: req.num_outputs,
                    needs_prevtx,
                    ..Default::default()
                });
                Response::BtcSignNext(sign_next(NextType::Input, 0))
            }
            Request::BtcSignInput(req) => Response::BtcSignNext(self.sign_input(req)?),
            Request::BtcSignOutput(req) => Response::BtcSignNext(self.sign_output(req)?),
            Request::Btc(btc) => self.handle_btc(btc.request?)?,
            _ => device_error(101, "unsupported by simulator"),
        })
    }

    fn sign_input(&mut self, req: messages::BtcSignInputRequest) -> Option<messages::BtcSignNextResponse> {
        let antiklepto = self.version.at_least(Version::new(9, 4, 0));
        let session = self.sign.as_mut()?;
        if !session.pass2 {
            return Some(if session.needs_prevtx {
                session.prevtx_step = 0;
                sign_next(NextType::PrevtxInit, session.current_input)
            } else {
                session.after_input()
            });
        }
        if antiklepto && req.host_nonce_commitment.is_some() {
            let k = random_key();
            let commitment = PublicKey::from_secret_key(&Secp256k1::new(), &k);
            session.nonce_secret = Some(k);
            return Some(messages::BtcSignNextResponse {
                r#type: NextType::HostNonce as i32,
                anti_klepto_signer_commitment: Some(messages::AntiKleptoSignerCommitment {
                    commitment: commitment.serialize().to_vec(),
                }),
                ..Default::default()
            });
        }
        let mut next = session.after_input();
        next.has_signature = true;
        next.signature = random_bytes(64);
        Some(next)
    }

    fn sign_output(&mut self, req: messages::BtcSignOutputRequest) -> Option<messages::BtcSignNextResponse> {
        let silent_payment = self.silent_payment.clone();
        let session = self.sign.as_mut()?;
        session.outputs_seen += 1;
        let mut next = if session.outputs_seen < session.n_outputs {
            sign_next(NextType::Output, session.outputs_seen)
        } else {
            session.start_pass2()
        };
        if let (Some(_), Some((proof, script))) = (req.silent_payment, silent_payment) {
            next.generated_output_pkscript = script;
            next.silent_payment_dleq_proof = proof;
        }
        Some(next)
    }

    fn handle_btc(&mut self, request: btc_request::Request) -> Option<Response> {
        Some(match request {
            btc_request::Request::PrevtxInit(init) => {
                self.prevtx_rounds += 1;
                let session = self.sign.as_mut()?;
                session.prevtx_counts = (init.num_inputs, init.num_outputs);
                session.prevtx_step = 0;
                nested(session.after_prevtx())
            }
            btc_request::Request::PrevtxInput(_) | btc_request::Request::PrevtxOutput(_) => {
                nested(self.sign.as_mut()?.after_prevtx())
            }
            btc_request::Request::AntikleptoSignature(req) => {
                self.antiklepto_rounds += 1;
                let mut host_nonce = [0u8; 32];
                host_nonce.copy_from_slice(req.host_nonce.get(..32)?);
                let biased = self.biased_nonce;
                let sign_with = |k: SecretKey| {
                    let k = if biased { random_key() } else { k };
                    honest_signer(&k, &host_nonce).1
                };
                let tx_nonce = self.sign.as_mut().and_then(|s| s.nonce_secret.take());
                if let Some(k) = tx_nonce {
                    let signature = sign_with(k);
                    let mut next = self.sign.as_mut()?.after_input();
                    next.has_signature = true;
                    next.signature = signature;
                    nested(next)
                } else {
                    let mut signature = sign_with(self.message_nonce.take()?);
                    signature.push(1);
                    Response::Btc(messages::BtcResponse {
                        response: Some(btc_response::Response::SignMessage(
                            messages::BtcSignMessageResponse { signature },
                        )),
                    })
                }
            }
            btc_request::Request::SignMessage(req) => {
                self.sign = None;
                if req.host_nonce_commitment.is_some() && self.version.at_least(Version::new(9, 5, 0)) {
                    let k = random_key();
                    let commitment = PublicKey::from_secret_key(&Secp256k1::new(), &k);
                    self.message_nonce = Some(k);
                    Response::Btc(messages::BtcResponse {
                        response: Some(btc_response::Response::AntikleptoSignerCommitment(
                            messages::AntiKleptoSignerCommitment {
                                commitment: commitment.serialize().to_vec(),
                            },
                        )),
                    })
                } else {
                    let mut signature = random_bytes(64);
                    signature.push(0);
                    Response::Btc(messages::BtcResponse {
                        response: Some(btc_response::Response::SignMessage(
                            messages::BtcSignMessageResponse { signature },
                        )),
                    })
                }
            }
            btc_request::Request::IsScriptConfigRegistered(_) => device_error(101, "unsupported by simulator"),
        })
    }
}

impl Responder for Simulator {
    fn respond(&mut self, request: &[u8]) -> Option<Vec<u8>> {
        let mut state = self.lock();
        if request == [hww::REQ_INFO] {
            return Some(state.info());
        }
        let framed = state.version.at_least(Version::new(7, 0, 0));
        let msg = if framed {
            match request.split_first() {
                Some((&hww::REQ_NEW, msg)) => msg,
                _ => return Some(vec![hww::RSP_NACK]),
            }
        } else {
            request
        };
        state.requests.push(msg.to_vec());

        let (&opcode, body) = msg.split_first()?;
        let reply = match opcode {
            op::ATTESTATION => attestation::tests::attestation_response(body),
            op::UNLOCK => vec![0x00],
            op::I_CAN_HAS_HANDSHAKE => {
                let static_key = AppKeypair {
                    private: state.static_key.private,
                    public: state.static_key.public,
                };
                state.handshake = Some(noise::responder(&static_key));
                state.ciphers = None;
                vec![0x00]
            }
            op::HER_COMES_HANDSHAKE => state.handshake(body)?,
            op::I_CAN_HAS_PAIRIN_VERIFICASHUN => {
                if state.user_confirms_pairing {
                    vec![0x00]
                } else {
                    state.ciphers = None;
                    vec![0x01]
                }
            }
            op::NOISE_MSG => state.noise(body)?,
            _ => return Some(vec![hww::RSP_NACK]),
        };
        if !framed {
            return Some(reply);
        }
        let mut ret = vec![hww::RSP_ACK];
        ret.extend_from_slice(&reply);
        Some(ret)
    }
}
