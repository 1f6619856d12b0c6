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

//! # Protobuf Messages
//!
//! The subset of the BitBox02 wire schema this library speaks. Field tags
//! must match the firmware; the Rust types are declared by hand with the
//! prost derives rather than generated at build time.
//!

#![allow(missing_docs)]

/// Top-level request envelope
#[derive(Clone, PartialEq, prost::Message)]
pub struct Request {
    #[prost(
        oneof = "request::Request",
        tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 21, 22, 24, 25"
    )]
    pub request: Option<request::Request>,
}

pub mod request {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Request {
        #[prost(message, tag = "1")]
        RandomNumber(super::RandomNumberRequest),
        #[prost(message, tag = "2")]
        DeviceName(super::SetDeviceNameRequest),
        #[prost(message, tag = "3")]
        DeviceLanguage(super::SetDeviceLanguageRequest),
        #[prost(message, tag = "4")]
        DeviceInfo(super::DeviceInfoRequest),
        #[prost(message, tag = "5")]
        SetPassword(super::SetPasswordRequest),
        #[prost(message, tag = "6")]
        CreateBackup(super::CreateBackupRequest),
        #[prost(message, tag = "7")]
        ShowMnemonic(super::ShowMnemonicRequest),
        #[prost(message, tag = "8")]
        BtcPub(super::BtcPubRequest),
        #[prost(message, tag = "9")]
        BtcSignInit(super::BtcSignInitRequest),
        #[prost(message, tag = "10")]
        BtcSignInput(super::BtcSignInputRequest),
        #[prost(message, tag = "11")]
        BtcSignOutput(super::BtcSignOutputRequest),
        #[prost(message, tag = "12")]
        InsertRemoveSdcard(super::InsertRemoveSdCardRequest),
        #[prost(message, tag = "13")]
        CheckSdcard(super::CheckSdCardRequest),
        #[prost(message, tag = "14")]
        SetMnemonicPassphraseEnabled(super::SetMnemonicPassphraseEnabledRequest),
        #[prost(message, tag = "15")]
        ListBackups(super::ListBackupsRequest),
        #[prost(message, tag = "16")]
        RestoreBackup(super::RestoreBackupRequest),
        #[prost(message, tag = "17")]
        PerformAttestation(super::PerformAttestationRequest),
        #[prost(message, tag = "18")]
        Reboot(super::RebootRequest),
        #[prost(message, tag = "19")]
        CheckBackup(super::CheckBackupRequest),
        #[prost(message, tag = "21")]
        Reset(super::ResetRequest),
        #[prost(message, tag = "22")]
        RestoreFromMnemonic(super::RestoreFromMnemonicRequest),
        #[prost(message, tag = "24")]
        Fingerprint(super::RootFingerprintRequest),
        #[prost(message, tag = "25")]
        Btc(super::BtcRequest),
    }
}

/// Top-level response envelope
#[derive(Clone, PartialEq, prost::Message)]
pub struct Response {
    #[prost(oneof = "response::Response", tags = "1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11")]
    pub response: Option<response::Response>,
}

pub mod response {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Response {
        #[prost(message, tag = "1")]
        Success(super::Success),
        #[prost(message, tag = "2")]
        Error(super::Error),
        #[prost(message, tag = "3")]
        RandomNumber(super::RandomNumberResponse),
        #[prost(message, tag = "4")]
        DeviceInfo(super::DeviceInfoResponse),
        #[prost(message, tag = "5")]
        Pub(super::PubResponse),
        #[prost(message, tag = "6")]
        BtcSignNext(super::BtcSignNextResponse),
        #[prost(message, tag = "7")]
        ListBackups(super::ListBackupsResponse),
        #[prost(message, tag = "8")]
        CheckBackup(super::CheckBackupResponse),
        #[prost(message, tag = "9")]
        Fingerprint(super::RootFingerprintResponse),
        #[prost(message, tag = "10")]
        Btc(super::BtcResponse),
        #[prost(message, tag = "11")]
        CheckSdcard(super::CheckSdCardResponse),
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Success {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Error {
    #[prost(int32, tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: String,
}

// System

#[derive(Clone, PartialEq, prost::Message)]
pub struct RandomNumberRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RandomNumberResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub number: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SetDeviceNameRequest {
    #[prost(string, tag = "1")]
    pub name: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SetDeviceLanguageRequest {
    #[prost(string, tag = "1")]
    pub language: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DeviceInfoRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct DeviceInfoResponse {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(bool, tag = "2")]
    pub initialized: bool,
    #[prost(string, tag = "3")]
    pub version: String,
    #[prost(bool, tag = "4")]
    pub mnemonic_passphrase_enabled: bool,
    #[prost(uint32, tag = "5")]
    pub monotonic_increments_remaining: u32,
    #[prost(string, tag = "6")]
    pub securechip_model: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SetPasswordRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub entropy: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CreateBackupRequest {
    #[prost(uint32, tag = "1")]
    pub timestamp: u32,
    #[prost(int32, tag = "2")]
    pub timezone_offset: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ShowMnemonicRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RestoreFromMnemonicRequest {
    #[prost(uint32, tag = "1")]
    pub timestamp: u32,
    #[prost(int32, tag = "2")]
    pub timezone_offset: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct InsertRemoveSdCardRequest {
    #[prost(enumeration = "insert_remove_sd_card_request::SdCardAction", tag = "1")]
    pub action: i32,
}

pub mod insert_remove_sd_card_request {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum SdCardAction {
        RemoveCard = 0,
        InsertCard = 1,
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CheckSdCardRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CheckSdCardResponse {
    #[prost(bool, tag = "1")]
    pub inserted: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SetMnemonicPassphraseEnabledRequest {
    #[prost(bool, tag = "1")]
    pub enabled: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BackupInfo {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(uint32, tag = "2")]
    pub timestamp: u32,
    #[prost(string, tag = "4")]
    pub name: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListBackupsRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListBackupsResponse {
    #[prost(message, repeated, tag = "1")]
    pub info: Vec<BackupInfo>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RestoreBackupRequest {
    #[prost(string, tag = "1")]
    pub id: String,
    #[prost(uint32, tag = "2")]
    pub timestamp: u32,
    #[prost(int32, tag = "3")]
    pub timezone_offset: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CheckBackupRequest {
    #[prost(bool, tag = "1")]
    pub silent: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CheckBackupResponse {
    #[prost(string, tag = "1")]
    pub id: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PerformAttestationRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub challenge: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RebootRequest {
    #[prost(enumeration = "reboot_request::Purpose", tag = "1")]
    pub purpose: i32,
}

pub mod reboot_request {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum Purpose {
        Upgrade = 0,
        Settings = 1,
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ResetRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RootFingerprintRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RootFingerprintResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub fingerprint: Vec<u8>,
}

// Bitcoin

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum BtcCoin {
    Btc = 0,
    Tbtc = 1,
    Ltc = 2,
    Tltc = 3,
    Rbtc = 4,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum BtcOutputType {
    Unknown = 0,
    P2pkh = 1,
    P2sh = 2,
    P2wpkh = 3,
    P2wsh = 4,
    P2tr = 5,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BtcScriptConfig {
    #[prost(oneof = "btc_script_config::Config", tags = "1")]
    pub config: Option<btc_script_config::Config>,
}

pub mod btc_script_config {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Config {
        #[prost(enumeration = "SimpleType", tag = "1")]
        SimpleType(i32),
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum SimpleType {
        P2wpkhP2sh = 0,
        P2wpkh = 1,
        P2tr = 2,
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BtcScriptConfigWithKeypath {
    #[prost(message, optional, tag = "2")]
    pub script_config: Option<BtcScriptConfig>,
    #[prost(uint32, repeated, tag = "3")]
    pub keypath: Vec<u32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BtcPubRequest {
    #[prost(enumeration = "BtcCoin", tag = "1")]
    pub coin: i32,
    #[prost(uint32, repeated, tag = "2")]
    pub keypath: Vec<u32>,
    #[prost(bool, tag = "5")]
    pub display: bool,
    #[prost(oneof = "btc_pub_request::Output", tags = "3, 4")]
    pub output: Option<btc_pub_request::Output>,
}

pub mod btc_pub_request {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum XPubType {
        Tpub = 0,
        Xpub = 1,
        Ypub = 2,
        Zpub = 3,
        Vpub = 4,
        Upub = 5,
    }

    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Output {
        #[prost(enumeration = "XPubType", tag = "3")]
        XpubType(i32),
        #[prost(message, tag = "4")]
        ScriptConfig(super::BtcScriptConfig),
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PubResponse {
    #[prost(string, tag = "1")]
    pub r#pub: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BtcSignInitRequest {
    #[prost(enumeration = "BtcCoin", tag = "1")]
    pub coin: i32,
    #[prost(message, repeated, tag = "2")]
    pub script_configs: Vec<BtcScriptConfigWithKeypath>,
    #[prost(uint32, tag = "4")]
    pub version: u32,
    #[prost(uint32, tag = "5")]
    pub num_inputs: u32,
    #[prost(uint32, tag = "6")]
    pub num_outputs: u32,
    #[prost(uint32, tag = "7")]
    pub locktime: u32,
    #[prost(enumeration = "btc_sign_init_request::FormatUnit", tag = "8")]
    pub format_unit: i32,
    #[prost(bool, tag = "9")]
    pub contains_silent_payment_outputs: bool,
    #[prost(message, repeated, tag = "10")]
    pub output_script_configs: Vec<BtcScriptConfigWithKeypath>,
}

pub mod btc_sign_init_request {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum FormatUnit {
        Default = 0,
        Sat = 1,
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BtcSignNextResponse {
    #[prost(enumeration = "btc_sign_next_response::Type", tag = "1")]
    pub r#type: i32,
    #[prost(uint32, tag = "2")]
    pub index: u32,
    #[prost(bool, tag = "3")]
    pub has_signature: bool,
    #[prost(bytes = "vec", tag = "4")]
    pub signature: Vec<u8>,
    #[prost(uint32, tag = "5")]
    pub prev_index: u32,
    #[prost(message, optional, tag = "6")]
    pub anti_klepto_signer_commitment: Option<AntiKleptoSignerCommitment>,
    #[prost(bytes = "vec", tag = "7")]
    pub generated_output_pkscript: Vec<u8>,
    #[prost(bytes = "vec", tag = "8")]
    pub silent_payment_dleq_proof: Vec<u8>,
}

pub mod btc_sign_next_response {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Input = 0,
        Output = 1,
        Done = 2,
        PrevtxInit = 3,
        PrevtxInput = 4,
        PrevtxOutput = 5,
        HostNonce = 6,
        PaymentRequest = 7,
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BtcSignInputRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub prev_out_hash: Vec<u8>,
    #[prost(uint32, tag = "2")]
    pub prev_out_index: u32,
    #[prost(uint64, tag = "3")]
    pub prev_out_value: u64,
    #[prost(uint32, tag = "4")]
    pub sequence: u32,
    #[prost(uint32, repeated, tag = "6")]
    pub keypath: Vec<u32>,
    #[prost(uint32, tag = "7")]
    pub script_config_index: u32,
    #[prost(message, optional, tag = "8")]
    pub host_nonce_commitment: Option<AntiKleptoHostNonceCommitment>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BtcSignOutputRequest {
    #[prost(bool, tag = "1")]
    pub ours: bool,
    #[prost(enumeration = "BtcOutputType", tag = "2")]
    pub r#type: i32,
    #[prost(uint64, tag = "3")]
    pub value: u64,
    #[prost(bytes = "vec", tag = "4")]
    pub payload: Vec<u8>,
    #[prost(uint32, repeated, tag = "5")]
    pub keypath: Vec<u32>,
    #[prost(uint32, tag = "6")]
    pub script_config_index: u32,
    #[prost(message, optional, tag = "8")]
    pub silent_payment: Option<btc_sign_output_request::SilentPayment>,
    #[prost(uint32, optional, tag = "9")]
    pub output_script_config_index: Option<u32>,
}

pub mod btc_sign_output_request {
    #[derive(Clone, PartialEq, prost::Message)]
    pub struct SilentPayment {
        #[prost(string, tag = "1")]
        pub address: String,
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BtcPrevTxInitRequest {
    #[prost(uint32, tag = "1")]
    pub version: u32,
    #[prost(uint32, tag = "2")]
    pub num_inputs: u32,
    #[prost(uint32, tag = "3")]
    pub num_outputs: u32,
    #[prost(uint32, tag = "4")]
    pub locktime: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BtcPrevTxInputRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub prev_out_hash: Vec<u8>,
    #[prost(uint32, tag = "2")]
    pub prev_out_index: u32,
    #[prost(bytes = "vec", tag = "3")]
    pub signature_script: Vec<u8>,
    #[prost(uint32, tag = "4")]
    pub sequence: u32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BtcPrevTxOutputRequest {
    #[prost(uint64, tag = "1")]
    pub value: u64,
    #[prost(bytes = "vec", tag = "2")]
    pub pubkey_script: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BtcSignMessageRequest {
    #[prost(enumeration = "BtcCoin", tag = "1")]
    pub coin: i32,
    #[prost(message, optional, tag = "2")]
    pub script_config: Option<BtcScriptConfigWithKeypath>,
    #[prost(bytes = "vec", tag = "3")]
    pub msg: Vec<u8>,
    #[prost(message, optional, tag = "4")]
    pub host_nonce_commitment: Option<AntiKleptoHostNonceCommitment>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BtcSignMessageResponse {
    #[prost(bytes = "vec", tag = "1")]
    pub signature: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BtcIsScriptConfigRegisteredRequest {
    #[prost(message, optional, tag = "1")]
    pub registration: Option<BtcScriptConfigRegistration>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BtcIsScriptConfigRegisteredResponse {
    #[prost(bool, tag = "1")]
    pub is_registered: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BtcScriptConfigRegistration {
    #[prost(enumeration = "BtcCoin", tag = "1")]
    pub coin: i32,
    #[prost(message, optional, tag = "2")]
    pub script_config: Option<BtcScriptConfig>,
    #[prost(uint32, repeated, tag = "3")]
    pub keypath: Vec<u32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BtcSuccess {}

/// Nested Bitcoin requests, used for everything added after the first
/// firmware releases
#[derive(Clone, PartialEq, prost::Message)]
pub struct BtcRequest {
    #[prost(oneof = "btc_request::Request", tags = "1, 3, 4, 5, 6, 7")]
    pub request: Option<btc_request::Request>,
}

pub mod btc_request {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Request {
        #[prost(message, tag = "1")]
        IsScriptConfigRegistered(super::BtcIsScriptConfigRegisteredRequest),
        #[prost(message, tag = "3")]
        PrevtxInit(super::BtcPrevTxInitRequest),
        #[prost(message, tag = "4")]
        PrevtxInput(super::BtcPrevTxInputRequest),
        #[prost(message, tag = "5")]
        PrevtxOutput(super::BtcPrevTxOutputRequest),
        #[prost(message, tag = "6")]
        SignMessage(super::BtcSignMessageRequest),
        #[prost(message, tag = "7")]
        AntikleptoSignature(super::AntiKleptoSignatureRequest),
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BtcResponse {
    #[prost(oneof = "btc_response::Response", tags = "1, 2, 3, 4, 5")]
    pub response: Option<btc_response::Response>,
}

pub mod btc_response {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Response {
        #[prost(message, tag = "1")]
        Success(super::BtcSuccess),
        #[prost(message, tag = "2")]
        IsScriptConfigRegistered(super::BtcIsScriptConfigRegisteredResponse),
        #[prost(message, tag = "3")]
        SignNext(super::BtcSignNextResponse),
        #[prost(message, tag = "4")]
        SignMessage(super::BtcSignMessageResponse),
        #[prost(message, tag = "5")]
        AntikleptoSignerCommitment(super::AntiKleptoSignerCommitment),
    }
}

// Anti-klepto

#[derive(Clone, PartialEq, prost::Message)]
pub struct AntiKleptoHostNonceCommitment {
    #[prost(bytes = "vec", tag = "1")]
    pub commitment: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AntiKleptoSignerCommitment {
    #[prost(bytes = "vec", tag = "1")]
    pub commitment: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct AntiKleptoSignatureRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub host_nonce: Vec<u8>,
}

impl BtcScriptConfig {
    /// A single-signature script config
    pub fn simple(simple_type: btc_script_config::SimpleType) -> Self {
        BtcScriptConfig {
            config: Some(btc_script_config::Config::SimpleType(simple_type as i32)),
        }
    }

    /// Whether this is a single-sig taproot config
    pub fn is_taproot(&self) -> bool {
        self.config
            == Some(btc_script_config::Config::SimpleType(
                btc_script_config::SimpleType::P2tr as i32,
            ))
    }
}
