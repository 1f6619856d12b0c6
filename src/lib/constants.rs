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

//! # Constants
//!
//! Various constants
//!

/// Directory under `$HOME` holding the pairing database and relay channel
pub const CONFIG_DIR: &str = ".bitbox-hww";

/// HID-related constants
pub mod hid {
    /// USB vendor ID shared by all BitBox devices
    pub const VENDOR_ID: u16 = 0x03eb;
    /// Constants for the legacy Digital BitBox
    pub mod v1 {
        /// USB product ID
        pub const PRODUCT_ID: u16 = 0x2402;
        /// HID usage page of the wallet interface
        pub const USAGE_PAGE: u16 = 0xffff;
        /// Product strings reported when the device is in bootloader mode
        pub const BOOTLOADER_PRODUCTS: [&str; 2] = ["bootloader", "Digital Bitbox bootloader"];
    }
    /// Constants for the BitBox02 family
    pub mod v2 {
        /// USB product ID
        pub const PRODUCT_ID: u16 = 0x2403;
        /// HID usage page of the wallet interface
        pub const USAGE_PAGE: u16 = 0xffff;
    }
}

/// Packet-layer constants
#[allow(missing_docs)]
pub mod u2fhid {
    /// Size of a single HID report
    pub const PACKET_SIZE: usize = 64;
    /// Broadcast channel id used for all traffic
    pub const CID: u32 = 0xff00_0000;
    /// Header length of the first frame: cid(4) cmd(1) len(2)
    pub const INIT_HEADER_LEN: usize = 7;
    /// Header length of continuation frames: cid(4) seq(1)
    pub const CONT_HEADER_LEN: usize = 5;
    /// Padding byte for unused space at the end of the last report
    pub const PAD: u8 = 0xee;
    /// Maximum number of continuation frames (sequence numbers 0..=0x7f)
    pub const MAX_CONT_FRAMES: usize = 0x80;

    const TYPE_INIT: u8 = 0x80;
    const VENDOR_FIRST: u8 = 0x40;

    /// Command byte used by firmware of both generations
    pub const CMD_HWW: u8 = TYPE_INIT | VENDOR_FIRST | 0x01;
    /// Command byte used by the BitBox02 bootloader
    pub const CMD_BOOTLOADER: u8 = TYPE_INIT | VENDOR_FIRST | 0x03;
}

/// BitBox02 application-layer constants
#[allow(missing_docs)]
pub mod v2 {
    /// Opcodes sent in the clear, before the Noise channel exists
    pub mod op {
        pub const INFO: u8 = b'i';
        pub const ATTESTATION: u8 = b'a';
        pub const UNLOCK: u8 = b'u';
        pub const I_CAN_HAS_HANDSHAKE: u8 = b'h';
        pub const HER_COMES_HANDSHAKE: u8 = b'H';
        pub const I_CAN_HAS_PAIRIN_VERIFICASHUN: u8 = b'v';
        pub const NOISE_MSG: u8 = b'n';
    }

    /// Response status byte, shared by the handshake and the query framing
    pub const RESPONSE_SUCCESS: u8 = 0x00;
    /// The handshake reply byte which asks the user to confirm pairing
    pub const PAIRING_REQUIRED: u8 = 0x01;

    /// Query framing, firmware 7.0.0 and later
    pub mod hww {
        pub const REQ_NEW: u8 = 0x00;
        pub const REQ_RETRY: u8 = 0x01;
        pub const REQ_CANCEL: u8 = 0x02;
        pub const REQ_INFO: u8 = b'i';

        pub const RSP_ACK: u8 = 0x00;
        pub const RSP_NOT_READY: u8 = 0x01;
        pub const RSP_BUSY: u8 = 0x02;
        pub const RSP_NACK: u8 = 0x03;
    }

    /// Timing of the query framing, in milliseconds
    pub mod timing {
        pub const BUSY_RETRY_MS: u64 = 1000;
        pub const NOT_READY_POLL_MS: u64 = 200;
        /// How many send timestamps are kept for diagnostics on a nack
        pub const TIMESTAMP_RING: usize = 11;
    }

    /// Noise protocol name
    pub const NOISE_PROTOCOL: &[u8] = b"Noise_XX_25519_ChaChaPoly_SHA256";

    /// Device error codes
    pub mod error {
        pub const INVALID_INPUT: i64 = 101;
        pub const MEMORY: i64 = 102;
        pub const GENERIC: i64 = 103;
        pub const USER_ABORT: i64 = 104;
        pub const INVALID_STATE: i64 = 105;
        pub const DISABLED: i64 = 106;
        pub const DUPLICATE: i64 = 107;
        pub const NOISE_ENCRYPT: i64 = 108;
        pub const NOISE_DECRYPT: i64 = 109;
    }

    /// Bootloader opcodes
    pub mod bootloader {
        pub const OP_VERSIONS: u8 = b'v';
        pub const OP_HASHES: u8 = b'h';
        pub const OP_SHOW_FIRMWARE_HASH: u8 = b'H';
        pub const OP_REBOOT: u8 = b'r';
        pub const OP_SCREEN_ROTATE: u8 = b'f';
        pub const OP_ERASE: u8 = b'e';
        pub const OP_WRITE_CHUNK: u8 = b'w';
        pub const OP_WRITE_SIGNATURE: u8 = b's';
        pub const OP_HARDWARE: u8 = b'W';

        /// Size of a flash chunk
        pub const CHUNK_SIZE: usize = 4096;
        /// Maximum number of firmware chunks
        pub const MAX_CHUNKS: usize = 216;
        /// Maximum firmware body size
        pub const MAX_FIRMWARE_SIZE: usize = CHUNK_SIZE * MAX_CHUNKS;
        /// Length of the product magic at the start of a signed binary
        pub const MAGIC_LEN: usize = 4;
        /// Length of the signature block following the magic
        pub const SIG_DATA_LEN: usize = 584;
        /// Byte used to pad partial chunks and the firmware hash
        pub const PAD: u8 = 0xff;
        /// Seconds counted down between a successful flash and the reboot
        pub const REBOOT_SECONDS: u8 = 5;
    }
}

/// Legacy Digital BitBox constants
#[allow(missing_docs)]
pub mod v1 {
    /// Maximum number of hashes the device signs in one round
    pub const SIGN_BATCH_SIZE: usize = 15;
    /// Salt used when stretching backup passwords
    pub const STRETCH_SALT: &[u8] = b"Digital Bitbox";
    /// PBKDF2 rounds used when stretching backup passwords
    pub const STRETCH_ITERATIONS: u32 = 20480;
    /// Number of pings sent while the device is still booting
    pub const PING_ATTEMPTS: usize = 20;
    /// Delay between pings while the device is still booting, in milliseconds
    pub const PING_RETRY_MS: u64 = 500;

    /// Device error codes
    pub mod error {
        pub const PIN_TOO_SHORT: i64 = 109;
        pub const SD_CARD: i64 = 400;
        pub const SD_OPEN_DIR: i64 = 403;
        pub const SD_NO_MATCH: i64 = 410;
        pub const INITIALIZING: i64 = 503;
        pub const TOUCH_ABORT: i64 = 600;
        pub const TOUCH_TIMEOUT: i64 = 601;
        /// Host-side: the given PIN does not match the cached one
        pub const PIN_INCORRECT: i64 = 1000;
        /// Host-side: the device did not acknowledge a new PIN
        pub const REPLACE_PIN_FAILED: i64 = 1001;
    }

    /// Mobile relay
    pub mod relay {
        /// Relay server used unless configured otherwise
        pub const DEFAULT_SERVER: &str = "https://digitalbitbox.com/smartverification/index.php";
        /// Device type sent with every request: desktop
        pub const DEVICE_TYPE: &str = "0";
        /// Command to push a message to the mobile
        pub const CMD_PUSH: &str = "data";
        /// Command to pull the oldest message from the mobile
        pub const CMD_PULL: &str = "gd";
        /// Name of the file the channel is stored in
        pub const CONFIG_FILE_NAME: &str = "channel.json";

        pub const SCAN_TIMEOUT_SECS: u64 = 60;
        pub const KEY_EXCHANGE_TIMEOUT_SECS: u64 = 120;
        pub const COMMAND_TIMEOUT_SECS: u64 = 120;
        pub const SIGNING_PIN_TIMEOUT_SECS: u64 = 120;
        pub const PONG_TIMEOUT_SECS: u64 = 1;
        pub const PING_INTERVAL_SECS: u64 = 10;
        /// Delay before pulling again after the server had nothing for us
        pub const PULL_RETRY_MS: u64 = 100;
    }

    /// Bootloader constants
    pub mod bootloader {
        /// Size of a flash chunk
        pub const CHUNK_SIZE: usize = 4096;
        /// Every bootloader request is zero-padded to this length
        pub const SEND_LEN: usize = 4098;
        /// Every bootloader reply has this length
        pub const READ_LEN: usize = 256;
        /// Report size used by bootloaders of version 3.0.0 and later
        pub const REPORT_SIZE: usize = 64;
        /// Report sizes used by older bootloaders (write, read)
        pub const LEGACY_REPORT_SIZES: (usize, usize) = (SEND_LEN, READ_LEN);
        /// Number of signatures prefixed to a signed firmware
        pub const NUM_SIGNATURES: usize = 7;
        /// Length of the signature prefix
        pub const SIGS_LEN: usize = 64 * NUM_SIGNATURES;
        /// Byte used to pad partial chunks
        pub const PAD: u8 = 0xff;
    }
}
