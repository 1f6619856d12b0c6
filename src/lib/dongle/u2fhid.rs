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

//! # HID Packet Framing
//!
//! Messages travel as one init report followed by continuation reports,
//! each exactly 64 bytes, in the style of U2F-HID.
//!

use core::cmp;
use core::convert::TryFrom as _;

use crate::constants::u2fhid;
use crate::dongle::{write_all, ReadWrite};
use crate::Error;

/// Largest message which fits in one init and all continuation frames
const MAX_MESSAGE_LEN: usize = (u2fhid::PACKET_SIZE - u2fhid::INIT_HEADER_LEN)
    + u2fhid::MAX_CONT_FRAMES * (u2fhid::PACKET_SIZE - u2fhid::CONT_HEADER_LEN);

/// Splits a message into 64-byte reports, concatenated
///
/// Trailing space in the last report is filled with padding bytes.
pub fn encode_frames(cmd: u8, mut data: &[u8]) -> Result<Vec<u8>, Error> {
    if data.len() > MAX_MESSAGE_LEN {
        return Err(Error::FrameMessageTooLong(data.len()));
    }

    let mut ret = Vec::with_capacity(u2fhid::PACKET_SIZE * (2 + data.len() / 59));
    let mut frame = [u2fhid::PAD; u2fhid::PACKET_SIZE];
    frame[0..4].copy_from_slice(&u2fhid::CID.to_be_bytes());
    frame[4] = cmd;
    frame[5..7].copy_from_slice(
        &u16::try_from(data.len())
            .expect("length checked above")
            .to_be_bytes(),
    );
    let n = cmp::min(data.len(), u2fhid::PACKET_SIZE - u2fhid::INIT_HEADER_LEN);
    frame[u2fhid::INIT_HEADER_LEN..u2fhid::INIT_HEADER_LEN + n].copy_from_slice(&data[..n]);
    ret.extend_from_slice(&frame);
    data = &data[n..];

    let mut sequence_no = 0u8;
    while !data.is_empty() {
        let mut frame = [u2fhid::PAD; u2fhid::PACKET_SIZE];
        frame[0..4].copy_from_slice(&u2fhid::CID.to_be_bytes());
        frame[4] = sequence_no;
        let n = cmp::min(data.len(), u2fhid::PACKET_SIZE - u2fhid::CONT_HEADER_LEN);
        frame[u2fhid::CONT_HEADER_LEN..u2fhid::CONT_HEADER_LEN + n].copy_from_slice(&data[..n]);
        ret.extend_from_slice(&frame);
        data = &data[n..];
        sequence_no += 1;
    }
    Ok(ret)
}

/// A device handle speaking the packet framing with a fixed command byte
pub struct U2fHid<T> {
    dev: T,
    cmd: u8,
}

impl<T: ReadWrite> U2fHid<T> {
    /// Wraps an opened device handle
    pub fn new(dev: T, cmd: u8) -> Self {
        U2fHid { dev, cmd }
    }

    /// Access the underlying handle
    pub fn device_mut(&mut self) -> &mut T {
        &mut self.dev
    }

    /// Closes the underlying handle
    pub fn close(&mut self) {
        self.dev.close()
    }

    /// Sends a message without waiting for a reply
    pub fn send_frame(&mut self, msg: &[u8]) -> Result<(), Error> {
        let frames = encode_frames(self.cmd, msg)?;
        write_all(&mut self.dev, &frames)
    }

    /// Reads one complete message
    pub fn read_frame(&mut self) -> Result<Vec<u8>, Error> {
        let mut frame = [0u8; u2fhid::PACKET_SIZE];
        let n = self.dev.read(&mut frame)?;
        if n < u2fhid::INIT_HEADER_LEN {
            return Err(Error::FrameTooShort(n));
        }
        check_channel(&frame)?;
        if frame[4] != self.cmd {
            return Err(Error::FrameWrongCommand {
                expected: self.cmd,
                found: frame[4],
            });
        }
        let data_len = usize::from(u16::from_be_bytes([frame[5], frame[6]]));
        let mut ret = Vec::with_capacity(data_len);
        let take = cmp::min(data_len, n - u2fhid::INIT_HEADER_LEN);
        ret.extend_from_slice(&frame[u2fhid::INIT_HEADER_LEN..u2fhid::INIT_HEADER_LEN + take]);

        let mut sequence_no = 0u8;
        while ret.len() < data_len {
            let n = self.dev.read(&mut frame)?;
            if n < u2fhid::CONT_HEADER_LEN {
                return Err(Error::FrameTooShort(n));
            }
            check_channel(&frame)?;
            if frame[4] != sequence_no {
                return Err(Error::FrameWrongSequence {
                    expected: sequence_no,
                    found: frame[4],
                });
            }
            let take = cmp::min(data_len - ret.len(), n - u2fhid::CONT_HEADER_LEN);
            ret.extend_from_slice(&frame[u2fhid::CONT_HEADER_LEN..u2fhid::CONT_HEADER_LEN + take]);
            sequence_no = sequence_no.wrapping_add(1);
        }
        Ok(ret)
    }

    /// Sends a message and reads the reply
    pub fn query(&mut self, msg: &[u8]) -> Result<Vec<u8>, Error> {
        self.send_frame(msg)?;
        self.read_frame()
    }
}

fn check_channel(frame: &[u8]) -> Result<(), Error> {
    let cid = u32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]);
    if cid != u2fhid::CID {
        return Err(Error::FrameWrongChannel {
            expected: u2fhid::CID,
            found: cid,
        });
    }
    Ok(())
}
