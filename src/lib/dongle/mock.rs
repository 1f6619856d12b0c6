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

//! In-memory device for unit tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::constants::u2fhid;
use crate::dongle::{encode_frames, ReadWrite};
use crate::Error;

/// Something which answers complete requests
pub trait Responder: Send {
    /// Answers one request; `None` means the device stays silent
    fn respond(&mut self, request: &[u8]) -> Option<Vec<u8>>;
}

impl<F: FnMut(&[u8]) -> Option<Vec<u8>> + Send> Responder for F {
    fn respond(&mut self, request: &[u8]) -> Option<Vec<u8>> {
        self(request)
    }
}

enum Mode {
    /// Requests and replies use the packet framing with this command byte
    U2f(u8),
    /// Requests are a fixed number of raw bytes, replies go out unframed
    Raw(usize),
    /// Reads return canned reports, writes are swallowed
    Scripted,
}

/// A fake device handle
pub struct MockDevice {
    mode: Mode,
    responder: Box<dyn Responder>,
    pending: Vec<u8>,
    reports: VecDeque<Vec<u8>>,
    requests: Arc<Mutex<Vec<Vec<u8>>>>,
    write_sizes: Arc<Mutex<Vec<usize>>>,
}

impl MockDevice {
    fn with_mode(mode: Mode, responder: Box<dyn Responder>) -> Self {
        MockDevice {
            mode,
            responder,
            pending: vec![],
            reports: VecDeque::new(),
            requests: Arc::new(Mutex::new(vec![])),
            write_sizes: Arc::new(Mutex::new(vec![])),
        }
    }

    /// A device speaking the packet framing, answering with a closure
    pub fn u2f<F>(cmd: u8, f: F) -> Self
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        MockDevice::with_mode(Mode::U2f(cmd), Box::new(f))
    }

    /// A device speaking the packet framing, answering with a simulator
    pub fn u2f_with<R: Responder + 'static>(cmd: u8, responder: R) -> Self {
        MockDevice::with_mode(Mode::U2f(cmd), Box::new(responder))
    }

    /// A device taking fixed-size raw requests
    pub fn raw<F>(request_len: usize, f: F) -> Self
    where
        F: FnMut(&[u8]) -> Option<Vec<u8>> + Send + 'static,
    {
        MockDevice::with_mode(Mode::Raw(request_len), Box::new(f))
    }

    /// A device which replays the given reports
    pub fn scripted(reports: Vec<Vec<u8>>) -> Self {
        let mut dev = MockDevice::raw(usize::MAX, |_| None);
        dev.mode = Mode::Scripted;
        dev.reports = reports.into();
        dev
    }

    /// Every complete request received so far
    pub fn requests(&self) -> Arc<Mutex<Vec<Vec<u8>>>> {
        self.requests.clone()
    }

    /// The size of every individual write call
    pub fn write_sizes(&self) -> Arc<Mutex<Vec<usize>>> {
        self.write_sizes.clone()
    }

    fn handle(&mut self, request: Vec<u8>) {
        self.requests.lock().unwrap().push(request.clone());
        if let Some(reply) = self.responder.respond(&request) {
            match self.mode {
                Mode::U2f(cmd) => {
                    let frames = encode_frames(cmd, &reply).unwrap();
                    for report in frames.chunks(u2fhid::PACKET_SIZE) {
                        self.reports.push_back(report.to_vec());
                    }
                }
                Mode::Raw(_) => self.reports.push_back(reply),
                Mode::Scripted => {}
            }
        }
    }

    fn try_decode_u2f(&mut self, cmd: u8) -> Result<(), Error> {
        loop {
            if self.pending.len() < u2fhid::INIT_HEADER_LEN {
                return Ok(());
            }
            if self.pending[4] != cmd {
                return Err(Error::FrameWrongCommand {
                    expected: cmd,
                    found: self.pending[4],
                });
            }
            let len = usize::from(u16::from_be_bytes([self.pending[5], self.pending[6]]));
            let first = u2fhid::PACKET_SIZE - u2fhid::INIT_HEADER_LEN;
            let cont = u2fhid::PACKET_SIZE - u2fhid::CONT_HEADER_LEN;
            let n_frames = if len <= first {
                1
            } else {
                1 + (len - first + cont - 1) / cont
            };
            if self.pending.len() < n_frames * u2fhid::PACKET_SIZE {
                return Ok(());
            }
            let frames: Vec<u8> = self.pending.drain(..n_frames * u2fhid::PACKET_SIZE).collect();
            let mut data = Vec::with_capacity(len);
            for (i, frame) in frames.chunks(u2fhid::PACKET_SIZE).enumerate() {
                let header = if i == 0 {
                    u2fhid::INIT_HEADER_LEN
                } else {
                    u2fhid::CONT_HEADER_LEN
                };
                let take = std::cmp::min(len - data.len(), u2fhid::PACKET_SIZE - header);
                data.extend_from_slice(&frame[header..header + take]);
            }
            self.handle(data);
        }
    }
}

impl ReadWrite for MockDevice {
    fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
        self.write_sizes.lock().unwrap().push(data.len());
        self.pending.extend_from_slice(data);
        match self.mode {
            Mode::U2f(cmd) => self.try_decode_u2f(cmd)?,
            Mode::Raw(len) => {
                while self.pending.len() >= len {
                    let request: Vec<u8> = self.pending.drain(..len).collect();
                    self.handle(request);
                }
            }
            Mode::Scripted => self.pending.clear(),
        }
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let mut report = self.reports.pop_front().ok_or(Error::UnexpectedEof)?;
        if report.len() > buf.len() {
            let rest = report.split_off(buf.len());
            self.reports.push_front(rest);
        }
        buf[..report.len()].copy_from_slice(&report);
        Ok(report.len())
    }
}
