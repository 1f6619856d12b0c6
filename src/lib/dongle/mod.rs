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

//! # Dongle
//!
//! Abstract byte pipe to a device, plus the HID packet framing that both
//! device generations share.
//!

use crate::{constants, Error};

pub mod hid;
#[cfg(test)]
pub(crate) mod mock;
mod u2fhid;

pub use self::u2fhid::{encode_frames, U2fHid};

/// Trait representing a raw, opened device handle
pub trait ReadWrite: Send {
    /// Writes some prefix of `data` to the device and returns how many
    /// bytes were consumed
    fn write(&mut self, data: &[u8]) -> Result<usize, Error>;

    /// Reads one report into `buf` and returns how many bytes were read
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error>;

    /// Releases the handle; the default does nothing
    fn close(&mut self) {}
}

impl<T: ReadWrite + ?Sized> ReadWrite for Box<T> {
    fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
        (**self).write(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        (**self).read(buf)
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// Per-platform write shim
///
/// macOS truncates HID writes to a single report, and firmware before
/// 9.23.1 (bootloader before 1.1.2) misparses the truncated tail. There we
/// never hand the OS more than one report at a time. Everywhere else writes
/// pass through unchanged.
pub struct WriteShim<T> {
    inner: T,
    max_write: Option<usize>,
}

impl<T: ReadWrite> WriteShim<T> {
    /// Wraps a handle with the shim for the platform we were compiled for
    pub fn for_platform(inner: T) -> Self {
        if cfg!(target_os = "macos") {
            WriteShim::single_report(inner)
        } else {
            WriteShim {
                inner,
                max_write: None,
            }
        }
    }

    /// Wraps a handle so that every write carries at most one report
    pub fn single_report(inner: T) -> Self {
        WriteShim {
            inner,
            max_write: Some(constants::u2fhid::PACKET_SIZE),
        }
    }
}

impl<T: ReadWrite> ReadWrite for WriteShim<T> {
    fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
        match self.max_write {
            Some(max) if data.len() > max => self.inner.write(&data[..max]),
            _ => self.inner.write(data),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        self.inner.read(buf)
    }

    fn close(&mut self) {
        self.inner.close()
    }
}

/// Writes all of `data`, looping over partial writes
pub(crate) fn write_all<T: ReadWrite + ?Sized>(dev: &mut T, mut data: &[u8]) -> Result<(), Error> {
    while !data.is_empty() {
        let n = dev.write(data)?;
        if n == 0 {
            return Err(Error::UnexpectedEof);
        }
        data = &data[n..];
    }
    Ok(())
}
