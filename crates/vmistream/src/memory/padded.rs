//! Padded physical memory stream.
//!
//! `read(n)` always yields exactly `n` bytes: the range is read page by page
//! and any page the driver cannot provide is left as zeros. Offline analysis
//! frameworks rely on this to walk address ranges with holes at a fixed
//! stride.

use crate::memory::error::{DriverResult, StreamError, StreamResult};
use crate::memory::stream::{AddressCursor, PAGE_SIZE};
use crate::memory::traits::DriverSession;
use std::io::{self, Read, Seek, SeekFrom};
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, trace};

/// Physical memory stream whose reads never fail and never come back short.
///
/// Unlike [`MemoryStream`](crate::memory::stream::MemoryStream), a read
/// advances the cursor by the requested length (clamped at the maximum
/// address).
///
/// Pages of one read are fetched at `cursor + i * PAGE_SIZE` and are not
/// clamped, so the part of a read that runs past the maximum address is
/// zero-filled rather than re-read at the maximum address.
pub struct PaddedMemoryStream {
    session: Arc<dyn DriverSession>,
    cursor: AddressCursor,
}

impl PaddedMemoryStream {
    /// Wrap a session. The maximum address is queried once, here.
    pub fn new(session: Arc<dyn DriverSession>) -> StreamResult<Self> {
        let max_addr = session.max_physical_address()?;
        debug!(
            "PaddedMemoryStream on '{}': max_addr={:#x}",
            session.name(),
            max_addr
        );
        Ok(PaddedMemoryStream {
            session,
            cursor: AddressCursor::new(max_addr),
        })
    }

    pub fn seek(&mut self, position: SeekFrom) -> StreamResult<u64> {
        trace!("seek: {:?}, pos: {:#x}", position, self.cursor.position());
        self.cursor.seek(position)
    }

    pub fn tell(&self) -> u64 {
        self.cursor.position()
    }

    pub fn max_address(&self) -> u64 {
        self.cursor.max_addr()
    }

    /// Read exactly `size` bytes starting at the cursor.
    pub fn read(&mut self, size: usize) -> Vec<u8> {
        let mut data = vec![0u8; size];
        self.read_into(&mut data);
        data
    }

    /// Fill the whole of `buf` starting at the cursor, returning `buf.len()`.
    pub fn read_into(&mut self, buf: &mut [u8]) -> usize {
        let start = self.cursor.position();
        trace!("padded read: len: {}, pos: {:#x}", buf.len(), start);
        let holes = read_padded(self.session.as_ref(), start, buf);
        if !holes.is_empty() {
            trace!("padded read: {} range(s) zero-filled", holes.len());
        }
        self.cursor.advance(buf.len() as u64);
        buf.len()
    }

    /// Read-to-end is not a supported mode.
    pub fn read_to_end(&self) -> StreamResult<Vec<u8>> {
        Err(StreamError::UnsupportedReadMode)
    }

    pub fn seekable(&self) -> bool {
        true
    }

    pub fn writable(&self) -> bool {
        false
    }

    pub fn session(&self) -> &Arc<dyn DriverSession> {
        &self.session
    }
}

/// Fill `buf` from `start` in page-sized chunks, zeroing what cannot be read.
///
/// Returns the address ranges that were zero-filled, in ascending order.
pub(crate) fn read_padded(
    session: &dyn DriverSession,
    start: u64,
    buf: &mut [u8],
) -> Vec<Range<u64>> {
    buf.chunks_mut(PAGE_SIZE)
        .enumerate()
        .filter_map(|(i, page)| {
            let paddr = start.saturating_add((i * PAGE_SIZE) as u64);
            fill_page(session, paddr, page)
        })
        .collect()
}

/// Read one page-sized chunk at `paddr` into `out`.
fn read_page(session: &dyn DriverSession, paddr: u64, out: &mut [u8]) -> DriverResult<usize> {
    session.read_physical_into(paddr, out)
}

/// Read one chunk, zero-filling whatever the driver could not provide.
///
/// Driver errors are swallowed here and only here. Returns the zeroed range,
/// if any.
fn fill_page(session: &dyn DriverSession, paddr: u64, out: &mut [u8]) -> Option<Range<u64>> {
    let len = out.len();
    let got = read_page(session, paddr, out)
        .unwrap_or_else(|e| {
            trace!("padded read: page at {:#x} unreadable: {}", paddr, e);
            0
        })
        .min(len);
    out[got..].fill(0);
    (got < len).then(|| paddr.saturating_add(got as u64)..paddr.saturating_add(len as u64))
}

impl Read for PaddedMemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(self.read_into(buf))
    }

    fn read_to_end(&mut self, _buf: &mut Vec<u8>) -> io::Result<usize> {
        Err(StreamError::UnsupportedReadMode.into())
    }

    fn read_to_string(&mut self, _buf: &mut String) -> io::Result<usize> {
        Err(StreamError::UnsupportedReadMode.into())
    }
}

impl Seek for PaddedMemoryStream {
    fn seek(&mut self, position: SeekFrom) -> io::Result<u64> {
        Ok(self.cursor.seek(position)?)
    }
}
