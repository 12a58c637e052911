//! Seekable, read-only view of a guest's physical memory.
//!
//! The stream is unbuffered since it is backed by live memory, and allows
//! random access. A plain read never advances the cursor: callers seek, read,
//! seek again.

use crate::memory::error::{StreamError, StreamResult};
use crate::memory::traits::DriverSession;
use std::io::{self, Seek, SeekFrom};
use std::sync::Arc;
use tracing::{debug, trace};

/// Page granularity used by padded reads.
pub const PAGE_SIZE: usize = 4096;

/// Cursor shared by the plain and padded streams.
///
/// The position is always within `[0, max_addr]`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct AddressCursor {
    pos: u64,
    max_addr: u64,
}

impl AddressCursor {
    pub(crate) fn new(max_addr: u64) -> Self {
        AddressCursor { pos: 0, max_addr }
    }

    pub(crate) fn position(&self) -> u64 {
        self.pos
    }

    pub(crate) fn max_addr(&self) -> u64 {
        self.max_addr
    }

    /// Absolute and end seeks must land exactly inside the address space.
    /// Relative seeks saturate at both ends.
    pub(crate) fn seek(&mut self, position: SeekFrom) -> StreamResult<u64> {
        match position {
            SeekFrom::Start(offset) => {
                if offset > self.max_addr {
                    return Err(self.out_of_range(position));
                }
                self.pos = offset;
            }
            SeekFrom::End(0) => self.pos = self.max_addr,
            SeekFrom::End(_) => return Err(self.out_of_range(position)),
            SeekFrom::Current(delta) => {
                let moved = if delta >= 0 {
                    self.pos.saturating_add(delta.unsigned_abs())
                } else {
                    self.pos.saturating_sub(delta.unsigned_abs())
                };
                self.pos = moved.min(self.max_addr);
            }
        }
        Ok(self.pos)
    }

    /// Move forward by `len` bytes, clamped at `max_addr`.
    pub(crate) fn advance(&mut self, len: u64) -> u64 {
        self.pos = self.pos.saturating_add(len).min(self.max_addr);
        self.pos
    }

    fn out_of_range(&self, position: SeekFrom) -> StreamError {
        StreamError::OutOfRangeSeek {
            position,
            max_addr: self.max_addr,
        }
    }
}

/// Plain physical memory stream.
///
/// Each read is exactly one driver read and may come back short.
pub struct MemoryStream {
    session: Arc<dyn DriverSession>,
    cursor: AddressCursor,
}

impl MemoryStream {
    /// Wrap a session. The maximum address is queried once, here.
    pub fn new(session: Arc<dyn DriverSession>) -> StreamResult<Self> {
        let max_addr = session.max_physical_address()?;
        debug!("MemoryStream on '{}': max_addr={:#x}", session.name(), max_addr);
        Ok(MemoryStream {
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

    /// Read up to `size` bytes at the cursor without moving it.
    pub fn read(&self, size: usize) -> StreamResult<Vec<u8>> {
        trace!("read: size: {}, pos: {:#x}", size, self.tell());
        let mut data = self.session.read_physical(self.tell(), size)?;
        data.truncate(size);
        Ok(data)
    }

    /// Read at the cursor into `buf` without moving it.
    ///
    /// Returns the number of bytes read; the rest of `buf` is left as is.
    pub fn read_into(&self, buf: &mut [u8]) -> StreamResult<usize> {
        trace!("read_into: len: {}, pos: {:#x}", buf.len(), self.tell());
        Ok(self.session.read_physical_into(self.tell(), buf)?)
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

impl Seek for MemoryStream {
    fn seek(&mut self, position: SeekFrom) -> io::Result<u64> {
        Ok(self.cursor.seek(position)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::error::DriverError;
    use crate::memory::mock::MockSession;

    const MAX_ADDR: u64 = 1000;

    fn stream_over(mock: MockSession) -> (Arc<MockSession>, MemoryStream) {
        let mock = Arc::new(mock);
        let stream = MemoryStream::new(mock.clone()).unwrap();
        (mock, stream)
    }

    #[test]
    fn test_seek_start() {
        let (_, mut stream) = stream_over(MockSession::new(MAX_ADDR));
        for addr in [0, 1, 500, MAX_ADDR] {
            assert_eq!(stream.seek(SeekFrom::Start(addr)).unwrap(), addr);
            assert_eq!(stream.tell(), addr);
        }
    }

    #[test]
    fn test_seek_start_out_of_range() {
        let (_, mut stream) = stream_over(MockSession::new(MAX_ADDR));
        stream.seek(SeekFrom::Start(10)).unwrap();
        match stream.seek(SeekFrom::Start(MAX_ADDR + 1)) {
            Err(StreamError::OutOfRangeSeek { max_addr, .. }) => assert_eq!(max_addr, MAX_ADDR),
            other => panic!("Expected OutOfRangeSeek, got: {:?}", other),
        }
        // Position untouched on failure.
        assert_eq!(stream.tell(), 10);
    }

    #[test]
    fn test_seek_end() {
        let (_, mut stream) = stream_over(MockSession::new(MAX_ADDR));
        assert_eq!(stream.seek(SeekFrom::End(0)).unwrap(), MAX_ADDR);
        assert_eq!(stream.tell(), MAX_ADDR);
        assert!(matches!(
            stream.seek(SeekFrom::End(-50)),
            Err(StreamError::OutOfRangeSeek { .. })
        ));
        assert!(matches!(
            stream.seek(SeekFrom::End(50)),
            Err(StreamError::OutOfRangeSeek { .. })
        ));
    }

    #[test]
    fn test_seek_current_clamps() {
        let (_, mut stream) = stream_over(MockSession::new(MAX_ADDR));
        assert_eq!(stream.seek(SeekFrom::Current(-5)).unwrap(), 0);
        assert_eq!(stream.seek(SeekFrom::Current(50)).unwrap(), 50);
        assert_eq!(stream.seek(SeekFrom::Current(-1)).unwrap(), 49);
        assert_eq!(stream.seek(SeekFrom::Current(10)).unwrap(), 59);
        assert_eq!(stream.seek(SeekFrom::Current(i64::MAX)).unwrap(), MAX_ADDR);
        assert_eq!(stream.seek(SeekFrom::Current(i64::MIN)).unwrap(), 0);
    }

    #[test]
    fn test_read_does_not_advance() {
        let (mock, mut stream) = stream_over(MockSession::new(0xffff));
        stream.seek(SeekFrom::Start(0x100)).unwrap();
        let first = stream.read(8).unwrap();
        let second = stream.read(8).unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0], MockSession::byte_at(0x100));
        assert_eq!(stream.tell(), 0x100);
        assert_eq!(mock.read_count(), 2);
    }

    #[test]
    fn test_read_short() {
        let (mock, mut stream) = stream_over(MockSession::new(0xffff).with_mapped_end(0x1004));
        stream.seek(SeekFrom::Start(0x1000)).unwrap();
        let data = stream.read(0x100).unwrap();
        assert_eq!(data.len(), 4);
        assert_eq!(mock.read_count(), 1);
    }

    #[test]
    fn test_read_zero() {
        let (_, stream) = stream_over(MockSession::new(MAX_ADDR));
        assert!(stream.read(0).unwrap().is_empty());
    }

    #[test]
    fn test_read_error_propagates() {
        let (_, stream) = stream_over(MockSession::new(0xffff).with_bad_page(0));
        assert!(matches!(
            stream.read(16),
            Err(StreamError::Driver(DriverError::InvalidAddress { .. }))
        ));
    }

    #[test]
    fn test_read_to_end_unsupported() {
        let (mock, stream) = stream_over(MockSession::new(MAX_ADDR));
        assert!(matches!(
            stream.read_to_end(),
            Err(StreamError::UnsupportedReadMode)
        ));
        assert_eq!(mock.read_count(), 0);
    }

    #[test]
    fn test_read_into_leaves_tail() {
        let (_, mut stream) = stream_over(MockSession::new(0xffff).with_mapped_end(0x1002));
        stream.seek(SeekFrom::Start(0x1000)).unwrap();
        let mut buf = [0xAAu8; 6];
        let n = stream.read_into(&mut buf).unwrap();
        assert_eq!(n, 2);
        assert_eq!(buf[0], MockSession::byte_at(0x1000));
        assert_eq!(&buf[2..], &[0xAA; 4]);
    }

    #[test]
    fn test_stream_flags() {
        let (_, stream) = stream_over(MockSession::new(MAX_ADDR));
        assert!(stream.seekable());
        assert!(!stream.writable());
        assert_eq!(stream.max_address(), MAX_ADDR);
    }

    #[test]
    fn test_io_seek_maps_errors() {
        let (_, mut stream) = stream_over(MockSession::new(MAX_ADDR));
        let err = Seek::seek(&mut stream, SeekFrom::Start(MAX_ADDR + 1)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert_eq!(Seek::seek(&mut stream, SeekFrom::End(0)).unwrap(), MAX_ADDR);
    }
}
