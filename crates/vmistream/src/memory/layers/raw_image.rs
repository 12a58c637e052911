//! Raw physical memory image session.
//!
//! Serves a flat dump of guest-physical memory (as written by `virsh dump
//! --memory-only --format=raw` or a padded memory dumper) through the
//! [`DriverSession`] interface, using a read-only memory map.

use crate::memory::error::{DriverError, DriverResult};
use crate::memory::traits::DriverSession;
use memmap2::{Mmap, MmapOptions};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info};
use vmiurl::DriverType;

/// A memory-mapped raw image, exposed as a driver session.
///
/// # Thread Safety
///
/// The map is read-only and never remapped, so concurrent reads need no
/// locking.
///
/// # Example
///
/// ```rust,ignore
/// use vmistream::memory::layers::RawImageSession;
/// use vmistream::memory::traits::DriverSession;
///
/// let session = RawImageSession::open("file:///var/lib/dumps/win10.raw")?;
/// let page = session.read_physical(0x1000, 4096)?;
/// ```
pub struct RawImageSession {
    /// Session name, derived from the file name.
    name: String,
    /// Location as given (file:// URL or path).
    location: String,
    /// Resolved file path.
    path: PathBuf,
    /// None for empty files, which cannot be mapped.
    mmap: Option<Mmap>,
    /// Image size in bytes.
    size: u64,
    /// Tracks pause state; a file has no VCPUs to stop.
    paused: AtomicBool,
}

impl RawImageSession {
    /// Parse a file:// URL to a path.
    fn parse_location(location: &str) -> DriverResult<PathBuf> {
        let path_str = match location.strip_prefix("file://") {
            // file:///C:/path -> C:/path
            Some(url_path)
                if url_path.starts_with('/')
                    && url_path.len() > 2
                    && url_path.chars().nth(2) == Some(':') =>
            {
                &url_path[1..]
            }
            Some(url_path) => url_path,
            None => location,
        };

        let decoded = urlencoding::decode(path_str).map_err(|e| {
            DriverError::MissingParameter(format!("invalid image location {:?}: {}", location, e))
        })?;
        Ok(PathBuf::from(decoded.into_owned()))
    }

    /// Map a raw image. `location` is a path or a file:// URL.
    pub fn open(location: impl Into<String>) -> DriverResult<Self> {
        let location = location.into();
        let path = Self::parse_location(&location)?;
        let file = File::open(&path)?;
        let size = file.metadata()?.len();

        let mmap = if size == 0 {
            None
        } else {
            // SAFETY: the map is read-only; the image is expected not to be
            // truncated while it is open.
            Some(unsafe { MmapOptions::new().map(&file)? })
        };

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| location.clone());

        info!("Opened raw image {} ({} bytes)", path.display(), size);

        Ok(RawImageSession {
            name,
            location,
            path,
            mmap,
            size,
            paused: AtomicBool::new(false),
        })
    }

    fn as_slice(&self) -> &[u8] {
        self.mmap.as_deref().unwrap_or(&[])
    }

    /// The location as given to [`open`](Self::open).
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

impl DriverSession for RawImageSession {
    fn driver_type(&self) -> DriverType {
        DriverType::Memflow
    }

    fn name(&self) -> &str {
        &self.name
    }

    /// `size - 1`; an empty image reports 0 and fails every read.
    fn max_physical_address(&self) -> DriverResult<u64> {
        Ok(self.size.saturating_sub(1))
    }

    /// Reads that run past the end of the image come back short; reads that
    /// start past it fail.
    fn read_physical(&self, paddr: u64, length: usize) -> DriverResult<Vec<u8>> {
        if paddr >= self.size {
            return Err(DriverError::invalid_address(
                &self.name,
                paddr,
                "Offset outside of the image boundaries",
            ));
        }

        let start = paddr as usize;
        let available = (self.size - paddr) as usize;
        let end = start + length.min(available);
        Ok(self.as_slice()[start..end].to_vec())
    }

    fn read_physical_into(&self, paddr: u64, buf: &mut [u8]) -> DriverResult<usize> {
        if paddr >= self.size {
            return Err(DriverError::invalid_address(
                &self.name,
                paddr,
                "Offset outside of the image boundaries",
            ));
        }

        let start = paddr as usize;
        let n = buf.len().min((self.size - paddr) as usize);
        buf[..n].copy_from_slice(&self.as_slice()[start..start + n]);
        Ok(n)
    }

    fn pause(&self) -> DriverResult<()> {
        debug!("pause: {}", self.name);
        self.paused.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resume(&self) -> DriverResult<()> {
        debug!("resume: {}", self.name);
        self.paused.store(false, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn image_from_bytes(data: &[u8]) -> (NamedTempFile, RawImageSession) {
        let mut tmpfile = NamedTempFile::new().unwrap();
        tmpfile.write_all(data).unwrap();
        tmpfile.flush().unwrap();
        let session = RawImageSession::open(tmpfile.path().to_str().unwrap()).unwrap();
        (tmpfile, session)
    }

    #[test]
    fn test_parse_file_url() {
        let path = RawImageSession::parse_location("file:///tmp/test.raw").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/test.raw"));
    }

    #[test]
    fn test_parse_plain_path() {
        let path = RawImageSession::parse_location("/tmp/test.raw").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/test.raw"));
    }

    #[test]
    fn test_url_decode() {
        let path = RawImageSession::parse_location("file:///tmp/test%20file.raw").unwrap();
        assert_eq!(path, PathBuf::from("/tmp/test file.raw"));
    }

    #[test]
    fn test_open_and_read() {
        let (_tmp, session) = image_from_bytes(b"Hello, World!");
        assert_eq!(session.max_physical_address().unwrap(), 12);
        assert_eq!(session.read_physical(0, 5).unwrap(), b"Hello");
        assert_eq!(session.read_physical(7, 5).unwrap(), b"World");
    }

    #[test]
    fn test_short_read_at_end() {
        let (_tmp, session) = image_from_bytes(b"Hello");
        assert_eq!(session.read_physical(3, 5).unwrap(), b"lo");

        let mut buf = [0xAAu8; 5];
        assert_eq!(session.read_physical_into(3, &mut buf).unwrap(), 2);
        assert_eq!(&buf, b"lo\xAA\xAA\xAA");
    }

    #[test]
    fn test_read_past_end_fails() {
        let (_tmp, session) = image_from_bytes(b"Hello");
        assert!(matches!(
            session.read_physical(5, 1),
            Err(DriverError::InvalidAddress { address: 5, .. })
        ));
        assert!(session.read_physical_into(100, &mut [0u8; 4]).is_err());
    }

    #[test]
    fn test_empty_image() {
        let (_tmp, session) = image_from_bytes(b"");
        assert_eq!(session.max_physical_address().unwrap(), 0);
        assert!(session.read_physical(0, 1).is_err());
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            RawImageSession::open("/nonexistent/path.raw"),
            Err(DriverError::Io(_))
        ));
    }

    #[test]
    fn test_pause_resume_tracks_state() {
        let (_tmp, session) = image_from_bytes(b"data");
        assert!(!session.is_paused());
        session.pause().unwrap();
        assert!(session.is_paused());
        session.resume().unwrap();
        assert!(!session.is_paused());
    }

    #[test]
    fn test_session_trait_object() {
        let (tmp, session) = image_from_bytes(b"Hello, World!");
        let session_ref: &dyn DriverSession = &session;
        assert_eq!(
            session_ref.name(),
            tmp.path().file_name().unwrap().to_str().unwrap()
        );
        assert_eq!(session_ref.driver_type(), DriverType::Memflow);
        assert_eq!(session_ref.read_physical(0, 5).unwrap(), b"Hello");
    }
}
