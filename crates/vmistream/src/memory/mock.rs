//! Mock driver session for tests.

use crate::memory::error::{DriverError, DriverResult};
use crate::memory::stream::PAGE_SIZE;
use crate::memory::traits::DriverSession;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use vmiurl::DriverType;

/// An in-memory guest with configurable holes.
///
/// Byte `i` of the guest holds `(i % 255) + 1`, so zero-filled output is
/// always distinguishable from real content.
pub struct MockSession {
    pub name: String,
    pub driver_type: DriverType,
    pub max_addr: u64,
    /// Page numbers (`paddr / 4096`) whose reads fail.
    pub bad_pages: HashSet<u64>,
    /// Reads are truncated at this address (exclusive).
    pub mapped_end: u64,
    pub fail_pause: bool,
    pub fail_resume: bool,
    pub reads: AtomicUsize,
    pub pauses: AtomicUsize,
    pub resumes: AtomicUsize,
}

impl MockSession {
    pub fn new(max_addr: u64) -> Self {
        MockSession {
            name: "mock".to_string(),
            driver_type: DriverType::KVM,
            max_addr,
            bad_pages: HashSet::new(),
            mapped_end: max_addr + 1,
            fail_pause: false,
            fail_resume: false,
            reads: AtomicUsize::new(0),
            pauses: AtomicUsize::new(0),
            resumes: AtomicUsize::new(0),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_bad_page(mut self, page: u64) -> Self {
        self.bad_pages.insert(page);
        self
    }

    pub fn with_mapped_end(mut self, end: u64) -> Self {
        self.mapped_end = end;
        self
    }

    /// Expected content of the guest at `addr`.
    pub fn byte_at(addr: u64) -> u8 {
        ((addr % 255) + 1) as u8
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn pause_count(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }

    pub fn resume_count(&self) -> usize {
        self.resumes.load(Ordering::SeqCst)
    }
}

impl DriverSession for MockSession {
    fn driver_type(&self) -> DriverType {
        self.driver_type
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn max_physical_address(&self) -> DriverResult<u64> {
        Ok(self.max_addr)
    }

    fn read_physical(&self, paddr: u64, length: usize) -> DriverResult<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        if paddr >= self.mapped_end {
            return Err(DriverError::invalid_address(&self.name, paddr, "unmapped"));
        }
        let end = paddr.saturating_add(length as u64).min(self.mapped_end);
        if length > 0 {
            let first = paddr / PAGE_SIZE as u64;
            let last = (end - 1) / PAGE_SIZE as u64;
            if let Some(bad) = (first..=last).find(|p| self.bad_pages.contains(p)) {
                return Err(DriverError::invalid_address(
                    &self.name,
                    bad * PAGE_SIZE as u64,
                    "page not present",
                ));
            }
        }
        Ok((paddr..end).map(Self::byte_at).collect())
    }

    fn pause(&self) -> DriverResult<()> {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        if self.fail_pause {
            return Err(DriverError::other("pause failed"));
        }
        Ok(())
    }

    fn resume(&self) -> DriverResult<()> {
        self.resumes.fetch_add(1, Ordering::SeqCst);
        if self.fail_resume {
            return Err(DriverError::other("resume failed"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_read_content() {
        let mock = MockSession::new(0xffff);
        let data = mock.read_physical(0x10, 4).unwrap();
        assert_eq!(
            data,
            vec![
                MockSession::byte_at(0x10),
                MockSession::byte_at(0x11),
                MockSession::byte_at(0x12),
                MockSession::byte_at(0x13),
            ]
        );
        assert_eq!(mock.read_count(), 1);
    }

    #[test]
    fn test_mock_short_read() {
        let mock = MockSession::new(0xffff).with_mapped_end(0x1002);
        assert_eq!(mock.read_physical(0x1000, 16).unwrap().len(), 2);
        assert!(mock.read_physical(0x1002, 16).is_err());
    }

    #[test]
    fn test_mock_bad_page() {
        let mock = MockSession::new(0xffff).with_bad_page(1);
        assert!(mock.read_physical(0x0ff0, 0x20).is_err());
        assert!(mock.read_physical(0x0000, 0x1000).is_ok());
        assert!(mock.read_physical(0x2000, 0x1000).is_ok());
    }
}
