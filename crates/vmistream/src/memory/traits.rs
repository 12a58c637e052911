//! The driver session boundary.
//!
//! A [`DriverSession`] is an open introspection handle on one virtual
//! machine, provided by a hypervisor driver. Streams and caches only ever talk
//! to a session through this trait.

use crate::memory::error::DriverResult;
use vmiurl::DriverType;

/// An open hypervisor-backed introspection session.
pub trait DriverSession: Send + Sync {
    /// The backend that opened this session.
    fn driver_type(&self) -> DriverType;

    /// Human-readable name, used in logs and error messages.
    fn name(&self) -> &str;

    /// Highest valid guest-physical address.
    fn max_physical_address(&self) -> DriverResult<u64>;

    /// Read up to `length` bytes of guest-physical memory at `paddr`.
    ///
    /// May return fewer bytes than requested when the range is only partly
    /// mapped. Unmapped or inaccessible ranges fail with
    /// [`DriverError::InvalidAddress`](crate::memory::error::DriverError::InvalidAddress).
    fn read_physical(&self, paddr: u64, length: usize) -> DriverResult<Vec<u8>>;

    /// Read into `buf`, returning the number of bytes written.
    ///
    /// Bytes past the returned count are left untouched.
    fn read_physical_into(&self, paddr: u64, buf: &mut [u8]) -> DriverResult<usize> {
        let data = self.read_physical(paddr, buf.len())?;
        let n = data.len().min(buf.len());
        buf[..n].copy_from_slice(&data[..n]);
        Ok(n)
    }

    /// Pause every VCPU of the guest.
    fn pause(&self) -> DriverResult<()>;

    /// Resume the guest.
    fn resume(&self) -> DriverResult<()>;
}
