//! Hypervisor drivers.
//!
//! A [`DriverRegistry`] maps each [`DriverType`](vmiurl::DriverType) to the
//! [`DriverFactory`] that opens sessions for it. Live KVM, Xen and VirtualBox
//! drivers are provided by the embedding application; this crate ships the
//! connector driver and its raw image connector.

pub mod connector;
pub mod registry;

pub use connector::{ConnectorDriver, ConnectorOpener, RAW_CONNECTOR};
pub use registry::{DriverFactory, DriverRegistry};
