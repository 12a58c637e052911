//! Session implementations shipped with the crate.
//!
//! Live hypervisor drivers are external; the only backend provided here is a
//! raw image, which lets every layer above be exercised without a guest.

pub mod raw_image;

pub use raw_image::RawImageSession;
