//! Physical memory access: driver sessions and the streams built on them.

pub mod error;
pub mod layers;
pub mod padded;
pub mod pause;
pub mod stream;
pub mod traits;

#[cfg(test)]
pub(crate) mod mock;
