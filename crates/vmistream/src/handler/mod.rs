//! Adapters from `vmi://` URLs to padded memory streams.
//!
//! [`VmiHandler`] keeps the single-slot behaviour that URL-driven analysis
//! frameworks expect: whatever URL it is given, every stream binds to the
//! first session it opened. [`KeyedSessionCache`] keys sessions by their
//! resolved configuration instead.

pub mod keyed;
pub mod slot;

pub use keyed::{KeyedSessionCache, DEFAULT_CAPACITY};
pub use slot::VmiHandler;

use crate::memory::error::{DriverError, StreamError};
use thiserror::Error;
use vmiurl::ConfigError;

/// Errors raised while turning a URL into a stream.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Invalid vmi URL: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Stream(#[from] StreamError),
}

/// Result type for handler operations.
pub type HandlerResult<T> = Result<T, HandlerError>;
