//! Error types for driver sessions and memory streams.

use std::io;
use std::io::SeekFrom;
use thiserror::Error;
use vmiurl::DriverType;

/// Errors raised by a driver session or while opening one.
#[derive(Error, Debug)]
pub enum DriverError {
    /// An address is not backed by readable physical memory.
    #[error("Invalid address {address:#x} in session '{session}': {message}")]
    InvalidAddress {
        session: String,
        address: u64,
        message: String,
    },

    /// Auto-detection found no driver that could open the target.
    #[error("No suitable driver available")]
    NoDriverAvailable,

    /// The requested driver has no registered factory.
    #[error("Driver {0} is not registered")]
    DriverNotRegistered(DriverType),

    /// The connector name does not match any registered connector.
    #[error("Unknown connector {name:?}. Valid connectors: {}", .valid.join(", "))]
    UnknownConnector { name: String, valid: Vec<String> },

    /// The configuration lacks a parameter the driver needs.
    #[error("Missing driver parameter: {0}")]
    MissingParameter(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Opaque failure reported by an external driver.
    #[error("{0}")]
    Other(String),
}

impl DriverError {
    /// Create an InvalidAddress error.
    pub fn invalid_address(session: impl Into<String>, address: u64, msg: impl Into<String>) -> Self {
        DriverError::InvalidAddress {
            session: session.into(),
            address,
            message: msg.into(),
        }
    }

    /// Create an opaque driver error.
    pub fn other(msg: impl Into<String>) -> Self {
        DriverError::Other(msg.into())
    }
}

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors raised by memory streams.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),

    /// Read-to-end was requested; callers must pass an explicit length.
    #[error("Reading to the end of physical memory is not supported")]
    UnsupportedReadMode,

    #[error("Seek {position:?} is outside of [0, {max_addr:#x}]")]
    OutOfRangeSeek { position: SeekFrom, max_addr: u64 },
}

/// Result type for stream operations.
pub type StreamResult<T> = Result<T, StreamError>;

impl From<StreamError> for io::Error {
    fn from(err: StreamError) -> Self {
        match err {
            StreamError::Driver(DriverError::Io(e)) => e,
            StreamError::Driver(e) => io::Error::other(e),
            StreamError::UnsupportedReadMode => {
                io::Error::new(io::ErrorKind::Unsupported, StreamError::UnsupportedReadMode)
            }
            e @ StreamError::OutOfRangeSeek { .. } => io::Error::new(io::ErrorKind::InvalidInput, e),
        }
    }
}
