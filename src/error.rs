use crate::codec::{DecodeError, EncodeError};
use std::sync::Arc;

/// Represents errors that can occur in the external-memory engine
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(std::io::Error),

    /// I/O failure reported by a disk driver, with the failed byte range
    Disk {
        /// Index of the disk the request was submitted to
        disk: usize,

        /// Byte offset of the failed request
        offset: u64,

        /// Length of the failed request
        len: usize,

        /// Underlying driver error
        source: Arc<std::io::Error>,
    },

    /// A read returned fewer bytes than requested
    ///
    /// Only legal for the final block of an input file; everywhere else it
    /// indicates a truncated backing store.
    ShortRead {
        /// Index of the disk the request was submitted to
        disk: usize,

        /// Byte offset of the read
        offset: u64,

        /// Requested byte count
        wanted: usize,

        /// Received byte count
        got: usize,
    },

    /// Block allocation exhausted all configured disks
    OutOfSpace,

    /// Configuration could not be parsed or validated
    BadConfig(String),

    /// Record encoding failed
    Encode(EncodeError),

    /// Record decoding failed
    Decode(DecodeError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ExtMemError: {self:?}")
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<EncodeError> for Error {
    fn from(value: EncodeError) -> Self {
        Self::Encode(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Self::BadConfig(value.to_string())
    }
}

/// Crate-wide result
pub type Result<T> = std::result::Result<T, Error>;
