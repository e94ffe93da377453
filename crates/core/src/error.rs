//! Error types for the commit log
//!
//! Every layer of the engine (store, index, segment, log) reports failures
//! through this one enum. We use `thiserror` for automatic `Display` and
//! `Error` trait implementations.
//!
//! The variants fall into four groups:
//!
//! - **Out of range**: `OffsetOutOfRange`, `EndOfData`. Expected and
//!   recoverable; callers treat them as "not found".
//! - **Capacity exceeded**: `IndexFull`. The log checks for room and rolls
//!   to a new segment first, so callers of the log rarely see it.
//! - **I/O**: `Io`. Always propagated, never retried internally.
//! - **Data**: `Serialization`, `Corruption`, `InvalidConfig`.

use std::io;
use thiserror::Error;

/// Result type alias for commit log operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the commit log
#[derive(Debug, Error)]
pub enum Error {
    /// No segment covers the requested offset
    #[error("Offset out of range: {offset}")]
    OffsetOutOfRange {
        /// The offset that was requested
        offset: u64,
    },

    /// Read past the last index entry, or the index is empty
    #[error("End of data")]
    EndOfData,

    /// Writing one more entry would exceed the index capacity
    #[error("Index full: capacity {capacity} bytes")]
    IndexFull {
        /// Mapped capacity of the index in bytes
        capacity: u64,
    },

    /// I/O error (open, stat, truncate, map, flush, close)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Record encoding or decoding failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// On-disk data is malformed
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// Configuration rejected by validation
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Check whether this error means "nothing stored at that offset".
    ///
    /// True for both `OffsetOutOfRange` and `EndOfData`.
    pub fn is_out_of_range(&self) -> bool {
        matches!(self, Error::OffsetOutOfRange { .. } | Error::EndOfData)
    }

    /// Check whether this error signals a full segment index.
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, Error::IndexFull { .. })
    }
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(e: rmp_serde::encode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(e: rmp_serde::decode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
