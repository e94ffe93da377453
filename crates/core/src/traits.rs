//! Capability trait consumed by the network layer
//!
//! The produce/consume service only ever appends a record or reads one
//! back by offset. It depends on this trait and never on segments,
//! stores or indexes, which keeps the storage engine swappable.

use crate::error::Result;
use crate::record::Record;

/// Append/read access to a commit log.
///
/// Thread safety: all methods must be safe to call concurrently from
/// multiple threads (requires Send + Sync).
pub trait CommitLog: Send + Sync {
    /// Append a record and return the offset assigned to it.
    ///
    /// Any offset already set on `record` is overwritten.
    ///
    /// # Errors
    ///
    /// Returns an error on any I/O or serialization failure.
    fn append(&self, record: Record) -> Result<u64>;

    /// Read the record stored at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OffsetOutOfRange`](crate::Error::OffsetOutOfRange)
    /// when no segment covers `offset`, and an I/O or data error otherwise.
    fn read(&self, offset: u64) -> Result<Record>;
}
