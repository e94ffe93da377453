//! Seglog - segmented, append-only commit log
//!
//! Records are opaque byte payloads. Each append is assigned the next
//! monotonically increasing offset; reads fetch a record by offset. Data is
//! split into segments (one store file plus one memory-mapped index file)
//! that roll over once either file reaches its configured limit.
//!
//! # Quick Start
//!
//! ```no_run
//! use seglog::{Log, LogConfig, Record};
//!
//! # fn main() -> seglog::Result<()> {
//! let log = Log::open("/var/lib/seglog", LogConfig::default())?;
//!
//! let offset = log.append(Record::new("hello world"))?;
//! let record = log.read(offset)?;
//! assert_eq!(record.value, b"hello world");
//!
//! log.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - `seglog-core`: records, errors, configuration, the [`CommitLog`] trait
//! - `seglog-storage`: store, index, segment and log implementations
//!
//! Network-facing layers should depend on [`CommitLog`] only.

pub use seglog_core::{
    CommitLog, Error, LogConfig, Record, Result, SecurityConfig, SegmentConfig,
    DEFAULT_SEGMENT_BYTES, INDEX_ENTRY_WIDTH,
};
pub use seglog_storage::{Log, LogReader, SegmentReport};
