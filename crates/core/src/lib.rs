//! Core types and traits for seglog
//!
//! This crate defines the foundational types shared by every layer:
//! - Record: opaque payload plus the offset the log assigned it
//! - Error: error type hierarchy (out of range, capacity, I/O, data)
//! - Config: segment limits, initial offset and security paths
//! - CommitLog: the append/read capability the network layer depends on

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod record;
pub mod traits;

pub use config::{
    LogConfig, SecurityConfig, SegmentConfig, DEFAULT_SEGMENT_BYTES, INDEX_ENTRY_WIDTH,
};
pub use error::{Error, Result};
pub use record::Record;
pub use traits::CommitLog;
