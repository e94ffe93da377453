//! Storage layer for seglog
//!
//! This crate implements the on-disk commit log:
//! - Store: append-only file of length-prefixed record frames
//! - Index: fixed-capacity, memory-mapped offset → position table
//! - Segment: one store plus one index over a contiguous offset range
//! - Log: ordered segments with rotation, routing, truncation and recovery
//! - LogReader: raw sequential read of every store for snapshot transfer
//!
//! # On-disk layout
//!
//! ```text
//! <dir>/
//! ├── 0.store      frames for offsets 0..N
//! ├── 0.index      12-byte entries for offsets 0..N
//! ├── N.store
//! └── N.index
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod index;
pub mod log;
pub mod reader;
pub mod segment;
pub mod store;

pub use index::Index;
pub use log::Log;
pub use reader::LogReader;
pub use segment::{Segment, SegmentReport};
pub use store::{Frame, Store, StoreScan};
