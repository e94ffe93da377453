//! Sequential raw reader over a whole log
//!
//! Yields the store files' bytes back to back, in base-offset order, exactly
//! as they sit on disk (length-prefixed frames). Used to stream a snapshot of
//! the log to another process.

use crate::segment::Segment;
use parking_lot::RwLockReadGuard;
use std::io::{self, Read};

/// `io::Read` over every store of a log.
///
/// Holds the segment list read lock while alive: appends to the active
/// segment still proceed, but rotation, truncation and reset wait until the
/// reader is dropped.
pub struct LogReader<'a> {
    segments: RwLockReadGuard<'a, Vec<Segment>>,
    current: usize,
    position: u64,
}

impl<'a> LogReader<'a> {
    pub(crate) fn new(segments: RwLockReadGuard<'a, Vec<Segment>>) -> Self {
        LogReader {
            segments,
            current: 0,
            position: 0,
        }
    }
}

impl Read for LogReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while let Some(segment) = self.segments.get(self.current) {
            let n = segment.store().read_at(buf, self.position)?;
            if n > 0 {
                self.position += n as u64;
                return Ok(n);
            }
            self.current += 1;
            self.position = 0;
        }
        Ok(0)
    }
}

impl std::fmt::Debug for LogReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogReader")
            .field("segment", &self.current)
            .field("position", &self.position)
            .finish()
    }
}
