//! Segmented commit log
//!
//! The log owns an ordered list of segments in one directory. Appends go to
//! the last (active) segment; once it is maxed a new segment is created whose
//! base offset is the next offset. Reads locate the covering segment by
//! binary search over base offsets.
//!
//! # Locking
//!
//! - `append` takes an upgradable read guard, so it runs alongside readers
//!   and only excludes them while rolling to a new segment. It rolls before
//!   writing when the tail is already full, so a crash or failed roll never
//!   lets a segment grow past its limit by more than one record
//! - `read` takes a shared guard
//! - `truncate` and `reset` take the write guard only to edit the list;
//!   detached segments are closed and deleted after it is released
//!
//! # Recovery
//!
//! `open` lists the directory, collects the numeric stems of `.store` and
//! `.index` files, and opens one segment per base offset in ascending order.
//! Each segment recovers its own next offset from its index.

use crate::reader::LogReader;
use crate::segment::{Segment, SegmentReport, INDEX_EXT, STORE_EXT};
use parking_lot::{RwLock, RwLockUpgradableReadGuard, RwLockWriteGuard};
use seglog_core::{CommitLog, Error, LogConfig, Record, Result};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Segmented, append-only commit log.
pub struct Log {
    dir: PathBuf,
    config: LogConfig,
    segments: RwLock<Vec<Segment>>,
}

impl Log {
    /// Open (or create) the log stored in `dir`.
    ///
    /// Zero size limits are replaced with the defaults. Fails with
    /// `InvalidConfig` if the config does not validate.
    pub fn open(dir: impl AsRef<Path>, config: LogConfig) -> Result<Self> {
        config.validate()?;
        let mut config = config;
        config.segment = config.segment.normalized();

        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let segments = Self::load_segments(&dir, &config)?;
        info!(
            dir = %dir.display(),
            segments = segments.len(),
            "Opened log"
        );

        Ok(Log {
            dir,
            config,
            segments: RwLock::new(segments),
        })
    }

    fn load_segments(dir: &Path, config: &LogConfig) -> Result<Vec<Segment>> {
        let mut base_offsets = BTreeSet::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let ext = path.extension().and_then(|e| e.to_str());
            if ext != Some(STORE_EXT) && ext != Some(INDEX_EXT) {
                debug!(path = %path.display(), "Ignoring non-segment file");
                continue;
            }
            match path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            {
                Some(base) => {
                    base_offsets.insert(base);
                }
                None => warn!(path = %path.display(), "Skipping file with unparseable base offset"),
            }
        }

        let mut segments = Vec::with_capacity(base_offsets.len().max(1));
        for base in base_offsets {
            segments.push(Segment::open(dir, base, &config.segment)?);
        }
        if segments.is_empty() {
            segments.push(Segment::open(
                dir,
                config.segment.initial_offset,
                &config.segment,
            )?);
        }
        Ok(segments)
    }

    /// Append a record and return its offset.
    ///
    /// Rolls to a new segment first if the active one is maxed or its index
    /// has no room. A failed roll after a successful append is logged and
    /// retried on the next append; the record itself stays in the log.
    pub fn append(&self, mut record: Record) -> Result<u64> {
        let mut segments = self.segments.upgradable_read();
        if segments.last().map_or(true, |s| s.is_maxed() || !s.has_room()) {
            let mut writable = RwLockUpgradableReadGuard::upgrade(segments);
            self.roll(&mut writable)?;
            segments = RwLockWriteGuard::downgrade_to_upgradable(writable);
        }

        let active = segments.last().ok_or_else(no_segments)?;
        let offset = active.append(&mut record)?;

        if active.is_maxed() {
            let mut writable = RwLockUpgradableReadGuard::upgrade(segments);
            if let Err(e) = self.roll(&mut writable) {
                warn!(offset, error = %e, "Failed to roll after append");
            }
        }
        Ok(offset)
    }

    /// Push a new segment starting at the tail's next offset, or at the
    /// initial offset when the list is empty.
    fn roll(&self, segments: &mut Vec<Segment>) -> Result<()> {
        let base_offset = match segments.last() {
            Some(tail) => tail.next_offset(),
            None => {
                fs::create_dir_all(&self.dir)?;
                self.config.segment.initial_offset
            }
        };
        let segment = Segment::open(&self.dir, base_offset, &self.config.segment)?;
        segments.push(segment);
        info!(base_offset, segments = segments.len(), "Rolled to new segment");
        Ok(())
    }

    /// Read the record at `offset`.
    pub fn read(&self, offset: u64) -> Result<Record> {
        let segments = self.segments.read();
        let idx = segments.partition_point(|s| s.base_offset() <= offset);
        if idx == 0 {
            return Err(Error::OffsetOutOfRange { offset });
        }
        segments[idx - 1].read(offset)
    }

    /// Base offset of the oldest segment.
    pub fn lowest_offset(&self) -> u64 {
        self.segments
            .read()
            .first()
            .map_or(self.config.segment.initial_offset, Segment::base_offset)
    }

    /// Offset of the newest record.
    ///
    /// Saturates at 0 for an empty log starting at offset 0; use
    /// [`Log::is_empty`] to tell the two apart.
    pub fn highest_offset(&self) -> u64 {
        self.segments
            .read()
            .last()
            .map_or(0, |s| s.next_offset().saturating_sub(1))
    }

    /// Whether no segment holds a record.
    pub fn is_empty(&self) -> bool {
        self.segments.read().iter().all(Segment::is_empty)
    }

    /// Remove every segment whose offsets all lie below `lowest`.
    ///
    /// A segment is removed when its next offset is at most `lowest`. The
    /// active segment is never removed.
    pub fn truncate(&self, lowest: u64) -> Result<()> {
        let removed: Vec<Segment> = {
            let mut segments = self.segments.write();
            let candidates = segments.len().saturating_sub(1);
            let count = segments[..candidates]
                .iter()
                .take_while(|s| s.next_offset() <= lowest)
                .count();
            segments.drain(..count).collect()
        };

        if removed.is_empty() {
            return Ok(());
        }
        info!(lowest, segments = removed.len(), "Truncating log");

        let mut result = Ok(());
        for segment in removed {
            let base_offset = segment.base_offset();
            if let Err(e) = segment.remove() {
                warn!(base_offset, error = %e, "Failed to remove segment");
                result = result.and(Err(e));
            }
        }
        result
    }

    /// Sequential reader over the raw bytes of every store.
    pub fn reader(&self) -> LogReader<'_> {
        LogReader::new(self.segments.read())
    }

    /// Rescan every segment and report its consistency.
    pub fn verify(&self) -> Result<Vec<SegmentReport>> {
        self.segments.read().iter().map(Segment::verify).collect()
    }

    /// Close every segment and delete the directory, then start over with
    /// one empty segment at the configured initial offset.
    ///
    /// If the directory cannot be recreated the log is left without
    /// segments and the next append tries again.
    pub fn reset(&self) -> Result<()> {
        let mut segments = self.segments.write();
        let close_result = close_all(segments.drain(..));

        if let Err(e) = fs::remove_dir_all(&self.dir) {
            warn!(dir = %self.dir.display(), error = %e, "Failed to delete log directory");
            if let Err(e) = self.roll(&mut segments) {
                warn!(dir = %self.dir.display(), error = %e, "Failed to reinitialize log");
            }
            return Err(e.into());
        }
        self.roll(&mut segments)?;

        info!(dir = %self.dir.display(), "Reset log");
        close_result
    }

    /// Close every segment.
    pub fn close(self) -> Result<()> {
        let dir = self.dir;
        let result = close_all(self.segments.into_inner().into_iter());
        debug!(dir = %dir.display(), "Closed log");
        result
    }

    /// Close the log and delete its directory.
    pub fn remove(self) -> Result<()> {
        let dir = self.dir.clone();
        let close_result = self.close();
        fs::remove_dir_all(&dir)?;
        info!(dir = %dir.display(), "Removed log");
        close_result
    }

    /// Directory holding the segment files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Effective configuration, with zero limits normalized.
    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    /// Number of segments.
    pub fn segment_count(&self) -> usize {
        self.segments.read().len()
    }

    /// Base offsets of all segments, ascending.
    pub fn segment_base_offsets(&self) -> Vec<u64> {
        self.segments.read().iter().map(Segment::base_offset).collect()
    }
}

impl CommitLog for Log {
    fn append(&self, record: Record) -> Result<u64> {
        Log::append(self, record)
    }

    fn read(&self, offset: u64) -> Result<Record> {
        Log::read(self, offset)
    }
}

impl std::fmt::Debug for Log {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Log")
            .field("dir", &self.dir)
            .field("segments", &self.segment_count())
            .finish()
    }
}

fn close_all(segments: impl Iterator<Item = Segment>) -> Result<()> {
    let mut result = Ok(());
    for segment in segments {
        let base_offset = segment.base_offset();
        if let Err(e) = segment.close() {
            warn!(base_offset, error = %e, "Failed to close segment");
            result = result.and(Err(e));
        }
    }
    result
}

fn no_segments() -> Error {
    Error::Corruption("log has no segments".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config() -> LogConfig {
        LogConfig::new().with_max_store_bytes(32)
    }

    #[test]
    fn test_append_read() {
        let dir = TempDir::new().unwrap();
        let log = Log::open(dir.path(), config()).unwrap();

        let offset = log.append(Record::new("hello world")).unwrap();
        assert_eq!(offset, 0);

        let record = log.read(offset).unwrap();
        assert_eq!(record.value, b"hello world");
        assert_eq!(record.offset, 0);
    }

    #[test]
    fn test_out_of_range() {
        let dir = TempDir::new().unwrap();
        let log = Log::open(dir.path(), config()).unwrap();

        let err = log.read(1).unwrap_err();
        assert!(matches!(err, Error::OffsetOutOfRange { offset: 1 }));
        assert!(log.is_empty());
    }

    #[test]
    fn test_init_existing() {
        let dir = TempDir::new().unwrap();
        let log = Log::open(dir.path(), config()).unwrap();
        for _ in 0..3 {
            log.append(Record::new("hello world")).unwrap();
        }
        assert_eq!(log.lowest_offset(), 0);
        assert_eq!(log.highest_offset(), 2);
        log.close().unwrap();

        let log = Log::open(dir.path(), config()).unwrap();
        assert_eq!(log.lowest_offset(), 0);
        assert_eq!(log.highest_offset(), 2);
    }

    #[test]
    fn test_reader() {
        let dir = TempDir::new().unwrap();
        let log = Log::open(dir.path(), config()).unwrap();
        let record = Record::new("hello world");
        let offset = log.append(record.clone()).unwrap();

        let mut bytes = Vec::new();
        std::io::Read::read_to_end(&mut log.reader(), &mut bytes).unwrap();

        let len = u64::from_be_bytes(bytes[..8].try_into().unwrap()) as usize;
        let decoded = Record::decode(&bytes[8..8 + len]).unwrap();
        assert_eq!(decoded.value, record.value);
        assert_eq!(decoded.offset, offset);
    }

    #[test]
    fn test_truncate() {
        let dir = TempDir::new().unwrap();
        let log = Log::open(dir.path(), config()).unwrap();
        for _ in 0..3 {
            log.append(Record::new("hello world")).unwrap();
        }

        log.truncate(1).unwrap();
        let err = log.read(0).unwrap_err();
        assert!(err.is_out_of_range());
        assert_eq!(log.lowest_offset(), 1);
        assert_eq!(log.read(1).unwrap().offset, 1);
    }

    #[test]
    fn test_truncate_keeps_active_segment() {
        let dir = TempDir::new().unwrap();
        let log = Log::open(dir.path(), config()).unwrap();
        log.append(Record::new("hello world")).unwrap();
        assert_eq!(log.segment_count(), 2);

        log.truncate(u64::MAX).unwrap();
        assert_eq!(log.segment_count(), 1);
        // The active segment still accepts appends
        assert_eq!(log.append(Record::new("again")).unwrap(), log.highest_offset());
    }

    #[test]
    fn test_reset() {
        let dir = TempDir::new().unwrap();
        let log = Log::open(dir.path(), config().with_initial_offset(7)).unwrap();
        for _ in 0..3 {
            log.append(Record::new("hello world")).unwrap();
        }

        log.reset().unwrap();
        assert!(log.is_empty());
        assert_eq!(log.segment_count(), 1);
        assert_eq!(log.lowest_offset(), 7);
        assert!(log.read(7).unwrap_err().is_out_of_range());
        assert_eq!(log.append(Record::new("fresh")).unwrap(), 7);
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let dir = TempDir::new().unwrap();
        let err = Log::open(dir.path(), LogConfig::new().with_max_index_bytes(5)).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn test_zero_limits_use_defaults() {
        let dir = TempDir::new().unwrap();
        let log = Log::open(
            dir.path(),
            LogConfig::new().with_max_store_bytes(0).with_max_index_bytes(0),
        )
        .unwrap();
        assert_eq!(log.config().segment.max_store_bytes, 1024);
        assert_eq!(log.config().segment.max_index_bytes, 1024);
    }

    #[test]
    fn test_failed_roll_keeps_appended_record() {
        let dir = TempDir::new().unwrap();
        let log = Log::open(dir.path(), config()).unwrap();

        // A directory where the next store file would go makes the roll fail
        let blocker = dir.path().join("1.store");
        fs::create_dir(&blocker).unwrap();

        assert_eq!(log.append(Record::new("hello world")).unwrap(), 0);
        assert_eq!(log.segment_count(), 1);
        assert_eq!(log.read(0).unwrap().value, b"hello world");

        // The full tail is not written to again
        assert!(log.append(Record::new("again")).is_err());
        assert_eq!(log.highest_offset(), 0);
        assert_eq!(log.verify().unwrap()[0].store_frames, 1);

        fs::remove_dir(&blocker).unwrap();
        assert_eq!(log.append(Record::new("again")).unwrap(), 1);
        assert_eq!(log.segment_base_offsets(), vec![0, 1]);
        assert_eq!(log.verify().unwrap()[0].store_frames, 1);
    }

    #[test]
    fn test_failed_reset_recovers_on_append() {
        let root = TempDir::new().unwrap();
        let log_dir = root.path().join("log");
        let log = Log::open(&log_dir, config().with_initial_offset(7)).unwrap();
        log.append(Record::new("hello world")).unwrap();

        // Swap the directory for a file so it can be neither removed nor recreated
        fs::rename(&log_dir, root.path().join("moved")).unwrap();
        fs::write(&log_dir, b"in the way").unwrap();

        assert!(log.reset().is_err());
        assert!(log.read(7).unwrap_err().is_out_of_range());

        fs::remove_file(&log_dir).unwrap();
        assert_eq!(log.append(Record::new("after")).unwrap(), 7);
        assert_eq!(log.lowest_offset(), 7);
        assert_eq!(log.read(7).unwrap().value, b"after");
    }
}
