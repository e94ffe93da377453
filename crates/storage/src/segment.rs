//! Segment: one store plus one index over a contiguous offset range
//!
//! A segment owns the files `{base_offset}.store` and `{base_offset}.index`.
//! Offsets `[base_offset, next_offset)` are readable; `next_offset` is
//! recovered from the last index entry on open.
//!
//! # Append ordering
//!
//! 1. Check index room (fail with `IndexFull`, nothing written)
//! 2. Encode the record with its assigned offset
//! 3. Append the frame to the store
//! 4. Write `(offset - base_offset, position)` to the index
//! 5. Advance `next_offset`
//!
//! The index write guard is held across steps 1-5, so concurrent appends on
//! one segment are serialized and readers never see an entry whose frame is
//! not yet in the store. A failure at step 4 leaves an unindexed frame at the
//! tail of the store; nothing repairs it, but it is reported on open and by
//! [`Segment::verify`].

use crate::index::Index;
use crate::store::{Store, LEN_WIDTH};
use parking_lot::RwLock;
use seglog_core::{Error, Record, Result, SegmentConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// File extension of a segment's record store.
pub const STORE_EXT: &str = "store";

/// File extension of a segment's offset index.
pub const INDEX_EXT: &str = "index";

/// Consistency report for one segment, produced by a full store rescan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentReport {
    /// Base offset of the segment
    pub base_offset: u64,
    /// Next offset the segment would assign
    pub next_offset: u64,
    /// Number of index entries
    pub indexed_records: u64,
    /// Number of complete frames in the store
    pub store_frames: u64,
    /// Complete frames after the last indexed frame
    pub unindexed_frames: u64,
    /// Index entries whose position is not the start of a frame
    pub misplaced_entries: u64,
    /// Trailing store bytes that do not form a complete frame
    pub torn_bytes: u64,
}

impl SegmentReport {
    /// True when every frame is indexed and every entry points at a frame.
    pub fn is_consistent(&self) -> bool {
        self.unindexed_frames == 0 && self.misplaced_entries == 0 && self.torn_bytes == 0
    }
}

/// A bounded, contiguous-offset-range unit of the log.
pub struct Segment {
    base_offset: u64,
    next_offset: AtomicU64,
    store: Store,
    index: RwLock<Index>,
    config: SegmentConfig,
}

impl Segment {
    /// Open (or create) the segment starting at `base_offset` inside `dir`.
    pub fn open(dir: impl AsRef<Path>, base_offset: u64, config: &SegmentConfig) -> Result<Self> {
        let dir = dir.as_ref();
        let store = Store::open(segment_path(dir, base_offset, STORE_EXT))?;
        let mut index = Index::open(
            segment_path(dir, base_offset, INDEX_EXT),
            config.max_index_bytes,
        )?;

        // Entries without any store bytes can only be leftover padding
        if store.size() == 0 && !index.is_empty() {
            warn!(
                base_offset,
                entries = index.len(),
                "Discarding index entries of an empty store"
            );
            index.truncate_entries(0);
        }

        let next_offset = match index.last() {
            Ok((relative, _)) => base_offset + relative as u64 + 1,
            Err(Error::EndOfData) => base_offset,
            Err(e) => return Err(e),
        };

        let segment = Segment {
            base_offset,
            next_offset: AtomicU64::new(next_offset),
            store,
            index: RwLock::new(index),
            config: config.clone(),
        };

        let unindexed = segment.unindexed_bytes()?;
        if unindexed > 0 {
            warn!(
                base_offset,
                unindexed_bytes = unindexed,
                "Store has bytes past the last indexed record"
            );
        }

        debug!(base_offset, next_offset, "Opened segment");
        Ok(segment)
    }

    /// Append a record, assigning it the next offset.
    ///
    /// `record.offset` is overwritten with the assigned offset, which is
    /// also returned.
    pub fn append(&self, record: &mut Record) -> Result<u64> {
        let mut index = self.index.write();
        if !index.has_room() {
            return Err(Error::IndexFull {
                capacity: index.capacity(),
            });
        }

        let offset = self.next_offset.load(Ordering::Acquire);
        let relative = u32::try_from(offset - self.base_offset).map_err(|_| Error::IndexFull {
            capacity: index.capacity(),
        })?;

        record.offset = offset;
        let bytes = record.encode()?;
        let (_, position) = self.store.append(&bytes)?;
        index.write(relative, position)?;

        self.next_offset.store(offset + 1, Ordering::Release);
        Ok(offset)
    }

    /// Read the record stored at `offset`.
    pub fn read(&self, offset: u64) -> Result<Record> {
        if offset < self.base_offset || offset >= self.next_offset() {
            return Err(Error::OffsetOutOfRange { offset });
        }
        let slot = u32::try_from(offset - self.base_offset)
            .map_err(|_| Error::OffsetOutOfRange { offset })?;

        let (_, position) = self.index.read().read(slot).map_err(|e| match e {
            Error::EndOfData => Error::OffsetOutOfRange { offset },
            other => other,
        })?;

        let bytes = self.store.read(position)?;
        Record::decode(&bytes)
    }

    /// Whether either file has reached its configured limit.
    ///
    /// Checked after an append, so a store may exceed its limit by one frame.
    pub fn is_maxed(&self) -> bool {
        self.store.size() >= self.config.max_store_bytes
            || self.index.read().size() >= self.config.max_index_bytes
    }

    /// Whether the index can take one more entry.
    pub fn has_room(&self) -> bool {
        self.index.read().has_room()
    }

    /// First offset of this segment.
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Offset the next append will receive.
    pub fn next_offset(&self) -> u64 {
        self.next_offset.load(Ordering::Acquire)
    }

    /// Number of records.
    pub fn len(&self) -> u64 {
        self.next_offset() - self.base_offset
    }

    /// Whether the segment holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Path of the store file.
    pub fn store_path(&self) -> &Path {
        self.store.path()
    }

    /// Path of the index file.
    pub fn index_path(&self) -> PathBuf {
        self.index.read().path().to_path_buf()
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    /// Store bytes after the end of the last indexed frame.
    pub fn unindexed_bytes(&self) -> Result<u64> {
        let indexed_end = match self.index.read().last() {
            Ok((_, position)) => {
                let mut header = [0u8; LEN_WIDTH as usize];
                let n = self.store.read_at(&mut header, position)?;
                if n < header.len() {
                    return Err(Error::Corruption(format!(
                        "index entry of segment {} points past the store end",
                        self.base_offset
                    )));
                }
                position + LEN_WIDTH + u64::from_be_bytes(header)
            }
            Err(Error::EndOfData) => 0,
            Err(e) => return Err(e),
        };
        Ok(self.store.size().saturating_sub(indexed_end))
    }

    /// Rescan the store and compare it against the index.
    pub fn verify(&self) -> Result<SegmentReport> {
        let index = self.index.read();
        let scan = self.store.scan()?;
        let positions: Vec<u64> = scan.frames.iter().map(|f| f.position).collect();

        let mut report = SegmentReport {
            base_offset: self.base_offset,
            next_offset: self.next_offset(),
            indexed_records: index.len(),
            store_frames: positions.len() as u64,
            torn_bytes: scan.torn_bytes,
            ..SegmentReport::default()
        };

        let mut last_indexed = None;
        for slot in 0..index.len() {
            let (_, position) = index.read(slot as u32)?;
            match positions.binary_search(&position) {
                Ok(i) => last_indexed = Some(i),
                Err(_) => report.misplaced_entries += 1,
            }
        }

        let first_unindexed = last_indexed.map_or(0, |i| i + 1);
        report.unindexed_frames = positions.len().saturating_sub(first_unindexed) as u64;
        Ok(report)
    }

    /// Close the index, then the store.
    ///
    /// Both are attempted; the first failure is returned.
    pub fn close(self) -> Result<()> {
        let Segment {
            base_offset,
            store,
            index,
            ..
        } = self;

        let mut index = index.into_inner();
        let index_result = index.close();
        drop(index);
        let store_result = store.close();

        debug!(base_offset, "Closed segment");
        index_result.and(store_result)
    }

    /// Close the segment and delete both files.
    pub fn remove(self) -> Result<()> {
        let base_offset = self.base_offset;
        let store_path = self.store_path().to_path_buf();
        let index_path = self.index_path();

        let close_result = self.close();
        fs::remove_file(&index_path)?;
        fs::remove_file(&store_path)?;

        info!(base_offset, "Removed segment");
        close_result
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("base_offset", &self.base_offset)
            .field("next_offset", &self.next_offset())
            .field("store", &self.store)
            .finish()
    }
}

/// Path of one segment file: `{dir}/{base_offset}.{ext}`.
pub fn segment_path(dir: &Path, base_offset: u64, ext: &str) -> PathBuf {
    dir.join(format!("{}.{}", base_offset, ext))
}
