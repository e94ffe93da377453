//! Memory-mapped offset index
//!
//! Maps a record's offset relative to its segment base to the byte position
//! of its frame in the paired store. Entries are fixed width:
//!
//! ```text
//! ┌───────────────────────────────┬────────────────────────────┐
//! │ Relative offset (4 bytes, BE) │ Store position (8 bytes, BE)│
//! └───────────────────────────────┴────────────────────────────┘
//! ```
//!
//! While open, the file is padded to its full capacity and mapped; the
//! logical size (bytes actually written) is tracked separately. Closing
//! syncs the mapping, unmaps it, truncates the file back to the logical
//! size and fsyncs, so a reopen derives the entry count from the file
//! length. Skipping the truncation would make every reopen treat the
//! padding as entries.

use byteorder::{BigEndian, ByteOrder};
use memmap2::MmapMut;
use seglog_core::{Error, Result, INDEX_ENTRY_WIDTH};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Width of the relative offset field.
pub const OFF_WIDTH: u64 = 4;

/// Width of the position field.
pub const POS_WIDTH: u64 = 8;

/// Width of one entry.
pub const ENT_WIDTH: u64 = INDEX_ENTRY_WIDTH;

/// Fixed-capacity, memory-mapped index file.
pub struct Index {
    file: File,
    mmap: Option<MmapMut>,
    size: u64,
    capacity: u64,
    path: PathBuf,
}

impl Index {
    /// Open (or create) the index at `path` with room for `capacity` bytes.
    ///
    /// The logical size is the file length before padding. A file that was
    /// never truncated (the process died while it was open) still carries its
    /// padding; trailing zeroed slots past slot 0 are dropped.
    pub fn open(path: impl AsRef<Path>, capacity: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let file_len = file.metadata()?.len();
        if file_len > capacity {
            return Err(Error::Corruption(format!(
                "index {} holds {} bytes, more than its capacity {}",
                path.display(),
                file_len,
                capacity
            )));
        }

        let mut size = file_len - file_len % ENT_WIDTH;
        if size != file_len {
            warn!(
                path = %path.display(),
                file_len,
                size,
                "Dropping torn trailing index entry"
            );
        }

        file.set_len(capacity)?;
        // SAFETY: the file is owned by this index for the lifetime of the
        // mapping and is not resized until the mapping has been dropped.
        let mmap = unsafe { MmapMut::map_mut(&file)? };

        // Every entry past slot 0 has a non-zero position, so zeroed slots
        // there are padding from a mapping that was never truncated, whatever
        // capacity it was created with.
        let padded = size;
        while size > ENT_WIDTH && is_zeroed(&mmap, size - ENT_WIDTH) {
            size -= ENT_WIDTH;
        }
        if size != padded {
            warn!(
                path = %path.display(),
                entries = size / ENT_WIDTH,
                "Index was not closed cleanly, ignoring zeroed padding"
            );
        }

        debug!(path = %path.display(), size, capacity, "Opened index");

        Ok(Index {
            file,
            mmap: Some(mmap),
            size,
            capacity,
            path,
        })
    }

    /// Read the entry in `slot`.
    ///
    /// Returns the stored `(relative_offset, position)`. Fails with
    /// `EndOfData` if the index is empty or the slot is past the last entry.
    pub fn read(&self, slot: u32) -> Result<(u32, u64)> {
        if self.size == 0 {
            return Err(Error::EndOfData);
        }
        let start = slot as u64 * ENT_WIDTH;
        if start + ENT_WIDTH > self.size {
            return Err(Error::EndOfData);
        }

        let mmap = self.mapped()?;
        let start = start as usize;
        let offset = BigEndian::read_u32(&mmap[start..start + OFF_WIDTH as usize]);
        let position =
            BigEndian::read_u64(&mmap[start + OFF_WIDTH as usize..start + ENT_WIDTH as usize]);
        Ok((offset, position))
    }

    /// Read the most recently written entry.
    pub fn last(&self) -> Result<(u32, u64)> {
        if self.size == 0 {
            return Err(Error::EndOfData);
        }
        self.read((self.size / ENT_WIDTH - 1) as u32)
    }

    /// Append an entry at the current logical size.
    ///
    /// Fails with `IndexFull` if the entry does not fit; the mapping never
    /// grows.
    pub fn write(&mut self, offset: u32, position: u64) -> Result<()> {
        if !self.has_room() {
            return Err(Error::IndexFull {
                capacity: self.capacity,
            });
        }

        let start = self.size as usize;
        let mmap = self.mmap.as_mut().ok_or_else(closed_error)?;
        BigEndian::write_u32(&mut mmap[start..start + OFF_WIDTH as usize], offset);
        BigEndian::write_u64(
            &mut mmap[start + OFF_WIDTH as usize..start + ENT_WIDTH as usize],
            position,
        );

        self.size += ENT_WIDTH;
        Ok(())
    }

    /// Whether one more entry fits.
    pub fn has_room(&self) -> bool {
        self.size + ENT_WIDTH <= self.capacity
    }

    /// Number of entries.
    pub fn len(&self) -> u64 {
        self.size / ENT_WIDTH
    }

    /// Whether the index has no entries.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Logical size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Mapped capacity in bytes.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Forget every entry from `entries` on.
    pub(crate) fn truncate_entries(&mut self, entries: u64) {
        self.size = self.size.min(entries * ENT_WIDTH);
    }

    /// Sync, unmap, truncate to the logical size, fsync.
    ///
    /// Calling it again after success is a no-op.
    pub fn close(&mut self) -> Result<()> {
        let Some(mmap) = self.mmap.take() else {
            return Ok(());
        };
        mmap.flush()?;
        drop(mmap);

        self.file.set_len(self.size)?;
        self.file.sync_all()?;

        debug!(path = %self.path.display(), size = self.size, "Closed index");
        Ok(())
    }

    fn mapped(&self) -> Result<&MmapMut> {
        self.mmap.as_ref().ok_or_else(closed_error)
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        if self.mmap.is_some() {
            if let Err(e) = self.close() {
                warn!(path = %self.path.display(), error = %e, "Failed to close index on drop");
            }
        }
    }
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("capacity", &self.capacity)
            .field("open", &self.mmap.is_some())
            .finish()
    }
}

fn is_zeroed(mmap: &MmapMut, start: u64) -> bool {
    let start = start as usize;
    mmap[start..start + ENT_WIDTH as usize].iter().all(|b| *b == 0)
}

fn closed_error() -> Error {
    Error::Io(io::Error::new(io::ErrorKind::Other, "index is closed"))
}
