//! Append-only record store
//!
//! A store is one file holding a sequence of length-prefixed frames:
//!
//! ```text
//! ┌──────────────────────┬─────────────────────────┐
//! │ Length (8 bytes, BE) │ Payload (Length bytes)  │   frame 0
//! ├──────────────────────┼─────────────────────────┤
//! │ Length (8 bytes, BE) │ Payload (Length bytes)  │   frame 1
//! └──────────────────────┴─────────────────────────┘
//! ```
//!
//! Frames are self-delimiting, so the file can be rescanned without its
//! index. Writes go through a buffered writer; the logical size tracks the
//! write cursor, including bytes not yet flushed. Every operation takes the
//! same mutex: `append` must hold it across header and payload so the
//! returned position is exactly where the frame landed, and reads flush
//! first so that read-after-write is always visible.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::Mutex;
use seglog_core::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Width of the length prefix in front of every frame.
pub const LEN_WIDTH: u64 = 8;

/// Location of one frame inside a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Byte position of the length prefix
    pub position: u64,
    /// Payload length, excluding the prefix
    pub len: u64,
}

impl Frame {
    /// Position just past the end of this frame.
    pub fn end(&self) -> u64 {
        self.position + LEN_WIDTH + self.len
    }
}

/// Result of a full store rescan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreScan {
    /// Complete frames in file order
    pub frames: Vec<Frame>,
    /// Trailing bytes that do not form a complete frame
    pub torn_bytes: u64,
}

struct StoreInner {
    writer: BufWriter<File>,
    size: u64,
}

/// Append-only, length-prefixed record file.
pub struct Store {
    inner: Mutex<StoreInner>,
    path: PathBuf,
}

impl Store {
    /// Open (or create) the store at `path`.
    ///
    /// The logical size starts at the current file length.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(&path)?;
        let size = file.metadata()?.len();

        debug!(path = %path.display(), size, "Opened store");

        Ok(Store {
            inner: Mutex::new(StoreInner {
                writer: BufWriter::new(file),
                size,
            }),
            path,
        })
    }

    /// Append one frame holding `data`.
    ///
    /// Returns `(bytes_written, position)`, where `position` is the logical
    /// size before this append and `bytes_written` includes the prefix.
    pub fn append(&self, data: &[u8]) -> Result<(u64, u64)> {
        let mut inner = self.inner.lock();
        let position = inner.size;

        inner.writer.write_u64::<BigEndian>(data.len() as u64)?;
        inner.writer.write_all(data)?;

        let written = data.len() as u64 + LEN_WIDTH;
        inner.size += written;
        Ok((written, position))
    }

    /// Read the payload of the frame starting at `position`.
    pub fn read(&self, position: u64) -> Result<Vec<u8>> {
        let mut inner = self.inner.lock();
        inner.writer.flush()?;
        let size = inner.size;

        let payload_start = position
            .checked_add(LEN_WIDTH)
            .filter(|end| *end <= size)
            .ok_or_else(|| {
                Error::Corruption(format!(
                    "frame header at {} past end of store ({} bytes)",
                    position, size
                ))
            })?;

        let file = inner.writer.get_mut();
        file.seek(SeekFrom::Start(position))?;
        let len = file.read_u64::<BigEndian>()?;

        if payload_start.checked_add(len).map_or(true, |end| end > size) {
            return Err(Error::Corruption(format!(
                "frame at {} claims {} bytes, store has {}",
                position, len, size
            )));
        }

        let mut payload = vec![0u8; len as usize];
        file.read_exact(&mut payload)?;
        Ok(payload)
    }

    /// Raw positional read of up to `buf.len()` bytes at `offset`.
    ///
    /// Flushes pending writes first. Returns 0 at end of data.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        let mut inner = self.inner.lock();
        inner.writer.flush()?;

        if offset >= inner.size {
            return Ok(0);
        }
        let available = (inner.size - offset).min(buf.len() as u64) as usize;

        let file = inner.writer.get_mut();
        file.seek(SeekFrom::Start(offset))?;
        file.read(&mut buf[..available])
    }

    /// Walk every frame from the start of the file.
    ///
    /// Stops at the first frame whose header or payload runs past the end;
    /// the remainder is reported as `torn_bytes`.
    pub fn scan(&self) -> Result<StoreScan> {
        let mut inner = self.inner.lock();
        inner.writer.flush()?;
        let size = inner.size;

        let file = inner.writer.get_mut();
        let mut scan = StoreScan::default();
        let mut position = 0u64;

        while position < size {
            if size - position < LEN_WIDTH {
                scan.torn_bytes = size - position;
                break;
            }
            file.seek(SeekFrom::Start(position))?;
            let len = file.read_u64::<BigEndian>()?;
            let frame = Frame { position, len };
            match position.checked_add(LEN_WIDTH).and_then(|p| p.checked_add(len)) {
                Some(end) if end <= size => {
                    scan.frames.push(frame);
                    position = end;
                }
                _ => {
                    scan.torn_bytes = size - position;
                    break;
                }
            }
        }

        Ok(scan)
    }

    /// Logical size in bytes, including buffered writes.
    pub fn size(&self) -> u64 {
        self.inner.lock().size
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush buffered writes, fsync and release the file.
    pub fn close(self) -> Result<()> {
        let inner = self.inner.into_inner();
        let file = inner
            .writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))?;
        file.sync_all()?;
        debug!(path = %self.path.display(), size = inner.size, "Closed store");
        Ok(())
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("size", &self.size())
            .finish()
    }
}
