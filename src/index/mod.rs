//! Memory-mapped offset index.
//!
//! The index maps a record's **relative offset** (its absolute offset minus
//! the segment's base offset) to the **position** of its entry in the store.
//! Entries are fixed-width, so entry `n` always lives at byte
//! `n * ENTRY_WIDTH` and a lookup is a single slice of the mapping.
//!
//! # On-disk layout
//!
//! ```text
//! [REL_OFFSET_BE u32][POSITION_BE u64]
//! [REL_OFFSET_BE u32][POSITION_BE u64]
//! ...
//! ```
//!
//! # Lifecycle
//!
//! A live mapping cannot change length, so the index works in two phases:
//!
//! 1. **Open**: the logical size is taken from the current file length, then
//!    the file is grown to `max_index_bytes` and mapped read/write, shared.
//! 2. **Close**: the mapping is flushed and unmapped, the file synced and
//!    truncated back down to the logical size.
//!
//! Reads are bounded by the logical size, never by the mapped capacity.
//!
//! # Limitation
//!
//! The logical end of the index is only known because a clean close shrinks
//! the file. If the process dies while the index is open, the file stays at
//! its pre-grown capacity and the next open treats the zero-filled tail as
//! entries. No integrity scan is performed; [`Index::health`] reports such
//! files as [`IndexHealth::AtCapacity`] so the owner can decide what to do.
//!
//! # Concurrency model
//!
//! The index holds no lock. [`Index::write`] takes `&mut self`, so the owning
//! segment (and whatever shares it) serializes writers through the borrow
//! checker; [`Index::read`] takes `&self`.

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::{
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
};

use crate::SegmentConfig;
use crate::encoding::{self, EncodingError};
use memmap2::MmapMut;
use thiserror::Error;
use tracing::{debug, error, trace, warn};

// ------------------------------------------------------------------------------------------------
// Constants
// ------------------------------------------------------------------------------------------------

/// Width of the relative offset field of an entry.
pub const OFF_WIDTH: u64 = encoding::U32_WIDTH as u64;

/// Width of the store position field of an entry.
pub const POS_WIDTH: u64 = encoding::U64_WIDTH as u64;

/// Width of one index entry.
pub const ENTRY_WIDTH: u64 = OFF_WIDTH + POS_WIDTH;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Underlying I/O error (open, grow, map, flush, sync, truncate).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Entry field could not be encoded or decoded.
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// The requested entry has not been written.
    #[error("End of data")]
    EndOfData,

    /// No room for another entry; the segment must be rolled.
    #[error("Index full (capacity {capacity} bytes)")]
    Full {
        /// Mapped capacity in bytes.
        capacity: u64,
    },

    /// Existing file is larger than the configured maximum.
    #[error("Index file is {len} bytes, larger than max_index_bytes {max}")]
    Oversized {
        /// Length of the file found on disk.
        len: u64,
        /// Configured `max_index_bytes`.
        max: u64,
    },

    /// The index has already been unmapped.
    #[error("Index is closed")]
    Closed,
}

// ------------------------------------------------------------------------------------------------
// Lookup / Health
// ------------------------------------------------------------------------------------------------

/// Which entry [`Index::read`] should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// The entry for this relative offset.
    Relative(u32),

    /// The most recently written entry.
    Last,
}

/// Classification of the index file length found at open time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexHealth {
    /// Empty, or a whole number of entries below capacity: a clean close.
    Clean,

    /// Exactly `max_index_bytes` long. Either a full index that was closed
    /// cleanly or an index left pre-grown by a crash; the two cannot be told
    /// apart without scanning.
    AtCapacity,

    /// Not a whole number of entries. The partial tail is ignored.
    Degraded,
}

// ------------------------------------------------------------------------------------------------
// Index
// ------------------------------------------------------------------------------------------------

/// Fixed-width, memory-mapped offset → position index.
///
/// See the [module-level documentation](self) for the mapping lifecycle.
pub struct Index {
    /// Path to the index file on disk.
    path: PathBuf,

    /// Backing file, kept open to sync and truncate on close.
    file: File,

    /// Mapping over the pre-grown file; `None` once closed.
    mmap: Option<MmapMut>,

    /// Logical size in bytes: the end of the last written entry.
    size: u64,

    /// What the file length looked like when the index was opened.
    health: IndexHealth,
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("capacity", &self.capacity())
            .field("health", &self.health)
            .finish()
    }
}

impl Index {
    /// Open or create the index file at `path` and map it.
    ///
    /// The logical size is the current file length (rounded down to a whole
    /// entry); the file is then grown to `config.max_index_bytes` before it
    /// is mapped.
    ///
    /// # Errors
    ///
    /// - [`IndexError::Oversized`] if the file is longer than
    ///   `max_index_bytes`; growing the limit is fine, shrinking it below
    ///   existing data is not.
    /// - [`IndexError::Io`] if the file cannot be opened, grown or mapped.
    pub fn open<P: AsRef<Path>>(path: P, config: &SegmentConfig) -> Result<Self, IndexError> {
        let path = path.as_ref();
        let max = config.max_index_bytes;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;

        let len = file.metadata()?.len();
        if len > max {
            return Err(IndexError::Oversized { len, max });
        }

        let size = len - len % ENTRY_WIDTH;
        let health = if size != len {
            warn!(
                path = %path.display(),
                len,
                "index length is not a whole number of entries; ignoring partial tail"
            );
            IndexHealth::Degraded
        } else if len == max {
            debug!(path = %path.display(), len, "index found at full capacity");
            IndexHealth::AtCapacity
        } else {
            IndexHealth::Clean
        };

        // SAFETY: the file is owned by this index for the mapping's lifetime,
        // never shrunk while mapped, and every access is bounds-checked.
        let mmap = grow_and_map(&file, len, max, |f| unsafe { MmapMut::map_mut(f) })?;

        debug!(path = %path.display(), size, capacity = max, "index mapped");

        Ok(Self {
            path: path.to_path_buf(),
            file,
            mmap: Some(mmap),
            size,
            health,
        })
    }

    /// Returns `(relative_offset, position)` of the requested entry.
    ///
    /// # Errors
    ///
    /// [`IndexError::EndOfData`] if the index is empty or the entry lies
    /// beyond the logical size.
    pub fn read(&self, lookup: Lookup) -> Result<(u32, u64), IndexError> {
        let mmap = self.mmap.as_ref().ok_or(IndexError::Closed)?;

        if self.size == 0 {
            return Err(IndexError::EndOfData);
        }

        let entry = match lookup {
            Lookup::Relative(n) => u64::from(n),
            Lookup::Last => self.size / ENTRY_WIDTH - 1,
        };

        let start = entry * ENTRY_WIDTH;
        if self.size < start + ENTRY_WIDTH {
            return Err(IndexError::EndOfData);
        }

        let start = start as usize;
        let slot = &mmap[start..start + ENTRY_WIDTH as usize];
        let offset = encoding::get_u32(&slot[..OFF_WIDTH as usize])?;
        let position = encoding::get_u64(&slot[OFF_WIDTH as usize..])?;

        Ok((offset, position))
    }

    /// Appends the entry `(relative_offset, position)`.
    ///
    /// # Errors
    ///
    /// [`IndexError::Full`] if the mapping has no room for one more entry.
    /// This is the normal signal that the segment is full, not corruption.
    pub fn write(&mut self, offset: u32, position: u64) -> Result<(), IndexError> {
        let mmap = self.mmap.as_mut().ok_or(IndexError::Closed)?;

        let capacity = mmap.len() as u64;
        if capacity < self.size + ENTRY_WIDTH {
            return Err(IndexError::Full { capacity });
        }

        let start = self.size as usize;
        let slot = &mut mmap[start..start + ENTRY_WIDTH as usize];
        encoding::put_u32(&mut slot[..OFF_WIDTH as usize], offset)?;
        encoding::put_u64(&mut slot[OFF_WIDTH as usize..], position)?;

        self.size += ENTRY_WIDTH;

        trace!(offset, position, size = self.size, "wrote index entry");
        Ok(())
    }

    /// Logical size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Mapped capacity in bytes (0 once closed).
    pub fn capacity(&self) -> u64 {
        self.mmap.as_ref().map_or(0, |m| m.len() as u64)
    }

    /// Number of entries written.
    pub fn len(&self) -> u64 {
        self.size / ENTRY_WIDTH
    }

    /// Returns `true` if no entry has been written.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Returns `true` if the next [`Index::write`] would fail with
    /// [`IndexError::Full`].
    pub fn is_full(&self) -> bool {
        self.capacity() < self.size + ENTRY_WIDTH
    }

    /// Classification of the file length found at open time.
    pub fn health(&self) -> IndexHealth {
        self.health
    }

    /// Get the path of the underlying index file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes the mapping, syncs the file, shrinks it to the logical size
    /// and closes it.
    ///
    /// The first failing step aborts the remaining ones and is returned.
    pub fn close(mut self) -> Result<(), IndexError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), IndexError> {
        let Some(mmap) = self.mmap.take() else {
            return Ok(());
        };

        mmap.flush()?;
        drop(mmap);

        self.file.sync_all()?;
        // Undo the pre-grow so the next open sees the logical end of data.
        self.file.set_len(self.size)?;

        debug!(path = %self.path.display(), size = self.size, "index closed");
        Ok(())
    }
}

/// Grows `file` from `len` to `max` bytes and maps it.
///
/// The mapping's length is fixed for its lifetime, so the file is grown
/// first. If mapping fails the file is shrunk back to `len`; a file left at
/// `max` would read as a full index on the next open.
fn grow_and_map<F>(file: &File, len: u64, max: u64, map: F) -> Result<MmapMut, IndexError>
where
    F: FnOnce(&File) -> io::Result<MmapMut>,
{
    file.set_len(max)?;

    match map(file) {
        Ok(mmap) => Ok(mmap),
        Err(e) => {
            if let Err(shrink) = file.set_len(len) {
                error!(len, "Failed to shrink index after map failure: {shrink}");
            }
            Err(e.into())
        }
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            error!(path = %self.path.display(), "Failed to close index on drop: {e}");
        }
    }
}
