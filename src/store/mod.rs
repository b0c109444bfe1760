//! Append-only record store.
//!
//! The store is the byte half of a segment: every record handed to it is
//! written as a length-prefixed entry and addressed afterwards by its
//! **position**, the byte offset of the length prefix inside the file.
//!
//! # On-disk layout
//!
//! ```text
//! [LEN_BE u64][RECORD_BYTES]
//! [LEN_BE u64][RECORD_BYTES]
//! ...
//! ```
//!
//! There is no header and no footer; the logical size of the store is the
//! file size, recovered from the file metadata when the store is opened.
//!
//! # Concurrency model
//!
//! - The buffered writer, the read handle and the size counter live behind
//!   one `Mutex`, so [`Store::append`], [`Store::read`] and
//!   [`Store::read_at`] are mutually exclusive and take `&self`.
//! - Reads flush the write buffer first, so a position returned by `append`
//!   is always readable, even before an explicit flush.
//!
//! # Guarantees
//!
//! - **Committed size:** `size` only advances after the length prefix and the
//!   record bytes were both accepted by the writer.
//! - **Failed appends touch only their own bytes:** before an entry that does
//!   not fit in the write buffer's spare room, the buffer (holding only
//!   committed entries) is flushed. If that flush fails, the append fails
//!   with the committed bytes still buffered for the next flush. An entry
//!   that fits is copied into the buffer without I/O; a larger one is
//!   written straight to the file, and a failure there truncates the file
//!   back to the committed size.
//! - **Bounded reads:** a read never reaches past the committed size; a
//!   position or length prefix pointing beyond it is reported as
//!   [`StoreError::EndOfData`].

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::{
    fs::{File, OpenOptions},
    io::{self, BufWriter, Write},
    os::unix::fs::FileExt,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use crate::encoding::{self, EncodingError};
use thiserror::Error;
use tracing::{debug, error, trace};

/// Number of bytes used to store a record's length.
pub const LEN_WIDTH: u64 = encoding::U64_WIDTH as u64;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Length prefix could not be decoded.
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// The requested entry lies (partly) beyond the written region.
    #[error("End of data: entry at position {position} is beyond store size {size}")]
    EndOfData {
        /// Requested entry position.
        position: u64,
        /// Committed store size at the time of the read.
        size: u64,
    },

    /// Internal consistency or locking error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Store
// ------------------------------------------------------------------------------------------------

struct StoreInner {
    /// Handle used for positional reads and truncation.
    file: File,

    /// Buffered handle all appends go through.
    writer: BufWriter<File>,

    /// Committed size in bytes; the position of the next entry.
    size: u64,
}

/// Append-only, length-prefixed byte store backed by a single file.
///
/// See the [module-level documentation](self) for format and guarantees.
pub struct Store {
    /// Path to the store file on disk.
    path: PathBuf,

    inner: Mutex<StoreInner>,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("path", &self.path)
            .field("size", &self.size())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Open or create the store file at `path`.
    ///
    /// The file is opened in append mode; its current length becomes the
    /// store size, so reopening an existing store continues after the last
    /// entry.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let size = file.metadata()?.len();
        let writer = BufWriter::new(file.try_clone()?);

        debug!(path = %path.display(), size, "store opened");

        Ok(Self {
            path: path.to_path_buf(),
            inner: Mutex::new(StoreInner { file, writer, size }),
        })
    }

    /// Appends `data` as a new entry.
    ///
    /// Returns `(bytes_written, position)`: the total number of bytes the
    /// entry occupies (length prefix included) and the position it starts
    /// at.
    pub fn append(&self, data: &[u8]) -> Result<(u64, u64), StoreError> {
        let mut inner = self.lock()?;

        let position = inner.size;
        let mut prefix = [0u8; LEN_WIDTH as usize];
        encoding::put_u64(&mut prefix, data.len() as u64)?;

        let entry_len = prefix.len() + data.len();
        let spare = inner.writer.capacity() - inner.writer.buffer().len();
        if entry_len > spare {
            // Only committed entries are buffered here; on failure they stay
            // buffered and `size` does not move.
            if let Err(e) = inner.writer.flush() {
                error!(path = %self.path.display(), position, "store flush before append failed: {e}");
                return Err(StoreError::Io(e));
            }
        }

        let written = if entry_len <= inner.writer.capacity() {
            inner
                .writer
                .write_all(&prefix)
                .and_then(|()| inner.writer.write_all(data))
        } else {
            let file = inner.writer.get_mut();
            file.write_all(&prefix).and_then(|()| file.write_all(data))
        };

        if let Err(e) = written {
            error!(path = %self.path.display(), position, "store append failed: {e}");
            Self::rollback(&mut inner);
            return Err(StoreError::Io(e));
        }

        let bytes_written = LEN_WIDTH + data.len() as u64;
        inner.size += bytes_written;

        trace!(position, len = data.len(), "appended store entry");
        Ok((bytes_written, position))
    }

    /// Reads the entry starting at `position`.
    ///
    /// Pending buffered writes are flushed first.
    pub fn read(&self, position: u64) -> Result<Vec<u8>, StoreError> {
        let mut inner = self.lock()?;
        inner.writer.flush()?;

        let size = inner.size;
        let end_of_data = StoreError::EndOfData { position, size };

        let data_start = match position.checked_add(LEN_WIDTH) {
            Some(start) if start <= size => start,
            _ => return Err(end_of_data),
        };

        let mut prefix = [0u8; LEN_WIDTH as usize];
        inner.file.read_exact_at(&mut prefix, position)?;
        let len = encoding::get_u64(&prefix)?;

        // A length reaching past the committed size means a torn or foreign entry.
        match data_start.checked_add(len) {
            Some(end) if end <= size => {}
            _ => return Err(end_of_data),
        }

        let len = usize::try_from(len)
            .map_err(|_| StoreError::Internal(format!("entry length {len} exceeds usize")))?;
        let mut data = vec![0u8; len];
        inner.file.read_exact_at(&mut data, data_start)?;

        trace!(position, len, "read store entry");
        Ok(data)
    }

    /// Reads raw bytes starting at `offset` into `buf`.
    ///
    /// Pending buffered writes are flushed first. Returns the number of bytes
    /// read, which is smaller than `buf.len()` only when the end of the file
    /// was reached.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<usize, StoreError> {
        let mut inner = self.lock()?;
        inner.writer.flush()?;

        let mut filled = 0;
        while filled < buf.len() {
            match inner.file.read_at(&mut buf[filled..], offset + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(StoreError::Io(e)),
            }
        }
        Ok(filled)
    }

    /// Flushes buffered entries to the file.
    pub fn flush(&self) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        inner.writer.flush()?;
        Ok(())
    }

    /// Committed size of the store in bytes.
    pub fn size(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .size
    }

    /// Get the path of the underlying store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes buffered entries, syncs the file and closes it.
    ///
    /// The first failing step aborts the close and is returned; the file
    /// handles are released either way.
    pub fn close(self) -> Result<(), StoreError> {
        let mut inner = self
            .inner
            .into_inner()
            .map_err(|_| StoreError::Internal("Mutex poisoned".into()))?;

        inner.writer.flush()?;
        inner.file.sync_all()?;

        debug!(path = %self.path.display(), size = inner.size, "store closed");
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Internal("Mutex poisoned".into()))
    }

    /// Cuts off whatever a failed direct write left past the committed size.
    ///
    /// The write buffer was empty when the write started, so the file ends
    /// exactly at the committed size once truncated.
    fn rollback(inner: &mut StoreInner) {
        if let Err(e) = inner.file.set_len(inner.size) {
            error!(size = inner.size, "store rollback failed to truncate: {e}");
        }
    }
}
