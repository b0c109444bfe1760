//! Log segment: one store and one index under a shared base offset.
//!
//! A segment owns the contiguous offset range
//! `[base_offset, next_offset)`. Appends go store-first: the record envelope
//! is written to the store, then its position is indexed under the relative
//! offset `next_offset - base_offset`. Reads walk the same path backwards.
//!
//! # Files
//!
//! ```text
//! {dir}/{base_offset}.store
//! {dir}/{base_offset}.index
//! ```
//!
//! # Rolling
//!
//! A segment is full when its store reaches `max_store_bytes` or its index
//! has no room for another entry. Small records exhaust the index first,
//! large records the store. [`Segment::is_maxed`] reports either; an append
//! to a full segment fails with [`SegmentError::CapacityExceeded`], which the
//! log manager answers by opening a new segment at [`Segment::next_offset`].
//!
//! # Concurrency model
//!
//! [`Segment::append`] takes `&mut self` and [`Segment::read`] takes
//! `&self`; sharing a segment between a writer and readers goes through the
//! owner's lock (typically an `RwLock<Segment>` in the log manager).

mod encoding_impls;

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use crate::encoding::{self, EncodingError};
use crate::index::{Index, IndexError, IndexHealth, Lookup};
use crate::store::{Store, StoreError};
use crate::{ConfigError, SegmentConfig};
use thiserror::Error;
use tracing::{info, trace, warn};

const STORE_SUFFIX: &str = "store";
const INDEX_SUFFIX: &str = "index";

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Which limit made a segment full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// The store reached `max_store_bytes`.
    Store,

    /// The index has no room for another entry.
    Index,
}

/// Errors returned by segment operations.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// Invalid configuration.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// I/O error outside the store and index (directory creation, removal).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Index error.
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    /// Record could not be serialized or deserialized.
    #[error("Encoding error: {0}")]
    Encoding(#[from] EncodingError),

    /// The segment is full; a new segment must be opened.
    #[error("Segment capacity exceeded ({0:?} limit)")]
    CapacityExceeded(Limit),
}

impl SegmentError {
    /// Returns `true` for "no such entry (yet)" errors from the index or store.
    pub fn is_end_of_data(&self) -> bool {
        matches!(
            self,
            SegmentError::Index(IndexError::EndOfData)
                | SegmentError::Store(StoreError::EndOfData { .. })
        )
    }

    /// Returns `true` if the segment is full and must be rolled.
    pub fn is_capacity_exceeded(&self) -> bool {
        matches!(self, SegmentError::CapacityExceeded(_))
    }
}

// ------------------------------------------------------------------------------------------------
// Record
// ------------------------------------------------------------------------------------------------

/// A single log record: an opaque value and the offset the log assigned it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    /// Absolute offset; overwritten by [`Segment::append`].
    pub offset: u64,

    /// Opaque payload.
    pub value: Vec<u8>,
}

impl Record {
    /// Creates a record with the given value and offset 0.
    pub fn new(value: impl Into<Vec<u8>>) -> Self {
        Self {
            offset: 0,
            value: value.into(),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Segment
// ------------------------------------------------------------------------------------------------

/// One store and one index covering `[base_offset, next_offset)`.
///
/// See the [module-level documentation](self) for layout and rolling.
#[derive(Debug)]
pub struct Segment {
    store: Store,
    index: Index,

    /// Absolute offset of the first record.
    base_offset: u64,

    /// Absolute offset the next appended record receives.
    next_offset: u64,

    config: SegmentConfig,
}

impl Segment {
    /// Opens (or creates) the segment with `base_offset` inside `dir`.
    ///
    /// The directory is created if missing. On existing files, the next
    /// offset continues after the last indexed record.
    ///
    /// # Errors
    ///
    /// - [`SegmentError::Config`] if `config` is invalid or the segment's
    ///   offset range would overflow `u64`.
    /// - [`SegmentError::Store`] / [`SegmentError::Index`] if either file
    ///   cannot be opened.
    pub fn open(
        dir: impl AsRef<Path>,
        base_offset: u64,
        config: SegmentConfig,
    ) -> Result<Self, SegmentError> {
        config.validate()?;
        if base_offset.checked_add(config.max_entries()).is_none() {
            return Err(ConfigError::Invalid(format!(
                "base offset {base_offset} leaves no room for {} entries",
                config.max_entries()
            ))
            .into());
        }

        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let store = Store::open(dir.join(format!("{base_offset}.{STORE_SUFFIX}")))?;
        let index = Index::open(dir.join(format!("{base_offset}.{INDEX_SUFFIX}")), &config)?;

        if index.health() != IndexHealth::Clean {
            warn!(
                base_offset,
                health = ?index.health(),
                "segment index was not cleanly closed or is full; contents are unverified"
            );
        }

        let next_offset = match index.read(Lookup::Last) {
            Ok((relative, _)) => base_offset + u64::from(relative) + 1,
            Err(IndexError::EndOfData) => base_offset,
            Err(e) => return Err(e.into()),
        };

        info!(
            dir = %dir.display(),
            base_offset,
            next_offset,
            store_size = store.size(),
            "segment opened"
        );

        Ok(Self {
            store,
            index,
            base_offset,
            next_offset,
            config,
        })
    }

    /// Appends `record`, assigning it the next offset.
    ///
    /// `record.offset` is overwritten with the assigned offset, which is also
    /// returned. On any failure the next offset does not advance.
    ///
    /// # Errors
    ///
    /// - [`SegmentError::CapacityExceeded`] if the segment is full. Nothing
    ///   is written; the log manager should roll to a new segment.
    /// - [`SegmentError::Encoding`] if the record cannot be serialized.
    /// - [`SegmentError::Store`] on write failure.
    pub fn append(&mut self, record: &mut Record) -> Result<u64, SegmentError> {
        if self.index.is_full() {
            return Err(SegmentError::CapacityExceeded(Limit::Index));
        }
        if self.store.size() >= self.config.max_store_bytes {
            return Err(SegmentError::CapacityExceeded(Limit::Store));
        }

        let offset = self.next_offset;
        record.offset = offset;

        let bytes = encoding::encode_to_vec(record)?;
        let (_, position) = self.store.append(&bytes)?;

        // Fits: `open` checked that the index cannot address past u32::MAX.
        let relative = u32::try_from(offset - self.base_offset)
            .map_err(|_| SegmentError::CapacityExceeded(Limit::Index))?;

        self.index
            .write(relative, position)
            .map_err(|e| match e {
                IndexError::Full { .. } => SegmentError::CapacityExceeded(Limit::Index),
                other => other.into(),
            })?;

        self.next_offset += 1;

        trace!(offset, position, len = record.value.len(), "appended record");
        Ok(offset)
    }

    /// Reads the record at absolute `offset`.
    ///
    /// # Errors
    ///
    /// - End-of-data ([`SegmentError::is_end_of_data`]) if `offset` is not in
    ///   this segment.
    /// - [`SegmentError::Encoding`] if the stored bytes do not decode to a
    ///   record (checksum mismatch, truncated envelope).
    pub fn read(&self, offset: u64) -> Result<Record, SegmentError> {
        let relative = offset
            .checked_sub(self.base_offset)
            .and_then(|r| u32::try_from(r).ok())
            .ok_or(IndexError::EndOfData)?;

        let (_, position) = self.index.read(Lookup::Relative(relative))?;
        let bytes = self.store.read(position)?;
        let record = encoding::decode_exact::<Record>(&bytes)?;

        trace!(offset, position, "read record");
        Ok(record)
    }

    /// Raw positional read from the store, for bulk readers that stream
    /// whole entries.
    pub fn read_at(&self, buf: &mut [u8], position: u64) -> Result<usize, SegmentError> {
        Ok(self.store.read_at(buf, position)?)
    }

    /// Returns `true` if the store or the index has reached its limit.
    pub fn is_maxed(&self) -> bool {
        self.store.size() >= self.config.max_store_bytes || self.index.is_full()
    }

    /// Absolute offset of the first record.
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Absolute offset the next appended record receives.
    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// Number of records in the segment.
    pub fn len(&self) -> u64 {
        self.next_offset - self.base_offset
    }

    /// Returns `true` if no record has been appended.
    pub fn is_empty(&self) -> bool {
        self.next_offset == self.base_offset
    }

    /// Returns `true` if `offset` has been written to this segment.
    pub fn contains(&self, offset: u64) -> bool {
        (self.base_offset..self.next_offset).contains(&offset)
    }

    /// Limits the segment was opened with.
    pub fn config(&self) -> &SegmentConfig {
        &self.config
    }

    /// Committed size of the store file in bytes.
    pub fn store_size(&self) -> u64 {
        self.store.size()
    }

    /// Logical size of the index in bytes.
    pub fn index_size(&self) -> u64 {
        self.index.size()
    }

    /// State of the index file when the segment was opened.
    pub fn index_health(&self) -> IndexHealth {
        self.index.health()
    }

    /// Path of the `{base_offset}.store` file.
    pub fn store_path(&self) -> &Path {
        self.store.path()
    }

    /// Path of the `{base_offset}.index` file.
    pub fn index_path(&self) -> &Path {
        self.index.path()
    }

    /// Closes the index, then the store.
    ///
    /// Both are closed even if the first fails; the first error is returned.
    pub fn close(self) -> Result<(), SegmentError> {
        let base_offset = self.base_offset;
        let next_offset = self.next_offset;

        let index_result = self.index.close();
        let store_result = self.store.close();
        index_result?;
        store_result?;

        info!(base_offset, next_offset, "segment closed");
        Ok(())
    }

    /// Closes the segment and deletes both of its files.
    ///
    /// If the close fails nothing is deleted.
    pub fn remove(self) -> Result<(), SegmentError> {
        let base_offset = self.base_offset;
        let index_path: PathBuf = self.index.path().to_path_buf();
        let store_path: PathBuf = self.store.path().to_path_buf();

        self.close()?;

        fs::remove_file(&index_path)?;
        fs::remove_file(&store_path)?;

        info!(base_offset, "segment removed");
        Ok(())
    }
}
