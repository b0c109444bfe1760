//! # AeternusLog
//!
//! The on-disk storage engine underneath an append-only, offset-addressed
//! commit log. A log is a sequence of **segments**; each segment covers one
//! contiguous range of record offsets and is backed by two files sharing the
//! segment's base offset:
//!
//! - `{base_offset}.store`: length-prefixed record bytes ([`store`]).
//! - `{base_offset}.index`: fixed-width, memory-mapped offset → position
//!   entries ([`index`]).
//!
//! [`Segment`] binds the two, assigns offsets and serializes records. The
//! component that owns an ordered collection of segments and rolls to a new
//! one when [`Segment::is_maxed`] reports true lives outside this crate.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aeternuslog::{Record, Segment, SegmentConfig};
//!
//! let config = SegmentConfig::default();
//! let mut segment = Segment::open("/tmp/my_log", 16, config).unwrap();
//!
//! // The segment assigns the offset.
//! let offset = segment.append(&mut Record::new(b"hello world".to_vec())).unwrap();
//! assert_eq!(offset, 16);
//!
//! // Read
//! let record = segment.read(offset).unwrap();
//! assert_eq!(record.value, b"hello world");
//!
//! // Roll when full
//! if segment.is_maxed() {
//!     // the log manager opens the next segment at `segment.next_offset()`
//! }
//!
//! // Graceful shutdown shrinks the index back to its logical size.
//! segment.close().unwrap();
//! ```
//!
//! ## Features
//!
//! - **O(1) lookups**: fixed-width index entries in a memory-mapped file.
//! - **Buffered appends**: reads flush pending writes, so every returned
//!   offset is immediately readable.
//! - **CRC32 integrity**: every record envelope is checksummed.
//! - **Restart**: a reopened segment continues at the offset after its last
//!   indexed record.
//!
//! ## Limitations
//!
//! No corruption repair and no crash recovery scan: an index left pre-grown
//! by a crash is reported through [`IndexHealth`] but not repaired. One
//! writer per segment; multi-process access is not arbitrated.

pub mod encoding;
pub mod index;
pub mod segment;
pub mod store;

pub use index::{ENTRY_WIDTH, Index, IndexError, IndexHealth, Lookup};
pub use segment::{Limit, Record, Segment, SegmentError};
pub use store::{LEN_WIDTH, Store, StoreError};

use thiserror::Error;
use tracing::warn;

// ------------------------------------------------------------------------------------------------
// Configuration
// ------------------------------------------------------------------------------------------------

/// Size limits for one segment.
///
/// Supplied by the log manager and consumed, never mutated, by
/// [`Index`] and [`Segment`]. Validated when passed to [`Segment::open`].
///
/// # Example
///
/// ```rust
/// use aeternuslog::{ENTRY_WIDTH, SegmentConfig};
///
/// // Use defaults (1 MiB store, 1 MiB index)
/// let config = SegmentConfig::default();
///
/// // Or customize: at most three records per segment
/// let config = SegmentConfig {
///     max_index_bytes: ENTRY_WIDTH * 3,
///     ..SegmentConfig::default()
/// };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentConfig {
    /// Store size at which the segment reports itself maxed.
    ///
    /// Default: 1 MiB. Must be > 0.
    pub max_store_bytes: u64,

    /// Size the index file is pre-grown and mapped to. Bounds the number of
    /// records per segment to `max_index_bytes / ENTRY_WIDTH`.
    ///
    /// Default: the largest multiple of [`ENTRY_WIDTH`] not above 1 MiB.
    /// Must hold at least one entry and at most `2^32` entries.
    pub max_index_bytes: u64,

    /// Base offset of the first segment of a fresh log.
    ///
    /// Default: 0.
    pub initial_offset: u64,
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_store_bytes: 1024 * 1024,
            max_index_bytes: (1024 * 1024 / ENTRY_WIDTH) * ENTRY_WIDTH,
            initial_offset: 0,
        }
    }
}

impl SegmentConfig {
    /// Largest number of entries an index can address with a 4-byte
    /// relative offset.
    pub const MAX_ENTRIES: u64 = u32::MAX as u64 + 1;

    /// Maximum number of records a segment opened with this config holds.
    pub fn max_entries(&self) -> u64 {
        self.max_index_bytes / ENTRY_WIDTH
    }

    /// Validates all configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_store_bytes == 0 {
            return Err(ConfigError::Invalid("max_store_bytes must be > 0".into()));
        }
        if self.max_index_bytes < ENTRY_WIDTH {
            return Err(ConfigError::Invalid(format!(
                "max_index_bytes must be >= {ENTRY_WIDTH}"
            )));
        }
        if self.max_entries() > Self::MAX_ENTRIES {
            return Err(ConfigError::Invalid(format!(
                "max_index_bytes allows more than {} entries",
                Self::MAX_ENTRIES
            )));
        }
        if usize::try_from(self.max_index_bytes).is_err() {
            return Err(ConfigError::Invalid(
                "max_index_bytes does not fit in the address space".into(),
            ));
        }
        if self.max_index_bytes % ENTRY_WIDTH != 0 {
            warn!(
                max_index_bytes = self.max_index_bytes,
                wasted = self.max_index_bytes % ENTRY_WIDTH,
                "max_index_bytes is not a multiple of the index entry width"
            );
        }
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`SegmentConfig::validate`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid configuration parameter.
    #[error("invalid config: {0}")]
    Invalid(String),
}
