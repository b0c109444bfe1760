use crate::{ENTRY_WIDTH, LEN_WIDTH, Record, SegmentConfig};
use tracing_subscriber::EnvFilter;

/// Payload used throughout the segment tests.
pub const HELLO: &[u8] = b"hello world";

/// Size of one encoded `Record` envelope carrying `value_len` bytes:
/// offset (8) + value length (4) + value + crc (4).
pub const fn envelope_len(value_len: u64) -> u64 {
    8 + 4 + value_len + 4
}

/// Size of one store entry carrying `value_len` bytes.
pub const fn store_entry_len(value_len: u64) -> u64 {
    LEN_WIDTH + envelope_len(value_len)
}

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times; only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// 1 KiB store, three-entry index.
pub fn three_entry_config() -> SegmentConfig {
    SegmentConfig {
        max_store_bytes: 1024,
        max_index_bytes: ENTRY_WIDTH * 3,
        initial_offset: 0,
    }
}

/// Limits large enough that no test hits them by accident.
pub fn roomy_config() -> SegmentConfig {
    SegmentConfig {
        max_store_bytes: 1024 * 1024,
        max_index_bytes: ENTRY_WIDTH * 1024,
        initial_offset: 0,
    }
}

/// A record whose value encodes `i`.
pub fn numbered(i: u64) -> Record {
    Record::new(format!("record-{i}").into_bytes())
}
