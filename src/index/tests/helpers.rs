use crate::SegmentConfig;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times; only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Config with the given index limit and a generous store limit.
pub fn config_with_index_bytes(max_index_bytes: u64) -> SegmentConfig {
    SegmentConfig {
        max_store_bytes: 1024,
        max_index_bytes,
        initial_offset: 0,
    }
}

/// Size of the file on disk, bypassing the index.
pub fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).unwrap().len()
}
