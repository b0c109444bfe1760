use crate::store::Store;
use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Payloads of varying length used across store tests.
pub const PAYLOADS: [&[u8]; 3] = [b"hello world", b"", b"the quick brown fox jumps over the lazy dog"];

/// Initialize tracing subscriber controlled by `RUST_LOG` env var.
/// Safe to call multiple times; only the first call takes effect.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Append every payload, returning the positions in order.
pub fn append_all(store: &Store, payloads: &[&[u8]]) -> Vec<u64> {
    payloads
        .iter()
        .map(|p| store.append(p).unwrap().1)
        .collect()
}

/// Size of the file on disk, bypassing the store.
pub fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).unwrap().len()
}

/// Opens `/dev/full` for writing, or `None` where it is unavailable.
pub fn open_dev_full() -> Option<File> {
    OpenOptions::new().write(true).open("/dev/full").ok()
}

/// Replaces the file under the store's write buffer, returning the old one.
/// Buffered bytes stay in the buffer and go to `file` on the next flush.
pub fn swap_writer_file(store: &Store, file: File) -> File {
    let mut inner = store.inner.lock().unwrap();
    std::mem::replace(inner.writer.get_mut(), file)
}
