//! Index file lifecycle: pre-grow on open, shrink on close, reopen, and the
//! states a file can be found in.

#[cfg(test)]
mod tests {
    use crate::index::tests::helpers::*;
    use crate::index::{ENTRY_WIDTH, Index, IndexError, IndexHealth, Lookup, grow_and_map};
    use std::fs::OpenOptions;
    use std::io::{self, Write};
    use tempfile::TempDir;

    /// # Scenario
    /// Observe the file size across open and close.
    ///
    /// # Expected behavior
    /// While open the file is `max_index_bytes` long; after close it is
    /// exactly the logical size.
    #[test]
    fn file_grows_while_open_and_shrinks_on_close() {
        init_tracing();

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("0.index");
        let mut index = Index::open(&path, &config_with_index_bytes(1024)).unwrap();
        assert_eq!(file_len(&path), 1024);

        index.write(0, 0).unwrap();
        index.write(1, 10).unwrap();
        assert!(index.capacity() >= index.size());

        index.close().unwrap();
        assert_eq!(file_len(&path), 2 * ENTRY_WIDTH);
    }

    /// # Scenario
    /// Close an index and open it again with the same config.
    ///
    /// # Expected behavior
    /// The reopened index rebuilds its size from the file, every entry reads
    /// back, and the last entry is the one written last.
    #[test]
    fn reopen_restores_entries() {
        init_tracing();

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("0.index");
        let config = config_with_index_bytes(1024);

        let entries = [(0u32, 0u64), (1, 10)];
        let mut index = Index::open(&path, &config).unwrap();
        for (off, pos) in entries {
            index.write(off, pos).unwrap();
        }
        index.close().unwrap();

        let mut index = Index::open(&path, &config).unwrap();
        assert_eq!(index.health(), IndexHealth::Clean);
        assert_eq!(index.size(), 2 * ENTRY_WIDTH);
        for (off, pos) in entries {
            assert_eq!(index.read(Lookup::Relative(off)).unwrap(), (off, pos));
        }
        assert_eq!(index.read(Lookup::Last).unwrap(), (1, 10));

        // Appends continue after the restored entries.
        index.write(2, 20).unwrap();
        assert_eq!(index.read(Lookup::Last).unwrap(), (2, 20));
    }

    /// # Scenario
    /// Drop an index without calling `close`.
    ///
    /// # Expected behavior
    /// The drop performs the same shutdown: the file is shrunk to its
    /// logical size.
    #[test]
    fn drop_shrinks_file() {
        init_tracing();

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("0.index");
        {
            let mut index = Index::open(&path, &config_with_index_bytes(1024)).unwrap();
            index.write(0, 7).unwrap();
        }
        assert_eq!(file_len(&path), ENTRY_WIDTH);
    }

    /// # Scenario
    /// The process dies while the index is mapped (simulated with
    /// `mem::forget`, which skips every shutdown step).
    ///
    /// # Expected behavior
    /// The file stays pre-grown. Reopening reports `AtCapacity` and treats
    /// the whole capacity as written: the zero-filled tail is not detected.
    #[test]
    fn crash_leaves_file_pre_grown() {
        init_tracing();

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("0.index");
        let config = config_with_index_bytes(ENTRY_WIDTH * 4);

        let mut index = Index::open(&path, &config).unwrap();
        index.write(0, 0).unwrap();
        std::mem::forget(index);

        assert_eq!(file_len(&path), ENTRY_WIDTH * 4);

        let index = Index::open(&path, &config).unwrap();
        assert_eq!(index.health(), IndexHealth::AtCapacity);
        assert_eq!(index.size(), ENTRY_WIDTH * 4);
        assert!(index.is_full());
        assert_eq!(index.read(Lookup::Last).unwrap(), (0, 0));
    }

    /// # Scenario
    /// A file whose length is not a whole number of entries.
    ///
    /// # Expected behavior
    /// Health is `Degraded`, the partial tail is excluded from the logical
    /// size, and the whole entries remain readable.
    #[test]
    fn misaligned_file_is_degraded() {
        init_tracing();

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("0.index");
        {
            let mut f = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&path)
                .unwrap();
            f.write_all(&0u32.to_be_bytes()).unwrap();
            f.write_all(&42u64.to_be_bytes()).unwrap();
            f.write_all(&[0xFF; 5]).unwrap();
        }

        let index = Index::open(&path, &config_with_index_bytes(1024)).unwrap();
        assert_eq!(index.health(), IndexHealth::Degraded);
        assert_eq!(index.size(), ENTRY_WIDTH);
        assert_eq!(index.read(Lookup::Last).unwrap(), (0, 42));
    }

    /// # Scenario
    /// Reopen an index with a limit smaller than the existing file.
    ///
    /// # Expected behavior
    /// `Oversized`, and the file on disk is left untouched.
    #[test]
    fn shrinking_limit_below_data_is_rejected() {
        init_tracing();

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("0.index");

        let mut index = Index::open(&path, &config_with_index_bytes(1024)).unwrap();
        for i in 0..3u32 {
            index.write(i, u64::from(i)).unwrap();
        }
        index.close().unwrap();

        let err = Index::open(&path, &config_with_index_bytes(ENTRY_WIDTH * 2)).unwrap_err();
        assert!(matches!(
            err,
            IndexError::Oversized { len, max } if len == ENTRY_WIDTH * 3 && max == ENTRY_WIDTH * 2
        ));
        assert_eq!(file_len(&path), ENTRY_WIDTH * 3);
    }

    /// # Scenario
    /// Reopen an index with a larger limit than it was created with.
    ///
    /// # Expected behavior
    /// The file is grown to the new limit and existing entries survive.
    #[test]
    fn growing_limit_keeps_entries() {
        init_tracing();

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("0.index");

        let mut index = Index::open(&path, &config_with_index_bytes(ENTRY_WIDTH * 2)).unwrap();
        index.write(0, 0).unwrap();
        index.write(1, 19).unwrap();
        index.close().unwrap();

        let index = Index::open(&path, &config_with_index_bytes(1024)).unwrap();
        assert_eq!(index.health(), IndexHealth::Clean);
        assert_eq!(index.capacity(), 1024);
        assert!(!index.is_full());
        assert_eq!(index.read(Lookup::Last).unwrap(), (1, 19));
    }

    /// # Scenario
    /// The file is grown for mapping, but the mapping itself fails.
    ///
    /// # Expected behavior
    /// The error is returned as `IndexError::Io` and the file is shrunk back
    /// to its previous length, so a later open sees the same entries and a
    /// clean health instead of a full index of zeros.
    #[test]
    fn failed_map_restores_file_length() {
        init_tracing();

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("0.index");
        let config = config_with_index_bytes(1024);

        let mut index = Index::open(&path, &config).unwrap();
        index.write(0, 0).unwrap();
        index.write(1, 10).unwrap();
        index.close().unwrap();

        let file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        let len = file_len(&path);

        let err = grow_and_map(&file, len, 1024, |_| Err(io::Error::other("map refused")))
            .unwrap_err();
        assert!(matches!(err, IndexError::Io(_)));
        assert_eq!(file_len(&path), 2 * ENTRY_WIDTH);
        drop(file);

        let index = Index::open(&path, &config).unwrap();
        assert_eq!(index.health(), IndexHealth::Clean);
        assert_eq!(index.read(Lookup::Last).unwrap(), (1, 10));
    }
}
