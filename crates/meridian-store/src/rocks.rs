// crates/meridian-store/src/rocks.rs
//
// RocksDB-backed key-value store.
//
// Writes land in an in-memory overlay first (`None` marks a deletion) and
// reach RocksDB only on `commit`, as a single `WriteBatch`. Reads and
// iteration consult the overlay before the database, so callers always see
// their own uncommitted writes.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use rocksdb::{DBWithThreadMode, MultiThreaded, Options, WriteBatch};

use meridian_core::error::MeridianError;
use meridian_core::traits::KvStore;

type Overlay = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

/// RocksDB wrapper implementing the `KvStore` trait.
pub struct RocksKv {
    db: DBWithThreadMode<MultiThreaded>,
    pending: Mutex<Overlay>,
}

impl std::fmt::Debug for RocksKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RocksKv")
            .field("pending", &self.pending.lock().len())
            .finish_non_exhaustive()
    }
}

impl RocksKv {
    /// Open a RocksDB database at the given filesystem path.
    ///
    /// Creates the database directory if it does not exist.
    pub fn open(path: &str) -> Result<Self, MeridianError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DBWithThreadMode::<MultiThreaded>::open(&opts, path).map_err(|e| {
            MeridianError::Storage(format!("Failed to open RocksDB at {}: {}", path, e))
        })?;

        Ok(Self {
            db,
            pending: Mutex::new(BTreeMap::new()),
        })
    }

    /// Number of writes waiting for the next commit.
    pub fn pending_writes(&self) -> usize {
        self.pending.lock().len()
    }

    fn get_committed(&self, key: &[u8]) -> Result<Option<Vec<u8>>, MeridianError> {
        self.db
            .get(key)
            .map_err(|e| MeridianError::Storage(format!("RocksDB get failed: {}", e)))
    }
}

impl KvStore for RocksKv {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, MeridianError> {
        if let Some(value) = self.pending.lock().get(key) {
            return Ok(value.clone());
        }
        self.get_committed(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), MeridianError> {
        self.pending.lock().insert(key.to_vec(), Some(value.to_vec()));
        Ok(())
    }

    fn delete(&self, key: &[u8]) -> Result<(), MeridianError> {
        self.pending.lock().insert(key.to_vec(), None);
        Ok(())
    }

    fn iter_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, MeridianError> {
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();

        for item in self.db.prefix_iterator(prefix) {
            let (key, value) = item
                .map_err(|e| MeridianError::Storage(format!("RocksDB iteration error: {}", e)))?;

            // No prefix extractor is configured; stop once past the prefix.
            if !key.starts_with(prefix) {
                break;
            }
            merged.insert(key.to_vec(), value.to_vec());
        }

        let pending = self.pending.lock();
        for (key, value) in pending.range(prefix.to_vec()..) {
            if !key.starts_with(prefix) {
                break;
            }
            match value {
                Some(v) => {
                    merged.insert(key.clone(), v.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }

        Ok(merged.into_iter().collect())
    }

    fn commit(&self) -> Result<(), MeridianError> {
        // Hold the overlay for the whole write so no put slips between the
        // batch and the clear.
        let mut pending = self.pending.lock();
        if pending.is_empty() {
            return Ok(());
        }

        let mut batch = WriteBatch::default();
        for (key, value) in pending.iter() {
            match value {
                Some(v) => batch.put(key, v),
                None => batch.delete(key),
            }
        }

        self.db
            .write(batch)
            .map_err(|e| MeridianError::Storage(format!("RocksDB commit failed: {}", e)))?;

        tracing::debug!("Committed {} writes to RocksDB", pending.len());
        pending.clear();
        Ok(())
    }
}
