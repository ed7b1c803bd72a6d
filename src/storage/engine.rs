use rocksdb::{ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{StoreError, StoreResult};

/// The four logical collections held by the durable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Records,
    PendingOps,
    SyncLog,
    Cache,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Records,
        Collection::PendingOps,
        Collection::SyncLog,
        Collection::Cache,
    ];

    fn cf_name(self) -> &'static str {
        match self {
            Collection::Records => "records",
            Collection::PendingOps => "pending_ops",
            Collection::SyncLog => "sync_log",
            Collection::Cache => "cache",
        }
    }
}

enum BatchOp {
    Put {
        collection: Collection,
        key: String,
        value: Vec<u8>,
    },
    Delete {
        collection: Collection,
        key: String,
    },
}

/// A multi-collection write batch, applied atomically by
/// [`StorageEngine::write`].
///
/// The record-write + operation-enqueue pair of every mutation goes through
/// one batch, so a crash can never persist one half of the pair.
#[derive(Default)]
pub struct StoreBatch {
    ops: Vec<BatchOp>,
}

impl StoreBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, collection: Collection, key: impl Into<String>, value: Vec<u8>) {
        self.ops.push(BatchOp::Put {
            collection,
            key: key.into(),
            value,
        });
    }

    pub fn delete(&mut self, collection: Collection, key: impl Into<String>) {
        self.ops.push(BatchOp::Delete {
            collection,
            key: key.into(),
        });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Durable store backed by RocksDB, one column family per collection.
///
/// An explicit handle with `open`/`close` lifecycle; callers share it via
/// `Arc` and inject it into the components built on top.
pub struct StorageEngine {
    db: RwLock<Option<DB>>,
    path: PathBuf,
}

impl std::fmt::Debug for StorageEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEngine")
            .field("path", &self.path)
            .finish()
    }
}

impl StorageEngine {
    /// Open (or create) the store at `data_dir`.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> StoreResult<Self> {
        let path = data_dir.as_ref().to_path_buf();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        // Bound WAL growth; client-side datasets are small
        opts.set_max_total_wal_size(16 * 1024 * 1024);
        opts.set_keep_log_file_num(5);

        let mut cf_descriptors = vec![ColumnFamilyDescriptor::new("default", Options::default())];
        cf_descriptors.extend(
            Collection::ALL
                .iter()
                .map(|c| ColumnFamilyDescriptor::new(c.cf_name(), Options::default())),
        );

        let db = DB::open_cf_descriptors(&opts, &path, cf_descriptors)
            .map_err(|e| StoreError::Storage(format!("Failed to open RocksDB: {}", e)))?;

        tracing::info!("Opened storage engine at {}", path.display());

        Ok(Self {
            db: RwLock::new(Some(db)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.db.read().unwrap().is_none()
    }

    /// Store a value under `key`. Atomic with respect to the single key.
    pub fn put(&self, collection: Collection, key: &str, value: &[u8]) -> StoreResult<()> {
        let guard = self.db.read().unwrap();
        let db = guard.as_ref().ok_or(StoreError::Closed)?;
        let cf = db
            .cf_handle(collection.cf_name())
            .ok_or_else(|| StoreError::Storage(format!("Missing CF {}", collection.cf_name())))?;
        db.put_cf(cf, key.as_bytes(), value)?;
        Ok(())
    }

    pub fn get(&self, collection: Collection, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let guard = self.db.read().unwrap();
        let db = guard.as_ref().ok_or(StoreError::Closed)?;
        let cf = db
            .cf_handle(collection.cf_name())
            .ok_or_else(|| StoreError::Storage(format!("Missing CF {}", collection.cf_name())))?;
        Ok(db.get_cf(cf, key.as_bytes())?)
    }

    pub fn delete(&self, collection: Collection, key: &str) -> StoreResult<()> {
        let guard = self.db.read().unwrap();
        let db = guard.as_ref().ok_or(StoreError::Closed)?;
        let cf = db
            .cf_handle(collection.cf_name())
            .ok_or_else(|| StoreError::Storage(format!("Missing CF {}", collection.cf_name())))?;
        db.delete_cf(cf, key.as_bytes())?;
        Ok(())
    }

    /// Return all `(key, value)` pairs whose key starts with `prefix`, in key
    /// order. This is the index primitive: components lay out index keys so
    /// that a prefix scan returns entries already sorted.
    pub fn scan_prefix(
        &self,
        collection: Collection,
        prefix: &str,
    ) -> StoreResult<Vec<(String, Vec<u8>)>> {
        let guard = self.db.read().unwrap();
        let db = guard.as_ref().ok_or(StoreError::Closed)?;
        let cf = db
            .cf_handle(collection.cf_name())
            .ok_or_else(|| StoreError::Storage(format!("Missing CF {}", collection.cf_name())))?;

        let iter = db.iterator_cf(cf, IteratorMode::From(prefix.as_bytes(), Direction::Forward));

        let mut entries = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            let key_str = String::from_utf8(key.to_vec())
                .map_err(|_| StoreError::Storage("Non-UTF8 storage key".to_string()))?;
            entries.push((key_str, value.to_vec()));
        }

        Ok(entries)
    }

    /// Total number of keys in the collection, index keys included.
    pub fn count(&self, collection: Collection) -> StoreResult<usize> {
        let guard = self.db.read().unwrap();
        let db = guard.as_ref().ok_or(StoreError::Closed)?;
        let cf = db
            .cf_handle(collection.cf_name())
            .ok_or_else(|| StoreError::Storage(format!("Missing CF {}", collection.cf_name())))?;

        let mut count = 0;
        for item in db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    /// Remove every key in the collection.
    pub fn clear(&self, collection: Collection) -> StoreResult<()> {
        let guard = self.db.read().unwrap();
        let db = guard.as_ref().ok_or(StoreError::Closed)?;
        let cf = db
            .cf_handle(collection.cf_name())
            .ok_or_else(|| StoreError::Storage(format!("Missing CF {}", collection.cf_name())))?;

        let mut batch = WriteBatch::default();
        for item in db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            batch.delete_cf(cf, key);
        }
        db.write(batch)?;
        Ok(())
    }

    pub fn batch(&self) -> StoreBatch {
        StoreBatch::new()
    }

    /// Apply a [`StoreBatch`] atomically across collections.
    pub fn write(&self, batch: StoreBatch) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let guard = self.db.read().unwrap();
        let db = guard.as_ref().ok_or(StoreError::Closed)?;

        let mut wb = WriteBatch::default();
        for op in &batch.ops {
            match op {
                BatchOp::Put {
                    collection,
                    key,
                    value,
                } => {
                    let cf = db.cf_handle(collection.cf_name()).ok_or_else(|| {
                        StoreError::Storage(format!("Missing CF {}", collection.cf_name()))
                    })?;
                    wb.put_cf(cf, key.as_bytes(), value);
                }
                BatchOp::Delete { collection, key } => {
                    let cf = db.cf_handle(collection.cf_name()).ok_or_else(|| {
                        StoreError::Storage(format!("Missing CF {}", collection.cf_name()))
                    })?;
                    wb.delete_cf(cf, key.as_bytes());
                }
            }
        }
        db.write(wb)?;
        Ok(())
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> StoreResult<()> {
        let guard = self.db.read().unwrap();
        let db = guard.as_ref().ok_or(StoreError::Closed)?;
        db.flush()
            .map_err(|e| StoreError::Storage(format!("Failed to flush: {}", e)))?;
        Ok(())
    }

    /// Flush and release the database handle. Subsequent operations fail with
    /// [`StoreError::Closed`].
    pub fn close(&self) -> StoreResult<()> {
        let mut guard = self.db.write().unwrap();
        if let Some(db) = guard.take() {
            db.flush()
                .map_err(|e| StoreError::Storage(format!("Failed to flush on close: {}", e)))?;
            tracing::info!("Closed storage engine at {}", self.path.display());
        }
        Ok(())
    }
}
