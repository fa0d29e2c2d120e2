use crate::error::RuntimeError;
use crate::Result;
use rocksdb::{Options, DB};
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;
use tracing::info;

/// Durable key-value store backing the repositories. Each repository owns a
/// column of keys distinguished by prefix (e.g. `tenant:`, `agent:`,
/// `session:`) rather than separate column families, mirroring how the
/// registries in this runtime were historically laid out on top of a single
/// RocksDB handle.
pub struct Storage {
    db: DB,
}

impl Storage {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);

        let db = DB::open(&opts, path).map_err(|e| RuntimeError::Storage(e.to_string()))?;

        info!("storage initialized");
        Ok(Self { db })
    }

    pub fn put<K: AsRef<[u8]>, V: Serialize>(&self, key: K, value: &V) -> Result<()> {
        let serialized = serde_json::to_vec(value)?;
        self.db
            .put(key, serialized)
            .map_err(|e| RuntimeError::Storage(e.to_string()))
    }

    pub fn get<K: AsRef<[u8]>, V: DeserializeOwned>(&self, key: K) -> Result<Option<V>> {
        match self.db.get(key) {
            Ok(Some(data)) => {
                let value = serde_json::from_slice(&data)?;
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(RuntimeError::Storage(e.to_string())),
        }
    }

    pub fn delete<K: AsRef<[u8]>>(&self, key: K) -> Result<()> {
        self.db
            .delete(key)
            .map_err(|e| RuntimeError::Storage(e.to_string()))
    }

    pub fn batch_put<K: AsRef<[u8]>, V: Serialize>(&self, items: Vec<(K, V)>) -> Result<()> {
        let mut batch = rocksdb::WriteBatch::default();
        for (key, value) in items {
            let serialized = serde_json::to_vec(&value)?;
            batch.put(key, serialized);
        }
        self.db
            .write(batch)
            .map_err(|e| RuntimeError::Storage(e.to_string()))
    }

    /// Iterate all keys under a prefix, deserializing values as `V`. Used at
    /// startup to warm the in-memory registries from disk.
    pub fn scan_prefix<V: DeserializeOwned>(&self, prefix: &str) -> Result<Vec<V>> {
        let mut out = Vec::new();
        let iter = self
            .db
            .prefix_iterator(prefix.as_bytes())
            .map(|r| r.map_err(|e| RuntimeError::Storage(e.to_string())));
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix.as_bytes()) {
                break;
            }
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }
}
