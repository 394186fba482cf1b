//! RocksDB wrapper for knowledge engine storage.
//!
//! Provides:
//! - Database open/close with column family setup
//! - Whole-blob JSON reads and overwrites keyed by [`ResourceKey`]
//! - Prefix listing and deletion scoped to one database
//! - Atomic write batches spanning several resource kinds

use rocksdb::{Direction, IteratorMode, Options, WriteBatch, DB};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

use crate::column_families::{build_cf_descriptors, ResourceKind, ALL_CF_NAMES};
use crate::error::StorageError;
use crate::keys::ResourceKey;

/// Main storage interface for the knowledge engine
pub struct Storage {
    db: DB,
}

/// A pending set of writes committed together by [`Storage::write_batch`].
#[derive(Debug, Default)]
pub struct StorageBatch {
    ops: Vec<BatchOp>,
}

#[derive(Debug)]
enum BatchOp {
    Put {
        kind: ResourceKind,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        kind: ResourceKind,
        key: Vec<u8>,
    },
}

impl StorageBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a JSON overwrite.
    pub fn put_json<T: Serialize>(
        &mut self,
        kind: ResourceKind,
        key: &ResourceKey,
        value: &T,
    ) -> Result<(), StorageError> {
        self.ops.push(BatchOp::Put {
            kind,
            key: key.to_bytes(),
            value: serde_json::to_vec(value)?,
        });
        Ok(())
    }

    /// Queue a delete.
    pub fn delete(&mut self, kind: ResourceKind, key: &ResourceKey) {
        self.ops.push(BatchOp::Delete {
            kind,
            key: key.to_bytes(),
        });
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl Storage {
    /// Open storage at the given path, creating if necessary
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening storage at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(4);

        let cf_descriptors = build_cf_descriptors();
        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        Ok(Self { db })
    }

    fn cf(&self, kind: ResourceKind) -> Result<&rocksdb::ColumnFamily, StorageError> {
        let name = kind.cf_name();
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::MissingColumnFamily(name.to_string()))
    }

    /// Read and decode a blob. `None` when the key is absent.
    pub fn get_json<T: DeserializeOwned>(
        &self,
        kind: ResourceKind,
        key: &ResourceKey,
    ) -> Result<Option<T>, StorageError> {
        let cf = self.cf(kind)?;
        match self.db.get_cf(cf, key.to_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Encode and overwrite a blob.
    pub fn put_json<T: Serialize>(
        &self,
        kind: ResourceKind,
        key: &ResourceKey,
        value: &T,
    ) -> Result<(), StorageError> {
        let cf = self.cf(kind)?;
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(cf, key.to_bytes(), &bytes)?;
        debug!(kind = ?kind, key = %key, bytes = bytes.len(), "Stored blob");
        Ok(())
    }

    /// Whether a blob exists.
    pub fn exists(&self, kind: ResourceKind, key: &ResourceKey) -> Result<bool, StorageError> {
        let cf = self.cf(kind)?;
        Ok(self.db.get_pinned_cf(cf, key.to_bytes())?.is_some())
    }

    /// Delete a blob. Deleting a missing key is not an error.
    pub fn delete(&self, kind: ResourceKind, key: &ResourceKey) -> Result<(), StorageError> {
        let cf = self.cf(kind)?;
        self.db.delete_cf(cf, key.to_bytes())?;
        Ok(())
    }

    /// Names of every resource of `kind` in one database, in key order.
    pub fn list_names(
        &self,
        kind: ResourceKind,
        tenant: &str,
        database: &str,
    ) -> Result<Vec<String>, StorageError> {
        let prefix = ResourceKey::database_prefix(tenant, database)?;
        let keys = self.scan_keys(kind, &prefix)?;
        keys.iter()
            .map(|k| ResourceKey::from_bytes(k).map(|key| key.name))
            .collect()
    }

    /// Delete every resource of `kind` in one database whose name starts with
    /// `name_prefix`. Returns the number of keys removed.
    pub fn delete_prefix(
        &self,
        kind: ResourceKind,
        tenant: &str,
        database: &str,
        name_prefix: &str,
    ) -> Result<usize, StorageError> {
        let mut prefix = ResourceKey::database_prefix(tenant, database)?;
        prefix.extend_from_slice(name_prefix.as_bytes());

        let keys = self.scan_keys(kind, &prefix)?;
        if keys.is_empty() {
            return Ok(0);
        }

        let cf = self.cf(kind)?;
        let mut batch = WriteBatch::default();
        for key in &keys {
            batch.delete_cf(cf, key);
        }
        self.db.write(batch)?;
        debug!(kind = ?kind, count = keys.len(), "Deleted keys by prefix");
        Ok(keys.len())
    }

    fn scan_keys(&self, kind: ResourceKind, prefix: &[u8]) -> Result<Vec<Vec<u8>>, StorageError> {
        let cf = self.cf(kind)?;
        let mut keys = Vec::new();
        let iter = self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward));
        for item in iter {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            keys.push(key.to_vec());
        }
        Ok(keys)
    }

    /// Commit every queued put and delete atomically.
    pub fn write_batch(&self, batch: StorageBatch) -> Result<(), StorageError> {
        if batch.is_empty() {
            return Ok(());
        }
        let count = batch.len();
        let mut write = WriteBatch::default();
        for op in batch.ops {
            match op {
                BatchOp::Put { kind, key, value } => write.put_cf(self.cf(kind)?, key, value),
                BatchOp::Delete { kind, key } => write.delete_cf(self.cf(kind)?, key),
            }
        }
        self.db.write(write)?;
        debug!(ops = count, "Committed write batch");
        Ok(())
    }

    /// Flush all column families to disk
    pub fn flush(&self) -> Result<(), StorageError> {
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.flush_cf(cf)?;
            }
        }
        Ok(())
    }

    // ===== Admin Operations =====

    /// Trigger manual compaction on all column families.
    pub fn compact(&self) -> Result<(), StorageError> {
        info!("Starting full compaction...");
        self.db.compact_range::<&[u8], &[u8]>(None, None);
        for cf_name in ALL_CF_NAMES {
            if let Some(cf) = self.db.cf_handle(cf_name) {
                self.db.compact_range_cf::<&[u8], &[u8]>(cf, None, None);
            }
        }
        info!("Compaction complete");
        Ok(())
    }

    /// Get database statistics.
    pub fn get_stats(&self) -> Result<StorageStats, StorageError> {
        Ok(StorageStats {
            collection_count: self.count_entries(ResourceKind::Collection)?,
            history_count: self.count_entries(ResourceKind::History)?,
            graph_count: self.count_entries(ResourceKind::Graph)?,
            vector_index_count: self.count_entries(ResourceKind::VectorIndex)?,
            field_index_count: self.count_entries(ResourceKind::FieldIndex)?,
            memory_count: self.count_entries(ResourceKind::Memory)?,
            disk_usage_bytes: self.get_disk_usage(),
        })
    }

    fn count_entries(&self, kind: ResourceKind) -> Result<u64, StorageError> {
        let cf = self.cf(kind)?;
        let mut count = 0u64;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            item?;
            count += 1;
        }
        Ok(count)
    }

    fn get_disk_usage(&self) -> u64 {
        let mut total_size = 0u64;
        if let Ok(entries) = std::fs::read_dir(self.db.path()) {
            for entry in entries.flatten() {
                if let Ok(metadata) = entry.metadata() {
                    total_size += metadata.len();
                }
            }
        }
        total_size
    }
}

/// Statistics about the storage, as blob counts per kind.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct StorageStats {
    pub collection_count: u64,
    pub history_count: u64,
    pub graph_count: u64,
    pub vector_index_count: u64,
    pub field_index_count: u64,
    pub memory_count: u64,
    /// Total disk usage in bytes
    pub disk_usage_bytes: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn create_test_storage() -> (Storage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::open(temp_dir.path()).unwrap();
        (storage, temp_dir)
    }

    fn key(name: &str) -> ResourceKey {
        ResourceKey::new("acme", "main", name).unwrap()
    }

    #[test]
    fn test_open_creates_column_families() {
        let (storage, _temp) = create_test_storage();
        for cf_name in ALL_CF_NAMES {
            assert!(
                storage.db.cf_handle(cf_name).is_some(),
                "CF {} should exist",
                cf_name
            );
        }
    }

    #[test]
    fn test_put_and_get_json() {
        let (storage, _temp) = create_test_storage();
        let value = json!([{"_id": "doc_1", "name": "Ada"}]);
        storage
            .put_json(ResourceKind::Collection, &key("people"), &value)
            .unwrap();

        let loaded: Value = storage
            .get_json(ResourceKind::Collection, &key("people"))
            .unwrap()
            .unwrap();
        assert_eq!(loaded, value);
        assert!(storage.exists(ResourceKind::Collection, &key("people")).unwrap());
    }

    #[test]
    fn test_get_missing_is_none() {
        let (storage, _temp) = create_test_storage();
        let loaded: Option<Value> = storage.get_json(ResourceKind::Graph, &key("graph")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_kinds_are_isolated() {
        let (storage, _temp) = create_test_storage();
        storage
            .put_json(ResourceKind::Collection, &key("people"), &json!([]))
            .unwrap();
        let other: Option<Value> = storage
            .get_json(ResourceKind::VectorIndex, &key("people"))
            .unwrap();
        assert!(other.is_none());
    }

    #[test]
    fn test_list_names_scoped_to_database() {
        let (storage, _temp) = create_test_storage();
        for name in ["orders", "people"] {
            storage
                .put_json(ResourceKind::Collection, &key(name), &json!([]))
                .unwrap();
        }
        let other_db = ResourceKey::new("acme", "main2", "zeta").unwrap();
        storage
            .put_json(ResourceKind::Collection, &other_db, &json!([]))
            .unwrap();

        let names = storage
            .list_names(ResourceKind::Collection, "acme", "main")
            .unwrap();
        assert_eq!(names, vec!["orders", "people"]);
    }

    #[test]
    fn test_delete_prefix() {
        let (storage, _temp) = create_test_storage();
        for name in ["people:doc_1", "people:doc_2", "orders:doc_3"] {
            storage
                .put_json(ResourceKind::History, &key(name), &json!([]))
                .unwrap();
        }

        let removed = storage
            .delete_prefix(ResourceKind::History, "acme", "main", "people:")
            .unwrap();
        assert_eq!(removed, 2);

        let names = storage
            .list_names(ResourceKind::History, "acme", "main")
            .unwrap();
        assert_eq!(names, vec!["orders:doc_3"]);
    }

    #[test]
    fn test_write_batch_spans_kinds() {
        let (storage, _temp) = create_test_storage();
        storage
            .put_json(ResourceKind::History, &key("people:old"), &json!([]))
            .unwrap();

        let mut batch = StorageBatch::new();
        batch
            .put_json(ResourceKind::Collection, &key("people"), &json!([{"a": 1}]))
            .unwrap();
        batch
            .put_json(ResourceKind::Graph, &key("graph"), &json!({"nodes": [], "edges": []}))
            .unwrap();
        batch.delete(ResourceKind::History, &key("people:old"));
        assert_eq!(batch.len(), 3);
        storage.write_batch(batch).unwrap();

        assert!(storage.exists(ResourceKind::Collection, &key("people")).unwrap());
        assert!(storage.exists(ResourceKind::Graph, &key("graph")).unwrap());
        assert!(!storage.exists(ResourceKind::History, &key("people:old")).unwrap());
    }

    #[test]
    fn test_stats_and_admin() {
        let (storage, _temp) = create_test_storage();
        storage
            .put_json(ResourceKind::Collection, &key("people"), &json!([]))
            .unwrap();
        storage
            .put_json(ResourceKind::Memory, &key("memories"), &json!([]))
            .unwrap();
        storage.flush().unwrap();
        storage.compact().unwrap();

        let stats = storage.get_stats().unwrap();
        assert_eq!(stats.collection_count, 1);
        assert_eq!(stats.memory_count, 1);
        assert_eq!(stats.graph_count, 0);
    }
}
