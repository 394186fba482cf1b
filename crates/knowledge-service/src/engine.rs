//! Engine instance: storage, lock registry and shared helpers.

use std::sync::Arc;

use knowledge_memory::MemoryStore;
use knowledge_storage::{ResourceKey, ResourceKind, ResourceLocks, Storage, StorageBatch};
use knowledge_types::{Document, Graph, HistorySnapshot, Settings};
use knowledge_vector::IndexManager;
use tracing::{debug, info, warn};

use crate::error::ServiceError;

/// Name of the per-database graph blob.
pub(crate) const GRAPH_BLOB: &str = "graph";

/// One knowledge engine over one RocksDB instance.
///
/// All mutable state lives in storage; the lock registry is owned by the
/// instance, so two engines in one process never contend or interfere.
pub struct KnowledgeEngine {
    pub(crate) storage: Arc<Storage>,
    pub(crate) locks: Arc<ResourceLocks>,
    pub(crate) settings: Settings,
    pub(crate) indexes: IndexManager,
    pub(crate) memory: MemoryStore,
}

impl KnowledgeEngine {
    /// Open (or create) storage at the configured data directory.
    pub fn open(settings: Settings) -> Result<Self, ServiceError> {
        let path = settings.expanded_data_dir();
        std::fs::create_dir_all(&path)?;
        let storage = Arc::new(Storage::open(&path)?);
        info!(path = %path.display(), "Knowledge engine ready");
        Ok(Self::with_storage(storage, settings))
    }

    /// Build an engine over already opened storage.
    pub fn with_storage(storage: Arc<Storage>, settings: Settings) -> Self {
        let locks = Arc::new(ResourceLocks::new());
        let indexes = IndexManager::new(storage.clone(), locks.clone(), settings.vector.clone());
        let memory = MemoryStore::new(
            storage.clone(),
            locks.clone(),
            settings.max_memory_items_per_agent,
        );
        Self {
            storage,
            locks,
            settings,
            indexes,
            memory,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    /// Vector and field index manager.
    pub fn indexes(&self) -> &IndexManager {
        &self.indexes
    }

    /// Agent memory store.
    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub(crate) fn collection_key(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
    ) -> Result<ResourceKey, ServiceError> {
        validate_collection_name(collection)?;
        Ok(ResourceKey::new(tenant, database, collection)?)
    }

    pub(crate) fn graph_key(&self, tenant: &str, database: &str) -> Result<ResourceKey, ServiceError> {
        Ok(ResourceKey::new(tenant, database, GRAPH_BLOB)?)
    }

    /// History blobs are named `{collection}:{docId}`.
    pub(crate) fn history_key(
        &self,
        collection_key: &ResourceKey,
        doc_id: &str,
    ) -> Result<ResourceKey, ServiceError> {
        Ok(collection_key.sibling(&format!("{}:{}", collection_key.name, doc_id))?)
    }

    pub(crate) fn load_documents(&self, key: &ResourceKey) -> Result<Vec<Document>, ServiceError> {
        Ok(self
            .storage
            .get_json(ResourceKind::Collection, key)?
            .unwrap_or_default())
    }

    pub(crate) fn load_graph(&self, key: &ResourceKey) -> Result<Graph, ServiceError> {
        Ok(self
            .storage
            .get_json(ResourceKind::Graph, key)?
            .unwrap_or_default())
    }

    pub(crate) fn load_history(&self, key: &ResourceKey) -> Result<Vec<HistorySnapshot>, ServiceError> {
        Ok(self
            .storage
            .get_json(ResourceKind::History, key)?
            .unwrap_or_default())
    }

    /// Write a collection, its touched histories and the graph in one batch.
    pub(crate) fn commit(
        &self,
        collection_key: &ResourceKey,
        documents: &[Document],
        histories: &[(ResourceKey, Vec<HistorySnapshot>)],
        graph_key: &ResourceKey,
        graph: &Graph,
    ) -> Result<(), ServiceError> {
        let mut batch = StorageBatch::new();
        batch.put_json(ResourceKind::Collection, collection_key, &documents)?;
        for (key, history) in histories {
            batch.put_json(ResourceKind::History, key, history)?;
        }
        batch.put_json(ResourceKind::Graph, graph_key, graph)?;
        let ops = batch.len();
        self.storage.write_batch(batch)?;
        debug!(collection = %collection_key.name, ops, "Committed mutation");
        Ok(())
    }

    /// Rebuild a collection's indexes after a write. Failures are logged and
    /// swallowed; the write has already succeeded and a later rebuild fixes
    /// the index.
    pub(crate) fn refresh_indexes(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
        documents: &[Document],
    ) {
        if let Err(e) = self
            .indexes
            .rebuild_indexes(tenant, database, collection, documents)
        {
            warn!(collection, error = %e, "Index refresh failed");
        }
    }
}

/// Collection names must be non-empty and free of `:`, which separates the
/// collection from the document id in history keys.
pub(crate) fn validate_collection_name(name: &str) -> Result<(), ServiceError> {
    if name.trim().is_empty() {
        return Err(ServiceError::InvalidInput(
            "collection name must not be empty".to_string(),
        ));
    }
    if name.contains(':') {
        return Err(ServiceError::InvalidInput(format!(
            "collection name '{}' must not contain ':'",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    pub fn create_test_engine() -> (KnowledgeEngine, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp_dir.path()).unwrap());
        let engine = KnowledgeEngine::with_storage(storage, Settings::default());
        (engine, temp_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_name_validation() {
        assert!(validate_collection_name("employees").is_ok());
        assert!(validate_collection_name("").is_err());
        assert!(validate_collection_name("a:b").is_err());
    }

    #[test]
    fn test_history_key_embeds_collection() {
        let (engine, _dir) = test_support::create_test_engine();
        let ckey = engine.collection_key("t1", "db", "people").unwrap();
        let hkey = engine.history_key(&ckey, "doc_1").unwrap();
        assert_eq!(hkey.name, "people:doc_1");
        assert_eq!(hkey.tenant, "t1");
    }
}
