//! Index manager.
//!
//! Owns the persisted vector and field indexes of every collection. Indexes
//! are replaced whole by [`IndexManager::rebuild_indexes`]; every read loads
//! the current blob. A missing vector index is an expected state (the
//! collection was never indexed) and is reported as a value, not an error.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use knowledge_storage::{ResourceKey, ResourceKind, ResourceLocks, Storage};
use knowledge_types::{doc_id, now_timestamp, Document, VectorSettings};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument};

use crate::embedding::{embedding_text, VECTOR_DIMENSION};
use crate::error::VectorError;
use crate::index::{EmbeddingStats, FieldIndex, VectorHit, VectorIndex};

/// Result of [`IndexManager::rebuild_indexes`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildSummary {
    pub vector_index_size: usize,
    pub field_index_size: usize,
    pub timestamp: String,
}

/// Ranked vector search hits for one collection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorSearchResults {
    pub results: Vec<VectorHit>,
    pub count: usize,
    pub query_keywords: Vec<String>,
}

/// Vector search outcome. Searching before any index exists is not an error.
#[derive(Debug, Clone)]
pub enum VectorSearchOutcome {
    NoIndex,
    Found(VectorSearchResults),
}

impl VectorSearchOutcome {
    /// Hits, or nothing when no index exists.
    pub fn hits(&self) -> &[VectorHit] {
        match self {
            VectorSearchOutcome::NoIndex => &[],
            VectorSearchOutcome::Found(found) => &found.results,
        }
    }

    pub fn into_hits(self) -> Vec<VectorHit> {
        match self {
            VectorSearchOutcome::NoIndex => Vec::new(),
            VectorSearchOutcome::Found(found) => found.results,
        }
    }

    /// JSON form used by the CLI and batch search output.
    pub fn to_json(&self) -> Value {
        match self {
            VectorSearchOutcome::NoIndex => {
                json!({"results": [], "count": 0, "error": "Vector index not found"})
            }
            VectorSearchOutcome::Found(found) => json!(found),
        }
    }
}

/// Vector hits narrowed by exact field filters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CombinedResults {
    pub results: Vec<VectorHit>,
    /// Matches after filtering, before truncation to `top_k`
    pub count: usize,
    pub applied_filters: usize,
}

/// Documents similar to a base document.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendations {
    pub recommendations: Vec<VectorHit>,
    pub count: usize,
    pub base_doc_id: String,
}

#[derive(Debug, Clone)]
pub enum RecommendationOutcome {
    DocumentNotFound,
    NoIndex,
    Found(Recommendations),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorIndexStats {
    pub size: usize,
    pub dimensions: usize,
    pub stats: EmbeddingStats,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldIndexStats {
    pub size: usize,
    pub indexed_fields: Vec<String>,
    pub created_at: String,
}

/// Index statistics; `None` for an index that was never built.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub vector: Option<VectorIndexStats>,
    pub field: Option<FieldIndexStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = VectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(VectorError::InvalidFormat(other.to_string())),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Json => write!(f, "json"),
            ExportFormat::Csv => write!(f, "csv"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum EmbeddingExport {
    Json(Value),
    Csv(String),
}

/// Builds, stores and queries per-collection indexes.
pub struct IndexManager {
    storage: Arc<Storage>,
    locks: Arc<ResourceLocks>,
    settings: VectorSettings,
}

impl IndexManager {
    pub fn new(storage: Arc<Storage>, locks: Arc<ResourceLocks>, settings: VectorSettings) -> Self {
        Self {
            storage,
            locks,
            settings,
        }
    }

    fn key(tenant: &str, database: &str, collection: &str) -> Result<ResourceKey, VectorError> {
        Ok(ResourceKey::new(tenant, database, collection)?)
    }

    /// Recompute both indexes from the full document set. Idempotent.
    #[instrument(skip(self, documents), fields(docs = documents.len()))]
    pub fn rebuild_indexes(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
        documents: &[Document],
    ) -> Result<RebuildSummary, VectorError> {
        let key = Self::key(tenant, database, collection)?;
        let vector_index = VectorIndex::build(collection, documents, self.settings.corpus_idf);
        let field_index = FieldIndex::build(collection, documents);

        let summary = RebuildSummary {
            vector_index_size: vector_index.len(),
            field_index_size: field_index.fields.len(),
            timestamp: now_timestamp(),
        };

        self.locks.with_lock(ResourceKind::VectorIndex, &key, || {
            self.storage
                .put_json(ResourceKind::VectorIndex, &key, &vector_index)?;
            self.storage
                .put_json(ResourceKind::FieldIndex, &key, &field_index)?;
            Ok::<_, VectorError>(())
        })?;

        info!(
            collection,
            vectors = summary.vector_index_size,
            fields = summary.field_index_size,
            "Rebuilt indexes"
        );
        Ok(summary)
    }

    /// Remove both indexes of a collection.
    pub fn drop_indexes(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
    ) -> Result<(), VectorError> {
        let key = Self::key(tenant, database, collection)?;
        self.locks.with_lock(ResourceKind::VectorIndex, &key, || {
            self.storage.delete(ResourceKind::VectorIndex, &key)?;
            self.storage.delete(ResourceKind::FieldIndex, &key)?;
            Ok::<_, VectorError>(())
        })?;
        debug!(collection, "Dropped indexes");
        Ok(())
    }

    pub fn load_vector_index(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
    ) -> Result<Option<VectorIndex>, VectorError> {
        let key = Self::key(tenant, database, collection)?;
        let index: Option<VectorIndex> = self.storage.get_json(ResourceKind::VectorIndex, &key)?;
        if let Some(index) = &index {
            if index.dimension != VECTOR_DIMENSION {
                return Err(VectorError::DimensionMismatch {
                    expected: VECTOR_DIMENSION,
                    actual: index.dimension,
                });
            }
        }
        Ok(index)
    }

    pub fn load_field_index(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
    ) -> Result<Option<FieldIndex>, VectorError> {
        let key = Self::key(tenant, database, collection)?;
        Ok(self.storage.get_json(ResourceKind::FieldIndex, &key)?)
    }

    /// Embed `query` and rank the collection's indexed documents.
    #[instrument(skip(self))]
    pub fn vector_search(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
        query: &str,
        top_k: usize,
    ) -> Result<VectorSearchOutcome, VectorError> {
        let Some(index) = self.load_vector_index(tenant, database, collection)? else {
            debug!(collection, "No vector index");
            return Ok(VectorSearchOutcome::NoIndex);
        };

        let embedding = index.embed_query(query);
        let results = index.search(&embedding, top_k, self.settings.lsh_prefix_bits);
        Ok(VectorSearchOutcome::Found(VectorSearchResults {
            count: results.len(),
            results,
            query_keywords: embedding.keywords,
        }))
    }

    /// Ids of documents whose `field` equals `value` exactly. Empty when the
    /// collection or field is not indexed.
    pub fn field_filter(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<String>, VectorError> {
        Ok(self
            .load_field_index(tenant, database, collection)?
            .map(|index| index.lookup(field, value).to_vec())
            .unwrap_or_default())
    }

    /// Vector search over `2 * top_k` candidates, narrowed to documents
    /// matching every field filter. `None` when no vector index exists.
    pub fn combined_search(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
        query: &str,
        filters: &Map<String, Value>,
        top_k: usize,
    ) -> Result<Option<CombinedResults>, VectorError> {
        let outcome = self.vector_search(
            tenant,
            database,
            collection,
            query,
            top_k.saturating_mul(2),
        )?;
        let VectorSearchOutcome::Found(found) = outcome else {
            return Ok(None);
        };

        let mut filtered = found.results;
        if !filters.is_empty() {
            let field_index = self.load_field_index(tenant, database, collection)?;
            for (field, value) in filters {
                let allowed: HashSet<&str> = field_index
                    .as_ref()
                    .map(|index| index.lookup(field, value).iter().map(String::as_str).collect())
                    .unwrap_or_default();
                filtered.retain(|hit| allowed.contains(hit.doc_id.as_str()));
            }
        }

        let count = filtered.len();
        filtered.truncate(top_k);
        Ok(Some(CombinedResults {
            results: filtered,
            count,
            applied_filters: filters.len(),
        }))
    }

    /// Documents most similar to `doc_id`, excluding itself.
    pub fn recommendations(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
        documents: &[Document],
        base_doc_id: &str,
        top_k: usize,
    ) -> Result<RecommendationOutcome, VectorError> {
        let Some(target) = documents.iter().find(|d| doc_id(d) == Some(base_doc_id)) else {
            return Ok(RecommendationOutcome::DocumentNotFound);
        };
        let Some(index) = self.load_vector_index(tenant, database, collection)? else {
            return Ok(RecommendationOutcome::NoIndex);
        };

        let embedding = index.embed_query(&embedding_text(target));
        let recommendations: Vec<VectorHit> = index
            .search(&embedding, top_k + 1, self.settings.lsh_prefix_bits)
            .into_iter()
            .filter(|hit| hit.doc_id != base_doc_id)
            .take(top_k)
            .collect();

        Ok(RecommendationOutcome::Found(Recommendations {
            count: recommendations.len(),
            recommendations,
            base_doc_id: base_doc_id.to_string(),
        }))
    }

    pub fn index_stats(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
    ) -> Result<IndexStats, VectorError> {
        let vector = self
            .load_vector_index(tenant, database, collection)?
            .map(|index| VectorIndexStats {
                size: index.len(),
                dimensions: index.dimension,
                stats: index.stats,
                created_at: index.created_at,
            });
        let field = self
            .load_field_index(tenant, database, collection)?
            .map(|index| FieldIndexStats {
                size: index.document_count,
                indexed_fields: index.indexed_fields(),
                created_at: index.created_at,
            });
        Ok(IndexStats { vector, field })
    }

    /// Vector search across several collections, in the order given.
    pub fn batch_vector_search(
        &self,
        tenant: &str,
        database: &str,
        collections: &[String],
        query: &str,
        top_k: usize,
    ) -> Result<Vec<(String, VectorSearchOutcome)>, VectorError> {
        collections
            .iter()
            .map(|collection| {
                self.vector_search(tenant, database, collection, query, top_k)
                    .map(|outcome| (collection.clone(), outcome))
            })
            .collect()
    }

    /// Export a collection's embeddings. `None` when no index exists.
    pub fn export_embeddings(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
        format: ExportFormat,
    ) -> Result<Option<EmbeddingExport>, VectorError> {
        let Some(index) = self.load_vector_index(tenant, database, collection)? else {
            return Ok(None);
        };

        let export = match format {
            ExportFormat::Csv => {
                let mut out = String::from("docId,keywords,vectorDimension\n");
                let rows: Vec<String> = index
                    .records
                    .iter()
                    .map(|r| {
                        format!(
                            "{},\"{}\",{}",
                            r.doc_id,
                            r.embedding.keywords.join(", "),
                            r.embedding.vector.len()
                        )
                    })
                    .collect();
                out.push_str(&rows.join("\n"));
                EmbeddingExport::Csv(out)
            }
            ExportFormat::Json => {
                let embeddings: Vec<Value> = index
                    .records
                    .iter()
                    .map(|r| {
                        json!({
                            "docId": r.doc_id,
                            "keywords": r.embedding.keywords,
                            "vector": r.embedding.vector,
                        })
                    })
                    .collect();
                EmbeddingExport::Json(json!({
                    "collection": collection,
                    "documentCount": index.len(),
                    "vectorDimension": index.dimension,
                    "embeddings": embeddings,
                }))
            }
        };
        Ok(Some(export))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_manager() -> (IndexManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(Storage::open(temp_dir.path()).unwrap());
        let manager = IndexManager::new(
            storage,
            Arc::new(ResourceLocks::new()),
            VectorSettings::default(),
        );
        (manager, temp_dir)
    }

    fn sample() -> Vec<Document> {
        [
            json!({"_id": "a", "content": "rust storage engine with column families", "team": "core"}),
            json!({"_id": "b", "content": "graph traversal and shortest path search", "team": "graph"}),
            json!({"_id": "c", "content": "rust graph engine for storage layers", "team": "core"}),
        ]
        .into_iter()
        .map(|v| match v {
            Value::Object(map) => map,
            _ => unreachable!(),
        })
        .collect()
    }

    #[test]
    fn test_search_before_build_reports_no_index() {
        let (manager, _dir) = create_test_manager();
        let outcome = manager
            .vector_search("t1", "db", "notes", "rust", 5)
            .unwrap();
        assert!(matches!(outcome, VectorSearchOutcome::NoIndex));
        assert!(outcome.hits().is_empty());
        assert_eq!(outcome.to_json()["error"], "Vector index not found");
    }

    #[test]
    fn test_rebuild_then_search() {
        let (manager, _dir) = create_test_manager();
        let summary = manager
            .rebuild_indexes("t1", "db", "notes", &sample())
            .unwrap();
        assert_eq!(summary.vector_index_size, 3);
        assert_eq!(summary.field_index_size, 2);

        let outcome = manager
            .vector_search("t1", "db", "notes", "graph traversal and shortest path search", 2)
            .unwrap();
        let hits = outcome.hits();
        assert_eq!(hits[0].doc_id, "b");
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let (manager, _dir) = create_test_manager();
        manager.rebuild_indexes("t1", "db", "notes", &sample()).unwrap();
        let first = manager.load_vector_index("t1", "db", "notes").unwrap().unwrap();
        manager.rebuild_indexes("t1", "db", "notes", &sample()).unwrap();
        let second = manager.load_vector_index("t1", "db", "notes").unwrap().unwrap();
        assert_eq!(first.records, second.records);
        assert_eq!(first.idf, second.idf);
    }

    #[test]
    fn test_combined_search_applies_field_filters() {
        let (manager, _dir) = create_test_manager();
        manager.rebuild_indexes("t1", "db", "notes", &sample()).unwrap();

        let mut filters = Map::new();
        filters.insert("team".to_string(), json!("core"));
        let combined = manager
            .combined_search("t1", "db", "notes", "rust storage engine", &filters, 5)
            .unwrap()
            .unwrap();
        assert_eq!(combined.applied_filters, 1);
        assert!(combined.results.iter().all(|h| h.doc_id != "b"));
        assert!(!combined.results.is_empty());
    }

    #[test]
    fn test_field_filter_without_index_is_empty() {
        let (manager, _dir) = create_test_manager();
        let ids = manager
            .field_filter("t1", "db", "notes", "team", &json!("core"))
            .unwrap();
        assert!(ids.is_empty());
    }

    #[test]
    fn test_recommendations_exclude_base_document() {
        let (manager, _dir) = create_test_manager();
        let docs = sample();
        manager.rebuild_indexes("t1", "db", "notes", &docs).unwrap();

        let outcome = manager
            .recommendations("t1", "db", "notes", &docs, "a", 2)
            .unwrap();
        let RecommendationOutcome::Found(found) = outcome else {
            panic!("expected recommendations");
        };
        assert_eq!(found.base_doc_id, "a");
        assert!(found.recommendations.iter().all(|h| h.doc_id != "a"));
        assert!(found.count <= 2);

        let missing = manager
            .recommendations("t1", "db", "notes", &docs, "zzz", 2)
            .unwrap();
        assert!(matches!(missing, RecommendationOutcome::DocumentNotFound));
    }

    #[test]
    fn test_index_stats_and_drop() {
        let (manager, _dir) = create_test_manager();
        let empty = manager.index_stats("t1", "db", "notes").unwrap();
        assert!(empty.vector.is_none() && empty.field.is_none());

        manager.rebuild_indexes("t1", "db", "notes", &sample()).unwrap();
        let stats = manager.index_stats("t1", "db", "notes").unwrap();
        let vector = stats.vector.unwrap();
        assert_eq!(vector.size, 3);
        assert_eq!(vector.dimensions, VECTOR_DIMENSION);
        assert_eq!(stats.field.unwrap().indexed_fields, vec!["content", "team"]);

        manager.drop_indexes("t1", "db", "notes").unwrap();
        assert!(manager.load_vector_index("t1", "db", "notes").unwrap().is_none());
    }

    #[test]
    fn test_export_csv_and_json() {
        let (manager, _dir) = create_test_manager();
        assert!(manager
            .export_embeddings("t1", "db", "notes", ExportFormat::Csv)
            .unwrap()
            .is_none());

        manager.rebuild_indexes("t1", "db", "notes", &sample()).unwrap();
        let Some(EmbeddingExport::Csv(csv)) = manager
            .export_embeddings("t1", "db", "notes", ExportFormat::Csv)
            .unwrap()
        else {
            panic!("expected csv");
        };
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "docId,keywords,vectorDimension");
        assert_eq!(lines.len(), 4);
        assert!(lines[1].starts_with("a,\"rust, storage, engine"));
        assert!(lines[1].ends_with(",384"));

        let Some(EmbeddingExport::Json(json)) = manager
            .export_embeddings("t1", "db", "notes", ExportFormat::Json)
            .unwrap()
        else {
            panic!("expected json");
        };
        assert_eq!(json["documentCount"], 3);
        assert_eq!(json["embeddings"][0]["vector"].as_array().unwrap().len(), 384);
    }

    #[test]
    fn test_batch_search_keeps_collection_order() {
        let (manager, _dir) = create_test_manager();
        manager.rebuild_indexes("t1", "db", "notes", &sample()).unwrap();
        let collections = vec!["notes".to_string(), "missing".to_string()];
        let results = manager
            .batch_vector_search("t1", "db", &collections, "rust", 3)
            .unwrap();
        assert_eq!(results[0].0, "notes");
        assert!(matches!(results[1].1, VectorSearchOutcome::NoIndex));
    }

    #[test]
    fn test_export_format_parsing() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
