//! End-to-end test infrastructure for knowledgedb.
//!
//! Provides a shared TestHarness and fixture helpers for scenario tests
//! covering the write path (store, graph, indexes) through search.

use std::sync::Arc;

use serde_json::{json, Value};

use knowledge_service::KnowledgeEngine;
use knowledge_storage::Storage;
use knowledge_types::{doc_id, Document, Settings};

/// Tenant used by every scenario.
pub const TENANT: &str = "tenant-e2e";

/// Database used by every scenario.
pub const DATABASE: &str = "main";

/// Shared test harness for E2E tests.
///
/// Owns a temp directory with its own RocksDB instance and an engine over
/// it, so harnesses never share state.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    /// Shared storage instance
    pub storage: Arc<Storage>,
    pub engine: Arc<KnowledgeEngine>,
}

impl TestHarness {
    /// Create a new test harness with default settings.
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    pub fn with_settings(settings: Settings) -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let storage =
            Arc::new(Storage::open(temp_dir.path()).expect("Failed to open test storage"));
        let engine = Arc::new(KnowledgeEngine::with_storage(storage.clone(), settings));
        Self {
            _temp_dir: temp_dir,
            storage,
            engine,
        }
    }

    /// Insert documents and return their ids in input order.
    pub fn insert(&self, collection: &str, documents: Vec<Value>) -> Vec<String> {
        self.engine
            .insert(TENANT, DATABASE, collection, documents)
            .expect("Failed to insert documents")
            .inserted_ids
    }

    pub fn insert_one(&self, collection: &str, document: Value) -> String {
        self.insert(collection, vec![document]).remove(0)
    }

    pub fn get(&self, collection: &str, id: &str) -> Document {
        self.engine
            .find_by_id(TENANT, DATABASE, collection, id)
            .expect("Failed to read document")
            .expect("Document missing")
    }

    /// Apply an update to one document by id.
    pub fn update_by_id(&self, collection: &str, id: &str, update: Value) {
        let result = self
            .engine
            .update(TENANT, DATABASE, collection, &json!({ "_id": id }), &update, false)
            .expect("Failed to update document");
        assert_eq!(result.modified_count, 1, "update matched nothing");
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// The two-employee fixture: Bob and Carol on the Backend team.
pub fn backend_team() -> Vec<Value> {
    vec![
        json!({"name": "Bob Smith", "team": "Backend"}),
        json!({"name": "Carol Davis", "team": "Backend"}),
    ]
}

/// A small corpus of articles on distinct topics.
pub fn articles() -> Vec<Value> {
    vec![
        json!({
            "title": "Ownership in Rust",
            "body": "Rust ownership and the borrow checker give memory safety without garbage collection"
        }),
        json!({
            "title": "Django tips",
            "body": "Python web frameworks like Django and Flask speed up web development"
        }),
        json!({
            "title": "Query planning",
            "body": "Database query optimization with indexes and execution plans improves performance"
        }),
    ]
}

/// Ids of `documents`, skipping any without one.
pub fn ids_of(documents: &[Document]) -> Vec<String> {
    documents
        .iter()
        .filter_map(|d| doc_id(d).map(str::to_string))
        .collect()
}
