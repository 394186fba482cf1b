//! Document store operations.
//!
//! Every mutation follows the same protocol under the collection lock (and
//! the graph lock inside it):
//! 1. Load the collection and compute the new documents in memory; any
//!    validation failure returns here with nothing written
//! 2. Snapshot each changed document's prior state into its history
//! 3. Re-derive the changed documents' graph entities
//! 4. Commit collection, histories and graph in one write batch
//! 5. Refresh the collection's indexes, best effort

use knowledge_graph::{process_delete, process_insert, process_update, remove_collection};
use knowledge_query::{
    query_documents, stamp_mutation, Filter, FindOptions, QueryPage, Update,
};
use knowledge_storage::{ResourceKey, ResourceKind, StorageBatch};
use knowledge_types::{
    doc_id, doc_version, now_timestamp, push_bounded, stamp_new, validate_document, ChangeEvent,
    Document, Graph, HistorySnapshot, FIELD_CREATED_AT, FIELD_ID, FIELD_UPDATED_AT,
    FIELD_VERSION,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use tracing::{debug, info, instrument};

use crate::engine::KnowledgeEngine;
use crate::error::ServiceError;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertResult {
    pub inserted_count: usize,
    pub inserted_ids: Vec<String>,
    #[serde(skip)]
    pub events: Vec<ChangeEvent>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateResult {
    pub matched_count: usize,
    pub modified_count: usize,
    #[serde(skip)]
    pub events: Vec<ChangeEvent>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResult {
    pub deleted_count: usize,
    #[serde(skip)]
    pub events: Vec<ChangeEvent>,
}

/// A document's current version and retained snapshots, oldest first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryView {
    pub doc_id: String,
    pub current_version: u64,
    pub history: Vec<HistorySnapshot>,
}

#[derive(Debug, Clone)]
pub enum RollbackOutcome {
    DocumentNotFound,
    VersionNotFound(u64),
    /// The restored document, now at a new version
    Restored(ChangeEvent),
}

/// A document's state change computed but not yet committed.
struct Pending {
    index: usize,
    document: Document,
}

impl KnowledgeEngine {
    /// Snapshot `prior` into its history, keeping the configured maximum.
    fn snapshot(
        &self,
        collection_key: &ResourceKey,
        prior: &Document,
    ) -> Result<(ResourceKey, Vec<HistorySnapshot>), ServiceError> {
        let id = doc_id(prior).unwrap_or_default();
        let key = self.history_key(collection_key, id)?;
        let mut history = self.load_history(&key)?;
        push_bounded(
            &mut history,
            HistorySnapshot::new(doc_version(prior), prior.clone(), now_timestamp()),
            self.settings.history_limit,
        );
        Ok((key, history))
    }

    /// Snapshot, re-derive graph entities, swap in and commit a set of
    /// computed changes. Returns the resulting update events.
    fn apply_pending(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
        collection_key: &ResourceKey,
        documents: &mut Vec<Document>,
        pending: Vec<Pending>,
    ) -> Result<Vec<ChangeEvent>, ServiceError> {
        let mut histories = Vec::with_capacity(pending.len());
        for change in &pending {
            histories.push(self.snapshot(collection_key, &documents[change.index])?);
        }

        let graph_key = self.graph_key(tenant, database)?;
        let events = self.locks.with_lock(ResourceKind::Graph, &graph_key, || {
            let mut graph = self.load_graph(&graph_key)?;
            let mut events = Vec::with_capacity(pending.len());
            for change in pending {
                process_update(&mut graph, &change.document, collection);
                events.push(ChangeEvent::updated(collection, change.document.clone()));
                documents[change.index] = change.document;
            }
            self.commit(collection_key, documents, &histories, &graph_key, &graph)?;
            Ok::<_, ServiceError>(events)
        })?;

        self.refresh_indexes(tenant, database, collection, documents);
        Ok(events)
    }

    /// Insert a batch of documents. The whole batch is validated first; one
    /// invalid document rejects the batch.
    #[instrument(skip(self, documents), fields(count = documents.len()))]
    pub fn insert(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
        documents: Vec<Value>,
    ) -> Result<InsertResult, ServiceError> {
        if documents.is_empty() {
            return Err(ServiceError::InvalidInput("No documents provided".to_string()));
        }
        let bodies = documents
            .into_iter()
            .map(validate_document)
            .collect::<Result<Vec<_>, _>>()?;
        self.insert_bodies(tenant, database, collection, bodies)
    }

    /// Insert already validated document bodies.
    pub(crate) fn insert_bodies(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
        bodies: Vec<Document>,
    ) -> Result<InsertResult, ServiceError> {
        let collection_key = self.collection_key(tenant, database, collection)?;
        let graph_key = self.graph_key(tenant, database)?;
        let stamped: Vec<Document> = bodies.into_iter().map(stamp_new).collect();

        self.locks.with_lock(ResourceKind::Collection, &collection_key, || {
            let mut documents = self.load_documents(&collection_key)?;
            documents.extend(stamped.iter().cloned());

            self.locks.with_lock(ResourceKind::Graph, &graph_key, || {
                let mut graph = self.load_graph(&graph_key)?;
                for doc in &stamped {
                    let change = process_insert(&mut graph, doc, collection);
                    debug!(nodes = change.nodes_added, edges = change.edges_added, "Graph updated");
                }
                self.commit(&collection_key, &documents, &[], &graph_key, &graph)
            })?;

            self.refresh_indexes(tenant, database, collection, &documents);
            Ok::<_, ServiceError>(())
        })?;

        let inserted_ids: Vec<String> = stamped
            .iter()
            .filter_map(|d| doc_id(d).map(str::to_string))
            .collect();
        info!(collection, count = inserted_ids.len(), "Inserted documents");

        Ok(InsertResult {
            inserted_count: inserted_ids.len(),
            inserted_ids,
            events: stamped
                .into_iter()
                .map(|d| ChangeEvent::inserted(collection, d))
                .collect(),
        })
    }

    /// Filtered, sorted, paginated read.
    pub fn find(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
        filter: &Value,
        options: &FindOptions,
    ) -> Result<QueryPage, ServiceError> {
        let filter = Filter::parse(filter)?;
        let key = self.collection_key(tenant, database, collection)?;
        let documents = self.load_documents(&key)?;
        Ok(query_documents(&documents, &filter, options))
    }

    pub fn find_by_id(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, ServiceError> {
        let key = self.collection_key(tenant, database, collection)?;
        Ok(self
            .load_documents(&key)?
            .into_iter()
            .find(|d| doc_id(d) == Some(id)))
    }

    pub fn count(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
        filter: &Value,
    ) -> Result<usize, ServiceError> {
        let filter = Filter::parse(filter)?;
        let key = self.collection_key(tenant, database, collection)?;
        Ok(self
            .load_documents(&key)?
            .iter()
            .filter(|d| filter.matches(d))
            .count())
    }

    /// Apply an update to the first (or, with `multi`, every) matching
    /// document.
    #[instrument(skip(self, filter, update))]
    pub fn update(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
        filter: &Value,
        update: &Value,
        multi: bool,
    ) -> Result<UpdateResult, ServiceError> {
        let filter = Filter::parse(filter)?;
        let update = Update::parse(update)?;
        let collection_key = self.collection_key(tenant, database, collection)?;

        self.locks.with_lock(ResourceKind::Collection, &collection_key, || {
            let mut documents = self.load_documents(&collection_key)?;
            let mut pending = Vec::new();
            for (index, doc) in documents.iter().enumerate() {
                if filter.matches(doc) {
                    pending.push(Pending {
                        index,
                        document: update.apply(doc)?,
                    });
                    if !multi {
                        break;
                    }
                }
            }
            if pending.is_empty() {
                return Ok(UpdateResult::default());
            }

            let matched = pending.len();
            let events = self.apply_pending(
                tenant,
                database,
                collection,
                &collection_key,
                &mut documents,
                pending,
            )?;
            debug!(collection, matched, "Updated documents");
            Ok(UpdateResult {
                matched_count: matched,
                modified_count: events.len(),
                events,
            })
        })
    }

    /// Replace a document's client fields wholesale, keeping `_id` and
    /// `_createdAt`. With `expected_version`, a stale version is a
    /// [`ServiceError::Conflict`]. `None` when the document does not exist.
    #[instrument(skip(self, body))]
    pub fn replace(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
        id: &str,
        body: Value,
        expected_version: Option<u64>,
    ) -> Result<Option<ChangeEvent>, ServiceError> {
        let body = validate_document(body)?;
        let collection_key = self.collection_key(tenant, database, collection)?;

        self.locks.with_lock(ResourceKind::Collection, &collection_key, || {
            let mut documents = self.load_documents(&collection_key)?;
            let Some(index) = documents.iter().position(|d| doc_id(d) == Some(id)) else {
                return Ok(None);
            };
            let current = &documents[index];
            let version = doc_version(current);
            if let Some(expected) = expected_version {
                if expected != version {
                    return Err(ServiceError::Conflict {
                        doc_id: id.to_string(),
                        expected,
                        actual: version,
                    });
                }
            }

            let mut replaced = Document::new();
            replaced.insert(FIELD_ID.to_string(), Value::String(id.to_string()));
            replaced.extend(body);
            if let Some(created) = current.get(FIELD_CREATED_AT) {
                replaced.insert(FIELD_CREATED_AT.to_string(), created.clone());
            }
            replaced.insert(FIELD_UPDATED_AT.to_string(), Value::String(now_timestamp()));
            replaced.insert(FIELD_VERSION.to_string(), Value::from(version + 1));

            let events = self.apply_pending(
                tenant,
                database,
                collection,
                &collection_key,
                &mut documents,
                vec![Pending {
                    index,
                    document: replaced,
                }],
            )?;
            Ok(events.into_iter().next())
        })
    }

    /// Shallow-merge client fields into a document. `None` when the document
    /// does not exist.
    #[instrument(skip(self, fields))]
    pub fn patch(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<Option<ChangeEvent>, ServiceError> {
        let fields = validate_document(fields)?;
        let collection_key = self.collection_key(tenant, database, collection)?;

        self.locks.with_lock(ResourceKind::Collection, &collection_key, || {
            let mut documents = self.load_documents(&collection_key)?;
            let Some(index) = documents.iter().position(|d| doc_id(d) == Some(id)) else {
                return Ok(None);
            };

            let mut patched = documents[index].clone();
            patched.extend(fields);
            stamp_mutation(&mut patched);

            let events = self.apply_pending(
                tenant,
                database,
                collection,
                &collection_key,
                &mut documents,
                vec![Pending {
                    index,
                    document: patched,
                }],
            )?;
            Ok(events.into_iter().next())
        })
    }

    /// Delete the first (or, with `multi`, every) matching document along
    /// with the graph entities it introduced. History is retained until the
    /// collection is dropped.
    #[instrument(skip(self, filter))]
    pub fn delete(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
        filter: &Value,
        multi: bool,
    ) -> Result<DeleteResult, ServiceError> {
        let filter = Filter::parse(filter)?;
        self.delete_matching(tenant, database, collection, |d| filter.matches(d), multi)
    }

    pub fn delete_by_id(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
        id: &str,
    ) -> Result<Option<ChangeEvent>, ServiceError> {
        let result = self.delete_matching(tenant, database, collection, |d| doc_id(d) == Some(id), false)?;
        Ok(result.events.into_iter().next())
    }

    fn delete_matching(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
        matches: impl Fn(&Document) -> bool,
        multi: bool,
    ) -> Result<DeleteResult, ServiceError> {
        let collection_key = self.collection_key(tenant, database, collection)?;
        let graph_key = self.graph_key(tenant, database)?;

        self.locks.with_lock(ResourceKind::Collection, &collection_key, || {
            let documents = self.load_documents(&collection_key)?;
            let mut removed = Vec::new();
            let mut remaining = Vec::with_capacity(documents.len());
            for doc in documents {
                if matches(&doc) && (multi || removed.is_empty()) {
                    removed.push(doc);
                } else {
                    remaining.push(doc);
                }
            }
            if removed.is_empty() {
                return Ok(DeleteResult::default());
            }

            self.locks.with_lock(ResourceKind::Graph, &graph_key, || {
                let mut graph = self.load_graph(&graph_key)?;
                for doc in &removed {
                    if let Some(id) = doc_id(doc) {
                        process_delete(&mut graph, id);
                    }
                }
                self.commit(&collection_key, &remaining, &[], &graph_key, &graph)
            })?;
            self.refresh_indexes(tenant, database, collection, &remaining);

            info!(collection, deleted = removed.len(), "Deleted documents");
            Ok(DeleteResult {
                deleted_count: removed.len(),
                events: removed
                    .into_iter()
                    .map(|d| ChangeEvent::deleted(collection, d))
                    .collect(),
            })
        })
    }

    /// Restore a historical version as a new version. The pre-rollback state
    /// is snapshotted first, so rollback itself can be rolled back.
    #[instrument(skip(self))]
    pub fn rollback(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
        id: &str,
        version: u64,
    ) -> Result<RollbackOutcome, ServiceError> {
        let collection_key = self.collection_key(tenant, database, collection)?;

        self.locks.with_lock(ResourceKind::Collection, &collection_key, || {
            let mut documents = self.load_documents(&collection_key)?;
            let Some(index) = documents.iter().position(|d| doc_id(d) == Some(id)) else {
                return Ok(RollbackOutcome::DocumentNotFound);
            };
            let history = self.load_history(&self.history_key(&collection_key, id)?)?;
            let Some(target) = history.iter().rev().find(|h| h.version == version) else {
                return Ok(RollbackOutcome::VersionNotFound(version));
            };

            let next_version = doc_version(&documents[index]) + 1;
            let mut restored = target.snapshot.clone();
            restored.insert(FIELD_ID.to_string(), Value::String(id.to_string()));
            restored.insert(FIELD_UPDATED_AT.to_string(), Value::String(now_timestamp()));
            restored.insert(FIELD_VERSION.to_string(), Value::from(next_version));

            let mut events = self.apply_pending(
                tenant,
                database,
                collection,
                &collection_key,
                &mut documents,
                vec![Pending {
                    index,
                    document: restored,
                }],
            )?;
            info!(collection, id, version, next_version, "Rolled back document");
            match events.pop() {
                Some(event) => Ok(RollbackOutcome::Restored(event)),
                None => Ok(RollbackOutcome::DocumentNotFound),
            }
        })
    }

    /// Current version and retained history. `None` when the document does
    /// not exist.
    pub fn history(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
        id: &str,
    ) -> Result<Option<HistoryView>, ServiceError> {
        let collection_key = self.collection_key(tenant, database, collection)?;
        let Some(doc) = self.find_by_id(tenant, database, collection, id)? else {
            return Ok(None);
        };
        let history = self.load_history(&self.history_key(&collection_key, id)?)?;
        Ok(Some(HistoryView {
            doc_id: id.to_string(),
            current_version: doc_version(&doc).max(1),
            history,
        }))
    }

    pub fn list_collections(&self, tenant: &str, database: &str) -> Result<Vec<String>, ServiceError> {
        Ok(self
            .storage
            .list_names(ResourceKind::Collection, tenant, database)?)
    }

    /// Create an empty collection. Returns false if it already existed.
    pub fn create_collection(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
    ) -> Result<bool, ServiceError> {
        let key = self.collection_key(tenant, database, collection)?;
        self.locks.with_lock(ResourceKind::Collection, &key, || {
            if self.storage.exists(ResourceKind::Collection, &key)? {
                return Ok(false);
            }
            self.storage
                .put_json(ResourceKind::Collection, &key, &Vec::<Document>::new())?;
            info!(collection, "Created collection");
            Ok(true)
        })
    }

    /// Drop a collection with its histories, indexes and graph entities.
    /// Returns false if it did not exist.
    #[instrument(skip(self))]
    pub fn drop_collection(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
    ) -> Result<bool, ServiceError> {
        let collection_key = self.collection_key(tenant, database, collection)?;
        let graph_key = self.graph_key(tenant, database)?;

        self.locks.with_lock(ResourceKind::Collection, &collection_key, || {
            if !self.storage.exists(ResourceKind::Collection, &collection_key)? {
                return Ok(false);
            }
            let documents = self.load_documents(&collection_key)?;
            let ids: HashSet<String> = documents
                .iter()
                .filter_map(|d| doc_id(d).map(str::to_string))
                .collect();

            self.locks.with_lock(ResourceKind::Graph, &graph_key, || {
                let mut graph: Graph = self.load_graph(&graph_key)?;
                let change = remove_collection(&mut graph, collection, &ids);
                let mut batch = StorageBatch::new();
                batch.delete(ResourceKind::Collection, &collection_key);
                batch.put_json(ResourceKind::Graph, &graph_key, &graph)?;
                self.storage.write_batch(batch)?;
                debug!(nodes = change.nodes_removed, edges = change.edges_removed, "Graph pruned");
                Ok::<_, ServiceError>(())
            })?;

            let histories = self.storage.delete_prefix(
                ResourceKind::History,
                tenant,
                database,
                &format!("{}:", collection),
            )?;
            self.indexes.drop_indexes(tenant, database, collection)?;
            info!(collection, documents = ids.len(), histories, "Dropped collection");
            Ok(true)
        })
    }
}
