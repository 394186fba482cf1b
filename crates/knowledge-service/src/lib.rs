//! # knowledge-service
//!
//! The knowledge engine as one object.
//!
//! [`KnowledgeEngine`] ties the building blocks together:
//! - Document store: insert, find, update, replace, patch, delete, history
//!   and rollback, each mutation snapshotted and versioned
//! - Graph upkeep: every write re-derives the affected documents' entities
//! - Index refresh: vector and field indexes rebuilt best-effort after writes
//! - Search pipeline: keyword, graph, hybrid, enhanced and vector search
//! - Bulk import/export as JSON or CSV
//!
//! Mutations return [`knowledge_types::ChangeEvent`]s for callers that feed
//! webhooks, triggers or live subscribers. The engine delivers nothing itself.

pub mod documents;
pub mod engine;
pub mod error;
pub mod graph;
pub mod interchange;
pub mod search;

pub use documents::{DeleteResult, HistoryView, InsertResult, RollbackOutcome, UpdateResult};
pub use engine::KnowledgeEngine;
pub use error::ServiceError;
pub use interchange::{
    documents_to_csv, documents_to_json, parse_csv_documents, parse_json_documents,
    ImportIssue, ImportReport, InterchangeFormat,
};
pub use search::{
    EnhancedSearchHit, SearchHit, SimilarDocument, SimilarOutcome, VectorSearchHit,
};
