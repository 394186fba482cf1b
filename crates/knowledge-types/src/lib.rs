//! # knowledge-types
//!
//! Shared domain types for the knowledge engine.
//!
//! This crate defines the data structures every other crate agrees on:
//! - Documents: open JSON objects with engine-owned system fields
//! - History snapshots: bounded per-document version lineage
//! - Graph nodes and edges derived from documents
//! - Agent memory items
//! - Change events handed to outside collaborators
//! - Settings: layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use knowledge_types::{stamp_new, validate_document};
//! use serde_json::json;
//!
//! let doc = validate_document(json!({"name": "Bob Smith"})).unwrap();
//! let stored = stamp_new(doc);
//! assert_eq!(stored["_version"], 1);
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod event;
pub mod graph;
pub mod history;
pub mod memory;
pub mod text;

pub use config::{FusionWeights, SearchSettings, Settings, VectorSettings};
pub use document::{
    doc_id, doc_version, generate_id, is_system_field, now_timestamp, stamp_new,
    validate_document, Document, FIELD_CREATED_AT, FIELD_ID, FIELD_UPDATED_AT, FIELD_VERSION,
    RESERVED_FIELDS,
};
pub use error::KnowledgeError;
pub use event::{ChangeEvent, ChangeKind};
pub use graph::{Graph, GraphEdge, GraphNode, ENTITY_NODE_TYPE, MANUAL_SOURCE};
pub use history::{push_bounded, HistorySnapshot, DEFAULT_HISTORY_LIMIT};
pub use memory::MemoryItem;
pub use text::{tokenize, tokenize_unique};
