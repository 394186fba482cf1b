//! Document model.
//!
//! A document is an ordered JSON object. The engine owns four system fields
//! (`_id`, `_createdAt`, `_updatedAt`, `_version`); everything else belongs
//! to the client and is schema-free.

use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value};
use ulid::Ulid;

use crate::error::KnowledgeError;

/// A stored document: field name -> JSON value, insertion ordered.
pub type Document = Map<String, Value>;

/// Document identifier field.
pub const FIELD_ID: &str = "_id";

/// Creation timestamp field (RFC 3339).
pub const FIELD_CREATED_AT: &str = "_createdAt";

/// Last mutation timestamp field (RFC 3339).
pub const FIELD_UPDATED_AT: &str = "_updatedAt";

/// Monotonic version counter, starts at 1.
pub const FIELD_VERSION: &str = "_version";

/// Fields clients may never supply or modify.
pub const RESERVED_FIELDS: &[&str] = &[FIELD_ID, FIELD_CREATED_AT, FIELD_UPDATED_AT, FIELD_VERSION];

/// Whether a top-level field is engine metadata rather than client data.
///
/// Any underscore-prefixed name is treated as metadata by extraction and
/// indexing, not only the reserved four.
pub fn is_system_field(name: &str) -> bool {
    name.starts_with('_')
}

/// Generate a prefixed unique identifier, e.g. `doc_01hq...`.
pub fn generate_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new().to_string().to_lowercase())
}

/// Current time as an RFC 3339 string with millisecond precision.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Validate a client-supplied value as a document body.
///
/// The value must be a JSON object whose keys are non-empty and do not start
/// with `$`. Reserved system fields are stripped; the engine assigns them.
pub fn validate_document(value: Value) -> Result<Document, KnowledgeError> {
    let Value::Object(mut doc) = value else {
        return Err(KnowledgeError::InvalidDocument(
            "Document must be a non-null object".to_string(),
        ));
    };

    for key in doc.keys() {
        if key.is_empty() {
            return Err(KnowledgeError::InvalidDocument(
                "Document field names must be non-empty".to_string(),
            ));
        }
        if key.starts_with('$') {
            return Err(KnowledgeError::InvalidDocument(format!(
                "Document field '{}' must not start with '$'",
                key
            )));
        }
    }

    for reserved in RESERVED_FIELDS {
        doc.shift_remove(*reserved);
    }

    Ok(doc)
}

/// Attach system fields to a validated document body.
///
/// `_id` is placed first so exports and projections read naturally.
pub fn stamp_new(body: Document) -> Document {
    let now = now_timestamp();
    let mut doc = Document::new();
    doc.insert(FIELD_ID.to_string(), Value::String(generate_id("doc")));
    for (key, value) in body {
        doc.insert(key, value);
    }
    doc.insert(FIELD_CREATED_AT.to_string(), Value::String(now.clone()));
    doc.insert(FIELD_UPDATED_AT.to_string(), Value::String(now));
    doc.insert(FIELD_VERSION.to_string(), Value::from(1u64));
    doc
}

/// The document's `_id`, if present.
pub fn doc_id(doc: &Document) -> Option<&str> {
    doc.get(FIELD_ID).and_then(Value::as_str)
}

/// The document's `_version`, or 0 when missing.
pub fn doc_version(doc: &Document) -> u64 {
    doc.get(FIELD_VERSION).and_then(Value::as_u64).unwrap_or(0)
}
