//! Change events produced by document mutations.
//!
//! The engine does not deliver these anywhere. Callers hand them to whatever
//! webhook, trigger or live-subscription layer sits above.

use serde::{Deserialize, Serialize};

use crate::document::Document;

/// Kind of document mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Inserted,
    Updated,
    Deleted,
}

impl ChangeKind {
    /// Event type string, e.g. `document.inserted`.
    pub fn event_type(&self) -> &'static str {
        match self {
            ChangeKind::Inserted => "document.inserted",
            ChangeKind::Updated => "document.updated",
            ChangeKind::Deleted => "document.deleted",
        }
    }
}

/// One mutated document and what happened to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    pub collection: String,
    /// State after the mutation; for deletes, the removed document
    pub document: Document,
}

impl ChangeEvent {
    pub fn new(kind: ChangeKind, collection: impl Into<String>, document: Document) -> Self {
        Self {
            kind,
            collection: collection.into(),
            document,
        }
    }

    pub fn inserted(collection: &str, document: Document) -> Self {
        Self::new(ChangeKind::Inserted, collection, document)
    }

    pub fn updated(collection: &str, document: Document) -> Self {
        Self::new(ChangeKind::Updated, collection, document)
    }

    pub fn deleted(collection: &str, document: Document) -> Self {
        Self::new(ChangeKind::Deleted, collection, document)
    }

    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_types() {
        assert_eq!(ChangeKind::Inserted.event_type(), "document.inserted");
        assert_eq!(ChangeKind::Updated.event_type(), "document.updated");
        assert_eq!(ChangeKind::Deleted.event_type(), "document.deleted");
    }

    #[test]
    fn test_change_event_bytes() {
        let doc = json!({"_id": "doc_1", "name": "Ada"});
        let event = ChangeEvent::inserted("people", doc.as_object().unwrap().clone());
        let decoded = ChangeEvent::from_bytes(&event.to_bytes().unwrap()).unwrap();

        assert_eq!(decoded.kind, ChangeKind::Inserted);
        assert_eq!(decoded.collection, "people");
        assert_eq!(decoded.document["name"], "Ada");
    }
}
