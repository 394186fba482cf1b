//! Entity extraction from document fields.

use knowledge_types::{is_system_field, Document};
use serde_json::Value;

/// Substrings of field names that mark a field as holding entities.
pub const ENTITY_FIELD_HINTS: &[&str] = &[
    "name",
    "title",
    "company",
    "email",
    "author",
    "user",
    "owner",
    "tag",
    "category",
    "manager",
    "team",
    "project",
    "assignee",
    "creator",
    "department",
    "role",
    "organization",
    "client",
    "vendor",
    "partner",
    "supervisor",
    "lead",
];

const MIN_LABEL_CHARS: usize = 2;
const MAX_LABEL_CHARS: usize = 100;

/// A would-be node: a label and the field it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityCandidate {
    pub label: String,
    pub field: String,
}

/// Whether a field name contains one of the entity hints, ignoring case.
pub fn is_entity_field(field: &str) -> bool {
    let lower = field.to_lowercase();
    ENTITY_FIELD_HINTS.iter().any(|hint| lower.contains(hint))
}

fn qualifies(label: &str) -> bool {
    let len = label.chars().count();
    (MIN_LABEL_CHARS..=MAX_LABEL_CHARS).contains(&len)
}

/// Extract entity candidates from a document's top-level fields.
///
/// Strings in hinted fields become one candidate each; string arrays yield
/// one candidate per qualifying element. Repeats of the same label (ignoring
/// case) within one field are collapsed.
pub fn extract_candidates(doc: &Document) -> Vec<EntityCandidate> {
    let mut candidates: Vec<EntityCandidate> = Vec::new();
    let mut push = |field: &str, label: &str| {
        let lower = label.to_lowercase();
        let duplicate = candidates
            .iter()
            .any(|c| c.field == field && c.label.to_lowercase() == lower);
        if !duplicate {
            candidates.push(EntityCandidate {
                label: label.to_string(),
                field: field.to_string(),
            });
        }
    };

    for (field, value) in doc {
        if is_system_field(field) || !is_entity_field(field) {
            continue;
        }
        match value {
            Value::String(s) if qualifies(s) => push(field, s),
            Value::Array(items) => {
                for item in items {
                    if let Value::String(s) = item {
                        if qualifies(s) {
                            push(field, s);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().unwrap().clone()
    }

    fn labels(candidates: &[EntityCandidate]) -> Vec<(&str, &str)> {
        candidates
            .iter()
            .map(|c| (c.field.as_str(), c.label.as_str()))
            .collect()
    }

    #[test]
    fn test_hinted_fields_only() {
        let d = doc(json!({
            "_id": "doc_1",
            "name": "Bob Smith",
            "teamName": "Backend",
            "salary": "100000",
            "age": 40
        }));
        assert_eq!(
            labels(&extract_candidates(&d)),
            vec![("name", "Bob Smith"), ("teamName", "Backend")]
        );
    }

    #[test]
    fn test_length_bounds() {
        let long = "x".repeat(101);
        let d = doc(json!({"name": "X", "title": long, "owner": "ab"}));
        assert_eq!(labels(&extract_candidates(&d)), vec![("owner", "ab")]);
    }

    #[test]
    fn test_array_elements() {
        let d = doc(json!({"tags": ["rust", "db", 5, "x", "RUST"]}));
        assert_eq!(
            labels(&extract_candidates(&d)),
            vec![("tags", "rust"), ("tags", "db")]
        );
    }

    #[test]
    fn test_system_fields_skipped() {
        let d = doc(json!({"_username": "root", "username": "ada"}));
        assert_eq!(labels(&extract_candidates(&d)), vec![("username", "ada")]);
    }

    #[test]
    fn test_is_entity_field_case_insensitive() {
        assert!(is_entity_field("ProjectLead"));
        assert!(is_entity_field("EMAIL"));
        assert!(!is_entity_field("price"));
    }
}
