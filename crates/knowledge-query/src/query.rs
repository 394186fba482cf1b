//! Paged queries: filter, sort, count, skip, limit, project.

use knowledge_types::{Document, FIELD_ID};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use tracing::trace;

use crate::error::QueryError;
use crate::filter::{compare, Filter};
use crate::path::get_path;

/// One sort key. Direction is `1` (ascending) or `-1` (descending).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub direction: i8,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: 1,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: -1,
        }
    }

    /// Parse `{"age": -1, "name": 1}` into ordered sort keys.
    ///
    /// Accepts `1`/`-1` as well as `"asc"`/`"desc"`.
    pub fn parse_all(value: &Value) -> Result<Vec<SortKey>, QueryError> {
        let map = match value {
            Value::Null => return Ok(Vec::new()),
            Value::Object(map) => map,
            _ => return Err(QueryError::InvalidSort("sort must be an object".to_string())),
        };

        map.iter()
            .map(|(field, dir)| {
                let direction = match dir {
                    Value::Number(n) if n.as_f64() == Some(1.0) => 1,
                    Value::Number(n) if n.as_f64() == Some(-1.0) => -1,
                    Value::String(s) if s.eq_ignore_ascii_case("asc") => 1,
                    Value::String(s) if s.eq_ignore_ascii_case("desc") => -1,
                    other => {
                        return Err(QueryError::InvalidSort(format!(
                            "direction for '{}' must be 1 or -1, got {}",
                            field, other
                        )))
                    }
                };
                Ok(SortKey {
                    field: field.clone(),
                    direction,
                })
            })
            .collect()
    }
}

/// Options for a paged find.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FindOptions {
    #[serde(default)]
    pub sort: Vec<SortKey>,
    #[serde(default)]
    pub skip: usize,
    /// `None` or `Some(0)` returns everything after `skip`
    #[serde(default)]
    pub limit: Option<usize>,
    /// Top-level fields to keep; `_id` is always kept
    #[serde(default)]
    pub fields: Option<Vec<String>>,
}

/// A page of results plus the number matched before pagination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPage {
    pub documents: Vec<Document>,
    pub total: usize,
}

/// Stable multi-key sort.
///
/// Ascending order puts missing fields first, then null, booleans, numbers,
/// strings, and finally arrays and objects (which tie among themselves).
pub fn apply_sort(docs: &mut [Document], keys: &[SortKey]) {
    if keys.is_empty() {
        return;
    }
    docs.sort_by(|a, b| {
        for key in keys {
            let ordering = sort_ordering(get_path(a, &key.field), get_path(b, &key.field));
            let ordering = if key.direction < 0 {
                ordering.reverse()
            } else {
                ordering
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
}

fn type_rank(value: Option<&Value>) -> u8 {
    match value {
        None => 0,
        Some(Value::Null) => 1,
        Some(Value::Bool(_)) => 2,
        Some(Value::Number(_)) => 3,
        Some(Value::String(_)) => 4,
        Some(Value::Array(_) | Value::Object(_)) => 5,
    }
}

fn sort_ordering(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    type_rank(a).cmp(&type_rank(b)).then_with(|| match b {
        Some(bv) => compare(a, bv).unwrap_or(Ordering::Equal),
        None => Ordering::Equal,
    })
}

/// Keep only the listed top-level fields, always including `_id`.
pub fn apply_projection(doc: &Document, fields: &[String]) -> Document {
    let mut projected = Document::new();
    if let Some(id) = doc.get(FIELD_ID) {
        projected.insert(FIELD_ID.to_string(), id.clone());
    }
    for field in fields {
        if let Some(value) = doc.get(field) {
            projected.insert(field.clone(), value.clone());
        }
    }
    projected
}

/// Filter, sort, count, then paginate and project.
pub fn query_documents(docs: &[Document], filter: &Filter, options: &FindOptions) -> QueryPage {
    let mut matched: Vec<Document> = docs.iter().filter(|d| filter.matches(d)).cloned().collect();
    apply_sort(&mut matched, &options.sort);

    let total = matched.len();
    trace!(scanned = docs.len(), matched = total, "Filtered documents");
    let take = match options.limit {
        Some(limit) if limit > 0 => limit,
        _ => usize::MAX,
    };

    let documents = matched
        .into_iter()
        .skip(options.skip)
        .take(take)
        .map(|doc| match &options.fields {
            Some(fields) if !fields.is_empty() => apply_projection(&doc, fields),
            _ => doc,
        })
        .collect();

    QueryPage { documents, total }
}
