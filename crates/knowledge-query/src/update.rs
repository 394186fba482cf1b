//! Update operators.
//!
//! An update body holds at least one of `$set`, `$inc` and `$unset`. Paths
//! may be dotted. System fields cannot be touched. Whatever the operators
//! do, applying an update bumps `_version` by one and stamps `_updatedAt`.

use knowledge_types::{
    doc_version, now_timestamp, Document, FIELD_UPDATED_AT, FIELD_VERSION, RESERVED_FIELDS,
};
use serde_json::{Map, Number, Value};

use crate::error::QueryError;
use crate::path::{get_path, remove_path, set_path};

/// A validated update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Update {
    set: Vec<(String, Value)>,
    inc: Vec<(String, Number)>,
    unset: Vec<String>,
}

impl Update {
    /// Validate an update body.
    pub fn parse(value: &Value) -> Result<Self, QueryError> {
        let body = value
            .as_object()
            .ok_or_else(|| QueryError::InvalidUpdate("update must be an object".to_string()))?;

        let mut update = Update::default();
        for (op, operand) in body {
            match op.as_str() {
                "$set" => {
                    for (path, v) in operand_object(op, operand)? {
                        check_path(path)?;
                        update.set.push((path.clone(), v.clone()));
                    }
                }
                "$inc" => {
                    for (path, v) in operand_object(op, operand)? {
                        check_path(path)?;
                        let Value::Number(n) = v else {
                            return Err(QueryError::InvalidUpdate(format!(
                                "$inc value for '{}' must be a number",
                                path
                            )));
                        };
                        update.inc.push((path.clone(), n.clone()));
                    }
                }
                "$unset" => {
                    let paths: Vec<String> = match operand {
                        Value::Object(map) => map.keys().cloned().collect(),
                        Value::Array(items) => items
                            .iter()
                            .map(|item| {
                                item.as_str().map(str::to_string).ok_or_else(|| {
                                    QueryError::InvalidUpdate(
                                        "$unset list entries must be strings".to_string(),
                                    )
                                })
                            })
                            .collect::<Result<_, _>>()?,
                        _ => {
                            return Err(QueryError::InvalidUpdate(
                                "$unset must be an object or array of field names".to_string(),
                            ))
                        }
                    };
                    for path in &paths {
                        check_path(path)?;
                    }
                    update.unset.extend(paths);
                }
                other if other.starts_with('$') => {
                    return Err(QueryError::InvalidUpdate(format!(
                        "unsupported operator '{}'",
                        other
                    )))
                }
                other => {
                    return Err(QueryError::InvalidUpdate(format!(
                        "field '{}' must be wrapped in $set",
                        other
                    )))
                }
            }
        }

        if update.is_empty() {
            return Err(QueryError::InvalidUpdate(
                "update requires at least one of $set, $inc, $unset".to_string(),
            ));
        }
        Ok(update)
    }

    fn is_empty(&self) -> bool {
        self.set.is_empty() && self.inc.is_empty() && self.unset.is_empty()
    }

    /// Apply to a copy of `doc`. Operators run in the order set, inc, unset.
    ///
    /// Fails without side effects if `$inc` targets a non-numeric value.
    pub fn apply(&self, doc: &Document) -> Result<Document, QueryError> {
        let mut modified = doc.clone();

        for (path, value) in &self.set {
            set_path(&mut modified, path, value.clone());
        }

        for (path, delta) in &self.inc {
            let current = match get_path(&modified, path) {
                None | Some(Value::Null) => None,
                Some(Value::Number(n)) => Some(n.clone()),
                Some(_) => {
                    return Err(QueryError::InvalidUpdate(format!(
                        "cannot $inc non-numeric field '{}'",
                        path
                    )))
                }
            };
            let sum = match current {
                None => delta.clone(),
                Some(n) => add_numbers(&n, delta).ok_or_else(|| {
                    QueryError::InvalidUpdate(format!("$inc on '{}' overflowed", path))
                })?,
            };
            set_path(&mut modified, path, Value::Number(sum));
        }

        for path in &self.unset {
            remove_path(&mut modified, path);
        }

        stamp_mutation(&mut modified);
        Ok(modified)
    }
}

/// Parse and apply an update body in one step.
pub fn apply_update(doc: &Document, update: &Value) -> Result<Document, QueryError> {
    Update::parse(update)?.apply(doc)
}

/// Stamp `_updatedAt` and bump `_version` on a document being mutated.
pub fn stamp_mutation(doc: &mut Document) {
    let next = doc_version(doc) + 1;
    doc.insert(FIELD_UPDATED_AT.to_string(), Value::String(now_timestamp()));
    doc.insert(FIELD_VERSION.to_string(), Value::from(next));
}

fn operand_object<'a>(
    op: &str,
    operand: &'a Value,
) -> Result<&'a Map<String, Value>, QueryError> {
    operand
        .as_object()
        .ok_or_else(|| QueryError::InvalidUpdate(format!("{} must be an object", op)))
}

fn check_path(path: &str) -> Result<(), QueryError> {
    let root = path.split('.').next().unwrap_or(path);
    if path.is_empty() || path.split('.').any(str::is_empty) {
        return Err(QueryError::InvalidUpdate(format!("invalid field path '{}'", path)));
    }
    if RESERVED_FIELDS.contains(&root) {
        return Err(QueryError::InvalidUpdate(format!(
            "system field '{}' cannot be modified",
            root
        )));
    }
    if root.starts_with('$') {
        return Err(QueryError::InvalidUpdate(format!(
            "field '{}' must not start with '$'",
            root
        )));
    }
    Ok(())
}

/// Integer arithmetic when both sides are integers, float otherwise.
fn add_numbers(a: &Number, b: &Number) -> Option<Number> {
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return x.checked_add(y).map(Number::from);
    }
    Number::from_f64(a.as_f64()? + b.as_f64()?)
}
