//! Filter expressions.
//!
//! A filter maps field paths to conditions. A condition is either a literal
//! (exact equality) or an object of operators. Object keys that are not known
//! operators match against the nested object at that path, so
//! `{"address": {"city": "Oslo"}}` checks `address.city`.

use regex::{Regex, RegexBuilder};
use serde_json::{Map, Value};
use std::cmp::Ordering;

use crate::error::QueryError;
use crate::path::get_path;

/// A parsed filter, ready to evaluate against many documents.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    clauses: Vec<(String, Condition)>,
}

#[derive(Debug, Clone)]
enum Condition {
    /// Literal value; `null` matches only an explicit null
    Equals(Value),
    /// Every operator must hold
    Operators(Vec<Operator>),
}

#[derive(Debug, Clone)]
enum Operator {
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    Ne(Value),
    In(Option<Vec<Value>>),
    Nin(Option<Vec<Value>>),
    Exists(bool),
    /// `None` when the pattern failed to compile; never matches
    Regex(Option<Regex>),
    /// Unknown key: match the field's nested object
    Nested(Box<Filter>),
}

impl Filter {
    /// Filter that matches every document.
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse a filter body. `null` and `{}` match everything.
    pub fn parse(value: &Value) -> Result<Self, QueryError> {
        match value {
            Value::Null => Ok(Self::all()),
            Value::Object(map) => Ok(Self::from_map(map)),
            other => Err(QueryError::InvalidFilter(format!(
                "filter must be an object, got {}",
                type_name(other)
            ))),
        }
    }

    fn from_map(map: &Map<String, Value>) -> Self {
        let clauses = map
            .iter()
            .map(|(field, condition)| (field.clone(), Condition::parse(condition)))
            .collect();
        Self { clauses }
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Whether the document satisfies every clause.
    pub fn matches(&self, doc: &Map<String, Value>) -> bool {
        self.clauses
            .iter()
            .all(|(field, condition)| condition.matches(get_path(doc, field)))
    }
}

impl Condition {
    fn parse(value: &Value) -> Self {
        match value {
            Value::Object(ops) => {
                Condition::Operators(ops.iter().map(|(k, v)| Operator::parse(k, v)).collect())
            }
            literal => Condition::Equals(literal.clone()),
        }
    }

    fn matches(&self, actual: Option<&Value>) -> bool {
        match self {
            Condition::Equals(Value::Null) => matches!(actual, Some(Value::Null)),
            Condition::Equals(expected) => actual.is_some_and(|a| values_equal(a, expected)),
            Condition::Operators(ops) => ops.iter().all(|op| op.matches(actual)),
        }
    }
}

impl Operator {
    fn parse(key: &str, value: &Value) -> Self {
        match key {
            "$gt" => Operator::Gt(value.clone()),
            "$gte" => Operator::Gte(value.clone()),
            "$lt" => Operator::Lt(value.clone()),
            "$lte" => Operator::Lte(value.clone()),
            "$ne" => Operator::Ne(value.clone()),
            "$in" => Operator::In(value.as_array().cloned()),
            "$nin" => Operator::Nin(value.as_array().cloned()),
            "$exists" => Operator::Exists(is_truthy(value)),
            "$regex" => Operator::Regex(compile_regex(value)),
            _ => {
                let mut nested = Map::new();
                nested.insert(key.to_string(), value.clone());
                Operator::Nested(Box::new(Filter::from_map(&nested)))
            }
        }
    }

    fn matches(&self, actual: Option<&Value>) -> bool {
        match self {
            Operator::Gt(v) => compare(actual, v) == Some(Ordering::Greater),
            Operator::Gte(v) => matches!(
                compare(actual, v),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Operator::Lt(v) => compare(actual, v) == Some(Ordering::Less),
            Operator::Lte(v) => {
                matches!(compare(actual, v), Some(Ordering::Less | Ordering::Equal))
            }
            Operator::Ne(v) => !actual.is_some_and(|a| values_equal(a, v)),
            Operator::In(None) | Operator::Nin(None) => false,
            Operator::In(Some(list)) => {
                actual.is_some_and(|a| list.iter().any(|v| values_equal(a, v)))
            }
            Operator::Nin(Some(list)) => {
                !actual.is_some_and(|a| list.iter().any(|v| values_equal(a, v)))
            }
            Operator::Exists(should_exist) => actual.is_some() == *should_exist,
            Operator::Regex(None) => false,
            Operator::Regex(Some(re)) => actual
                .and_then(Value::as_str)
                .is_some_and(|s| re.is_match(s)),
            Operator::Nested(filter) => match actual {
                Some(Value::Object(obj)) => filter.matches(obj),
                _ => false,
            },
        }
    }
}

/// Evaluate a raw filter body against a document.
///
/// A body that is not an object (or null) matches nothing.
pub fn matches(doc: &Map<String, Value>, filter: &Value) -> bool {
    Filter::parse(filter).is_ok_and(|f| f.matches(doc))
}

fn compile_regex(value: &Value) -> Option<Regex> {
    let pattern = value.as_str()?;
    RegexBuilder::new(pattern).case_insensitive(true).build().ok()
}

/// Equality with numbers compared by value, so `1` equals `1.0`.
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Ordering between two values of the same scalar type. Missing values and
/// mixed types are incomparable.
pub(crate) fn compare(actual: Option<&Value>, expected: &Value) -> Option<Ordering> {
    match (actual?, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
