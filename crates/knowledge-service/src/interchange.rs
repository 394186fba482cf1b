//! Bulk import and export of collections as JSON arrays or flat CSV.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use knowledge_types::{validate_document, ChangeEvent, Document};
use serde::Serialize;
use serde_json::{Number, Value};
use tracing::{info, instrument, warn};

use crate::engine::KnowledgeEngine;
use crate::error::ServiceError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InterchangeFormat {
    #[default]
    Json,
    Csv,
}

impl InterchangeFormat {
    /// Guess the format from a file extension; anything but `.csv` is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => InterchangeFormat::Csv,
            _ => InterchangeFormat::Json,
        }
    }
}

impl FromStr for InterchangeFormat {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(InterchangeFormat::Json),
            "csv" => Ok(InterchangeFormat::Csv),
            other => Err(ServiceError::InvalidInput(format!(
                "unknown format '{}' (expected json or csv)",
                other
            ))),
        }
    }
}

impl fmt::Display for InterchangeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InterchangeFormat::Json => "json",
            InterchangeFormat::Csv => "csv",
        })
    }
}

/// A rejected import record. `index` is zero-based in the parsed input.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportIssue {
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub imported_count: usize,
    pub inserted_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ImportIssue>,
    #[serde(skip)]
    pub events: Vec<ChangeEvent>,
}

/// Pretty-printed JSON array.
pub fn documents_to_json(documents: &[Document]) -> Result<String, ServiceError> {
    Ok(serde_json::to_string_pretty(documents)?)
}

fn csv_quote(text: &str) -> String {
    format!("\"{}\"", text.replace('"', "\"\""))
}

fn csv_cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => csv_quote(s),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(nested @ (Value::Array(_) | Value::Object(_))) => csv_quote(&nested.to_string()),
    }
}

/// Flat CSV. The header is every field seen, in first-seen order; nested
/// values are written as quoted JSON. No documents yields an empty string.
pub fn documents_to_csv(documents: &[Document]) -> String {
    let mut headers: Vec<&str> = Vec::new();
    for doc in documents {
        for key in doc.keys() {
            if !headers.contains(&key.as_str()) {
                headers.push(key);
            }
        }
    }
    if headers.is_empty() {
        return String::new();
    }

    let mut lines = Vec::with_capacity(documents.len() + 1);
    lines.push(headers.join(","));
    for doc in documents {
        let row: Vec<String> = headers.iter().map(|h| csv_cell(doc.get(*h))).collect();
        lines.push(row.join(","));
    }
    lines.join("\n")
}

/// A JSON array of values, or a single value treated as one record.
pub fn parse_json_documents(text: &str) -> Result<Vec<Value>, ServiceError> {
    let parsed: Value = serde_json::from_str(text)
        .map_err(|e| ServiceError::Interchange(format!("Invalid JSON file: {}", e)))?;
    Ok(match parsed {
        Value::Array(items) => items,
        single => vec![single],
    })
}

/// Split CSV text into records of fields. Quoted fields may hold commas,
/// doubled quotes and newlines.
fn csv_records(text: &str) -> Result<Vec<Vec<String>>, ServiceError> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }
    if in_quotes {
        return Err(ServiceError::Interchange("unterminated quoted field".to_string()));
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }

    records.retain(|r| r.iter().any(|f| !f.trim().is_empty()));
    Ok(records)
}

fn coerce(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::String(String::new());
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::from(i);
    }
    match trimmed.parse::<f64>().ok().and_then(Number::from_f64) {
        Some(n) => Value::Number(n),
        None => Value::String(raw.to_string()),
    }
}

/// Header row plus data rows. Numeric-looking values become numbers.
pub fn parse_csv_documents(text: &str) -> Result<Vec<Value>, ServiceError> {
    let mut records = csv_records(text)?;
    if records.len() < 2 {
        return Err(ServiceError::Interchange(
            "CSV must have header + data rows".to_string(),
        ));
    }
    let header: Vec<String> = records
        .remove(0)
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    Ok(records
        .into_iter()
        .map(|row| {
            let doc: Document = header
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let value = row.get(i).map(|raw| coerce(raw)).unwrap_or(Value::Null);
                    (name.clone(), value)
                })
                .collect();
            Value::Object(doc)
        })
        .collect())
}

impl KnowledgeEngine {
    /// Serialize a whole collection.
    pub fn export_collection(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
        format: InterchangeFormat,
    ) -> Result<String, ServiceError> {
        let key = self.collection_key(tenant, database, collection)?;
        let documents = self.load_documents(&key)?;
        info!(collection, count = documents.len(), %format, "Exporting collection");
        match format {
            InterchangeFormat::Json => documents_to_json(&documents),
            InterchangeFormat::Csv => Ok(documents_to_csv(&documents)),
        }
    }

    /// Parse and insert records. Invalid records are reported and skipped;
    /// the valid ones are inserted as one batch.
    #[instrument(skip(self, text))]
    pub fn import_collection(
        &self,
        tenant: &str,
        database: &str,
        collection: &str,
        text: &str,
        format: InterchangeFormat,
    ) -> Result<ImportReport, ServiceError> {
        let records = match format {
            InterchangeFormat::Json => parse_json_documents(text)?,
            InterchangeFormat::Csv => parse_csv_documents(text)?,
        };

        let mut report = ImportReport::default();
        let mut bodies = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            match validate_document(record) {
                Ok(body) => bodies.push(body),
                Err(e) => report.errors.push(ImportIssue {
                    index,
                    error: e.to_string(),
                }),
            }
        }
        if !report.errors.is_empty() {
            warn!(collection, rejected = report.errors.len(), "Skipped invalid import records");
        }
        if bodies.is_empty() {
            return Ok(report);
        }

        let inserted = self.insert_bodies(tenant, database, collection, bodies)?;
        report.imported_count = inserted.inserted_count;
        report.inserted_ids = inserted.inserted_ids;
        report.events = inserted.events;
        Ok(report)
    }
}
