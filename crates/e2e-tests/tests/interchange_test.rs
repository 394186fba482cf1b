//! Import/export E2E tests for knowledgedb.
//!
//! Collections exported as JSON or CSV and imported into fresh collections
//! keep their client fields; system fields are reassigned.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use e2e_tests::{TestHarness, DATABASE, TENANT};
use knowledge_query::{FindOptions, SortKey};
use knowledge_service::InterchangeFormat;
use knowledge_types::{is_system_field, Document};

/// Client fields of every document in `collection`, sorted by name.
fn client_view(harness: &TestHarness, collection: &str) -> Vec<Value> {
    let options = FindOptions {
        sort: vec![SortKey::asc("name")],
        ..Default::default()
    };
    let page = harness
        .engine
        .find(TENANT, DATABASE, collection, &Value::Null, &options)
        .unwrap();
    page.documents
        .into_iter()
        .map(|doc| {
            let client: Document = doc.into_iter().filter(|(k, _)| !is_system_field(k)).collect();
            Value::Object(client)
        })
        .collect()
}

fn people() -> Vec<Value> {
    vec![
        json!({"name": "Ada", "age": 36, "city": "London", "skills": ["math", "engines"]}),
        json!({"name": "Grace", "age": 45, "city": "New York, NY", "note": "said \"hello\""}),
    ]
}

/// JSON export then import reproduces every client field, nested values
/// included, under new ids.
#[test]
fn test_json_round_trip() {
    let harness = TestHarness::new();
    let original_ids = harness.insert("people", people());

    // 1. Export
    let exported = harness
        .engine
        .export_collection(TENANT, DATABASE, "people", InterchangeFormat::Json)
        .unwrap();

    // 2. Import into a fresh collection
    let report = harness
        .engine
        .import_collection(TENANT, DATABASE, "people_copy", &exported, InterchangeFormat::Json)
        .unwrap();
    assert_eq!(report.imported_count, 2);
    assert!(report.errors.is_empty());
    for id in &report.inserted_ids {
        assert!(!original_ids.contains(id), "imported documents get fresh ids");
    }

    // 3. Compare
    assert_eq!(client_view(&harness, "people_copy"), client_view(&harness, "people"));
    let copy = harness.get("people_copy", &report.inserted_ids[0]);
    assert_eq!(copy["_version"], 1);
}

/// CSV export then import keeps scalar fields, commas and quotes inside
/// values, and numbers as numbers.
#[test]
fn test_csv_round_trip() {
    let harness = TestHarness::new();
    harness.insert(
        "people",
        vec![
            json!({"name": "Ada", "age": 36, "city": "London"}),
            json!({"name": "Grace", "age": 45, "city": "New York, NY", "note": "said \"hello\""}),
        ],
    );

    let exported = harness
        .engine
        .export_collection(TENANT, DATABASE, "people", InterchangeFormat::Csv)
        .unwrap();
    assert!(exported.lines().next().unwrap().starts_with("_id,"));

    let report = harness
        .engine
        .import_collection(TENANT, DATABASE, "people_copy", &exported, InterchangeFormat::Csv)
        .unwrap();
    assert_eq!(report.imported_count, 2);

    let copies = client_view(&harness, "people_copy");
    assert_eq!(copies[0]["name"], "Ada");
    assert_eq!(copies[0]["age"], 36);
    // Missing cells come back as empty strings
    assert_eq!(copies[0]["note"], "");
    assert_eq!(copies[1]["city"], "New York, NY");
    assert_eq!(copies[1]["note"], "said \"hello\"");
}

/// Invalid records are reported by position; the valid ones are inserted.
#[test]
fn test_import_reports_invalid_records() {
    let harness = TestHarness::new();
    let text = r#"[{"name": "ok"}, 42, {"$bad": 1}, {"name": "also ok"}]"#;

    let report = harness
        .engine
        .import_collection(TENANT, DATABASE, "mixed", text, InterchangeFormat::Json)
        .unwrap();
    assert_eq!(report.imported_count, 2);
    let rejected: Vec<usize> = report.errors.iter().map(|e| e.index).collect();
    assert_eq!(rejected, vec![1, 2]);
    assert_eq!(client_view(&harness, "mixed").len(), 2);

    let err = harness
        .engine
        .import_collection(TENANT, DATABASE, "mixed", "name\n", InterchangeFormat::Csv)
        .unwrap_err();
    assert!(err.to_string().contains("header"));
}

/// An empty collection exports as an empty array and an empty CSV.
#[test]
fn test_export_empty_collection() {
    let harness = TestHarness::new();
    let json = harness
        .engine
        .export_collection(TENANT, DATABASE, "nothing", InterchangeFormat::Json)
        .unwrap();
    assert_eq!(serde_json::from_str::<Value>(&json).unwrap(), json!([]));

    let csv = harness
        .engine
        .export_collection(TENANT, DATABASE, "nothing", InterchangeFormat::Csv)
        .unwrap();
    assert_eq!(csv, "");
}
