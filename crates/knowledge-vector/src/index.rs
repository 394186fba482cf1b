//! Per-collection vector and field indexes.
//!
//! Both are rebuildable caches derived from a collection's documents. They
//! are stored whole and replaced whole on every rebuild.

use std::collections::{BTreeMap, HashSet};

use knowledge_types::{doc_id, is_system_field, now_timestamp, Document};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::embedding::{
    compute_idf, cosine_similarity, embed_tokens, embedding_text, generate_embedding, preprocess,
    Embedding, IdfWeights, LSH_FUNCTIONS, VECTOR_DIMENSION,
};

/// One document's embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorRecord {
    pub doc_id: String,
    pub embedding: Embedding,
}

/// Summary statistics over an index's embeddings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingStats {
    pub count: usize,
    pub avg_magnitude: f64,
    pub max_magnitude: f64,
    pub min_magnitude: f64,
    pub vector_space: usize,
    pub vocabulary_size: usize,
    pub avg_tokens_per_doc: f64,
}

impl EmbeddingStats {
    pub fn from_records(records: &[VectorRecord]) -> Self {
        if records.is_empty() {
            return Self {
                vector_space: VECTOR_DIMENSION,
                ..Self::default()
            };
        }

        let count = records.len();
        let magnitudes: Vec<f64> = records.iter().map(|r| r.embedding.magnitude).collect();
        let vocabulary: HashSet<&str> = records
            .iter()
            .flat_map(|r| r.embedding.tokens.iter().map(String::as_str))
            .collect();
        let total_tokens: usize = records.iter().map(|r| r.embedding.tokens.len()).sum();

        Self {
            count,
            avg_magnitude: magnitudes.iter().sum::<f64>() / count as f64,
            max_magnitude: magnitudes.iter().copied().fold(f64::MIN, f64::max),
            min_magnitude: magnitudes.iter().copied().fold(f64::MAX, f64::min),
            vector_space: VECTOR_DIMENSION,
            vocabulary_size: vocabulary.len(),
            avg_tokens_per_doc: total_tokens as f64 / count as f64,
        }
    }
}

/// A similarity search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorHit {
    pub doc_id: String,
    /// Cosine similarity rounded to 4 decimals
    pub similarity: f64,
    pub keywords: Vec<String>,
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Rank `records` against `query`.
///
/// Candidates are the records whose LSH signature shares the first
/// `prefix_bits` bits with the query's. When that shortlist holds fewer than
/// `2 * top_k` records the whole set is scored instead. Only positive
/// similarities are returned, best first, at most `top_k`.
pub fn find_similar<'a>(
    query: &Embedding,
    records: &'a [VectorRecord],
    top_k: usize,
    prefix_bits: usize,
) -> Vec<(&'a VectorRecord, f64)> {
    if top_k == 0 || query.is_empty() {
        return Vec::new();
    }

    let bits = prefix_bits.min(LSH_FUNCTIONS).min(query.hash.len());
    let prefix = &query.hash[..bits];
    let bucket: Vec<&VectorRecord> = records
        .iter()
        .filter(|r| r.embedding.hash.starts_with(prefix))
        .collect();

    let candidates: Vec<&VectorRecord> = if bucket.len() < top_k.saturating_mul(2) {
        debug!(
            bucket = bucket.len(),
            total = records.len(),
            "LSH bucket too small, scoring full index"
        );
        records.iter().collect()
    } else {
        bucket
    };

    let mut scored: Vec<(&VectorRecord, f64)> = candidates
        .into_iter()
        .map(|r| (r, cosine_similarity(&query.vector, &r.embedding.vector)))
        .filter(|(_, sim)| *sim > 0.0)
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(top_k);
    scored
}

/// Embeddings of every document in one collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorIndex {
    pub collection: String,
    pub created_at: String,
    pub dimension: usize,
    /// Corpus IDF used for documents and queries alike; empty means idf = 1
    #[serde(default)]
    pub idf: IdfWeights,
    pub records: Vec<VectorRecord>,
    pub stats: EmbeddingStats,
}

impl VectorIndex {
    /// Embed every document that carries an `_id`.
    pub fn build(collection: &str, documents: &[Document], corpus_idf: bool) -> Self {
        let prepared: Vec<(String, Vec<String>)> = documents
            .iter()
            .filter_map(|d| {
                doc_id(d).map(|id| (id.to_string(), preprocess(&embedding_text(d))))
            })
            .collect();

        let idf = if corpus_idf {
            let corpus: Vec<Vec<String>> = prepared.iter().map(|(_, t)| t.clone()).collect();
            compute_idf(&corpus)
        } else {
            IdfWeights::new()
        };

        let weights = (!idf.is_empty()).then_some(&idf);
        let records: Vec<VectorRecord> = prepared
            .into_iter()
            .map(|(doc_id, tokens)| VectorRecord {
                doc_id,
                embedding: embed_tokens(tokens, weights),
            })
            .collect();
        let stats = EmbeddingStats::from_records(&records);

        Self {
            collection: collection.to_string(),
            created_at: now_timestamp(),
            dimension: VECTOR_DIMENSION,
            idf,
            records,
            stats,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record for one document.
    pub fn record(&self, doc_id: &str) -> Option<&VectorRecord> {
        self.records.iter().find(|r| r.doc_id == doc_id)
    }

    /// Embed query text with the same weights the documents used.
    pub fn embed_query(&self, text: &str) -> Embedding {
        let weights = (!self.idf.is_empty()).then_some(&self.idf);
        generate_embedding(text, weights)
    }

    /// Similarity search over this index. Similarities are rounded to four
    /// decimals; hits that round to zero are dropped.
    pub fn search(&self, query: &Embedding, top_k: usize, prefix_bits: usize) -> Vec<VectorHit> {
        find_similar(query, &self.records, top_k, prefix_bits)
            .into_iter()
            .map(|(record, sim)| VectorHit {
                doc_id: record.doc_id.clone(),
                similarity: round4(sim),
                keywords: record.embedding.keywords.clone(),
            })
            .filter(|hit| hit.similarity > 0.0)
            .collect()
    }
}

/// Exact-value lookup: field -> serialized value -> document ids.
///
/// Values are keyed by their JSON serialization, so only exact equality is
/// supported. `"5"` and `5` are different keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldIndex {
    pub collection: String,
    pub created_at: String,
    pub document_count: usize,
    pub fields: BTreeMap<String, BTreeMap<String, Vec<String>>>,
}

impl FieldIndex {
    /// Index every non-system top-level field.
    pub fn build(collection: &str, documents: &[Document]) -> Self {
        let mut fields: BTreeMap<String, BTreeMap<String, Vec<String>>> = BTreeMap::new();

        for doc in documents {
            let Some(id) = doc_id(doc) else {
                continue;
            };
            for (field, value) in doc {
                if is_system_field(field) {
                    continue;
                }
                fields
                    .entry(field.clone())
                    .or_default()
                    .entry(value.to_string())
                    .or_default()
                    .push(id.to_string());
            }
        }

        Self {
            collection: collection.to_string(),
            created_at: now_timestamp(),
            document_count: documents.len(),
            fields,
        }
    }

    /// Names of the indexed fields.
    pub fn indexed_fields(&self) -> Vec<String> {
        self.fields.keys().cloned().collect()
    }

    /// Ids of documents whose `field` equals `value` exactly.
    pub fn lookup(&self, field: &str, value: &Value) -> &[String] {
        self.fields
            .get(field)
            .and_then(|values| values.get(&value.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn docs(values: Vec<Value>) -> Vec<Document> {
        values
            .into_iter()
            .map(|v| match v {
                Value::Object(map) => map,
                _ => panic!("not an object"),
            })
            .collect()
    }

    fn sample() -> Vec<Document> {
        docs(vec![
            json!({"_id": "a", "text": "rust storage engine with column families", "team": "core"}),
            json!({"_id": "b", "text": "graph traversal and shortest path search", "team": "graph"}),
            json!({"_id": "c", "text": "rust graph engine for storage", "team": "core"}),
            json!({"text": "no id so skipped"}),
        ])
    }

    #[test]
    fn test_build_skips_documents_without_id() {
        let index = VectorIndex::build("notes", &sample(), true);
        assert_eq!(index.len(), 3);
        assert_eq!(index.stats.count, 3);
        assert_eq!(index.dimension, VECTOR_DIMENSION);
        assert!(!index.idf.is_empty());
    }

    #[test]
    fn test_document_finds_itself_first() {
        let index = VectorIndex::build("notes", &sample(), true);
        let query = index.embed_query("graph traversal and shortest path search");
        let hits = index.search(&query, 3, 8);
        assert_eq!(hits[0].doc_id, "b");
        assert!((hits[0].similarity - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_search_without_corpus_idf() {
        let index = VectorIndex::build("notes", &sample(), false);
        assert!(index.idf.is_empty());
        let query = index.embed_query("rust storage engine with column families");
        let hits = index.search(&query, 1, 0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_id, "a");
    }

    #[test]
    fn test_small_bucket_falls_back_to_full_index() {
        let index = VectorIndex::build("notes", &sample(), false);
        let query = index.embed_query("rust graph engine for storage");
        // A full-width prefix matches at most the identical document.
        let hits = find_similar(&query, &index.records, 3, LSH_FUNCTIONS);
        assert!(hits.len() >= 2);
        let ids: HashSet<&str> = hits.iter().map(|(r, _)| r.doc_id.as_str()).collect();
        assert_eq!(ids.len(), hits.len());
    }

    #[test]
    fn test_empty_query_returns_nothing() {
        let index = VectorIndex::build("notes", &sample(), true);
        let query = index.embed_query("the and of");
        assert!(index.search(&query, 5, 8).is_empty());
    }

    #[test]
    fn test_similarity_is_rounded() {
        let index = VectorIndex::build("notes", &sample(), true);
        let query = index.embed_query("rust engine");
        for hit in index.search(&query, 3, 0) {
            assert_eq!(hit.similarity, round4(hit.similarity));
            assert!(hit.similarity > 0.0);
        }
    }

    fn unit_embedding(vector: Vec<f32>) -> Embedding {
        Embedding {
            vector,
            magnitude: 1.0,
            hash: "0".repeat(LSH_FUNCTIONS),
            keywords: Vec::new(),
            tokens: Vec::new(),
        }
    }

    #[test]
    fn test_similarity_rounding_to_zero_is_dropped() {
        let mut index = VectorIndex::build("notes", &[], false);
        index.records = vec![
            VectorRecord {
                doc_id: "faint".to_string(),
                embedding: unit_embedding(vec![0.00001, 1.0]),
            },
            VectorRecord {
                doc_id: "close".to_string(),
                embedding: unit_embedding(vec![0.6, 0.8]),
            },
        ];
        let query = unit_embedding(vec![1.0, 0.0]);

        // The raw cosine of "faint" is positive but rounds to 0.0000.
        assert_eq!(find_similar(&query, &index.records, 5, 0).len(), 2);

        let hits = index.search(&query, 5, 0);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc_id, "close");
        assert_eq!(hits[0].similarity, 0.6);
    }

    #[test]
    fn test_stats_for_empty_index() {
        let stats = EmbeddingStats::from_records(&[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.vector_space, VECTOR_DIMENSION);
    }

    #[test]
    fn test_field_index_exact_lookup() {
        let index = FieldIndex::build("notes", &sample());
        assert_eq!(index.lookup("team", &json!("core")), ["a", "c"]);
        assert_eq!(index.lookup("team", &json!("graph")), ["b"]);
        assert!(index.lookup("team", &json!("missing")).is_empty());
        assert!(index.lookup("nope", &json!("core")).is_empty());
        assert_eq!(index.indexed_fields(), vec!["team", "text"]);
        assert_eq!(index.document_count, 4);
    }

    #[test]
    fn test_field_index_skips_system_fields() {
        let index = FieldIndex::build("notes", &sample());
        assert!(!index.fields.contains_key("_id"));
    }
}
