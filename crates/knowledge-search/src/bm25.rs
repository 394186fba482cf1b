//! Okapi BM25 keyword ranking.
//!
//! Stateless: the inverted index is built from the candidate documents on
//! every call. Collections are small enough that this is cheaper than keeping
//! an index consistent across writes.

use std::collections::HashMap;

use knowledge_types::{doc_id, is_system_field, tokenize, Document};
use tracing::debug;

use crate::types::ScoredDoc;

/// Default term-frequency saturation.
pub const DEFAULT_K1: f64 = 1.5;

/// Default length normalization.
pub const DEFAULT_B: f64 = 0.75;

/// BM25 scorer parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25 {
    pub k1: f64,
    pub b: f64,
}

impl Default for Bm25 {
    fn default() -> Self {
        Self {
            k1: DEFAULT_K1,
            b: DEFAULT_B,
        }
    }
}

/// Terms of a document: every top-level client string field, tokenized.
/// Arrays and nested objects contribute nothing.
pub fn document_tokens(doc: &Document) -> Vec<String> {
    doc.iter()
        .filter(|(field, _)| !is_system_field(field))
        .filter_map(|(_, value)| value.as_str())
        .flat_map(tokenize)
        .collect()
}

struct Posting {
    doc: usize,
    freq: usize,
}

impl Bm25 {
    pub fn new(k1: f64, b: f64) -> Self {
        Self { k1, b }
    }

    /// Rank documents against a query. Documents without a matching term are
    /// left out; ties keep input order.
    pub fn score(&self, query: &str, documents: &[Document]) -> Vec<ScoredDoc> {
        if documents.is_empty() {
            return Vec::new();
        }

        let mut index: HashMap<String, Vec<Posting>> = HashMap::new();
        let mut lengths = Vec::with_capacity(documents.len());
        for (i, doc) in documents.iter().enumerate() {
            let tokens = document_tokens(doc);
            lengths.push(tokens.len());
            let mut freq: HashMap<String, usize> = HashMap::new();
            for t in tokens {
                *freq.entry(t).or_default() += 1;
            }
            for (term, count) in freq {
                index.entry(term).or_default().push(Posting { doc: i, freq: count });
            }
        }

        let n = documents.len() as f64;
        let avg_len = lengths.iter().sum::<usize>() as f64 / n;
        let avg_len = if avg_len > 0.0 { avg_len } else { 1.0 };

        let mut scores = vec![0.0f64; documents.len()];
        for term in tokenize(query) {
            let Some(postings) = index.get(&term) else {
                continue;
            };
            let df = postings.len() as f64;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
            for posting in postings {
                let tf = posting.freq as f64;
                let dl = lengths[posting.doc] as f64;
                let norm = tf + self.k1 * (1.0 - self.b + self.b * dl / avg_len);
                scores[posting.doc] += idf * (tf * (self.k1 + 1.0)) / norm;
            }
        }

        let mut ranked: Vec<ScoredDoc> = documents
            .iter()
            .zip(scores)
            .filter(|(_, score)| *score > 0.0)
            .filter_map(|(doc, score)| doc_id(doc).map(|id| ScoredDoc::new(id, score)))
            .collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

        debug!(query, candidates = documents.len(), hits = ranked.len(), "BM25 scored");
        ranked
    }
}
