//! Hashed embedding generation.
//!
//! An embedding is built in four steps:
//! 1. Preprocess: lowercase, strip punctuation, drop stopwords and short tokens
//! 2. Weight each distinct term by `tf * ln(1 + idf)`, with tf normalized by
//!    the document's most frequent term and idf defaulting to 1
//! 3. Project each term onto a direction derived from `sha256(term)` and sum
//! 4. L2-normalize, then sign the result with 20 random hyperplanes (LSH)
//!
//! Everything is deterministic: the same text and weights always produce the
//! same vector and signature.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;

use knowledge_types::{is_system_field, Document};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Embedding dimensionality.
pub const VECTOR_DIMENSION: usize = 384;

/// Number of hyperplanes in the LSH signature.
pub const LSH_FUNCTIONS: usize = 20;

/// Keywords kept per embedding.
pub const KEYWORD_COUNT: usize = 10;

/// Document fields whose text feeds the embedding, in order.
pub const TEXT_FIELDS: &[&str] = &["text", "content", "body", "description"];

const STOPWORDS: &[&str] = &[
    "the", "and", "or", "not", "a", "an", "is", "are", "was", "were", "be", "been", "to", "for",
    "of", "in", "on", "at", "by", "from", "as", "it", "with", "that", "this", "these", "those",
    "what", "which", "who", "when", "where", "why", "how", "all", "each", "every", "no", "such",
    "if", "else", "can", "could", "would", "should", "may", "might",
];

/// Term -> inverse document frequency.
pub type IdfWeights = BTreeMap<String, f64>;

/// A document or query embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Embedding {
    /// Unit-length vector, or all zeros when no term survived preprocessing
    pub vector: Vec<f32>,
    /// Norm before normalization
    pub magnitude: f64,
    /// LSH signature, one `0`/`1` per hyperplane
    pub hash: String,
    /// First distinct terms in text order
    pub keywords: Vec<String>,
    /// Every surviving term, repeats included
    pub tokens: Vec<String>,
}

impl Embedding {
    /// Embedding of text with no usable terms.
    pub fn empty() -> Self {
        Self {
            vector: vec![0.0; VECTOR_DIMENSION],
            magnitude: 0.0,
            hash: "0".repeat(LSH_FUNCTIONS),
            keywords: Vec::new(),
            tokens: Vec::new(),
        }
    }

    /// Whether the vector carries no signal.
    pub fn is_empty(&self) -> bool {
        self.magnitude == 0.0
    }
}

fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

/// Reduce text to embedding terms.
///
/// Punctuation is removed rather than split on, so `don't` becomes `dont`.
pub fn preprocess(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();

    cleaned
        .split_whitespace()
        .filter(|w| w.chars().count() > 2 && !is_stopword(w))
        .map(str::to_string)
        .collect()
}

/// Project one weighted term into vector space.
///
/// Dimension `i` reads byte `i % 32` of the term's SHA-256 digest, scaled to
/// [-1, 1] and multiplied by `weight`.
pub fn hash_term_to_vector(term: &str, weight: f64) -> Vec<f64> {
    let digest = Sha256::digest(term.as_bytes());
    (0..VECTOR_DIMENSION)
        .map(|i| {
            let unit = f64::from(digest[i % digest.len()]) / 255.0;
            (unit - 0.5) * 2.0 * weight
        })
        .collect()
}

fn hyperplanes() -> &'static [Vec<f32>] {
    static PLANES: OnceLock<Vec<Vec<f32>>> = OnceLock::new();
    PLANES.get_or_init(|| {
        (0..LSH_FUNCTIONS)
            .map(|i| {
                let mut plane = Vec::with_capacity(VECTOR_DIMENSION);
                let mut block = 0;
                while plane.len() < VECTOR_DIMENSION {
                    let digest = Sha256::digest(format!("lsh:{}:{}", i, block).as_bytes());
                    for byte in digest.iter() {
                        if plane.len() == VECTOR_DIMENSION {
                            break;
                        }
                        plane.push(f32::from(*byte) / 255.0 - 0.5);
                    }
                    block += 1;
                }
                plane
            })
            .collect()
    })
}

/// Random-hyperplane signature: bit `i` is `1` when the vector lies on the
/// positive side of hyperplane `i`.
///
/// Nearby vectors agree on most bits, so a shared prefix is a cheap bucket.
pub fn lsh_signature(vector: &[f32]) -> String {
    hyperplanes()
        .iter()
        .map(|plane| {
            let dot: f64 = plane
                .iter()
                .zip(vector)
                .map(|(p, v)| f64::from(*p) * f64::from(*v))
                .sum();
            if dot > 0.0 {
                '1'
            } else {
                '0'
            }
        })
        .collect()
}

/// Embed already preprocessed terms.
pub fn embed_tokens(tokens: Vec<String>, idf: Option<&IdfWeights>) -> Embedding {
    if tokens.is_empty() {
        return Embedding::empty();
    }

    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    for token in &tokens {
        let count = counts.entry(token.as_str()).or_insert(0);
        if *count == 0 {
            order.push(token.as_str());
        }
        *count += 1;
    }
    let max_tf = counts.values().copied().max().unwrap_or(1) as f64;

    let mut sum = vec![0.0f64; VECTOR_DIMENSION];
    for term in &order {
        let tf = counts[term] as f64 / max_tf;
        let term_idf = idf.and_then(|w| w.get(*term)).copied().unwrap_or(1.0);
        let weight = tf * (1.0 + term_idf).ln();
        for (acc, v) in sum.iter_mut().zip(hash_term_to_vector(term, weight)) {
            *acc += v;
        }
    }

    let magnitude = sum.iter().map(|v| v * v).sum::<f64>().sqrt();
    let vector: Vec<f32> = if magnitude > 0.0 {
        sum.iter().map(|v| (v / magnitude) as f32).collect()
    } else {
        vec![0.0; VECTOR_DIMENSION]
    };

    let keywords = order
        .iter()
        .take(KEYWORD_COUNT)
        .map(|t| t.to_string())
        .collect();
    let hash = lsh_signature(&vector);

    Embedding {
        vector,
        magnitude,
        hash,
        keywords,
        tokens,
    }
}

/// Embed free text.
pub fn generate_embedding(text: &str, idf: Option<&IdfWeights>) -> Embedding {
    embed_tokens(preprocess(text), idf)
}

/// Cosine similarity in [-1, 1]; 0 when either side is a zero vector or the
/// dimensions differ.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Smoothed corpus IDF: `ln((N + 1) / (df + 1)) + 1`, always positive.
pub fn compute_idf(corpus: &[Vec<String>]) -> IdfWeights {
    let n = corpus.len() as f64;
    let mut df: HashMap<&str, usize> = HashMap::new();
    for tokens in corpus {
        let distinct: HashSet<&str> = tokens.iter().map(String::as_str).collect();
        for term in distinct {
            *df.entry(term).or_insert(0) += 1;
        }
    }

    df.into_iter()
        .map(|(term, df)| {
            let idf = ((n + 1.0) / (df as f64 + 1.0)).ln() + 1.0;
            (term.to_string(), idf)
        })
        .collect()
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Text used to embed a document.
///
/// Concatenates the [`TEXT_FIELDS`] that are present. Documents with none of
/// them fall back to every non-system string value.
pub fn embedding_text(doc: &Document) -> String {
    let parts: Vec<String> = TEXT_FIELDS
        .iter()
        .filter_map(|field| doc.get(*field).and_then(value_text))
        .collect();
    if !parts.is_empty() {
        return parts.join(" ");
    }

    doc.iter()
        .filter(|(key, _)| !is_system_field(key))
        .flat_map(|(_, value)| match value {
            Value::String(s) => vec![s.clone()],
            Value::Array(items) => items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
