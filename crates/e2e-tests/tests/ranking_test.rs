//! Ranking E2E tests for knowledgedb.
//!
//! BM25 behaviour, embedding similarity, and the score bounds of two-way and
//! enhanced fusion over a real engine.

use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use e2e_tests::{articles, TestHarness, DATABASE, TENANT};
use knowledge_search::{Bm25, SearchMode};
use knowledge_types::{Document, FusionWeights};
use knowledge_vector::{cosine_similarity, generate_embedding};

fn corpus(bodies: &[(&str, &str)]) -> Vec<Document> {
    bodies
        .iter()
        .map(|(id, body)| match json!({"_id": id, "body": body}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        })
        .collect()
}

fn score_of(docs: &[Document], query: &str, id: &str) -> f64 {
    Bm25::default()
        .score(query, docs)
        .into_iter()
        .find(|r| r.doc_id == id)
        .map(|r| r.score)
        .unwrap_or(0.0)
}

/// One more occurrence of a query term never lowers a document's score.
#[test]
fn test_bm25_term_frequency_is_monotonic() {
    let filler = ("other", "gardening tips for spring flowers");
    let once = corpus(&[("target", "rust storage engine"), filler]);
    let twice = corpus(&[("target", "rust storage engine rust"), filler]);
    let thrice = corpus(&[("target", "rust storage engine rust rust"), filler]);

    let s1 = score_of(&once, "rust", "target");
    let s2 = score_of(&twice, "rust", "target");
    let s3 = score_of(&thrice, "rust", "target");
    assert!(s1 > 0.0);
    assert!(s2 >= s1, "{} < {}", s2, s1);
    assert!(s3 >= s2, "{} < {}", s3, s2);

    // Documents without any query term are left out
    let ranked = Bm25::default().score("rust", &once);
    assert_eq!(ranked.len(), 1);
}

/// An embedding is maximally similar to itself and less similar to text on
/// another topic.
#[test]
fn test_embedding_self_similarity() {
    let text = "Rust ownership and the borrow checker give memory safety";
    let a = generate_embedding(text, None);
    let b = generate_embedding(text, None);
    assert_eq!(a.vector, b.vector, "embeddings are deterministic");
    assert!((cosine_similarity(&a.vector, &a.vector) - 1.0).abs() < 1e-6);

    let other = generate_embedding("Gardening tips for spring flowers", None);
    assert!(cosine_similarity(&a.vector, &other.vector) < 0.9);

    let empty = generate_embedding("the and of", None);
    assert!(empty.is_empty());
    assert_eq!(cosine_similarity(&a.vector, &empty.vector), 0.0);
}

/// Hybrid scores stay within [0, 1] and keyword-only hits keep a positive
/// hybrid score.
#[test]
fn test_hybrid_scores_bounded() {
    let harness = TestHarness::new();
    harness.insert("articles", articles());

    let hits = harness
        .engine
        .search(TENANT, DATABASE, "rust query performance", SearchMode::Hybrid, None, None)
        .unwrap();
    assert!(!hits.is_empty());
    for hit in &hits {
        for score in [hit.scores.keyword, hit.scores.graph, hit.scores.hybrid] {
            assert!((0.0..=1.0).contains(&score), "score {} out of range", score);
        }
        assert!(hit.scores.hybrid > 0.0);
    }
    for pair in hits.windows(2) {
        assert!(pair[0].scores.hybrid >= pair[1].scores.hybrid);
    }
}

/// With weights summing to 1, enhanced hybrid scores stay within [0, 1] and
/// the on-topic article ranks first.
#[test]
fn test_enhanced_search_ranks_on_topic_first() {
    let harness = TestHarness::new();
    harness.insert("articles", articles());

    let weights = FusionWeights {
        keyword: 0.5,
        graph: 0.1,
        vector: 0.4,
    };
    let hits = harness
        .engine
        .enhanced_search(TENANT, DATABASE, "borrow checker ownership", Some(weights), None, Some(3))
        .unwrap();
    assert!(!hits.is_empty());
    assert_eq!(hits[0].document["title"], "Ownership in Rust");
    for hit in &hits {
        assert!((0.0..=1.0).contains(&hit.hybrid_score));
        assert!(hit.scores.hybrid <= 100);
    }

    let negative = FusionWeights {
        keyword: -1.0,
        graph: 0.5,
        vector: 0.5,
    };
    assert!(harness
        .engine
        .enhanced_search(TENANT, DATABASE, "rust", Some(negative), None, None)
        .is_err());
}

/// Vector search across collections returns the article sharing the
/// query's terms, best matches first.
#[test]
fn test_vector_search_across_collections() {
    let harness = TestHarness::new();
    harness.insert("articles", articles());
    harness.insert("notes", vec![json!({"content": "Remember to water the garden flowers"})]);

    let hits = harness
        .engine
        .vector_search_all(TENANT, DATABASE, "borrow checker ownership", None, Some(4))
        .unwrap();
    let on_topic = hits
        .iter()
        .find(|h| {
            h.document
                .as_ref()
                .is_some_and(|d| d["title"] == "Ownership in Rust")
        })
        .expect("on-topic article missing");
    assert_eq!(on_topic.collection, "articles");
    assert!(on_topic.similarity > 0.0);
    for pair in hits.windows(2) {
        assert!(pair[0].similarity >= pair[1].similarity);
    }
}
