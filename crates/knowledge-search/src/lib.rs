//! # knowledge-search
//!
//! Free-text ranking for the knowledge engine.
//!
//! ## Features
//! - Okapi BM25 over an ad hoc document set, rebuilt per query
//! - Two-way fusion of keyword and graph rankings (max-normalized, 0.4/0.6)
//! - Three-way fusion adding vector similarity with caller-supplied weights
//!
//! Rankers hand results over as [`ScoredDoc`] lists keyed by document id, so
//! fusion never needs the documents themselves.

pub mod bm25;
pub mod error;
pub mod fusion;
pub mod types;

pub use bm25::{document_tokens, Bm25};
pub use error::SearchError;
pub use fusion::{
    fuse_enhanced, fuse_two_way, EnhancedHit, EnhancedScores, FusedHit, HybridScores,
    ENHANCED_SCALE, GRAPH_WEIGHT, KEYWORD_WEIGHT,
};
pub use types::{ScoredDoc, SearchMode};
