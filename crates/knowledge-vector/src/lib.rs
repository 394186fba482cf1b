//! # knowledge-vector
//!
//! Deterministic, model-free semantic search for the knowledge engine.
//!
//! Text is reduced to terms, each term is projected onto a fixed
//! 384-dimensional direction derived from its SHA-256 digest, and the
//! weighted sum is L2-normalized. A 20-bit random-hyperplane signature
//! buckets vectors so similarity search can shortlist candidates before
//! exact cosine scoring.
//!
//! ## Features
//! - Hashed TF-IDF embeddings with optional corpus IDF weights
//! - LSH prefix candidate selection with full-corpus fallback
//! - Per-collection vector and field indexes persisted in RocksDB
//! - Recommendations, combined vector + field filtering, embedding export
//!
//! Swapping in a learned model only means replacing [`generate_embedding`];
//! indexes and fusion consume the [`Embedding`] contract, nothing more.

pub mod embedding;
pub mod error;
pub mod index;
pub mod manager;

pub use embedding::{
    compute_idf, cosine_similarity, embed_tokens, embedding_text, generate_embedding,
    hash_term_to_vector, lsh_signature, preprocess, Embedding, IdfWeights, KEYWORD_COUNT,
    LSH_FUNCTIONS, TEXT_FIELDS, VECTOR_DIMENSION,
};
pub use error::VectorError;
pub use index::{find_similar, EmbeddingStats, FieldIndex, VectorHit, VectorIndex, VectorRecord};
pub use manager::{
    CombinedResults, EmbeddingExport, ExportFormat, FieldIndexStats, IndexManager, IndexStats,
    RebuildSummary, RecommendationOutcome, Recommendations, VectorIndexStats,
    VectorSearchOutcome, VectorSearchResults,
};
