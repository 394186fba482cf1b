//! # knowledge-memory
//!
//! Long-lived memory for AI agents.
//!
//! Agents store short facts, preferences and notes with [`MemoryStore::remember`]
//! and get them back by free-text query with [`MemoryStore::recall`]. Recall
//! ranks by keyword overlap ([`scorer`]), not embeddings: a query token found
//! in the content counts 1, one also found among the item's keywords counts
//! another 0.5, and the total is divided by the number of query tokens.
//!
//! Conversations use the same blob through the [`session`] operations: each
//! message is a `conversation` memory tagged with its session id, recalled
//! by the same scorer.
//!
//! All memories of one database live in a single blob, read and written back
//! under that database's memory lock.

pub mod error;
pub mod scorer;
pub mod session;
pub mod store;

pub use error::MemoryStoreError;
pub use scorer::{keyword_similarity, score, ScoredMemory};
pub use session::{SessionRecall, SessionTranscript, SESSION_MEMORY_TYPE};
pub use store::{derive_keywords, MemoryPage, MemoryStore, NewMemory, RecalledMemory};
