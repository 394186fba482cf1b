//! Storage layer for the knowledge engine.
//!
//! Provides RocksDB-backed whole-blob storage with:
//! - Column family isolation per resource kind (collections, histories, graphs, ...)
//! - Tenant/database scoped keys with prefix listing
//! - Atomic multi-blob commits via WriteBatch
//! - A per-resource lock registry for serialized read-modify-write

pub mod column_families;
pub mod db;
pub mod error;
pub mod keys;
pub mod locks;

pub use column_families::ResourceKind;
pub use db::{Storage, StorageBatch, StorageStats};
pub use error::StorageError;
pub use keys::ResourceKey;
pub use locks::ResourceLocks;
