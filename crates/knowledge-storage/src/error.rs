//! Storage errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// The database was opened without one of the resource column families
    #[error("Missing column family for {0}")]
    MissingColumnFamily(String),

    /// Tenant, database or resource name unusable as a key segment
    #[error("Invalid resource key: {0}")]
    InvalidKey(String),

    /// A stored blob did not decode, or a value did not encode
    #[error("Blob codec error: {0}")]
    Codec(#[from] serde_json::Error),
}
