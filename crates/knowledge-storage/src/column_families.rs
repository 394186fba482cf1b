//! Column family definitions for RocksDB.
//!
//! Each resource kind lives in its own column family:
//! - collections: whole document arrays, one blob per collection
//! - histories: per-document snapshot lists (key name `{collection}:{docId}`)
//! - graphs: one node/edge graph per database
//! - vector_indexes / field_indexes: rebuildable per-collection caches
//! - memories: agent memory items, one blob per database

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Column family name for document collections
pub const CF_COLLECTIONS: &str = "collections";

/// Column family name for document version histories
pub const CF_HISTORIES: &str = "histories";

/// Column family name for knowledge graphs
pub const CF_GRAPHS: &str = "graphs";

/// Column family name for vector indexes
pub const CF_VECTOR_INDEXES: &str = "vector_indexes";

/// Column family name for field indexes
pub const CF_FIELD_INDEXES: &str = "field_indexes";

/// Column family name for agent memories
pub const CF_MEMORIES: &str = "memories";

/// All column family names
pub const ALL_CF_NAMES: &[&str] = &[
    CF_COLLECTIONS,
    CF_HISTORIES,
    CF_GRAPHS,
    CF_VECTOR_INDEXES,
    CF_FIELD_INDEXES,
    CF_MEMORIES,
];

/// Kind of stored resource; selects the column family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Collection,
    History,
    Graph,
    VectorIndex,
    FieldIndex,
    Memory,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 6] = [
        ResourceKind::Collection,
        ResourceKind::History,
        ResourceKind::Graph,
        ResourceKind::VectorIndex,
        ResourceKind::FieldIndex,
        ResourceKind::Memory,
    ];

    /// Column family holding this kind.
    pub fn cf_name(&self) -> &'static str {
        match self {
            ResourceKind::Collection => CF_COLLECTIONS,
            ResourceKind::History => CF_HISTORIES,
            ResourceKind::Graph => CF_GRAPHS,
            ResourceKind::VectorIndex => CF_VECTOR_INDEXES,
            ResourceKind::FieldIndex => CF_FIELD_INDEXES,
            ResourceKind::Memory => CF_MEMORIES,
        }
    }
}

/// Options for blob families that are rewritten wholesale on every change.
fn blob_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(CF_COLLECTIONS, blob_options()),
        ColumnFamilyDescriptor::new(CF_HISTORIES, blob_options()),
        ColumnFamilyDescriptor::new(CF_GRAPHS, blob_options()),
        ColumnFamilyDescriptor::new(CF_VECTOR_INDEXES, blob_options()),
        ColumnFamilyDescriptor::new(CF_FIELD_INDEXES, Options::default()),
        ColumnFamilyDescriptor::new(CF_MEMORIES, Options::default()),
    ]
}
