//! # knowledge-graph
//!
//! Builds and queries the knowledge graph derived from documents.
//!
//! Every document insert extracts entity candidates from hinted fields
//! (`name`, `team`, `tags`, ...), deduplicates them against existing nodes by
//! (label, field, collection), and links them:
//! - cross-document edges between equal labels (`team_matches_team`)
//! - intra-document edges between all entities of one document (`name_in_team`)
//!
//! Reads cover BFS traversal, shortest paths, label search, statistics and a
//! proximity score used by free-text search.

pub mod engine;
pub mod error;
pub mod extract;
pub mod traverse;

pub use engine::{
    create_link, delete_link, graph_stats, node_detail, process_delete, process_insert,
    process_update, remove_collection, search_nodes, ConnectedNode, GraphChange, GraphStats,
    NodeDetail,
};
pub use error::GraphError;
pub use extract::{extract_candidates, is_entity_field, EntityCandidate, ENTITY_FIELD_HINTS};
pub use traverse::{graph_score, shortest_path, traverse, GraphIndex, PathResult, Traversal};
