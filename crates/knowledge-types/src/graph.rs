//! Knowledge graph model.
//!
//! Nodes are entities extracted from document fields (or created by hand);
//! edges connect them. One graph exists per tenant database and is shared by
//! all of its collections.

use serde::{Deserialize, Serialize};

/// Node type assigned to every extracted or manual entity.
pub const ENTITY_NODE_TYPE: &str = "ENTITY";

/// Field and collection recorded on manually created nodes.
pub const MANUAL_SOURCE: &str = "manual";

/// An entity node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphNode {
    pub id: String,
    /// Entity text as found in the source field
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: String,
    /// Field the label was extracted from
    pub field: String,
    pub collection: String,
    /// Originating document; `None` for manual nodes
    pub doc_id: Option<String>,
    pub created_at: String,
}

impl GraphNode {
    /// Whether this node's label equals `label`, ignoring case.
    pub fn label_matches(&self, label: &str) -> bool {
        self.label.to_lowercase() == label.to_lowercase()
    }
}

/// A relation between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphEdge {
    pub id: String,
    /// Source node id
    pub from: String,
    /// Target node id
    pub to: String,
    pub relation: String,
    pub weight: f32,
    /// True when created by extraction, false for manual links
    pub auto: bool,
    /// Document whose insert produced this edge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_doc_id: Option<String>,
    pub created_at: String,
}

impl GraphEdge {
    /// Whether the edge touches `node_id` at either end.
    pub fn touches(&self, node_id: &str) -> bool {
        self.from == node_id || self.to == node_id
    }

    /// The opposite endpoint when walking from `node_id`.
    pub fn other_end(&self, node_id: &str) -> &str {
        if self.from == node_id {
            &self.to
        } else {
            &self.from
        }
    }
}

/// The whole graph of a database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// First node whose label matches case-insensitively.
    pub fn find_by_label(&self, label: &str) -> Option<&GraphNode> {
        let wanted = label.to_lowercase();
        self.nodes.iter().find(|n| n.label.to_lowercase() == wanted)
    }

    /// Edges incident to a node.
    pub fn edges_of<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        self.edges.iter().filter(move |e| e.touches(node_id))
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
