//! Graph reads and manual link management over the per-database graph.

use knowledge_graph::{
    create_link, delete_link, graph_stats, node_detail, search_nodes, shortest_path, traverse,
    GraphStats, NodeDetail, PathResult, Traversal,
};
use knowledge_storage::ResourceKind;
use knowledge_types::{Graph, GraphEdge, GraphNode};
use tracing::{info, instrument};

use crate::engine::KnowledgeEngine;
use crate::error::ServiceError;

impl KnowledgeEngine {
    /// The whole graph of a database. Empty when nothing has been inserted.
    pub fn graph(&self, tenant: &str, database: &str) -> Result<Graph, ServiceError> {
        self.load_graph(&self.graph_key(tenant, database)?)
    }

    pub fn graph_stats(&self, tenant: &str, database: &str) -> Result<GraphStats, ServiceError> {
        Ok(graph_stats(&self.graph(tenant, database)?))
    }

    /// BFS from the node labeled `start_label`, up to `depth` hops.
    pub fn traverse(
        &self,
        tenant: &str,
        database: &str,
        start_label: &str,
        depth: usize,
    ) -> Result<Traversal, ServiceError> {
        let graph = self.graph(tenant, database)?;
        Ok(traverse(&graph, start_label, depth))
    }

    pub fn shortest_path(
        &self,
        tenant: &str,
        database: &str,
        from_label: &str,
        to_label: &str,
    ) -> Result<PathResult, ServiceError> {
        Ok(shortest_path(&self.graph(tenant, database)?, from_label, to_label))
    }

    /// Link two labels by hand. Unknown labels become manual nodes.
    #[instrument(skip(self))]
    pub fn create_link(
        &self,
        tenant: &str,
        database: &str,
        from_label: &str,
        to_label: &str,
        relation: &str,
    ) -> Result<GraphEdge, ServiceError> {
        let key = self.graph_key(tenant, database)?;
        self.locks.with_lock(ResourceKind::Graph, &key, || {
            let mut graph = self.load_graph(&key)?;
            let edge = create_link(&mut graph, from_label, to_label, relation)?;
            self.storage.put_json(ResourceKind::Graph, &key, &graph)?;
            info!(edge_id = %edge.id, relation, "Created manual link");
            Ok(edge)
        })
    }

    /// Remove an edge by id. `false` when no such edge exists.
    pub fn delete_link(&self, tenant: &str, database: &str, edge_id: &str) -> Result<bool, ServiceError> {
        let key = self.graph_key(tenant, database)?;
        self.locks.with_lock(ResourceKind::Graph, &key, || {
            let mut graph = self.load_graph(&key)?;
            if !delete_link(&mut graph, edge_id) {
                return Ok(false);
            }
            self.storage.put_json(ResourceKind::Graph, &key, &graph)?;
            info!(edge_id, "Deleted link");
            Ok(true)
        })
    }

    /// A node with its incident edges and neighbours.
    pub fn get_node(
        &self,
        tenant: &str,
        database: &str,
        node_id: &str,
    ) -> Result<Option<NodeDetail>, ServiceError> {
        Ok(node_detail(&self.graph(tenant, database)?, node_id))
    }

    /// Nodes whose label contains `query`, ignoring case.
    pub fn search_nodes(
        &self,
        tenant: &str,
        database: &str,
        query: &str,
    ) -> Result<Vec<GraphNode>, ServiceError> {
        let graph = self.graph(tenant, database)?;
        Ok(search_nodes(&graph, query).into_iter().cloned().collect())
    }

    pub fn list_nodes(
        &self,
        tenant: &str,
        database: &str,
        collection: Option<&str>,
    ) -> Result<Vec<GraphNode>, ServiceError> {
        let graph = self.graph(tenant, database)?;
        Ok(graph
            .nodes
            .into_iter()
            .filter(|n| collection.map_or(true, |c| n.collection == c))
            .collect())
    }

    pub fn list_edges(&self, tenant: &str, database: &str) -> Result<Vec<GraphEdge>, ServiceError> {
        Ok(self.graph(tenant, database)?.edges)
    }
}
