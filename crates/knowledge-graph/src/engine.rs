//! Graph maintenance: applying document inserts and deletes, manual links,
//! node lookups and statistics.

use std::collections::{HashMap, HashSet};

use knowledge_types::{
    doc_id, generate_id, now_timestamp, Document, Graph, GraphEdge, GraphNode, ENTITY_NODE_TYPE,
    MANUAL_SOURCE,
};
use serde::Serialize;
use tracing::debug;

use crate::error::GraphError;
use crate::extract::extract_candidates;

/// Counts of what a graph mutation changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphChange {
    pub nodes_added: usize,
    pub edges_added: usize,
    pub nodes_removed: usize,
    pub edges_removed: usize,
}

/// Fold a newly inserted (or re-derived) document into the graph.
///
/// Candidates reuse an existing node with the same lowercase label, field and
/// collection; otherwise a new node is added. Each candidate is then linked
/// to every pre-existing node with an equal label (unless that node came from
/// the same document and field), and all nodes of the document are linked
/// pairwise.
pub fn process_insert(graph: &mut Graph, doc: &Document, collection: &str) -> GraphChange {
    let mut change = GraphChange::default();
    let Some(doc_id) = doc_id(doc) else {
        return change;
    };
    let candidates = extract_candidates(doc);
    if candidates.is_empty() {
        return change;
    }

    let now = now_timestamp();
    let existing_len = graph.nodes.len();

    // Resolve each candidate to a node position, adding nodes as needed.
    let mut resolved: Vec<usize> = Vec::with_capacity(candidates.len());
    for candidate in &candidates {
        let lower = candidate.label.to_lowercase();
        let found = graph.nodes.iter().position(|n| {
            n.field == candidate.field
                && n.collection == collection
                && n.label.to_lowercase() == lower
        });
        let pos = match found {
            Some(pos) => pos,
            None => {
                graph.nodes.push(GraphNode {
                    id: generate_id("node"),
                    label: candidate.label.clone(),
                    node_type: ENTITY_NODE_TYPE.to_string(),
                    field: candidate.field.clone(),
                    collection: collection.to_string(),
                    doc_id: Some(doc_id.to_string()),
                    created_at: now.clone(),
                });
                change.nodes_added += 1;
                graph.nodes.len() - 1
            }
        };
        resolved.push(pos);
    }

    let mut new_edges = Vec::new();

    // Cross-document edges against nodes that existed before this insert.
    for (candidate, &target) in candidates.iter().zip(&resolved) {
        let lower = candidate.label.to_lowercase();
        for existing in &graph.nodes[..existing_len] {
            if existing.doc_id.as_deref() == Some(doc_id) && existing.field == candidate.field {
                continue;
            }
            if existing.label.to_lowercase() != lower {
                continue;
            }
            new_edges.push(auto_edge(
                &existing.id,
                &graph.nodes[target].id,
                format!("{}_matches_{}", candidate.field, existing.field),
                doc_id,
                &now,
            ));
        }
    }

    // Intra-document edges: complete graph over this document's nodes.
    let mut members: Vec<usize> = Vec::new();
    for &pos in &resolved {
        if !members.contains(&pos) {
            members.push(pos);
        }
    }
    for (pos, node) in graph.nodes[..existing_len].iter().enumerate() {
        if node.doc_id.as_deref() == Some(doc_id) && !members.contains(&pos) {
            members.push(pos);
        }
    }
    for (i, &a) in members.iter().enumerate() {
        for &b in &members[i + 1..] {
            let (from, to) = (&graph.nodes[a], &graph.nodes[b]);
            new_edges.push(auto_edge(
                &from.id,
                &to.id,
                format!("{}_in_{}", from.field, to.field),
                doc_id,
                &now,
            ));
        }
    }

    change.edges_added = new_edges.len();
    graph.edges.extend(new_edges);
    debug!(
        doc_id,
        collection,
        nodes_added = change.nodes_added,
        edges_added = change.edges_added,
        "Graph updated for insert"
    );
    change
}

fn auto_edge(from: &str, to: &str, relation: String, source_doc: &str, now: &str) -> GraphEdge {
    GraphEdge {
        id: generate_id("edge"),
        from: from.to_string(),
        to: to.to_string(),
        relation,
        weight: 1.0,
        auto: true,
        source_doc_id: Some(source_doc.to_string()),
        created_at: now.to_string(),
    }
}

/// Remove a document's nodes, every edge touching them, and every edge the
/// document's insert introduced.
///
/// A node the document created but a later document reused is handed to
/// that document instead, so the later document keeps its links.
pub fn process_delete(graph: &mut Graph, doc_id: &str) -> GraphChange {
    let handed_over = release_shared_nodes(graph, doc_id);
    if handed_over > 0 {
        debug!(doc_id, handed_over, "Shared nodes changed owner");
    }
    let doc_ids = HashSet::from([doc_id.to_string()]);
    remove_where(graph, &doc_ids, |n| n.doc_id.as_deref() == Some(doc_id))
}

/// Replace a changed document's entities with ones derived from its current
/// state. Links other documents hold onto its nodes are preserved.
pub fn process_update(graph: &mut Graph, doc: &Document, collection: &str) -> GraphChange {
    let removed = match doc_id(doc) {
        Some(id) => process_delete(graph, id),
        None => GraphChange::default(),
    };
    let added = process_insert(graph, doc, collection);
    GraphChange {
        nodes_added: added.nodes_added,
        edges_added: added.edges_added,
        nodes_removed: removed.nodes_removed,
        edges_removed: removed.edges_removed,
    }
}

/// Move nodes owned by `doc_id` to the first other document that reused
/// them. Reuse leaves a self-loop `*_matches_*` edge on the node introduced
/// by the reusing document. Returns the number of nodes that moved.
fn release_shared_nodes(graph: &mut Graph, doc_id: &str) -> usize {
    let mut heirs: HashMap<&str, &str> = HashMap::new();
    for edge in &graph.edges {
        if edge.from != edge.to {
            continue;
        }
        match edge.source_doc_id.as_deref() {
            Some(source) if source != doc_id => {
                heirs.entry(edge.from.as_str()).or_insert(source);
            }
            _ => {}
        }
    }

    let mut moved = 0;
    for node in graph
        .nodes
        .iter_mut()
        .filter(|n| n.doc_id.as_deref() == Some(doc_id))
    {
        if let Some(heir) = heirs.get(node.id.as_str()) {
            node.doc_id = Some(heir.to_string());
            moved += 1;
        }
    }
    moved
}

/// Remove everything derived from one collection: its nodes and all edges
/// touching them or introduced by any of `doc_ids`.
pub fn remove_collection(graph: &mut Graph, collection: &str, doc_ids: &HashSet<String>) -> GraphChange {
    remove_where(graph, doc_ids, |n| {
        n.collection == collection || n.doc_id.as_ref().is_some_and(|d| doc_ids.contains(d))
    })
}

fn remove_where(
    graph: &mut Graph,
    source_docs: &HashSet<String>,
    doomed: impl Fn(&GraphNode) -> bool,
) -> GraphChange {
    let removed_ids: HashSet<String> = graph
        .nodes
        .iter()
        .filter(|n| doomed(n))
        .map(|n| n.id.clone())
        .collect();

    let nodes_before = graph.nodes.len();
    let edges_before = graph.edges.len();

    graph
        .nodes
        .retain(|n| !removed_ids.contains(&n.id));
    graph.edges.retain(|e| {
        !removed_ids.contains(&e.from)
            && !removed_ids.contains(&e.to)
            && !e
                .source_doc_id
                .as_ref()
                .is_some_and(|d| source_docs.contains(d))
    });

    GraphChange {
        nodes_removed: nodes_before - graph.nodes.len(),
        edges_removed: edges_before - graph.edges.len(),
        ..Default::default()
    }
}

/// Link two labels by hand, creating manual nodes for unknown labels.
pub fn create_link(
    graph: &mut Graph,
    from_label: &str,
    to_label: &str,
    relation: &str,
) -> Result<GraphEdge, GraphError> {
    for (what, value) in [("fromLabel", from_label), ("toLabel", to_label), ("relation", relation)] {
        if value.trim().is_empty() {
            return Err(GraphError::InvalidInput(format!("{} must not be empty", what)));
        }
    }

    let now = now_timestamp();
    let from = find_or_create_manual(graph, from_label, &now);
    let to = find_or_create_manual(graph, to_label, &now);

    let edge = GraphEdge {
        id: generate_id("edge"),
        from,
        to,
        relation: relation.to_string(),
        weight: 1.0,
        auto: false,
        source_doc_id: None,
        created_at: now,
    };
    graph.edges.push(edge.clone());
    Ok(edge)
}

fn find_or_create_manual(graph: &mut Graph, label: &str, now: &str) -> String {
    if let Some(node) = graph.find_by_label(label) {
        return node.id.clone();
    }
    let node = GraphNode {
        id: generate_id("node"),
        label: label.to_string(),
        node_type: ENTITY_NODE_TYPE.to_string(),
        field: MANUAL_SOURCE.to_string(),
        collection: MANUAL_SOURCE.to_string(),
        doc_id: None,
        created_at: now.to_string(),
    };
    let id = node.id.clone();
    graph.nodes.push(node);
    id
}

/// Remove one edge by id. `false` when no such edge exists.
pub fn delete_link(graph: &mut Graph, edge_id: &str) -> bool {
    match graph.edges.iter().position(|e| e.id == edge_id) {
        Some(pos) => {
            graph.edges.remove(pos);
            true
        }
        None => false,
    }
}

/// A node with its neighbourhood.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDetail {
    pub node: GraphNode,
    pub connected_nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

/// Look up a node by id along with its incident edges and neighbours.
pub fn node_detail(graph: &Graph, node_id: &str) -> Option<NodeDetail> {
    let node = graph.node(node_id)?.clone();
    let edges: Vec<GraphEdge> = graph.edges_of(node_id).cloned().collect();
    let neighbor_ids: HashSet<&str> = edges.iter().map(|e| e.other_end(node_id)).collect();
    let connected_nodes = graph
        .nodes
        .iter()
        .filter(|n| neighbor_ids.contains(n.id.as_str()))
        .cloned()
        .collect();
    Some(NodeDetail {
        node,
        connected_nodes,
        edges,
    })
}

/// Nodes whose label contains `query`, ignoring case.
pub fn search_nodes<'a>(graph: &'a Graph, query: &str) -> Vec<&'a GraphNode> {
    let q = query.to_lowercase();
    graph
        .nodes
        .iter()
        .filter(|n| n.label.to_lowercase().contains(&q))
        .collect()
}

/// A node and how many edge endpoints touch it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedNode {
    pub node_id: String,
    pub label: String,
    pub connections: usize,
}

/// Summary statistics for a graph.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    /// edges / (n(n-1)/2), rounded to three decimals
    pub density: f64,
    pub top_connected: Vec<ConnectedNode>,
}

const TOP_CONNECTED: usize = 10;

pub fn graph_stats(graph: &Graph) -> GraphStats {
    let node_count = graph.nodes.len();
    let edge_count = graph.edges.len();
    let max_edges = node_count as f64 * (node_count as f64 - 1.0) / 2.0;
    let density = if node_count >= 2 {
        (edge_count as f64 / max_edges * 1000.0).round() / 1000.0
    } else {
        0.0
    };

    // Degree per node, remembering first-seen order for stable ties.
    let mut order: Vec<&str> = Vec::new();
    let mut degree: HashMap<&str, usize> = HashMap::new();
    for edge in &graph.edges {
        for end in [edge.from.as_str(), edge.to.as_str()] {
            let count = degree.entry(end).or_insert_with(|| {
                order.push(end);
                0
            });
            *count += 1;
        }
    }

    let mut ranked: Vec<(&str, usize)> = order.into_iter().map(|id| (id, degree[id])).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));

    let top_connected = ranked
        .into_iter()
        .take(TOP_CONNECTED)
        .map(|(id, connections)| ConnectedNode {
            node_id: id.to_string(),
            label: graph
                .node(id)
                .map(|n| n.label.clone())
                .unwrap_or_else(|| "Unknown".to_string()),
            connections,
        })
        .collect();

    GraphStats {
        node_count,
        edge_count,
        density,
        top_connected,
    }
}
