//! Breadth-first traversal, shortest paths and graph proximity scoring.

use std::collections::{HashMap, HashSet, VecDeque};

use knowledge_types::{doc_id, tokenize, Document, Graph, GraphEdge, GraphNode};
use serde::Serialize;

/// Lookup tables over a graph: node position by id, incident edges by node.
///
/// Built once per read so BFS does not rescan the edge list per node.
pub struct GraphIndex<'a> {
    graph: &'a Graph,
    positions: HashMap<&'a str, usize>,
    incident: HashMap<&'a str, Vec<usize>>,
}

impl<'a> GraphIndex<'a> {
    pub fn new(graph: &'a Graph) -> Self {
        let positions = graph
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();

        let mut incident: HashMap<&'a str, Vec<usize>> = HashMap::new();
        for (i, edge) in graph.edges.iter().enumerate() {
            incident.entry(edge.from.as_str()).or_default().push(i);
            if edge.to != edge.from {
                incident.entry(edge.to.as_str()).or_default().push(i);
            }
        }

        Self {
            graph,
            positions,
            incident,
        }
    }

    pub fn node(&self, id: &str) -> Option<&'a GraphNode> {
        self.positions.get(id).map(|&i| &self.graph.nodes[i])
    }

    /// Incident edges of a node, in insertion order.
    fn edges_of(&self, id: &str) -> impl Iterator<Item = &'a GraphEdge> + '_ {
        self.incident
            .get(id)
            .into_iter()
            .flatten()
            .map(move |&i| &self.graph.edges[i])
    }

    /// First node whose label equals `label`, ignoring case.
    pub fn find_label(&self, label: &str) -> Option<&'a GraphNode> {
        self.graph.find_by_label(label)
    }

    /// BFS from a node id. Each node is visited once; the edge that first
    /// reached a node is recorded with it. Stops early once the frontier is
    /// empty, so a large `max_depth` costs no more than the component size.
    fn bfs(&self, start: &'a GraphNode, max_depth: usize) -> Traversal {
        let mut visited: HashSet<&str> = HashSet::from([start.id.as_str()]);
        let mut nodes = vec![start.clone()];
        let mut edges = Vec::new();
        let mut frontier = vec![start.id.as_str()];

        for _ in 0..max_depth {
            let mut next = Vec::new();
            for node_id in frontier {
                for edge in self.edges_of(node_id) {
                    let neighbor = edge.other_end(node_id);
                    if visited.contains(neighbor) {
                        continue;
                    }
                    let Some(neighbor_node) = self.node(neighbor) else {
                        continue;
                    };
                    visited.insert(neighbor_node.id.as_str());
                    next.push(neighbor_node.id.as_str());
                    edges.push(edge.clone());
                    nodes.push(neighbor_node.clone());
                }
            }
            if next.is_empty() {
                break;
            }
            frontier = next;
        }

        Traversal {
            visited_count: nodes.len(),
            nodes,
            edges,
        }
    }
}

/// Nodes and edges reached by a traversal.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Traversal {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub visited_count: usize,
}

/// Outcome of a shortest-path search.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PathResult {
    /// Alternating labels and relations: `[label, relation, label, ...]`
    pub path: Vec<String>,
    /// Number of hops
    pub length: usize,
    pub found: bool,
}

/// Traverse from the first node labeled `start_label` up to `max_depth` hops.
///
/// An unknown label yields an empty traversal.
pub fn traverse(graph: &Graph, start_label: &str, max_depth: usize) -> Traversal {
    let index = GraphIndex::new(graph);
    match index.find_label(start_label) {
        Some(start) => index.bfs(start, max_depth),
        None => Traversal::default(),
    }
}

/// Fewest-hop path between two labels.
pub fn shortest_path(graph: &Graph, from_label: &str, to_label: &str) -> PathResult {
    let index = GraphIndex::new(graph);
    let (Some(from), Some(to)) = (index.find_label(from_label), index.find_label(to_label)) else {
        return PathResult::default();
    };
    if from.id == to.id {
        return PathResult {
            path: vec![from.label.clone()],
            length: 0,
            found: true,
        };
    }

    // node id -> (previous node id, edge used)
    let mut parents: HashMap<&str, (&str, &GraphEdge)> = HashMap::new();
    let mut visited: HashSet<&str> = HashSet::from([from.id.as_str()]);
    let mut queue = VecDeque::from([from.id.as_str()]);

    while let Some(current) = queue.pop_front() {
        for edge in index.edges_of(current) {
            let neighbor = edge.other_end(current);
            if visited.contains(neighbor) {
                continue;
            }
            let Some(neighbor_node) = index.node(neighbor) else {
                continue;
            };
            visited.insert(neighbor_node.id.as_str());
            parents.insert(neighbor_node.id.as_str(), (current, edge));

            if neighbor_node.id == to.id {
                return rebuild_path(&index, &parents, to);
            }
            queue.push_back(neighbor_node.id.as_str());
        }
    }

    PathResult::default()
}

fn rebuild_path(
    index: &GraphIndex<'_>,
    parents: &HashMap<&str, (&str, &GraphEdge)>,
    target: &GraphNode,
) -> PathResult {
    let mut reversed = vec![target.label.clone()];
    let mut current = target.id.as_str();
    let mut hops = 0;
    while let Some(&(previous, edge)) = parents.get(current) {
        reversed.push(edge.relation.clone());
        let label = index.node(previous).map(|n| n.label.clone()).unwrap_or_default();
        reversed.push(label);
        current = previous;
        hops += 1;
    }
    reversed.reverse();
    PathResult {
        path: reversed,
        length: hops,
        found: true,
    }
}

/// Score documents by graph proximity to a free-text query.
///
/// Nodes whose label contains any query token seed a BFS of `depth` hops;
/// each document scores one point per reached node that references it.
/// Only documents in `documents` are ranked, highest score first, ties in
/// input order.
pub fn graph_score(
    graph: &Graph,
    query: &str,
    depth: usize,
    documents: &[Document],
) -> Vec<(String, usize)> {
    let tokens = tokenize(query);
    if tokens.is_empty() || graph.nodes.is_empty() {
        return Vec::new();
    }

    let index = GraphIndex::new(graph);
    let mut hits: HashMap<String, usize> = HashMap::new();
    for node in &graph.nodes {
        let label = node.label.to_lowercase();
        if !tokens.iter().any(|t| label.contains(t.as_str())) {
            continue;
        }
        for reached in index.bfs(node, depth).nodes {
            if let Some(id) = reached.doc_id {
                *hits.entry(id).or_default() += 1;
            }
        }
    }

    let mut ranked: Vec<(String, usize)> = documents
        .iter()
        .filter_map(doc_id)
        .filter_map(|id| hits.get(id).map(|&score| (id.to_string(), score)))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use knowledge_types::ENTITY_NODE_TYPE;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn node(id: &str, label: &str, doc: Option<&str>) -> GraphNode {
        GraphNode {
            id: id.to_string(),
            label: label.to_string(),
            node_type: ENTITY_NODE_TYPE.to_string(),
            field: "name".to_string(),
            collection: "c".to_string(),
            doc_id: doc.map(str::to_string),
            created_at: String::new(),
        }
    }

    fn edge(id: &str, from: &str, to: &str, relation: &str) -> GraphEdge {
        GraphEdge {
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            relation: relation.to_string(),
            weight: 1.0,
            auto: true,
            source_doc_id: None,
            created_at: String::new(),
        }
    }

    /// A - B - C - D chain plus an isolated E.
    fn chain() -> Graph {
        Graph {
            nodes: vec![
                node("a", "Alpha", Some("d1")),
                node("b", "Beta", Some("d1")),
                node("c", "Gamma", Some("d2")),
                node("d", "Delta", Some("d3")),
                node("e", "Epsilon", None),
            ],
            edges: vec![
                edge("e1", "a", "b", "ab"),
                edge("e2", "c", "b", "cb"),
                edge("e3", "c", "d", "cd"),
            ],
        }
    }

    fn labels(t: &Traversal) -> Vec<&str> {
        t.nodes.iter().map(|n| n.label.as_str()).collect()
    }

    #[test]
    fn test_traverse_depth_bounds() {
        let g = chain();
        assert_eq!(labels(&traverse(&g, "alpha", 1)), vec!["Alpha", "Beta"]);
        let full = traverse(&g, "ALPHA", 5);
        assert_eq!(labels(&full), vec!["Alpha", "Beta", "Gamma", "Delta"]);
        assert_eq!(full.visited_count, 4);
        assert_eq!(full.edges.len(), 3);
    }

    #[test]
    fn test_traverse_unknown_label_is_empty() {
        let t = traverse(&chain(), "nobody", 2);
        assert_eq!(t, Traversal::default());
        assert_eq!(t.visited_count, 0);
    }

    #[test]
    fn test_traverse_never_revisits_in_cycle() {
        let mut g = chain();
        g.edges.push(edge("e4", "d", "a", "da"));
        g.edges.push(edge("e5", "a", "a", "self"));
        let t = traverse(&g, "alpha", 5);
        let unique: HashSet<&str> = t.nodes.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(unique.len(), t.nodes.len());
        assert_eq!(t.visited_count, 4);
    }

    #[test]
    fn test_traverse_reaches_far_end_of_long_chain() {
        let ids: Vec<String> = (0..8).map(|i| format!("n{}", i)).collect();
        let g = Graph {
            nodes: ids
                .iter()
                .enumerate()
                .map(|(i, id)| node(id, &format!("N{}", i), None))
                .collect(),
            edges: ids
                .windows(2)
                .enumerate()
                .map(|(i, pair)| edge(&format!("e{}", i), &pair[0], &pair[1], "next"))
                .collect(),
        };

        assert_eq!(traverse(&g, "N0", 5).visited_count, 6);
        let deep = traverse(&g, "N0", 10);
        assert_eq!(deep.visited_count, 8);
        assert_eq!(labels(&deep).last(), Some(&"N7"));
        assert_eq!(deep.edges.len(), 7);
        assert_eq!(shortest_path(&g, "N0", "N7").length, 7);
    }

    #[test]
    fn test_shortest_path_two_hops() {
        let g = chain();
        let result = shortest_path(&g, "alpha", "gamma");
        assert!(result.found);
        assert_eq!(result.length, 2);
        assert_eq!(result.path, vec!["Alpha", "ab", "Beta", "cb", "Gamma"]);
    }

    #[test]
    fn test_shortest_path_prefers_fewest_hops() {
        let mut g = chain();
        g.edges.push(edge("e4", "a", "d", "shortcut"));
        let result = shortest_path(&g, "alpha", "delta");
        assert_eq!(result.length, 1);
        assert_eq!(result.path, vec!["Alpha", "shortcut", "Delta"]);
    }

    #[test]
    fn test_shortest_path_edge_cases() {
        let g = chain();
        let same = shortest_path(&g, "beta", "BETA");
        assert!(same.found);
        assert_eq!(same.length, 0);
        assert_eq!(same.path, vec!["Beta"]);

        let unreachable = shortest_path(&g, "alpha", "epsilon");
        assert!(!unreachable.found);
        assert!(unreachable.path.is_empty());

        assert_eq!(shortest_path(&g, "alpha", "zeta"), PathResult::default());
    }

    #[test]
    fn test_graph_score_counts_references() {
        let g = chain();
        let docs: Vec<Document> = ["d1", "d2", "d3", "d4"]
            .iter()
            .map(|id| json!({"_id": id}).as_object().unwrap().clone())
            .collect();

        // "beta" seeds b; within 2 hops: b, a, c, d. d1 is referenced by a and b.
        let ranked = graph_score(&g, "beta", 2, &docs);
        assert_eq!(
            ranked,
            vec![
                ("d1".to_string(), 2),
                ("d2".to_string(), 1),
                ("d3".to_string(), 1)
            ]
        );

        assert!(graph_score(&g, "zz", 2, &docs).is_empty());
        assert!(graph_score(&g, "unrelated", 2, &docs).is_empty());
    }
}
