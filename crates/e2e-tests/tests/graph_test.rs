//! Knowledge graph E2E tests for knowledgedb.
//!
//! Entity extraction on insert, deduplication, traversal, shortest paths and
//! graph upkeep on delete and drop.

use std::collections::HashSet;

use pretty_assertions::assert_eq;
use serde_json::json;

use e2e_tests::{backend_team, ids_of, TestHarness, DATABASE, TENANT};
use knowledge_search::SearchMode;
use knowledge_types::GraphNode;

fn nodes_labeled<'a>(nodes: &'a [GraphNode], label: &str) -> Vec<&'a GraphNode> {
    nodes.iter().filter(|n| n.label == label).collect()
}

/// Bob and Carol on the Backend team: two name nodes, one shared team node
/// linked to both, and graph search for "Backend" finds both documents.
#[test]
fn test_employee_scenario() {
    let harness = TestHarness::new();
    let ids = harness.insert("employees", backend_team());

    let graph = harness.engine.graph(TENANT, DATABASE).unwrap();
    let names: Vec<&GraphNode> = graph.nodes.iter().filter(|n| n.field == "name").collect();
    assert_eq!(names.len(), 2);

    let backend = nodes_labeled(&graph.nodes, "Backend");
    assert_eq!(backend.len(), 1, "team node must be deduplicated");
    let backend_id = backend[0].id.as_str();

    for name in ["Bob Smith", "Carol Davis"] {
        let person = nodes_labeled(&graph.nodes, name)[0];
        let linked = graph.edges.iter().any(|e| {
            (e.from == person.id && e.to == backend_id) || (e.to == person.id && e.from == backend_id)
        });
        assert!(linked, "{} must be linked to Backend", name);
    }

    let hits = harness
        .engine
        .search(TENANT, DATABASE, "Backend", SearchMode::Graph, None, None)
        .unwrap();
    let found: HashSet<String> = hits
        .iter()
        .filter_map(|h| h.document.get("_id").and_then(|v| v.as_str()).map(str::to_string))
        .collect();
    let expected: HashSet<String> = ids.into_iter().collect();
    assert_eq!(found, expected);
}

/// The same (label, field, collection) in two documents yields one node, one
/// intra-document edge set per document, and one cross-document edge.
#[test]
fn test_dedup_across_documents() {
    let harness = TestHarness::new();
    let first = harness.insert_one("tickets", json!({"title": "Login bug", "project": "Atlas"}));
    let second = harness.insert_one("tickets", json!({"title": "Signup bug", "project": "Atlas"}));

    let graph = harness.engine.graph(TENANT, DATABASE).unwrap();
    assert_eq!(nodes_labeled(&graph.nodes, "Atlas").len(), 1);
    assert_eq!(graph.nodes.len(), 3);

    let intra = |doc: &str| {
        graph
            .edges
            .iter()
            .filter(|e| e.auto && e.source_doc_id.as_deref() == Some(doc) && e.relation.contains("_in_"))
            .count()
    };
    assert_eq!(intra(&first), 1);
    assert_eq!(intra(&second), 1);

    let cross: Vec<_> = graph
        .edges
        .iter()
        .filter(|e| e.relation == "project_matches_project")
        .collect();
    assert_eq!(cross.len(), 1);
    assert_eq!(cross[0].source_doc_id.as_deref(), Some(second.as_str()));
}

/// Traversal never revisits, stays within the component, and with enough
/// depth returns the whole component.
#[test]
fn test_traversal_covers_component() {
    let harness = TestHarness::new();
    // A chain: Ann - Alpha - Ben - Beta - Cal, plus an unrelated island
    harness.insert(
        "staff",
        vec![
            json!({"name": "Ann", "team": "Alpha"}),
            json!({"name": "Ben", "team": "Alpha", "project": "Beta"}),
            json!({"name": "Cal", "project": "Beta"}),
            json!({"name": "Zed", "department": "Island"}),
        ],
    );
    let graph = harness.engine.graph(TENANT, DATABASE).unwrap();

    let shallow = harness.engine.traverse(TENANT, DATABASE, "Ann", 1).unwrap();
    let shallow_labels: HashSet<&str> = shallow.nodes.iter().map(|n| n.label.as_str()).collect();
    assert_eq!(shallow_labels, HashSet::from(["Ann", "Alpha"]));

    let deep = harness.engine.traverse(TENANT, DATABASE, "ann", 5).unwrap();
    let ids: HashSet<&str> = deep.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids.len(), deep.nodes.len(), "no node visited twice");
    assert_eq!(deep.visited_count, 5);
    assert!(deep.visited_count <= graph.nodes.len());
    let labels: HashSet<&str> = deep.nodes.iter().map(|n| n.label.as_str()).collect();
    assert_eq!(labels, HashSet::from(["Ann", "Alpha", "Ben", "Beta", "Cal"]));

    let missing = harness.engine.traverse(TENANT, DATABASE, "Nobody", 3).unwrap();
    assert_eq!(missing.visited_count, 0);
}

/// A known two-hop path with no direct edge has length 2.
#[test]
fn test_shortest_path_two_hops() {
    let harness = TestHarness::new();
    harness.insert("employees", backend_team());

    let path = harness
        .engine
        .shortest_path(TENANT, DATABASE, "Bob Smith", "Carol Davis")
        .unwrap();
    assert!(path.found);
    assert_eq!(path.length, 2);
    assert_eq!(path.path.len(), 5);
    assert_eq!(path.path[0], "Bob Smith");
    assert_eq!(path.path[2], "Backend");
    assert_eq!(path.path[4], "Carol Davis");

    let same = harness
        .engine
        .shortest_path(TENANT, DATABASE, "Backend", "backend")
        .unwrap();
    assert!(same.found);
    assert_eq!(same.length, 0);

    let absent = harness
        .engine
        .shortest_path(TENANT, DATABASE, "Bob Smith", "Nobody")
        .unwrap();
    assert!(!absent.found);
    assert!(absent.path.is_empty());
}

/// Deleting a document leaves no dangling edges; dropping the collection
/// removes its entities but keeps manual links between other nodes.
#[test]
fn test_graph_upkeep_on_delete_and_drop() {
    let harness = TestHarness::new();
    let ids = harness.insert("employees", backend_team());
    harness
        .engine
        .create_link(TENANT, DATABASE, "Partner Co", "Vendor Inc", "supplies")
        .unwrap();

    harness
        .engine
        .delete_by_id(TENANT, DATABASE, "employees", &ids[1])
        .unwrap()
        .unwrap();
    let graph = harness.engine.graph(TENANT, DATABASE).unwrap();
    let node_ids: HashSet<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
    for edge in &graph.edges {
        assert!(node_ids.contains(edge.from.as_str()), "dangling edge {}", edge.id);
        assert!(node_ids.contains(edge.to.as_str()), "dangling edge {}", edge.id);
    }
    assert!(nodes_labeled(&graph.nodes, "Carol Davis").is_empty());
    assert_eq!(nodes_labeled(&graph.nodes, "Backend").len(), 1);

    assert!(harness.engine.drop_collection(TENANT, DATABASE, "employees").unwrap());
    let graph = harness.engine.graph(TENANT, DATABASE).unwrap();
    let labels: HashSet<&str> = graph.nodes.iter().map(|n| n.label.as_str()).collect();
    assert_eq!(labels, HashSet::from(["Partner Co", "Vendor Inc"]));
    assert_eq!(graph.edges.len(), 1);
    assert!(!graph.edges[0].auto);
}

fn backend_search(harness: &TestHarness) -> Vec<String> {
    let hits = harness
        .engine
        .search(TENANT, DATABASE, "Backend", SearchMode::Graph, None, None)
        .unwrap();
    let documents: Vec<_> = hits.into_iter().map(|h| h.document).collect();
    let mut ids = ids_of(&documents);
    ids.sort();
    ids
}

/// Changing or deleting the document that first introduced a shared node
/// leaves the other document's links to that node in place.
#[test]
fn test_shared_node_survives_owner_mutations() {
    let harness = TestHarness::new();
    let ids = harness.insert("employees", backend_team());
    let (bob, carol) = (&ids[0], &ids[1]);
    let mut both = ids.clone();
    both.sort();

    harness.update_by_id("employees", bob, json!({"$set": {"age": 41}}));
    assert_eq!(backend_search(&harness), both);

    harness
        .engine
        .replace(TENANT, DATABASE, "employees", bob, json!({"name": "Bob Smith", "team": "Infra"}), None)
        .unwrap()
        .unwrap();
    assert_eq!(backend_search(&harness), vec![carol.clone()]);

    harness
        .engine
        .rollback(TENANT, DATABASE, "employees", bob, 1)
        .unwrap();
    assert_eq!(backend_search(&harness), both);

    harness
        .engine
        .delete_by_id(TENANT, DATABASE, "employees", bob)
        .unwrap()
        .unwrap();
    assert_eq!(backend_search(&harness), vec![carol.clone()]);

    let carol_view = harness.engine.traverse(TENANT, DATABASE, "Carol Davis", 1).unwrap();
    let labels: HashSet<&str> = carol_view.nodes.iter().map(|n| n.label.as_str()).collect();
    assert_eq!(labels, HashSet::from(["Carol Davis", "Backend"]));

    let graph = harness.engine.graph(TENANT, DATABASE).unwrap();
    assert_eq!(nodes_labeled(&graph.nodes, "Backend").len(), 1);
    for edge in &graph.edges {
        assert!(graph.node(&edge.from).is_some() && graph.node(&edge.to).is_some());
    }
}

/// Traversal depth is whatever the caller asks for; a chain of eight nodes
/// is fully reached with depth 10.
#[test]
fn test_traversal_past_five_hops() {
    let harness = TestHarness::new();
    for i in 0..7 {
        harness
            .engine
            .create_link(TENANT, DATABASE, &format!("Stop {}", i), &format!("Stop {}", i + 1), "next")
            .unwrap();
    }

    let five = harness.engine.traverse(TENANT, DATABASE, "Stop 0", 5).unwrap();
    assert_eq!(five.visited_count, 6);

    let ten = harness.engine.traverse(TENANT, DATABASE, "Stop 0", 10).unwrap();
    assert_eq!(ten.visited_count, 8);
    assert_eq!(ten.nodes.last().map(|n| n.label.as_str()), Some("Stop 7"));

    let path = harness
        .engine
        .shortest_path(TENANT, DATABASE, "Stop 0", "Stop 7")
        .unwrap();
    assert_eq!(path.length, 7);
}
