//! End-to-end pipeline runs over in-memory backends and a directory configuration.

mod common;

use common::{create_config_dir, harness, init_logging, put_person};
use degraphmalizer::{
    degraphmalizer::RecomputeRequest,
    graph::GraphStore,
    id::DocumentId,
    store::DocumentStore,
    subgraph::Subgraph,
    updater::{Change, ChangeAction},
    DegraphmalizeAction, PipelineStage,
};
use serde_json::{json, Map};
use tempfile::TempDir;
use test_log::test;

#[test]
fn changing_a_child_recomputes_its_parent_once() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let h = harness(&create_config_dir(&temp), 3);

    let b = put_person(&h.store, "b", 5, None);
    let a = put_person(&h.store, "a", 1, Some("b"));
    let mut subgraph = Subgraph::new();
    subgraph.add_edge("parent", "people", "person", "b", false, Map::new());
    h.graph.commit_subgraph(&a, subgraph).unwrap();

    // A changes
    let a = put_person(&h.store, "a", 2, Some("b"));
    let result = h
        .pipeline
        .degraphmalize(DegraphmalizeAction::Update, &a)
        .unwrap();
    assert_eq!(result.stage, PipelineStage::Done);

    let at_one: Vec<_> = result.at_distance(1).collect();
    assert_eq!(at_one.len(), 1);
    assert_eq!(at_one[0].root.key(), b.key());
    assert!(!at_one[0].outcome.is_failure());

    let for_b: Vec<(String, Change)> = h
        .changes
        .changes()
        .into_iter()
        .filter(|(_, c)| c.id == "b")
        .collect();
    assert_eq!(
        for_b,
        vec![("family".to_string(), Change::update("person", "b", 5))]
    );
}

#[test]
fn derived_documents_carry_walk_properties() {
    let temp = TempDir::new().unwrap();
    let h = harness(&create_config_dir(&temp), 3);

    put_person(&h.store, "c", 1, None);
    let b = put_person(&h.store, "b", 1, Some("c"));
    let a = put_person(&h.store, "a", 1, Some("b"));
    for id in [&b, &a] {
        h.pipeline
            .degraphmalize(DegraphmalizeAction::Update, id)
            .unwrap();
    }

    let derived = h
        .store
        .get(&DocumentId::new("family", "person", "a", 0))
        .unwrap()
        .unwrap();
    assert_eq!(derived.source["name"], json!("a"));
    assert_eq!(derived.source["ancestor_count"], json!(2));
    assert_eq!(derived.source["ancestors"]["names"], json!(["b", "c"]));
}

#[test]
fn propagation_stops_at_the_hop_bound() {
    let temp = TempDir::new().unwrap();
    let h = harness(&create_config_dir(&temp), 2);

    put_person(&h.store, "b", 1, None);
    let a = put_person(&h.store, "a", 1, Some("b"));
    h.pipeline
        .degraphmalize(DegraphmalizeAction::Update, &a)
        .unwrap();

    let config = h.pipeline.configuration().indices[0].types[0].clone();
    let request = RecomputeRequest::new(a, config, 3);
    assert!(h.pipeline.propagate(&request).unwrap().is_empty());
}

#[test]
fn cycles_recompute_each_document_once() {
    let temp = TempDir::new().unwrap();
    let h = harness(&create_config_dir(&temp), 5);

    let b = put_person(&h.store, "b", 1, Some("a"));
    let a = put_person(&h.store, "a", 1, Some("b"));
    h.pipeline
        .degraphmalize(DegraphmalizeAction::Update, &b)
        .unwrap();
    h.changes.clear();

    let result = h
        .pipeline
        .degraphmalize(DegraphmalizeAction::Update, &a)
        .unwrap();
    assert_eq!(result.recomputes.len(), 2);
    assert_eq!(h.changes.changes().len(), 2);

    let derived = h
        .store
        .get(&DocumentId::new("family", "person", "a", 0))
        .unwrap()
        .unwrap();
    // b, then a again is already visited
    assert_eq!(derived.source["ancestor_count"], json!(1));
}

#[test]
fn deleting_a_source_deletes_its_derived_document() {
    let temp = TempDir::new().unwrap();
    let h = harness(&create_config_dir(&temp), 3);

    put_person(&h.store, "b", 1, None);
    let a = put_person(&h.store, "a", 4, Some("b"));
    h.pipeline
        .degraphmalize(DegraphmalizeAction::Update, &a)
        .unwrap();
    h.changes.clear();

    h.store.delete(&a.key()).unwrap();
    let result = h
        .pipeline
        .degraphmalize(DegraphmalizeAction::Delete, &a)
        .unwrap();
    assert_eq!(result.stage, PipelineStage::Done);
    assert!(h
        .store
        .get(&DocumentId::new("family", "person", "a", 0))
        .unwrap()
        .is_none());

    let changes = h.changes.changes();
    assert_eq!(
        changes[0],
        ("family".to_string(), Change::delete("person", "a", 4))
    );
    assert!(changes
        .iter()
        .any(|(_, c)| c.action == ChangeAction::Update && c.id == "b"));
}
