//! Shared test utilities for integration tests.
//!
//! Import from integration test files as:
//! ```ignore
//! mod common;
//! ```

use degraphmalizer::{
    config::{HookRegistry, PipelineSettings, PoolSettings, ReloadingConfiguration},
    graph::MemoryGraph,
    id::DocumentId,
    pools::WorkerPools,
    store::MemoryStore,
    updater::Change,
    ChangeSink, Degraphmalizer, DegraphmalizerError,
};
use serde_json::json;
use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tempfile::TempDir;

/// Initialize tracing for tests, respecting RUST_LOG env var.
///
/// Safe to call multiple times; subsequent calls are no-ops.
#[allow(dead_code)]
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init()
        .ok();
}

/// `family/person`: derived from `people/person`, with a `parent` edge and an outward
/// `ancestors` walk.
#[allow(dead_code)]
pub const PERSON_TYPE: &str = r#"
source_index = "people"
source_type = "person"

[[edges]]
label = "parent"
pointer = "/parent"
index = "people"
type = "person"

[walks.ancestors]
direction = "OUT"

[walks.ancestors.properties.ancestor_count]
reduce = "count"

[walks.ancestors.properties.names]
reduce = "collect:/name"
nested = true
"#;

/// Writes `text` to `dir/rel`, creating parent directories.
#[allow(dead_code)]
pub fn write_file(dir: &Path, rel: &str, text: &str) -> PathBuf {
    let path = dir.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, text).unwrap();
    path
}

/// A configuration directory holding `family/person.toml`.
#[allow(dead_code)]
pub fn create_config_dir(temp_dir: &TempDir) -> PathBuf {
    let config_dir = temp_dir.path().join("conf");
    write_file(&config_dir, "family/person.toml", PERSON_TYPE);
    config_dir
}

/// Change sink that remembers every change per target index.
#[derive(Default)]
pub struct RecordingSink(Mutex<Vec<(String, Change)>>);

#[allow(dead_code)]
impl RecordingSink {
    pub fn changes(&self) -> Vec<(String, Change)> {
        self.0.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

impl ChangeSink for RecordingSink {
    fn add(&self, index: &str, change: Change) -> Result<(), DegraphmalizerError> {
        self.0.lock().unwrap().push((index.to_string(), change));
        Ok(())
    }
}

#[allow(dead_code)]
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub graph: Arc<MemoryGraph>,
    pub changes: Arc<RecordingSink>,
    pub pipeline: Arc<Degraphmalizer>,
}

/// A pipeline over in-memory backends, configured from `config_dir`.
#[allow(dead_code)]
pub fn harness(config_dir: &Path, max_distance: usize) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let graph = Arc::new(MemoryGraph::new());
    let changes = Arc::new(RecordingSink::default());
    let provider = ReloadingConfiguration::new(config_dir, HookRegistry::with_builtins()).unwrap();
    let pipeline = Arc::new(Degraphmalizer::new(
        Arc::new(provider),
        store.clone(),
        graph.clone(),
        changes.clone(),
        WorkerPools::new(&PoolSettings::default()).unwrap(),
        PipelineSettings {
            max_distance,
            ..PipelineSettings::default()
        },
    ));
    Harness {
        store,
        graph,
        changes,
        pipeline,
    }
}

/// Stores a `people/person` source document, optionally pointing at a parent.
#[allow(dead_code)]
pub fn put_person(store: &MemoryStore, id: &str, version: u64, parent: Option<&str>) -> DocumentId {
    let doc_id = DocumentId::new("people", "person", id, version);
    let body = match parent {
        Some(p) => json!({"name": id, "parent": p}),
        None => json!({"name": id}),
    };
    store.put(doc_id.clone(), body);
    doc_id
}
