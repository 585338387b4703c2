//! Per-type hooks supplied to the pipeline.
//!
//! The pipeline only talks to these traits. Hooks are registered by name in a [`HookRegistry`]
//! and referenced by name from configuration files; closures implement every trait directly.

use serde_json::{Map, Value};
use std::{
    collections::BTreeMap,
    fmt::{Debug, Formatter},
    sync::Arc,
};

use crate::{
    error::DegraphmalizerError,
    graph::ResolvedPathElement,
    subgraph::Subgraph,
    trees::Tree,
};

pub trait DocumentFilter: Send + Sync {
    fn filter(&self, document: &Value) -> Result<bool, DegraphmalizerError>;
}

pub trait SubgraphExtractor: Send + Sync {
    fn extract(&self, document: &Value, subgraph: &mut Subgraph)
        -> Result<(), DegraphmalizerError>;
}

pub trait DocumentTransformer: Send + Sync {
    fn transform(&self, document: Value) -> Result<Value, DegraphmalizerError>;
}

/// Turns a resolved walk into one derived property value.
pub trait Reducer: Send + Sync {
    fn reduce(&self, tree: &Tree<ResolvedPathElement>) -> Result<Value, DegraphmalizerError>;
}

impl<F> DocumentFilter for F
where
    F: Fn(&Value) -> Result<bool, DegraphmalizerError> + Send + Sync,
{
    fn filter(&self, document: &Value) -> Result<bool, DegraphmalizerError> {
        self(document)
    }
}

impl<F> SubgraphExtractor for F
where
    F: Fn(&Value, &mut Subgraph) -> Result<(), DegraphmalizerError> + Send + Sync,
{
    fn extract(
        &self,
        document: &Value,
        subgraph: &mut Subgraph,
    ) -> Result<(), DegraphmalizerError> {
        self(document, subgraph)
    }
}

impl<F> DocumentTransformer for F
where
    F: Fn(Value) -> Result<Value, DegraphmalizerError> + Send + Sync,
{
    fn transform(&self, document: Value) -> Result<Value, DegraphmalizerError> {
        self(document)
    }
}

impl<F> Reducer for F
where
    F: Fn(&Tree<ResolvedPathElement>) -> Result<Value, DegraphmalizerError> + Send + Sync,
{
    fn reduce(&self, tree: &Tree<ResolvedPathElement>) -> Result<Value, DegraphmalizerError> {
        self(tree)
    }
}

/// Everything below the walk's root, in pre-order.
fn reached(tree: &Tree<ResolvedPathElement>) -> impl Iterator<Item = &ResolvedPathElement> {
    tree.iter().skip(1).map(|entry| entry.value())
}

/// Number of vertices reached by the walk, the root excluded.
pub struct CountReducer;

impl Reducer for CountReducer {
    fn reduce(&self, tree: &Tree<ResolvedPathElement>) -> Result<Value, DegraphmalizerError> {
        Ok(Value::from(reached(tree).count()))
    }
}

/// Ids of the vertices reached by the walk.
pub struct IdsReducer;

impl Reducer for IdsReducer {
    fn reduce(&self, tree: &Tree<ResolvedPathElement>) -> Result<Value, DegraphmalizerError> {
        Ok(Value::Array(
            reached(tree)
                .map(|e| Value::String(e.vertex.id.clone()))
                .collect(),
        ))
    }
}

/// Sources of the reached documents that exist in the store.
pub struct DocumentsReducer;

impl Reducer for DocumentsReducer {
    fn reduce(&self, tree: &Tree<ResolvedPathElement>) -> Result<Value, DegraphmalizerError> {
        Ok(Value::Array(
            reached(tree).filter_map(|e| e.source().cloned()).collect(),
        ))
    }
}

/// The value at a JSON pointer in every reached document that has one.
pub struct CollectReducer {
    pointer: String,
}

impl CollectReducer {
    pub fn new(pointer: impl Into<String>) -> Self {
        CollectReducer {
            pointer: pointer.into(),
        }
    }
}

impl Reducer for CollectReducer {
    fn reduce(&self, tree: &Tree<ResolvedPathElement>) -> Result<Value, DegraphmalizerError> {
        Ok(Value::Array(
            reached(tree)
                .filter_map(|e| e.source().and_then(|s| s.pointer(&self.pointer)).cloned())
                .collect(),
        ))
    }
}

/// Declarative edge extraction: one edge per id found at `pointer`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EdgeRule {
    pub label: String,
    pub pointer: String,
    pub index: String,
    #[serde(rename = "type")]
    pub doc_type: String,
    #[serde(default)]
    pub inward: bool,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl EdgeRule {
    fn target_ids(value: &Value) -> Vec<String> {
        match value {
            Value::String(s) => vec![s.clone()],
            Value::Number(n) => vec![n.to_string()],
            Value::Array(items) => items.iter().flat_map(EdgeRule::target_ids).collect(),
            _ => Vec::new(),
        }
    }
}

impl SubgraphExtractor for EdgeRule {
    fn extract(
        &self,
        document: &Value,
        subgraph: &mut Subgraph,
    ) -> Result<(), DegraphmalizerError> {
        let Some(found) = document.pointer(&self.pointer) else {
            return Ok(());
        };
        for id in EdgeRule::target_ids(found) {
            subgraph.add_edge(
                self.label.clone(),
                self.index.clone(),
                self.doc_type.clone(),
                id,
                self.inward,
                self.properties.clone(),
            );
        }
        Ok(())
    }
}

/// Named hook implementations available to configuration files.
#[derive(Default, Clone)]
pub struct HookRegistry {
    filters: BTreeMap<String, Arc<dyn DocumentFilter>>,
    extractors: BTreeMap<String, Arc<dyn SubgraphExtractor>>,
    transformers: BTreeMap<String, Arc<dyn DocumentTransformer>>,
    reducers: BTreeMap<String, Arc<dyn Reducer>>,
}

impl Debug for HookRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistry")
            .field("filters", &self.filters.keys().collect::<Vec<_>>())
            .field("extractors", &self.extractors.keys().collect::<Vec<_>>())
            .field("transformers", &self.transformers.keys().collect::<Vec<_>>())
            .field("reducers", &self.reducers.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub const COLLECT_PREFIX: &str = "collect:";

impl HookRegistry {
    pub fn new() -> Self {
        HookRegistry::default()
    }

    /// Registry with the `count`, `ids` and `documents` reducers. `collect:<pointer>` is
    /// resolved on demand.
    pub fn with_builtins() -> Self {
        let mut registry = HookRegistry::new();
        registry.register_reducer("count", CountReducer);
        registry.register_reducer("ids", IdsReducer);
        registry.register_reducer("documents", DocumentsReducer);
        registry
    }

    pub fn register_filter(
        &mut self,
        name: impl Into<String>,
        hook: impl DocumentFilter + 'static,
    ) {
        self.filters.insert(name.into(), Arc::new(hook));
    }

    pub fn register_extractor(
        &mut self,
        name: impl Into<String>,
        hook: impl SubgraphExtractor + 'static,
    ) {
        self.extractors.insert(name.into(), Arc::new(hook));
    }

    pub fn register_transformer(
        &mut self,
        name: impl Into<String>,
        hook: impl DocumentTransformer + 'static,
    ) {
        self.transformers.insert(name.into(), Arc::new(hook));
    }

    pub fn register_reducer(&mut self, name: impl Into<String>, hook: impl Reducer + 'static) {
        self.reducers.insert(name.into(), Arc::new(hook));
    }

    pub fn filter(&self, name: &str) -> Result<Arc<dyn DocumentFilter>, DegraphmalizerError> {
        self.filters
            .get(name)
            .cloned()
            .ok_or_else(|| unknown("filter", name))
    }

    pub fn extractor(&self, name: &str) -> Result<Arc<dyn SubgraphExtractor>, DegraphmalizerError> {
        self.extractors
            .get(name)
            .cloned()
            .ok_or_else(|| unknown("extractor", name))
    }

    pub fn transformer(
        &self,
        name: &str,
    ) -> Result<Arc<dyn DocumentTransformer>, DegraphmalizerError> {
        self.transformers
            .get(name)
            .cloned()
            .ok_or_else(|| unknown("transformer", name))
    }

    pub fn reducer(&self, name: &str) -> Result<Arc<dyn Reducer>, DegraphmalizerError> {
        if let Some(pointer) = name.strip_prefix(COLLECT_PREFIX) {
            return Ok(Arc::new(CollectReducer::new(pointer)));
        }
        self.reducers
            .get(name)
            .cloned()
            .ok_or_else(|| unknown("reducer", name))
    }
}

fn unknown(kind: &str, name: &str) -> DegraphmalizerError {
    DegraphmalizerError::Configuration(format!("no {kind} registered under '{name}'"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{graph::EdgeRecord, id::DocumentId, store::Document};
    use serde_json::json;

    fn element(n: &str, source: Option<Value>) -> ResolvedPathElement {
        let vertex = DocumentId::new("people", "person", n, 1);
        ResolvedPathElement {
            edge: None,
            document: source.map(|s| Document::new(vertex.clone(), s)),
            vertex,
        }
    }

    fn walk() -> Tree<ResolvedPathElement> {
        let mut child = element("b", Some(json!({"name": "bob"})));
        child.edge = Some(EdgeRecord {
            label: "parent".into(),
            tail: DocumentId::new("people", "person", "a", 1),
            head: child.vertex.clone(),
            owner: DocumentId::new("people", "person", "a", 1).key(),
            properties: Map::new(),
        });
        Tree::node(
            element("a", Some(json!({"name": "ann"}))),
            vec![Tree::leaf(child), Tree::leaf(element("c", None))],
        )
    }

    #[test]
    fn builtin_reducers() {
        let registry = HookRegistry::with_builtins();
        let tree = walk();
        assert_eq!(registry.reducer("count").unwrap().reduce(&tree).unwrap(), json!(2));
        assert_eq!(
            registry.reducer("ids").unwrap().reduce(&tree).unwrap(),
            json!(["b", "c"])
        );
        assert_eq!(
            registry.reducer("documents").unwrap().reduce(&tree).unwrap(),
            json!([{"name": "bob"}])
        );
        assert_eq!(
            registry.reducer("collect:/name").unwrap().reduce(&tree).unwrap(),
            json!(["bob"])
        );
        assert!(matches!(
            registry.reducer("median"),
            Err(DegraphmalizerError::Configuration(_))
        ));
    }

    #[test]
    fn edge_rule_reads_scalars_and_arrays() {
        let rule = EdgeRule {
            label: "member".into(),
            pointer: "/groups".into(),
            index: "groups".into(),
            doc_type: "group".into(),
            inward: false,
            properties: Map::new(),
        };
        let mut sg = Subgraph::new();
        rule.extract(&json!({"groups": ["g1", 2, null]}), &mut sg).unwrap();
        assert_eq!(sg.edges().len(), 2);
        assert_eq!(sg.edges()[1].other.id, "2");

        let mut empty = Subgraph::new();
        rule.extract(&json!({"name": "x"}), &mut empty).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn closures_register_as_hooks() {
        let mut registry = HookRegistry::new();
        registry.register_filter("named", |doc: &Value| {
            Ok::<_, DegraphmalizerError>(doc.get("name").is_some())
        });
        let filter = registry.filter("named").unwrap();
        assert!(filter.filter(&json!({"name": 1})).unwrap());
        assert!(!filter.filter(&json!({})).unwrap());
    }
}
