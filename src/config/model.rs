use serde_json::Value;
use std::{
    collections::BTreeMap,
    fmt::{Debug, Formatter},
    sync::Arc,
};

use super::hooks::{DocumentFilter, DocumentTransformer, Reducer, SubgraphExtractor};
use crate::{
    error::DegraphmalizerError, graph::WalkDirection, store::Document, subgraph::Subgraph,
};

/// One derived property: a named reduction of a walk's tree.
#[derive(Clone)]
pub struct PropertyConfig {
    pub name: String,
    /// Nested properties land under the walk's name in the derived document.
    pub nested: bool,
    pub reducer: Arc<dyn Reducer>,
}

impl Debug for PropertyConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyConfig")
            .field("name", &self.name)
            .field("nested", &self.nested)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct WalkConfig {
    pub name: String,
    pub direction: WalkDirection,
    /// Deepest distance from the root the walk expands to. `None` uses the service default.
    pub max_depth: Option<usize>,
    pub properties: BTreeMap<String, PropertyConfig>,
}

impl WalkConfig {
    pub fn new(name: impl Into<String>, direction: WalkDirection) -> Self {
        WalkConfig {
            name: name.into(),
            direction,
            max_depth: None,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_property(
        mut self,
        name: impl Into<String>,
        nested: bool,
        reducer: Arc<dyn Reducer>,
    ) -> Self {
        let name = name.into();
        self.properties.insert(
            name.clone(),
            PropertyConfig {
                name,
                nested,
                reducer,
            },
        );
        self
    }
}

/// How documents of one source (index, type) become derived documents of one target type.
///
/// The hook methods are the capability interface the pipeline depends on; absent hooks fall
/// back to "accept everything", "no edges" and "unchanged".
#[derive(Clone)]
pub struct TypeConfig {
    pub target_index: String,
    pub target_type: String,
    pub source_index: String,
    pub source_type: String,
    pub filter: Option<Arc<dyn DocumentFilter>>,
    pub extractors: Vec<Arc<dyn SubgraphExtractor>>,
    pub transform: Option<Arc<dyn DocumentTransformer>>,
    pub walks: BTreeMap<String, WalkConfig>,
}

impl Debug for TypeConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeConfig")
            .field("target", &format!("{}/{}", self.target_index, self.target_type))
            .field("source", &format!("{}/{}", self.source_index, self.source_type))
            .field("filter", &self.filter.is_some())
            .field("extractors", &self.extractors.len())
            .field("transform", &self.transform.is_some())
            .field("walks", &self.walks)
            .finish()
    }
}

impl TypeConfig {
    pub fn new(
        target_index: impl Into<String>,
        target_type: impl Into<String>,
        source_index: impl Into<String>,
        source_type: impl Into<String>,
    ) -> Self {
        TypeConfig {
            target_index: target_index.into(),
            target_type: target_type.into(),
            source_index: source_index.into(),
            source_type: source_type.into(),
            filter: None,
            extractors: Vec::new(),
            transform: None,
            walks: BTreeMap::new(),
        }
    }

    pub fn with_filter(mut self, filter: Arc<dyn DocumentFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn SubgraphExtractor>) -> Self {
        self.extractors.push(extractor);
        self
    }

    pub fn with_transform(mut self, transform: Arc<dyn DocumentTransformer>) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_walk(mut self, walk: WalkConfig) -> Self {
        self.walks.insert(walk.name.clone(), walk);
        self
    }

    pub fn matches(&self, source_index: &str, source_type: Option<&str>) -> bool {
        self.source_index == source_index
            && source_type.map_or(true, |t| self.source_type == t)
    }

    pub fn filter(&self, document: &Value) -> Result<bool, DegraphmalizerError> {
        match &self.filter {
            Some(filter) => filter.filter(document),
            None => Ok(true),
        }
    }

    /// Runs every extractor over the document. A missing (or JSON `null`) document is invalid
    /// input; no extractors means an empty subgraph.
    pub fn extract(&self, document: Option<&Document>) -> Result<Subgraph, DegraphmalizerError> {
        let document = match document {
            Some(doc) if !doc.source.is_null() => doc,
            Some(doc) => {
                return Err(DegraphmalizerError::InvalidInput(format!(
                    "document {} has no body to extract from",
                    doc.id
                )))
            }
            None => {
                return Err(DegraphmalizerError::InvalidInput(
                    "extract called without a document".to_string(),
                ))
            }
        };
        let mut subgraph = Subgraph::new();
        for extractor in self.extractors.iter() {
            extractor.extract(&document.source, &mut subgraph)?;
        }
        Ok(subgraph)
    }

    pub fn transform(&self, document: Value) -> Result<Value, DegraphmalizerError> {
        match &self.transform {
            Some(transform) => transform.transform(document),
            None => Ok(document),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexConfig {
    pub name: String,
    pub types: Vec<Arc<TypeConfig>>,
}

impl IndexConfig {
    pub fn new(name: impl Into<String>) -> Self {
        IndexConfig {
            name: name.into(),
            types: Vec::new(),
        }
    }

    pub fn with_type(mut self, config: TypeConfig) -> Self {
        self.types.push(Arc::new(config));
        self
    }

    pub fn type_config(&self, name: &str) -> Option<&Arc<TypeConfig>> {
        self.types.iter().find(|t| t.target_type == name)
    }
}

/// Immutable configuration snapshot: target indices in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    pub indices: Vec<IndexConfig>,
}

impl Configuration {
    pub fn new(indices: Vec<IndexConfig>) -> Self {
        Configuration { indices }
    }

    pub fn index(&self, name: &str) -> Option<&IndexConfig> {
        self.indices.iter().find(|i| i.name == name)
    }

    pub fn index_names(&self) -> Vec<String> {
        self.indices.iter().map(|i| i.name.clone()).collect()
    }

    pub fn type_configs(&self) -> impl Iterator<Item = &Arc<TypeConfig>> {
        self.indices.iter().flat_map(|i| i.types.iter())
    }
}

/// Every type configuration sourced from `source_index` (and `source_type`, when given), in
/// index then type declaration order.
pub fn configs_for(
    cfg: &Configuration,
    source_index: &str,
    source_type: Option<&str>,
) -> Vec<Arc<TypeConfig>> {
    cfg.type_configs()
        .filter(|t| t.matches(source_index, source_type))
        .cloned()
        .collect()
}
