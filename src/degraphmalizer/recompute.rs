use serde_json::{Map, Value};
use std::panic::{self, AssertUnwindSafe};

use super::{Degraphmalizer, RecomputeOutcome, RecomputeRequest, RecomputeResult};
use crate::{
    config::{PropertyConfig, WalkConfig},
    error::DegraphmalizerError,
    graph::{EdgeRecord, GraphViewer, PathElement, ResolvedPathElement},
    id::{DocumentId, DocumentKey},
    store::Document,
    trees::{build_tree, pmap, Tree, VertexAlreadyVisitedTracker},
    updater::Change,
};

/// What a recompute produced before anything was written.
#[derive(Debug)]
pub(super) enum Derivation {
    /// Walks and reductions are done; the document is ready to write.
    Derived {
        source: DocumentId,
        document: Map<String, Value>,
        properties: Vec<String>,
        omitted: Vec<String>,
    },
    FilteredOut,
    SourceMissing,
}

impl Degraphmalizer {
    /// Rebuilds one derived document. Never fails as a whole: errors end up in the outcome.
    pub fn recompute(&self, request: &RecomputeRequest) -> RecomputeResult {
        let outcome = self
            .derive(request)
            .and_then(|derivation| self.write_derivation(request, derivation));
        outcome_of(request, outcome)
    }

    /// Fetches, filters, transforms, walks and reduces. Reads only.
    pub(super) fn derive(
        &self,
        request: &RecomputeRequest,
    ) -> Result<Derivation, DegraphmalizerError> {
        let config = &request.config;
        let Some(document) = self.cache.get(&request.root) else {
            return Ok(Derivation::SourceMissing);
        };
        if !config.filter(&document.source)? {
            tracing::debug!("{request} filtered out");
            return Ok(Derivation::FilteredOut);
        }

        let mut derived = match config.transform(document.source.clone())? {
            Value::Object(map) => map,
            other => {
                return Err(DegraphmalizerError::InvalidInput(format!(
                    "transform of {} must produce an object, got {other}",
                    document.id
                )))
            }
        };

        let mut properties = Vec::new();
        let mut omitted = Vec::new();
        for walk in config.walks.values() {
            let tree = self.walk(&document, walk)?;
            for property in walk.properties.values() {
                let name = property_path(walk, property);
                match reduce(property, &tree) {
                    Ok(value) => {
                        place(&mut derived, walk, property, value);
                        properties.push(name);
                    }
                    Err(e) => {
                        tracing::warn!("{request}: {e}, omitting '{name}'");
                        omitted.push(name);
                    }
                }
            }
        }
        Ok(Derivation::Derived {
            source: document.id.clone(),
            document: derived,
            properties,
            omitted,
        })
    }

    /// Writes (or, for a vanished source, deletes) the derived document and queues its change.
    pub(super) fn write_derivation(
        &self,
        request: &RecomputeRequest,
        derivation: Derivation,
    ) -> Result<RecomputeOutcome, DegraphmalizerError> {
        let config = &request.config;
        let (source, document, properties, omitted) = match derivation {
            Derivation::FilteredOut => return Ok(RecomputeOutcome::FilteredOut),
            Derivation::SourceMissing => {
                tracing::info!("source of {request} is missing, deleting its derived document");
                let deleted = self.delete_derived(request)?;
                return Ok(RecomputeOutcome::SourceMissing { deleted });
            }
            Derivation::Derived {
                source,
                document,
                properties,
                omitted,
            } => (source, document, properties, omitted),
        };

        let written = self.documents.write(
            &config.target_index,
            &config.target_type,
            &source.id,
            Value::Object(document),
        )?;
        self.cache.invalidate(&written.key());
        self.changes.add(
            &config.target_index,
            Change::update(&config.target_type, &source.id, source.version),
        )?;
        tracing::debug!("{request} wrote {written}");
        Ok(RecomputeOutcome::Written {
            derived: written,
            properties,
            omitted,
        })
    }

    /// Deletes the derived document of `request` and queues the DELETE change.
    pub(super) fn delete_derived(
        &self,
        request: &RecomputeRequest,
    ) -> Result<Option<DocumentId>, DegraphmalizerError> {
        let config = &request.config;
        let derived = DocumentKey::new(
            &config.target_index,
            &config.target_type,
            &request.root.id,
        );
        let deleted = self.documents.delete(&derived)?;
        self.cache.invalidate(&derived);
        self.changes.add(
            &config.target_index,
            Change::delete(&config.target_type, &request.root.id, request.root.version),
        )?;
        Ok(deleted)
    }

    /// Walks the graph from `document` and resolves every reached vertex on the fetch pool.
    fn walk(
        &self,
        document: &Document,
        walk: &WalkConfig,
    ) -> Result<Tree<ResolvedPathElement>, DegraphmalizerError> {
        let depth = walk.max_depth.unwrap_or(self.settings.max_walk_depth);
        let viewer = GraphViewer::new(self.graph.as_ref(), walk.direction);
        let tree = build_tree(
            PathElement::root(document.id.clone()),
            &viewer,
            VertexAlreadyVisitedTracker::<EdgeRecord, DocumentKey>::default(),
            depth,
        )
        .ok_or_else(|| {
            DegraphmalizerError::TaskFailed(format!(
                "walk '{}' from {} produced no tree",
                walk.name, document.id
            ))
        })?;

        let cache = self.cache.as_ref();
        let resolved = pmap(
            &self.pools.fetch,
            |element: &PathElement| {
                // the root is the document being recomputed
                let found = match element.edge {
                    None => Some(document.clone()),
                    Some(_) => cache.get(&element.vertex),
                };
                Ok::<_, DegraphmalizerError>(ResolvedPathElement {
                    edge: element.edge.clone(),
                    vertex: element.vertex.clone(),
                    document: found,
                })
            },
            &tree,
        )?;
        Ok(resolved)
    }
}

pub(super) fn outcome_of(
    request: &RecomputeRequest,
    outcome: Result<RecomputeOutcome, DegraphmalizerError>,
) -> RecomputeResult {
    let outcome = outcome.unwrap_or_else(|e| {
        tracing::warn!("recompute {request} failed: {e}");
        RecomputeOutcome::Failed(e)
    });
    RecomputeResult::new(request, outcome)
}

fn property_path(walk: &WalkConfig, property: &PropertyConfig) -> String {
    if property.nested {
        format!("{}.{}", walk.name, property.name)
    } else {
        property.name.clone()
    }
}

fn reduce(
    property: &PropertyConfig,
    tree: &Tree<ResolvedPathElement>,
) -> Result<Value, DegraphmalizerError> {
    match panic::catch_unwind(AssertUnwindSafe(|| property.reducer.reduce(tree))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(DegraphmalizerError::ReduceFailure {
            property: property.name.clone(),
            reason: e.to_string(),
        }),
        Err(_) => Err(DegraphmalizerError::ReduceFailure {
            property: property.name.clone(),
            reason: "reducer panicked".to_string(),
        }),
    }
}

/// Nested properties go under the walk's name, the rest at the top level.
fn place(
    derived: &mut Map<String, Value>,
    walk: &WalkConfig,
    property: &PropertyConfig,
    value: Value,
) {
    if !property.nested {
        derived.insert(property.name.clone(), value);
        return;
    }
    let slot = derived
        .entry(walk.name.clone())
        .or_insert_with(|| Value::Object(Map::new()));
    if !slot.is_object() {
        *slot = Value::Object(Map::new());
    }
    if let Value::Object(nested) = slot {
        nested.insert(property.name.clone(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::CountReducer, graph::WalkDirection};
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn nested_properties_land_under_the_walk() {
        let walk = WalkConfig::new("friends", WalkDirection::Out);
        let nested = PropertyConfig {
            name: "count".into(),
            nested: true,
            reducer: Arc::new(CountReducer),
        };
        let flat = PropertyConfig {
            nested: false,
            ..nested.clone()
        };
        let mut derived = Map::new();
        derived.insert("friends".into(), json!("overwritten"));
        place(&mut derived, &walk, &nested, json!(2));
        place(&mut derived, &walk, &flat, json!(3));
        assert_eq!(Value::Object(derived), json!({"friends": {"count": 2}, "count": 3}));
        assert_eq!(property_path(&walk, &nested), "friends.count");
    }

    #[test]
    fn panicking_reducer_is_a_reduce_failure() {
        let property = PropertyConfig {
            name: "boom".into(),
            nested: false,
            reducer: Arc::new(
                |_: &Tree<ResolvedPathElement>| -> Result<Value, DegraphmalizerError> {
                    panic!("reducer bug")
                },
            ),
        };
        let tree = Tree::leaf(ResolvedPathElement {
            edge: None,
            vertex: DocumentId::new("i", "t", "1", 1),
            document: None,
        });
        assert!(matches!(
            reduce(&property, &tree),
            Err(DegraphmalizerError::ReduceFailure { property, .. }) if property == "boom"
        ));
    }
}
