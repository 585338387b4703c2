use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::{Display, Formatter};

use crate::id::{DocumentId, DocumentKey};

/// Which way an extracted edge points relative to the document it was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EdgeDirection {
    /// `other -> document`
    Inward,
    /// `document -> other`
    Outward,
}

impl Display for EdgeDirection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeDirection::Inward => write!(f, "inward"),
            EdgeDirection::Outward => write!(f, "outward"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubgraphEdge {
    pub label: String,
    pub other: DocumentId,
    pub direction: EdgeDirection,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl SubgraphEdge {
    fn same_edge(&self, other: &SubgraphEdge) -> bool {
        self.label == other.label
            && self.direction == other.direction
            && self.other.key() == other.other.key()
    }
}

/// The edges (and root-vertex properties) extracted from one document. Committing a subgraph
/// replaces whatever the same document committed before.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    edges: Vec<SubgraphEdge>,
    properties: Map<String, Value>,
}

impl Subgraph {
    pub fn new() -> Self {
        Subgraph::default()
    }

    /// Adds an edge to `index/type/id`. The target is recorded with the symbolic version `0`;
    /// adding the same (label, target, direction) twice keeps the later properties.
    pub fn add_edge(
        &mut self,
        label: impl Into<String>,
        index: impl Into<String>,
        doc_type: impl Into<String>,
        id: impl Into<String>,
        inward: bool,
        properties: Map<String, Value>,
    ) -> &mut Self {
        let edge = SubgraphEdge {
            label: label.into(),
            other: DocumentId::new(index, doc_type, id, 0),
            direction: if inward {
                EdgeDirection::Inward
            } else {
                EdgeDirection::Outward
            },
            properties,
        };
        match self.edges.iter_mut().find(|e| e.same_edge(&edge)) {
            Some(existing) => *existing = edge,
            None => self.edges.push(edge),
        }
        self
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: Value) -> &mut Self {
        self.properties.insert(key.into(), value);
        self
    }

    /// Folds another subgraph's edges and properties into this one.
    pub fn merge(&mut self, other: Subgraph) {
        for edge in other.edges {
            match self.edges.iter_mut().find(|e| e.same_edge(&edge)) {
                Some(existing) => *existing = edge,
                None => self.edges.push(edge),
            }
        }
        self.properties.extend(other.properties);
    }

    pub fn edges(&self) -> &[SubgraphEdge] {
        &self.edges
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty() && self.properties.is_empty()
    }

    /// Every document this subgraph connects to, in declaration order.
    pub fn neighbors(&self) -> Vec<DocumentKey> {
        let mut keys: Vec<DocumentKey> = Vec::with_capacity(self.edges.len());
        for edge in &self.edges {
            let key = edge.other.key();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn duplicate_edges_keep_latest_properties() {
        let mut sg = Subgraph::new();
        let mut props = Map::new();
        props.insert("weight".into(), json!(1));
        sg.add_edge("parent", "people", "person", "2", false, props.clone());
        props.insert("weight".into(), json!(2));
        sg.add_edge("parent", "people", "person", "2", false, props);
        sg.add_edge("parent", "people", "person", "2", true, Map::new());

        assert_eq!(sg.edges().len(), 2);
        assert_eq!(sg.edges()[0].properties["weight"], json!(2));
        assert_eq!(sg.edges()[0].other.version, 0);
        assert_eq!(sg.neighbors().len(), 1);
    }

    #[test]
    fn merge_unions_edges() {
        let mut a = Subgraph::new();
        a.add_edge("parent", "people", "person", "2", false, Map::new());
        let mut b = Subgraph::new();
        b.add_edge("owner", "things", "thing", "9", true, Map::new());
        b.set_property("kind", json!("x"));
        a.merge(b);
        assert_eq!(a.edges().len(), 2);
        assert_eq!(a.properties()["kind"], json!("x"));
    }
}
