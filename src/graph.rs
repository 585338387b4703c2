//! The relationship graph between documents.
//!
//! Every document may commit a [`Subgraph`]: the edges it declares to other documents. Edges are
//! owned by the document that declared them, so recommitting replaces exactly that document's
//! contribution and nothing else. Walks over the graph are expressed as a [`TreeViewer`] over
//! [`PathElement`]s so the generic traversal machinery in [`crate::trees`] applies.

use parking_lot::RwLock;
use petgraph::{
    stable_graph::{EdgeIndex, NodeIndex, StableDiGraph},
    visit::EdgeRef,
    Direction,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt::{Display, Formatter},
};

use crate::{
    error::DegraphmalizerError,
    id::{DocumentId, DocumentKey},
    store::Document,
    subgraph::{EdgeDirection, Subgraph},
    trees::{EdgeVertex, TreeViewer},
};

/// Direction a walk follows edges in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WalkDirection {
    #[serde(rename = "IN", alias = "in")]
    In,
    #[serde(rename = "OUT", alias = "out")]
    Out,
}

impl From<WalkDirection> for Direction {
    fn from(dir: WalkDirection) -> Direction {
        match dir {
            WalkDirection::In => Direction::Incoming,
            WalkDirection::Out => Direction::Outgoing,
        }
    }
}

impl Display for WalkDirection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            WalkDirection::In => write!(f, "IN"),
            WalkDirection::Out => write!(f, "OUT"),
        }
    }
}

/// A committed edge as seen by readers: `tail --label--> head`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub label: String,
    pub tail: DocumentId,
    pub head: DocumentId,
    /// The document whose subgraph declared this edge.
    pub owner: DocumentKey,
    pub properties: Map<String, Value>,
}

impl EdgeRecord {
    /// The far end of the edge when walking in `direction`.
    pub fn opposite(&self, direction: WalkDirection) -> &DocumentId {
        match direction {
            WalkDirection::Out => &self.head,
            WalkDirection::In => &self.tail,
        }
    }
}

impl Display for EdgeRecord {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} --{}--> {}", self.tail, self.label, self.head)
    }
}

pub trait GraphStore: Send + Sync {
    /// Replaces every edge previously declared by `id`'s document with the edges of `subgraph`.
    /// Readers observe either the old or the new edge set.
    fn commit_subgraph(&self, id: &DocumentId, subgraph: Subgraph)
        -> Result<(), DegraphmalizerError>;

    /// Drops the document's own edges and returns every document it was connected to.
    fn remove_document(&self, key: &DocumentKey) -> Result<Vec<DocumentKey>, DegraphmalizerError>;

    /// Edges leaving (`Out`) or entering (`In`) the document's vertex.
    fn edges(
        &self,
        key: &DocumentKey,
        direction: WalkDirection,
    ) -> Result<Vec<EdgeRecord>, DegraphmalizerError>;

    /// The identity the graph currently holds for the vertex, `None` if unknown.
    fn vertex(&self, key: &DocumentKey) -> Result<Option<DocumentId>, DegraphmalizerError>;

    /// Documents one hop away in either direction, in a stable order.
    fn neighbors(&self, key: &DocumentKey) -> Result<Vec<DocumentKey>, DegraphmalizerError> {
        let mut found = BTreeSet::new();
        for direction in [WalkDirection::Out, WalkDirection::In] {
            for edge in self.edges(key, direction)? {
                found.insert(edge.opposite(direction).key());
            }
        }
        found.remove(key);
        Ok(found.into_iter().collect())
    }
}

#[derive(Debug, Clone)]
struct Vertex {
    id: DocumentId,
    committed: bool,
    properties: Map<String, Value>,
}

#[derive(Debug, Clone)]
struct Edge {
    label: String,
    owner: DocumentKey,
    properties: Map<String, Value>,
}

#[derive(Debug, Default)]
struct GraphInner {
    graph: StableDiGraph<Vertex, Edge>,
    index: BTreeMap<DocumentKey, NodeIndex>,
}

impl GraphInner {
    fn ensure_vertex(&mut self, id: &DocumentId) -> NodeIndex {
        let key = id.key();
        if let Some(idx) = self.index.get(&key) {
            return *idx;
        }
        let idx = self.graph.add_node(Vertex {
            id: key.at_version(0),
            committed: false,
            properties: Map::new(),
        });
        self.index.insert(key, idx);
        idx
    }

    fn owned_edges(&self, vertex: NodeIndex, owner: &DocumentKey) -> Vec<(EdgeIndex, NodeIndex)> {
        let mut owned = Vec::new();
        for direction in [Direction::Outgoing, Direction::Incoming] {
            for edge in self.graph.edges_directed(vertex, direction) {
                if &edge.weight().owner == owner {
                    let other = match direction {
                        Direction::Outgoing => edge.target(),
                        Direction::Incoming => edge.source(),
                    };
                    owned.push((edge.id(), other));
                }
            }
        }
        owned
    }

    /// Vertices nobody committed and nothing points at are dropped.
    fn prune(&mut self, idx: NodeIndex) {
        let Some(vertex) = self.graph.node_weight(idx) else {
            return;
        };
        let dangling = self.graph.edges_directed(idx, Direction::Outgoing).next().is_none()
            && self.graph.edges_directed(idx, Direction::Incoming).next().is_none();
        if !vertex.committed && dangling {
            let key = vertex.id.key();
            self.graph.remove_node(idx);
            self.index.remove(&key);
        }
    }

    fn record(&self, idx: EdgeIndex) -> Option<EdgeRecord> {
        let (tail, head) = self.graph.edge_endpoints(idx)?;
        let edge = self.graph.edge_weight(idx)?;
        Some(EdgeRecord {
            label: edge.label.clone(),
            tail: self.graph.node_weight(tail)?.id.clone(),
            head: self.graph.node_weight(head)?.id.clone(),
            owner: edge.owner.clone(),
            properties: edge.properties.clone(),
        })
    }
}

/// In-process [`GraphStore`] over a `petgraph` stable graph. Vertex indices stay valid across
/// removals, so the key index never needs rebuilding.
#[derive(Debug, Default)]
pub struct MemoryGraph {
    inner: RwLock<GraphInner>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        MemoryGraph::default()
    }

    pub fn vertex_count(&self) -> usize {
        self.inner.read().graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.inner.read().graph.edge_count()
    }

    /// Properties the document's last subgraph set on its own vertex.
    pub fn vertex_properties(&self, key: &DocumentKey) -> Option<Map<String, Value>> {
        let inner = self.inner.read();
        let idx = inner.index.get(key)?;
        inner.graph.node_weight(*idx).map(|v| v.properties.clone())
    }
}

impl GraphStore for MemoryGraph {
    fn commit_subgraph(
        &self,
        id: &DocumentId,
        subgraph: Subgraph,
    ) -> Result<(), DegraphmalizerError> {
        let owner = id.key();
        let mut inner = self.inner.write();
        let root = inner.ensure_vertex(id);

        let stale = inner.owned_edges(root, &owner);
        for (edge, _) in stale.iter() {
            inner.graph.remove_edge(*edge);
        }

        if let Some(vertex) = inner.graph.node_weight_mut(root) {
            vertex.id = id.clone();
            vertex.committed = true;
            vertex.properties = subgraph.properties().clone();
        }

        for edge in subgraph.edges() {
            let other = inner.ensure_vertex(&edge.other);
            let (tail, head) = match edge.direction {
                EdgeDirection::Outward => (root, other),
                EdgeDirection::Inward => (other, root),
            };
            inner.graph.add_edge(
                tail,
                head,
                Edge {
                    label: edge.label.clone(),
                    owner: owner.clone(),
                    properties: edge.properties.clone(),
                },
            );
        }

        for (_, other) in stale {
            inner.prune(other);
        }
        tracing::debug!(
            "committed {} edge(s) for {id}",
            subgraph.edges().len()
        );
        Ok(())
    }

    fn remove_document(&self, key: &DocumentKey) -> Result<Vec<DocumentKey>, DegraphmalizerError> {
        let mut inner = self.inner.write();
        let Some(idx) = inner.index.get(key).copied() else {
            return Ok(Vec::new());
        };

        let mut former = BTreeSet::new();
        for direction in [Direction::Outgoing, Direction::Incoming] {
            for neighbor in inner.graph.neighbors_directed(idx, direction) {
                if neighbor != idx {
                    if let Some(vertex) = inner.graph.node_weight(neighbor) {
                        former.insert(vertex.id.key());
                    }
                }
            }
        }

        let owned = inner.owned_edges(idx, key);
        for (edge, _) in owned.iter() {
            inner.graph.remove_edge(*edge);
        }
        if let Some(vertex) = inner.graph.node_weight_mut(idx) {
            vertex.committed = false;
            vertex.id = key.at_version(0);
            vertex.properties = Map::new();
        }
        inner.prune(idx);
        for (_, other) in owned {
            inner.prune(other);
        }
        Ok(former.into_iter().collect())
    }

    fn edges(
        &self,
        key: &DocumentKey,
        direction: WalkDirection,
    ) -> Result<Vec<EdgeRecord>, DegraphmalizerError> {
        let inner = self.inner.read();
        let Some(idx) = inner.index.get(key) else {
            return Ok(Vec::new());
        };
        Ok(inner
            .graph
            .edges_directed(*idx, direction.into())
            .filter_map(|edge| inner.record(edge.id()))
            .collect())
    }

    fn vertex(&self, key: &DocumentKey) -> Result<Option<DocumentId>, DegraphmalizerError> {
        let inner = self.inner.read();
        Ok(inner
            .index
            .get(key)
            .and_then(|idx| inner.graph.node_weight(*idx))
            .map(|v| v.id.clone()))
    }
}

/// One step of a walk: the edge taken (none at the root) and the vertex it led to.
#[derive(Debug, Clone, PartialEq)]
pub struct PathElement {
    pub edge: Option<EdgeRecord>,
    pub vertex: DocumentId,
    key: DocumentKey,
}

impl PathElement {
    pub fn root(vertex: DocumentId) -> Self {
        let key = vertex.key();
        PathElement {
            edge: None,
            vertex,
            key,
        }
    }

    pub fn step(edge: EdgeRecord, vertex: DocumentId) -> Self {
        let key = vertex.key();
        PathElement {
            edge: Some(edge),
            vertex,
            key,
        }
    }

    pub fn key(&self) -> &DocumentKey {
        &self.key
    }
}

impl EdgeVertex for PathElement {
    type Edge = EdgeRecord;
    type Vertex = DocumentKey;

    fn edge(&self) -> Option<&EdgeRecord> {
        self.edge.as_ref()
    }

    fn vertex(&self) -> &DocumentKey {
        &self.key
    }
}

impl Display for PathElement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.edge {
            Some(edge) => write!(f, "{} -- {}", edge.label, self.vertex),
            None => write!(f, "{}", self.vertex),
        }
    }
}

/// A [`PathElement`] together with the document found at its vertex. A vertex whose document
/// is missing from the store is a normal outcome: `document` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPathElement {
    pub edge: Option<EdgeRecord>,
    pub vertex: DocumentId,
    pub document: Option<Document>,
}

impl ResolvedPathElement {
    pub fn exists(&self) -> bool {
        self.document.is_some()
    }

    pub fn source(&self) -> Option<&Value> {
        self.document.as_ref().map(|d| &d.source)
    }
}

/// Expands path elements along one direction of a [`GraphStore`].
pub struct GraphViewer<'g> {
    graph: &'g dyn GraphStore,
    direction: WalkDirection,
}

impl<'g> GraphViewer<'g> {
    pub fn new(graph: &'g dyn GraphStore, direction: WalkDirection) -> Self {
        GraphViewer { graph, direction }
    }
}

impl TreeViewer<PathElement> for GraphViewer<'_> {
    fn children(&self, node: &PathElement) -> Vec<PathElement> {
        match self.graph.edges(node.key(), self.direction) {
            Ok(edges) => edges
                .into_iter()
                .map(|edge| {
                    let next = edge.opposite(self.direction).clone();
                    PathElement::step(edge, next)
                })
                .collect(),
            Err(e) => {
                tracing::warn!("could not expand {}: {e}", node.vertex);
                Vec::new()
            }
        }
    }
}
