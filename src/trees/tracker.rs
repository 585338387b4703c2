use std::{
    collections::{HashMap, HashSet},
    hash::Hash,
};

/// Records whether an element has been seen before. `has_occurred` both queries and records:
/// the first call for an element returns `false`, every later call returns `true`.
pub trait OccurrenceTracker<A> {
    fn has_occurred(&mut self, element: &A) -> bool;
}

/// Tracks the elements themselves. Suitable for tree-shaped data where a value identifies a node.
#[derive(Debug)]
pub struct NodeAlreadyVisitedTracker<A> {
    contents: HashSet<A>,
}

impl<A> Default for NodeAlreadyVisitedTracker<A> {
    fn default() -> Self {
        NodeAlreadyVisitedTracker {
            contents: HashSet::new(),
        }
    }
}

impl<A: Eq + Hash + Clone> OccurrenceTracker<A> for NodeAlreadyVisitedTracker<A> {
    fn has_occurred(&mut self, element: &A) -> bool {
        !self.contents.insert(element.clone())
    }
}

/// An element reached through an edge: the graph walk's view of "how did we get here".
pub trait EdgeVertex {
    type Edge: Clone;
    type Vertex: Eq + Hash + Clone;

    /// `None` for the root of a walk.
    fn edge(&self) -> Option<&Self::Edge>;
    fn vertex(&self) -> &Self::Vertex;
}

impl<E: Clone, V: Eq + Hash + Clone> EdgeVertex for (E, V) {
    type Edge = E;
    type Vertex = V;

    fn edge(&self) -> Option<&E> {
        Some(&self.0)
    }

    fn vertex(&self) -> &V {
        &self.1
    }
}

/// Tracks vertex identity for graph walks. The same vertex may be reached over several edges;
/// only the first arrival counts as new, but every traversing edge is kept.
#[derive(Debug)]
pub struct VertexAlreadyVisitedTracker<E, V> {
    arrivals: HashMap<V, Vec<E>>,
}

impl<E, V> Default for VertexAlreadyVisitedTracker<E, V> {
    fn default() -> Self {
        VertexAlreadyVisitedTracker {
            arrivals: HashMap::new(),
        }
    }
}

impl<E, V: Eq + Hash> VertexAlreadyVisitedTracker<E, V> {
    /// Edges over which `vertex` was reached, in arrival order.
    pub fn arrivals(&self, vertex: &V) -> &[E] {
        self.arrivals.get(vertex).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn visited(&self) -> usize {
        self.arrivals.len()
    }
}

impl<P> OccurrenceTracker<P> for VertexAlreadyVisitedTracker<P::Edge, P::Vertex>
where
    P: EdgeVertex,
{
    fn has_occurred(&mut self, element: &P) -> bool {
        let seen = self.arrivals.contains_key(element.vertex());
        let edges = self.arrivals.entry(element.vertex().clone()).or_default();
        if let Some(edge) = element.edge() {
            edges.push(edge.clone());
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_tracker_reports_second_sighting() {
        let mut tracker = NodeAlreadyVisitedTracker::default();
        assert!(!tracker.has_occurred(&"a"));
        assert!(!tracker.has_occurred(&"b"));
        assert!(tracker.has_occurred(&"a"));
    }

    #[test]
    fn vertex_tracker_ignores_edge_identity() {
        let mut tracker: VertexAlreadyVisitedTracker<&str, i32> = Default::default();
        assert!(!tracker.has_occurred(&("e1", 1)));
        assert!(tracker.has_occurred(&("e2", 1)));
        assert!(!tracker.has_occurred(&("e3", 2)));
        assert_eq!(tracker.arrivals(&1), &["e1", "e2"]);
        assert_eq!(tracker.visited(), 2);
    }
}
