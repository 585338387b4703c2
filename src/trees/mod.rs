//! Generic trees and the traversals that build and transform them.
//!
//! - [`Tree`]/[`TreeEntry`]: immutable tree whose nodes carry their distance from the root
//! - [`bfs_walk`]: lazy breadth-first walk over anything a [`TreeViewer`] can expand
//! - [`visit`]: depth-first visitor driver, with the composable [`CycleKiller`] and
//!   [`LevelLimitingVisitor`] decorators and the [`TreeBuilder`] that collects a tree
//! - [`build_tree`]: breadth-first, depth bounded tree construction over a graph
//! - [`map`], [`pmap`], [`optional`]: structure preserving transformations
//!
//! Walks over cyclic graphs are not cycle safe on their own; pass an [`OccurrenceTracker`].

mod tracker;
mod tree;
mod visitor;

#[cfg(test)]
mod tests;

pub use tracker::{
    EdgeVertex, NodeAlreadyVisitedTracker, OccurrenceTracker, VertexAlreadyVisitedTracker,
};
pub use tree::{PreOrder, Tree, TreeEntry};
pub use visitor::{
    visit, CycleKiller, LevelLimitingVisitor, PrettyPrinter, TreeBuilder, TreeViewer, TreeVisitor,
};

use rayon::ThreadPool;
use std::{
    any::Any,
    collections::VecDeque,
    fmt::{Display, Formatter},
    panic::{self, AssertUnwindSafe},
    sync::mpsc,
};

use crate::error::DegraphmalizerError;

/// Why a [`pmap`] did not produce a tree.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskError<E> {
    /// The mapped function returned an error.
    Failed(E),
    /// The task never delivered a value: it panicked or was torn down.
    Interrupted(String),
}

impl<E: Display> Display for TaskError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskError::Failed(e) => write!(f, "task failed: {e}"),
            TaskError::Interrupted(reason) => write!(f, "task interrupted: {reason}"),
        }
    }
}

impl<E: Display> From<TaskError<E>> for DegraphmalizerError {
    fn from(err: TaskError<E>) -> Self {
        match err {
            TaskError::Failed(e) => DegraphmalizerError::TaskFailed(e.to_string()),
            TaskError::Interrupted(reason) => DegraphmalizerError::Interrupted(reason),
        }
    }
}

/// Applies `f` to every value, keeping shape and distances.
pub fn map<A, B>(f: impl Fn(&A) -> B, tree: &Tree<A>) -> Tree<B> {
    fn go<A, B>(f: &dyn Fn(&A) -> B, tree: &Tree<A>) -> Tree<B> {
        let children = tree.children().iter().map(|c| go(f, c)).collect();
        Tree::from_parts(TreeEntry::new(f(tree.value()), tree.distance()), children)
    }
    go(&f, tree)
}

/// Runs `f` once per node on `pool` and blocks until every task has finished.
///
/// Either every node is computed, or the first fault in pre-order is returned. Errors from `f`
/// come back as [`TaskError::Failed`]; a task that panicked as [`TaskError::Interrupted`].
pub fn pmap<A, B, E, F>(pool: &ThreadPool, f: F, tree: &Tree<A>) -> Result<Tree<B>, TaskError<E>>
where
    A: Sync,
    B: Send,
    E: Send,
    F: Fn(&A) -> Result<B, E> + Sync,
{
    let nodes: Vec<&TreeEntry<A>> = tree.iter().collect();
    let (tx, rx) = mpsc::channel();

    pool.scope(|scope| {
        for (idx, entry) in nodes.iter().copied().enumerate() {
            let tx = tx.clone();
            let f = &f;
            scope.spawn(move |_| {
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| f(entry.value())));
                // receiver outlives the scope
                let _ = tx.send((idx, outcome));
            });
        }
    });
    drop(tx);

    let mut slots: Vec<Option<std::thread::Result<Result<B, E>>>> =
        (0..nodes.len()).map(|_| None).collect();
    for (idx, outcome) in rx {
        slots[idx] = Some(outcome);
    }

    let mut values = Vec::with_capacity(slots.len());
    for (idx, slot) in slots.into_iter().enumerate() {
        match slot {
            Some(Ok(Ok(value))) => values.push(value),
            Some(Ok(Err(e))) => return Err(TaskError::Failed(e)),
            Some(Err(payload)) => return Err(TaskError::Interrupted(panic_message(payload))),
            None => {
                return Err(TaskError::Interrupted(format!(
                    "task for node {idx} delivered no result"
                )))
            }
        }
    }

    tree.rebuild(&mut values.into_iter())
        .ok_or_else(|| TaskError::Interrupted("result count did not match tree size".into()))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

/// All-or-nothing: `None` if any node holds `None`, otherwise the unwrapped tree.
pub fn optional<A>(tree: Tree<Option<A>>) -> Option<Tree<A>> {
    let (entry, children) = tree.into_parts();
    let distance = entry.distance();
    let value = entry.into_value()?;
    let children = children
        .into_iter()
        .map(optional)
        .collect::<Option<Vec<_>>>()?;
    Some(Tree::from_parts(TreeEntry::new(value, distance), children))
}

/// Lazy breadth-first walk. Each yielded entry carries its distance from `root`.
///
/// Never terminates on cyclic input; use [`bfs_walk_tracked`] for graphs.
pub fn bfs_walk<'a, A>(root: A, viewer: &'a dyn TreeViewer<A>) -> BfsWalk<'a, A> {
    BfsWalk {
        queue: VecDeque::from([TreeEntry::new(root, 0)]),
        viewer,
        tracker: None,
    }
}

/// Breadth-first walk that only enqueues children the tracker has not seen yet.
pub fn bfs_walk_tracked<'a, A>(
    root: A,
    viewer: &'a dyn TreeViewer<A>,
    tracker: &'a mut dyn OccurrenceTracker<A>,
) -> BfsWalk<'a, A> {
    tracker.has_occurred(&root);
    BfsWalk {
        queue: VecDeque::from([TreeEntry::new(root, 0)]),
        viewer,
        tracker: Some(tracker),
    }
}

pub struct BfsWalk<'a, A> {
    queue: VecDeque<TreeEntry<A>>,
    viewer: &'a dyn TreeViewer<A>,
    tracker: Option<&'a mut dyn OccurrenceTracker<A>>,
}

impl<A> Iterator for BfsWalk<'_, A> {
    type Item = TreeEntry<A>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.queue.pop_front()?;
        let distance = entry.distance() + 1;
        for child in self.viewer.children(entry.value()) {
            if let Some(tracker) = self.tracker.as_mut() {
                if tracker.has_occurred(&child) {
                    continue;
                }
            }
            self.queue.push_back(TreeEntry::new(child, distance));
        }
        Some(entry)
    }
}

/// Builds the tree reachable from `root` down to `max_depth`, skipping nodes the tracker has
/// already seen.
///
/// Nodes are expanded breadth-first, so every node lands at its shortest distance from `root`
/// and a node reached over several paths hangs below the parent that found it first.
pub fn build_tree<A>(
    root: A,
    viewer: &dyn TreeViewer<A>,
    mut tracker: impl OccurrenceTracker<A>,
    max_depth: usize,
) -> Option<Tree<A>> {
    struct Slot<A> {
        value: A,
        distance: usize,
        children: Vec<usize>,
    }

    if tracker.has_occurred(&root) {
        return None;
    }
    let mut slots = vec![Slot {
        value: root,
        distance: 0,
        children: Vec::new(),
    }];
    let mut next = 0;
    while next < slots.len() {
        let distance = slots[next].distance;
        if distance < max_depth {
            for child in viewer.children(&slots[next].value) {
                if tracker.has_occurred(&child) {
                    continue;
                }
                let index = slots.len();
                slots.push(Slot {
                    value: child,
                    distance: distance + 1,
                    children: Vec::new(),
                });
                slots[next].children.push(index);
            }
        }
        next += 1;
    }

    // children always sit after their parent, so assemble back to front
    let mut built: Vec<Option<Tree<A>>> = (0..slots.len()).map(|_| None).collect();
    for (index, slot) in slots.into_iter().enumerate().rev() {
        let children = slot
            .children
            .iter()
            .filter_map(|child| built[*child].take())
            .collect();
        built[index] = Some(Tree::from_parts(
            TreeEntry::new(slot.value, slot.distance),
            children,
        ));
    }
    built.into_iter().next().flatten()
}
