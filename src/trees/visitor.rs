use std::fmt::{Display, Write};

use super::{
    tracker::OccurrenceTracker,
    tree::{Tree, TreeEntry},
};

/// Views values of type `A` as a tree (or graph) by listing each node's children.
pub trait TreeViewer<A> {
    fn children(&self, node: &A) -> Vec<A>;
}

impl<A, F> TreeViewer<A> for F
where
    F: Fn(&A) -> Vec<A>,
{
    fn children(&self, node: &A) -> Vec<A> {
        self(node)
    }
}

/// Callbacks for a depth-first [`visit`].
pub trait TreeVisitor<A> {
    /// Called before a node's children are listed. Returning `true` stops the walk at this
    /// node: it is skipped entirely, `begin_children`/`end_children` are not called for it.
    fn visit_node(&mut self, node: &A, viewer: &dyn TreeViewer<A>) -> bool;

    fn begin_children(&mut self, node: &A, viewer: &dyn TreeViewer<A>);

    /// Called once all of the node's children have been visited. Hands the node back.
    fn end_children(&mut self, node: A, viewer: &dyn TreeViewer<A>);
}

/// Depth-first walk from `root`, driving `visitor`. Terminates on cyclic data only when the
/// visitor stops descent, see [`CycleKiller`] and [`LevelLimitingVisitor`].
pub fn visit<A>(root: A, viewer: &dyn TreeViewer<A>, visitor: &mut dyn TreeVisitor<A>) {
    if visitor.visit_node(&root, viewer) {
        return;
    }
    visitor.begin_children(&root, viewer);
    for child in viewer.children(&root) {
        visit(child, viewer, visitor);
    }
    visitor.end_children(root, viewer);
}

/// Assembles the visited nodes into a [`Tree`].
pub struct TreeBuilder<A> {
    stack: Vec<Vec<Tree<A>>>,
    level: usize,
    root: Option<Tree<A>>,
}

impl<A> Default for TreeBuilder<A> {
    fn default() -> Self {
        TreeBuilder {
            stack: Vec::new(),
            level: 0,
            root: None,
        }
    }
}

impl<A> TreeBuilder<A> {
    pub fn new() -> Self {
        TreeBuilder::default()
    }

    /// The finished tree, `None` when the root itself was skipped.
    pub fn into_tree(self) -> Option<Tree<A>> {
        self.root
    }
}

impl<A> TreeVisitor<A> for TreeBuilder<A> {
    fn visit_node(&mut self, _node: &A, _viewer: &dyn TreeViewer<A>) -> bool {
        false
    }

    fn begin_children(&mut self, _node: &A, _viewer: &dyn TreeViewer<A>) {
        self.stack.push(Vec::new());
        self.level += 1;
    }

    fn end_children(&mut self, node: A, _viewer: &dyn TreeViewer<A>) {
        self.level -= 1;
        let children = self.stack.pop().unwrap_or_default();
        let tree = Tree::from_parts(TreeEntry::new(node, self.level), children);
        match self.stack.last_mut() {
            Some(parent) => parent.push(tree),
            None => self.root = Some(tree),
        }
    }
}

/// Stops descent into any node the tracker has already seen.
pub struct CycleKiller<V, T> {
    inner: V,
    tracker: T,
}

impl<V, T> CycleKiller<V, T> {
    pub fn new(inner: V, tracker: T) -> Self {
        CycleKiller { inner, tracker }
    }

    pub fn into_inner(self) -> (V, T) {
        (self.inner, self.tracker)
    }
}

impl<A, V, T> TreeVisitor<A> for CycleKiller<V, T>
where
    V: TreeVisitor<A>,
    T: OccurrenceTracker<A>,
{
    fn visit_node(&mut self, node: &A, viewer: &dyn TreeViewer<A>) -> bool {
        if self.tracker.has_occurred(node) {
            return true;
        }
        self.inner.visit_node(node, viewer)
    }

    fn begin_children(&mut self, node: &A, viewer: &dyn TreeViewer<A>) {
        self.inner.begin_children(node, viewer)
    }

    fn end_children(&mut self, node: A, viewer: &dyn TreeViewer<A>) {
        self.inner.end_children(node, viewer)
    }
}

/// Stops descent below `max_depth` levels: nodes at distance `>= max_depth` are skipped.
pub struct LevelLimitingVisitor<V> {
    inner: V,
    max_depth: usize,
    level: usize,
}

impl<V> LevelLimitingVisitor<V> {
    pub fn new(inner: V, max_depth: usize) -> Self {
        LevelLimitingVisitor {
            inner,
            max_depth,
            level: 0,
        }
    }

    pub fn into_inner(self) -> V {
        self.inner
    }
}

impl<A, V: TreeVisitor<A>> TreeVisitor<A> for LevelLimitingVisitor<V> {
    fn visit_node(&mut self, node: &A, viewer: &dyn TreeViewer<A>) -> bool {
        if self.level >= self.max_depth {
            return true;
        }
        self.inner.visit_node(node, viewer)
    }

    fn begin_children(&mut self, node: &A, viewer: &dyn TreeViewer<A>) {
        self.level += 1;
        self.inner.begin_children(node, viewer)
    }

    fn end_children(&mut self, node: A, viewer: &dyn TreeViewer<A>) {
        self.level -= 1;
        self.inner.end_children(node, viewer)
    }
}

/// Writes one indented `distance -- value` line per visited node.
#[derive(Default)]
pub struct PrettyPrinter {
    out: String,
    level: usize,
}

impl PrettyPrinter {
    pub fn new() -> Self {
        PrettyPrinter::default()
    }

    pub fn lines(&self) -> Vec<&str> {
        self.out.lines().collect()
    }

    pub fn finish(self) -> String {
        self.out
    }
}

impl<A: Display> TreeVisitor<A> for PrettyPrinter {
    fn visit_node(&mut self, node: &A, _viewer: &dyn TreeViewer<A>) -> bool {
        let _ = writeln!(
            self.out,
            "{}{} -- {}",
            "  ".repeat(self.level),
            self.level,
            node
        );
        false
    }

    fn begin_children(&mut self, _node: &A, _viewer: &dyn TreeViewer<A>) {
        self.level += 1;
    }

    fn end_children(&mut self, _node: A, _viewer: &dyn TreeViewer<A>) {
        self.level -= 1;
    }
}
