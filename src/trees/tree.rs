use serde::{Deserialize, Serialize};
use std::{
    collections::VecDeque,
    fmt::{Display, Formatter, Write},
};

/// A value paired with its distance from the root of the tree it was built in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TreeEntry<A> {
    value: A,
    distance: usize,
}

impl<A> TreeEntry<A> {
    pub fn new(value: A, distance: usize) -> Self {
        TreeEntry { value, distance }
    }

    pub fn value(&self) -> &A {
        &self.value
    }

    pub fn distance(&self) -> usize {
        self.distance
    }

    pub fn into_value(self) -> A {
        self.value
    }
}

impl<A: Display> Display for TreeEntry<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} -- {}", self.distance, self.value)
    }
}

/// Immutable tree. Every node owns its children; distances are fixed when the node is built
/// and always satisfy `child.distance == parent.distance + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tree<A> {
    entry: TreeEntry<A>,
    children: Vec<Tree<A>>,
}

impl<A> Tree<A> {
    pub fn leaf(value: A) -> Self {
        Tree {
            entry: TreeEntry::new(value, 0),
            children: Vec::new(),
        }
    }

    /// Builds a root node over `children`, re-basing every distance below it.
    pub fn node(value: A, children: Vec<Tree<A>>) -> Self {
        let mut tree = Tree {
            entry: TreeEntry::new(value, 0),
            children,
        };
        tree.rebase(0);
        tree
    }

    /// Used by builders that already track depth.
    pub(crate) fn from_parts(entry: TreeEntry<A>, children: Vec<Tree<A>>) -> Self {
        Tree { entry, children }
    }

    fn rebase(&mut self, distance: usize) {
        self.entry.distance = distance;
        for child in self.children.iter_mut() {
            child.rebase(distance + 1);
        }
    }

    pub fn value(&self) -> &A {
        &self.entry.value
    }

    pub fn entry(&self) -> &TreeEntry<A> {
        &self.entry
    }

    pub fn distance(&self) -> usize {
        self.entry.distance
    }

    pub fn children(&self) -> &[Tree<A>] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(Tree::len).sum::<usize>()
    }

    /// Largest distance found in the tree.
    pub fn depth(&self) -> usize {
        self.children
            .iter()
            .map(Tree::depth)
            .max()
            .unwrap_or(self.entry.distance)
    }

    /// Pre-order traversal of the entries.
    pub fn iter(&self) -> PreOrder<'_, A> {
        PreOrder { stack: vec![self] }
    }

    /// Breadth-first traversal of the entries.
    pub fn bfs(&self) -> impl Iterator<Item = &TreeEntry<A>> {
        let mut queue = VecDeque::from([self]);
        std::iter::from_fn(move || {
            let next = queue.pop_front()?;
            queue.extend(next.children.iter());
            Some(&next.entry)
        })
    }

    pub fn into_parts(self) -> (TreeEntry<A>, Vec<Tree<A>>) {
        (self.entry, self.children)
    }

    /// Rebuilds this tree's shape from a pre-order stream of values.
    pub(crate) fn rebuild<B>(&self, values: &mut impl Iterator<Item = B>) -> Option<Tree<B>> {
        let value = values.next()?;
        let mut children = Vec::with_capacity(self.children.len());
        for child in self.children.iter() {
            children.push(child.rebuild(values)?);
        }
        Some(Tree {
            entry: TreeEntry::new(value, self.entry.distance),
            children,
        })
    }
}

impl<A: Display> Tree<A> {
    /// Compact one-line form: `(value (child,child,))`.
    pub fn print_tree(&self) -> String {
        let mut out = String::new();
        self.write_compact(&mut out);
        out
    }

    fn write_compact(&self, out: &mut String) {
        let _ = write!(out, "({} (", self.entry.value);
        for child in self.children.iter() {
            child.write_compact(out);
            out.push(',');
        }
        out.push_str("))");
    }
}

impl<A: Display> Display for Tree<A> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for entry in self.iter() {
            writeln!(f, "{}{}", "  ".repeat(entry.distance()), entry)?;
        }
        Ok(())
    }
}

pub struct PreOrder<'a, A> {
    stack: Vec<&'a Tree<A>>,
}

impl<'a, A> Iterator for PreOrder<'a, A> {
    type Item = &'a TreeEntry<A>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        self.stack.extend(next.children.iter().rev());
        Some(&next.entry)
    }
}
