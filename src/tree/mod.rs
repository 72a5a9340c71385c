//! Tree composition
//!
//! [`Treeable`] supplies navigation over any cheaply clonable node handle
//! that can report its parent and children. Mutation stays with the node
//! type, which owns its own insertion rules.

use std::fmt;

pub trait Treeable: Clone {
    fn parent(&self) -> Option<Self>;

    /// Children in insertion order
    fn children(&self) -> Vec<Self>;

    /// The topmost ancestor, or `self` when detached
    fn root(&self) -> Self {
        let mut node = self.clone();
        while let Some(parent) = node.parent() {
            node = parent;
        }
        node
    }

    /// Depth in the tree, 0 being the root
    fn level(&self) -> usize {
        self.parents().len()
    }

    /// Ancestors, nearest first
    fn parents(&self) -> Vec<Self> {
        let mut output = Vec::new();
        let mut current = self.parent();
        while let Some(parent) = current {
            current = parent.parent();
            output.push(parent);
        }
        output
    }

    /// Pre-order walk: `self` first, then each child subtree in order
    fn descendants(&self) -> Vec<Self> {
        let mut output = Vec::new();
        let mut stack = vec![self.clone()];
        while let Some(node) = stack.pop() {
            let children = node.children();
            output.push(node);
            stack.extend(children.into_iter().rev());
        }
        output
    }

    /// Number of nodes in this subtree, including `self`
    fn descendant_count(&self) -> usize {
        self.descendants().len()
    }

    /// Indented outline of the subtree
    fn tree(&self) -> String
    where
        Self: fmt::Display,
    {
        let base = self.level();
        self.descendants()
            .iter()
            .map(|node| format!("{}- {}\n", "  ".repeat(node.level() - base), node))
            .collect()
    }
}
