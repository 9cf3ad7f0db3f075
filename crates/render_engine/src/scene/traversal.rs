//! Descendants-first tree walk

use super::node::Node;

/// Lazy post-order walk over a forest of nodes
///
/// For each root, its whole subtree is yielded before the root itself. The iterator borrows
/// the tree, so it always reflects the tree as it is when the walk starts.
pub struct Nodes<'a> {
    roots: std::slice::Iter<'a, Node>,
    // node and index of its next unvisited child
    stack: Vec<(&'a Node, usize)>,
}

impl<'a> Nodes<'a> {
    pub(crate) fn new(roots: &'a [Node]) -> Self {
        Self {
            roots: roots.iter(),
            stack: Vec::new(),
        }
    }
}

impl<'a> Iterator for Nodes<'a> {
    type Item = &'a Node;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.stack.last_mut() {
                Some((node, next_child)) => {
                    let node: &'a Node = *node;
                    if let Some(child) = node.children.get(*next_child) {
                        *next_child += 1;
                        self.stack.push((child, 0));
                    } else {
                        self.stack.pop();
                        return Some(node);
                    }
                }
                None => {
                    let root = self.roots.next()?;
                    self.stack.push((root, 0));
                }
            }
        }
    }
}

/// Mutable walk in the same order as [`Nodes`]
pub(crate) fn visit_mut(nodes: &mut [Node], visitor: &mut impl FnMut(&mut Node)) {
    for node in nodes {
        visit_mut(&mut node.children, visitor);
        visitor(node);
    }
}
