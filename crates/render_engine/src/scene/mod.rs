//! Scene graph
//!
//! A [`Scene`] is a forest of [`Node`]s owned by value. Meshes, materials and cameras are
//! shared through `Arc`, so many nodes can reference the same GPU resources. Nodes are
//! addressed by [`NodePath`] rather than by reference, which keeps selections valid across
//! insertions that reallocate child storage.
//!
//! Traversal is descendants-first: every node is yielded after all of its children's
//! subtrees.

mod camera;
mod material;
mod mesh;
mod node;
mod traversal;
mod uniform;

pub use camera::{CameraData, CameraUniform};
pub use material::{Material, MaterialData};
pub use mesh::{Mesh, MeshBuilder, MeshVertex, Primitive, PrimitiveSpan};
pub use node::Node;
pub use traversal::Nodes;
pub use uniform::Uniform;

#[cfg(test)]
pub(crate) use mesh::tests::triangle_mesh;

use std::sync::Arc;

/// Index path from a root to a node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    /// Path of the `index`th root
    pub fn root(index: usize) -> Self {
        Self(vec![index])
    }

    /// Path of this node's `index`th child
    #[must_use]
    pub fn child(&self, index: usize) -> Self {
        let mut indices = self.0.clone();
        indices.push(index);
        Self(indices)
    }

    /// Parent path; `None` for roots
    pub fn parent(&self) -> Option<Self> {
        (self.0.len() > 1).then(|| Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Child indices from the root down
    pub fn indices(&self) -> &[usize] {
        &self.0
    }
}

/// Forest of nodes
#[derive(Debug, Default)]
pub struct Scene {
    roots: Vec<Node>,
}

impl Scene {
    /// Empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Top-level nodes
    pub fn roots(&self) -> &[Node] {
        &self.roots
    }

    /// Append a top-level node
    pub fn add_node(&mut self, node: Node) -> NodePath {
        self.roots.push(node);
        NodePath::root(self.roots.len() - 1)
    }

    /// Append `node` under `parent`; `None` when `parent` does not resolve
    pub fn add_child(&mut self, parent: &NodePath, node: Node) -> Option<NodePath> {
        let parent_node = self.node_mut(parent)?;
        parent_node.children.push(node);
        Some(parent.child(parent_node.children.len() - 1))
    }

    /// Remove and return the node at `path` with its subtree
    ///
    /// Paths to later siblings and their descendants shift down by one.
    pub fn remove(&mut self, path: &NodePath) -> Option<Node> {
        let (&last, parent) = path.0.split_last()?;
        let siblings = if parent.is_empty() {
            &mut self.roots
        } else {
            &mut self.node_mut(&NodePath(parent.to_vec()))?.children
        };
        (last < siblings.len()).then(|| siblings.remove(last))
    }

    /// Resolve a path
    pub fn node(&self, path: &NodePath) -> Option<&Node> {
        let (first, rest) = path.0.split_first()?;
        rest.iter()
            .try_fold(self.roots.get(*first)?, |node, &index| node.children.get(index))
    }

    /// Resolve a path for mutation
    pub fn node_mut(&mut self, path: &NodePath) -> Option<&mut Node> {
        let (first, rest) = path.0.split_first()?;
        rest.iter()
            .try_fold(self.roots.get_mut(*first)?, |node, &index| node.children.get_mut(index))
    }

    /// Every node, descendants before ancestors
    pub fn nodes(&self) -> Nodes<'_> {
        Nodes::new(&self.roots)
    }

    /// Visit every node mutably in [`Self::nodes`] order
    pub fn for_each_node_mut(&mut self, mut visitor: impl FnMut(&mut Node)) {
        traversal::visit_mut(&mut self.roots, &mut visitor);
    }

    /// First node in traversal order carrying a camera
    pub fn find_camera(&self) -> Option<&Node> {
        self.nodes().find(|node| node.camera.is_some())
    }

    /// Nodes with a mesh, in traversal order
    pub fn drawables(&self) -> impl Iterator<Item = (&Node, &Arc<Mesh>)> {
        self.nodes().filter_map(|node| node.mesh.as_ref().map(|mesh| (node, mesh)))
    }
}
