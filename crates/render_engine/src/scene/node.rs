//! Scene nodes

use std::sync::Arc;

use super::camera::CameraUniform;
use super::mesh::Mesh;
use super::traversal::Nodes;
use crate::foundation::math::{Mat4, Transform};

/// Transform node owning its children
pub struct Node {
    /// Display name
    pub name: String,
    /// Local transform
    pub transform: Transform,
    /// Owned children, in insertion order
    pub children: Vec<Node>,
    /// Shared geometry drawn at this node
    pub mesh: Option<Arc<Mesh>>,
    /// Camera bound while rendering, when this node carries one
    pub camera: Option<Arc<CameraUniform>>,
}

impl Node {
    /// Empty node at the identity transform
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Transform::identity(),
            children: Vec::new(),
            mesh: None,
            camera: None,
        }
    }

    /// Set the transform
    #[must_use]
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Attach a mesh
    #[must_use]
    pub fn with_mesh(mut self, mesh: Arc<Mesh>) -> Self {
        self.mesh = Some(mesh);
        self
    }

    /// Attach a camera
    #[must_use]
    pub fn with_camera(mut self, camera: Arc<CameraUniform>) -> Self {
        self.camera = Some(camera);
        self
    }

    /// Append a child
    #[must_use]
    pub fn with_child(mut self, child: Self) -> Self {
        self.children.push(child);
        self
    }

    /// Local transform as a matrix
    pub fn matrix(&self) -> Mat4 {
        self.transform.to_matrix()
    }

    /// Every node below this one; each child's subtree comes before the child
    pub fn descendants(&self) -> Nodes<'_> {
        Nodes::new(&self.children)
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("transform", &self.transform)
            .field("children", &self.children)
            .field("mesh", &self.mesh.is_some())
            .field("camera", &self.camera.is_some())
            .finish()
    }
}
