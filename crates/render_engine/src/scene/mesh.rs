//! Meshes and their CPU-side builder

use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::mem;
use std::sync::Arc;

use super::material::Material;
use crate::render::vulkan::Buffer;

/// Interleaved vertex consumed by the geometry pipeline
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    /// Object-space position (location 0)
    pub position: [f32; 3],
    /// Object-space normal (location 1)
    pub normal: [f32; 3],
    /// First texture coordinate set (location 2)
    pub uv: [f32; 2],
}

impl MeshVertex {
    /// Single interleaved binding
    pub const fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Position, normal, uv
    pub const fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 12,
            },
            vk::VertexInputAttributeDescription {
                location: 2,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: 24,
            },
        ]
    }
}

/// Range of a primitive inside a mesh's shared buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimitiveSpan {
    /// Added to every index of the primitive
    pub first_vertex: u32,
    /// Vertices owned by the primitive
    pub vertex_count: u32,
    /// First index in the index buffer
    pub first_index: u32,
    /// Indices drawn
    pub index_count: u32,
}

/// Drawable range with its material
pub struct Primitive {
    /// Buffer range
    pub span: PrimitiveSpan,
    /// Material bound while drawing the range
    pub material: Arc<Material>,
}

/// Device-resident geometry shared between nodes
pub struct Mesh {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    primitives: Vec<Primitive>,
}

impl Mesh {
    /// Indices are always 16 bit
    pub const INDEX_TYPE: vk::IndexType = vk::IndexType::UINT16;

    /// Assemble a mesh from uploaded buffers
    pub fn new(vertex_buffer: Buffer, index_buffer: Buffer, primitives: Vec<Primitive>) -> Self {
        Self {
            vertex_buffer,
            index_buffer,
            primitives,
        }
    }

    /// Vertex buffer handle
    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer.handle()
    }

    /// Index buffer handle
    pub fn index_buffer(&self) -> vk::Buffer {
        self.index_buffer.handle()
    }

    /// Primitives in draw order
    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }
}

/// Concatenates primitives into one vertex and one index array
#[derive(Debug, Default, Clone)]
pub struct MeshBuilder {
    vertices: Vec<MeshVertex>,
    indices: Vec<u16>,
}

impl MeshBuilder {
    /// Empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a primitive whose indices refer to its own `vertices`
    pub fn add_primitive(&mut self, vertices: &[MeshVertex], indices: &[u16]) -> PrimitiveSpan {
        let span = PrimitiveSpan {
            first_vertex: self.vertices.len() as u32,
            vertex_count: vertices.len() as u32,
            first_index: self.indices.len() as u32,
            index_count: indices.len() as u32,
        };
        self.vertices.extend_from_slice(vertices);
        self.indices.extend_from_slice(indices);
        span
    }

    /// No primitive has been added
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Vertex data ready for upload
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Index data ready for upload
    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}
