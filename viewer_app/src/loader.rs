//! glTF scene loading
//!
//! Loading runs in two steps. [`SceneSource::from_gltf`] reads the document into host-side
//! vertex arrays, RGBA8 texels, material parameters and a node tree. [`SceneSource::upload`]
//! then moves everything to the GPU in one [`TransferStager`] batch and builds the
//! [`Scene`].

use ash::vk;
use render_engine::foundation::math::Transform;
use render_engine::render::deferred::PassPipelines;
use render_engine::render::transfer::{ImageTransferHandle, TransferStager};
use render_engine::render::vulkan::{GpuDevice, Image, MemoryAllocator, VulkanResult};
use render_engine::scene::{
    CameraData, CameraUniform, Material, MaterialData, Mesh, MeshBuilder, MeshVertex, Node, Primitive, PrimitiveSpan,
    Scene,
};
use std::path::Path;
use std::sync::Arc;

use crate::error::{ViewerError, ViewerResult};

/// Name of the node that carries the viewer camera
pub const CAMERA_NODE: &str = "Camera";

const WHITE_TEXEL: [u8; 4] = [255, 255, 255, 255];
/// Tangent-space +Z
const FLAT_NORMAL_TEXEL: [u8; 4] = [128, 128, 255, 255];

/// Decoded image, always four 8-bit channels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureSource {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Row-major RGBA8 texels
    pub pixels: Vec<u8>,
}

impl TextureSource {
    fn from_gltf(image: &gltf::image::Data) -> ViewerResult<Self> {
        use gltf::image::Format;

        let pixels = match image.format {
            Format::R8G8B8A8 => image.pixels.clone(),
            Format::R8G8B8 => image
                .pixels
                .chunks_exact(3)
                .flat_map(|rgb| [rgb[0], rgb[1], rgb[2], 255])
                .collect(),
            Format::R8G8 => image
                .pixels
                .chunks_exact(2)
                .flat_map(|rg| [rg[0], rg[1], 0, 255])
                .collect(),
            Format::R8 => image.pixels.iter().flat_map(|&r| [r, r, r, 255]).collect(),
            other => return Err(ViewerError::Unsupported(format!("image format {other:?}"))),
        };

        Ok(Self {
            width: image.width,
            height: image.height,
            pixels,
        })
    }

    /// Queue an upload into a sampled image
    fn stage<'d, D: GpuDevice>(&'d self, stager: &mut TransferStager<'d, D>) -> VulkanResult<ImageTransferHandle> {
        stager.add_image_transfer(
            &self.pixels,
            &self.create_info(),
            vk::ImageAspectFlags::COLOR,
            vk::PipelineStageFlags2::FRAGMENT_SHADER,
            vk::AccessFlags2::SHADER_SAMPLED_READ,
        )
    }

    fn create_info(&self) -> vk::ImageCreateInfo {
        vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(vk::Format::R8G8B8A8_UNORM)
            .extent(vk::Extent3D {
                width: self.width,
                height: self.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::SAMPLED)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .build()
    }
}

/// Material parameters with indices into [`SceneSource::textures`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialSource {
    /// Base color factor
    pub color: [f32; 4],
    /// Base color texture
    pub color_texture: Option<usize>,
    /// Tangent-space normal texture
    pub normal_texture: Option<usize>,
}

impl Default for MaterialSource {
    fn default() -> Self {
        Self {
            color: MaterialData::default().color,
            color_texture: None,
            normal_texture: None,
        }
    }
}

/// Concatenated primitives of one glTF mesh
#[derive(Debug, Clone)]
pub struct MeshSource {
    /// Vertex and index data of every primitive
    pub builder: MeshBuilder,
    /// Span of each primitive and its index into [`SceneSource::materials`]
    pub primitives: Vec<(PrimitiveSpan, usize)>,
}

/// Node tree entry
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSource {
    /// glTF name, or a generated one
    pub name: String,
    /// Decomposed local transform
    pub transform: Transform,
    /// Index into [`SceneSource::meshes`]
    pub mesh: Option<usize>,
    /// Child nodes
    pub children: Vec<NodeSource>,
}

/// Host-side copy of a glTF scene
#[derive(Debug, Clone)]
pub struct SceneSource {
    /// Every image in the document
    pub textures: Vec<TextureSource>,
    /// Document materials followed by the default material
    pub materials: Vec<MaterialSource>,
    /// Every mesh in the document
    pub meshes: Vec<MeshSource>,
    /// Roots of the default scene
    pub roots: Vec<NodeSource>,
}

impl SceneSource {
    /// Import a `.gltf` or `.glb` file with its external buffers and images
    pub fn load(path: impl AsRef<Path>) -> ViewerResult<Self> {
        let path = path.as_ref();
        let (document, buffers, images) = gltf::import(path)?;
        let source = Self::from_gltf(&document, &buffers, &images)?;
        log::info!(
            "Loaded {}: {} meshes, {} materials, {} textures",
            path.display(),
            source.meshes.len(),
            source.materials.len() - 1,
            source.textures.len()
        );
        Ok(source)
    }

    /// Read an imported document
    pub fn from_gltf(
        document: &gltf::Document,
        buffers: &[gltf::buffer::Data],
        images: &[gltf::image::Data],
    ) -> ViewerResult<Self> {
        let textures = images.iter().map(TextureSource::from_gltf).collect::<ViewerResult<Vec<_>>>()?;

        let mut materials: Vec<MaterialSource> = document
            .materials()
            .map(|material| MaterialSource {
                color: material.pbr_metallic_roughness().base_color_factor(),
                color_texture: material
                    .pbr_metallic_roughness()
                    .base_color_texture()
                    .map(|info| info.texture().source().index()),
                normal_texture: material.normal_texture().map(|info| info.texture().source().index()),
            })
            .collect();
        let default_material = materials.len();
        materials.push(MaterialSource::default());

        let meshes = document
            .meshes()
            .map(|mesh| load_mesh(&mesh, buffers, default_material))
            .collect::<ViewerResult<Vec<_>>>()?;

        let scene = document
            .default_scene()
            .or_else(|| document.scenes().next())
            .ok_or_else(|| ViewerError::Unsupported("document has no scene".to_string()))?;
        let roots = scene.nodes().map(|node| load_node(&node)).collect();

        Ok(Self {
            textures,
            materials,
            meshes,
            roots,
        })
    }

    /// Upload every mesh and texture in one batch and assemble the scene
    ///
    /// A top-level [`CAMERA_NODE`] holding `camera` is appended to the roots. Returns the scene
    /// and that camera's uniform.
    pub fn upload<D: GpuDevice>(
        &self,
        device: &Arc<D>,
        allocator: &Arc<dyn MemoryAllocator>,
        pipelines: &PassPipelines,
        command_pool: vk::CommandPool,
        camera: &CameraData,
    ) -> ViewerResult<(Scene, Arc<CameraUniform>)> {
        let white = TextureSource {
            width: 1,
            height: 1,
            pixels: WHITE_TEXEL.to_vec(),
        };
        let flat_normal = TextureSource {
            width: 1,
            height: 1,
            pixels: FLAT_NORMAL_TEXEL.to_vec(),
        };

        let mut stager = TransferStager::new(Arc::clone(device), Arc::clone(allocator))?;
        let texture_handles = self
            .textures
            .iter()
            .map(|texture| texture.stage(&mut stager))
            .collect::<Result<Vec<_>, _>>()?;
        let white_handle = white.stage(&mut stager)?;
        let flat_normal_handle = flat_normal.stage(&mut stager)?;

        let mesh_handles = self
            .meshes
            .iter()
            .filter(|mesh| !mesh.builder.is_empty())
            .map(|mesh| {
                Ok((
                    stager.add_buffer_transfer(mesh.builder.vertex_bytes(), vk::BufferUsageFlags::VERTEX_BUFFER)?,
                    stager.add_buffer_transfer(mesh.builder.index_bytes(), vk::BufferUsageFlags::INDEX_BUFFER)?,
                ))
            })
            .collect::<ViewerResult<Vec<_>>>()?;

        stager.submit(command_pool)?;
        stager.wait()?;

        let mut take = |handle: ImageTransferHandle| Arc::new(stager.get_image(handle));
        let textures: Vec<Arc<Image>> = texture_handles.into_iter().map(&mut take).collect();
        let white = take(white_handle);
        let flat_normal = take(flat_normal_handle);

        let texture_or = |index: Option<usize>, fallback: &Arc<Image>| -> ViewerResult<Arc<Image>> {
            match index {
                Some(index) => textures
                    .get(index)
                    .cloned()
                    .ok_or_else(|| ViewerError::Unsupported(format!("texture {index} out of range"))),
                None => Ok(Arc::clone(fallback)),
            }
        };

        let material_sets = pipelines.material_sets();
        let materials = self
            .materials
            .iter()
            .map(|material| {
                Ok(Arc::new(Material::new(
                    device.as_ref(),
                    allocator.as_ref(),
                    &material_sets,
                    &MaterialData { color: material.color },
                    texture_or(material.color_texture, &white)?,
                    texture_or(material.normal_texture, &flat_normal)?,
                    pipelines.material_sampler,
                )?))
            })
            .collect::<ViewerResult<Vec<_>>>()?;

        let mut uploaded = mesh_handles.into_iter();
        let meshes: Vec<Option<Arc<Mesh>>> = self
            .meshes
            .iter()
            .map(|mesh| {
                if mesh.builder.is_empty() {
                    return None;
                }
                let (vertices, indices) = uploaded.next()?;
                let primitives = mesh
                    .primitives
                    .iter()
                    .map(|&(span, material)| Primitive {
                        span,
                        material: Arc::clone(&materials[material]),
                    })
                    .collect();
                Some(Arc::new(Mesh::new(
                    stager.get_buffer(vertices),
                    stager.get_buffer(indices),
                    primitives,
                )))
            })
            .collect();

        let mut scene = Scene::new();
        for root in &self.roots {
            scene.add_node(build_node(root, &meshes));
        }

        let camera = Arc::new(CameraUniform::new(
            device.as_ref(),
            allocator.as_ref(),
            &pipelines.camera_sets(),
            camera,
        )?);
        scene.add_node(Node::new(CAMERA_NODE).with_camera(Arc::clone(&camera)));

        Ok((scene, camera))
    }
}

fn load_mesh(mesh: &gltf::Mesh<'_>, buffers: &[gltf::buffer::Data], default_material: usize) -> ViewerResult<MeshSource> {
    let mut builder = MeshBuilder::new();
    let mut primitives = Vec::new();

    for primitive in mesh.primitives() {
        if primitive.mode() != gltf::mesh::Mode::Triangles {
            log::warn!("Skipping {:?} primitive in mesh {}", primitive.mode(), mesh.index());
            continue;
        }

        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|data| &data.0[..]));
        let positions: Vec<[f32; 3]> = reader
            .read_positions()
            .ok_or_else(|| ViewerError::Unsupported(format!("mesh {} has no positions", mesh.index())))?
            .collect();
        let mut normals = reader.read_normals();
        let mut uvs = reader.read_tex_coords(0).map(gltf::mesh::util::ReadTexCoords::into_f32);

        let vertices: Vec<MeshVertex> = positions
            .iter()
            .map(|&position| MeshVertex {
                position,
                normal: normals.as_mut().and_then(Iterator::next).unwrap_or([0.0, 1.0, 0.0]),
                uv: uvs.as_mut().and_then(Iterator::next).unwrap_or([0.0, 0.0]),
            })
            .collect();

        let indices: Vec<u16> = match reader.read_indices() {
            Some(indices) => indices
                .into_u32()
                .map(u16::try_from)
                .collect::<Result<_, _>>()
                .map_err(|_| ViewerError::Unsupported(format!("mesh {} needs 32-bit indices", mesh.index())))?,
            None => (0..vertices.len())
                .map(u16::try_from)
                .collect::<Result<_, _>>()
                .map_err(|_| ViewerError::Unsupported(format!("mesh {} has too many vertices", mesh.index())))?,
        };

        let span = builder.add_primitive(&vertices, &indices);
        let material = primitive.material().index().unwrap_or(default_material);
        primitives.push((span, material));
    }

    Ok(MeshSource { builder, primitives })
}

fn load_node(node: &gltf::Node<'_>) -> NodeSource {
    let (translation, rotation, scale) = node.transform().decomposed();
    NodeSource {
        name: node
            .name()
            .map_or_else(|| format!("node {}", node.index()), str::to_string),
        transform: Transform::from_decomposed(translation, rotation, scale),
        mesh: node.mesh().map(|mesh| mesh.index()),
        children: node.children().map(|child| load_node(&child)).collect(),
    }
}

fn build_node(source: &NodeSource, meshes: &[Option<Arc<Mesh>>]) -> Node {
    let mut node = Node::new(source.name.clone()).with_transform(source.transform);
    if let Some(mesh) = source.mesh.and_then(|index| meshes.get(index)).and_then(Option::as_ref) {
        node = node.with_mesh(Arc::clone(mesh));
    }
    for child in &source.children {
        node = node.with_child(build_node(child, meshes));
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// One red triangle under a translated parent
    const TRIANGLE_GLTF: &str = r#"{
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [
            { "name": "parent", "translation": [0.0, 0.0, -3.0], "children": [1] },
            { "name": "triangle", "mesh": 0 }
        ],
        "meshes": [{
            "primitives": [{ "attributes": { "POSITION": 0, "NORMAL": 1 }, "indices": 2, "material": 0 }]
        }],
        "materials": [{ "pbrMetallicRoughness": { "baseColorFactor": [1.0, 0.0, 0.0, 1.0] } }],
        "accessors": [
            { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
              "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] },
            { "bufferView": 1, "componentType": 5126, "count": 3, "type": "VEC3" },
            { "bufferView": 2, "componentType": 5123, "count": 3, "type": "SCALAR" }
        ],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 36 },
            { "buffer": 0, "byteOffset": 72, "byteLength": 6 }
        ],
        "buffers": [{
            "byteLength": 80,
            "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAAAAAAAAAAAAAAAIA/AAAAAAAAAAAAAIA/AAAAAAAAAAAAAIA/AAABAAIAAAA="
        }]
    }"#;

    fn triangle_source() -> SceneSource {
        let (document, buffers, images) = gltf::import_slice(TRIANGLE_GLTF.as_bytes()).unwrap();
        SceneSource::from_gltf(&document, &buffers, &images).unwrap()
    }

    #[test]
    fn test_reads_geometry_and_material() {
        let source = triangle_source();

        assert_eq!(source.meshes.len(), 1);
        let mesh = &source.meshes[0];
        assert_eq!(mesh.primitives.len(), 1);
        let (span, material) = mesh.primitives[0];
        assert_eq!(span.vertex_count, 3);
        assert_eq!(span.index_count, 3);
        assert_eq!(material, 0);
        assert_eq!(mesh.builder.index_bytes(), bytemuck::cast_slice::<u16, u8>(&[0, 1, 2]));

        assert_eq!(source.materials.len(), 2);
        assert_eq!(source.materials[0].color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(source.materials[0].color_texture, None);
        assert_eq!(source.materials[1], MaterialSource::default());
    }

    #[test]
    fn test_keeps_node_hierarchy_and_transforms() {
        let source = triangle_source();

        assert_eq!(source.roots.len(), 1);
        let parent = &source.roots[0];
        assert_eq!(parent.name, "parent");
        assert_eq!(parent.mesh, None);
        assert_relative_eq!(parent.transform.position.z, -3.0);
        assert_eq!(parent.children.len(), 1);
        assert_eq!(parent.children[0].name, "triangle");
        assert_eq!(parent.children[0].mesh, Some(0));
    }

    #[test]
    fn test_rgb_images_gain_opaque_alpha() {
        let image = gltf::image::Data {
            pixels: vec![10, 20, 30, 40, 50, 60],
            format: gltf::image::Format::R8G8B8,
            width: 2,
            height: 1,
        };
        let texture = TextureSource::from_gltf(&image).unwrap();
        assert_eq!(texture.pixels, vec![10, 20, 30, 255, 40, 50, 60, 255]);
        assert_eq!(texture.create_info().extent.width, 2);
    }

    #[test]
    fn test_float_images_are_rejected() {
        let image = gltf::image::Data {
            pixels: vec![0; 12],
            format: gltf::image::Format::R32G32B32FLOAT,
            width: 1,
            height: 1,
        };
        assert!(matches!(TextureSource::from_gltf(&image), Err(ViewerError::Unsupported(_))));
    }
}
