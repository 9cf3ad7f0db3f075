//! Pipelines, layouts and descriptor resources of the deferred passes
//!
//! [`DeferredPipelines`] owns the Vulkan objects; the renderer and the scene only ever see the
//! plain handles collected in [`PassPipelines`], so they can be driven by a mock device.

use ash::{vk, Device};

use super::gbuffer::GBuffer;
use super::hdr::HdrTarget;
use super::push_constant::ModelPushConstant;
use crate::config::RendererConfig;
use crate::render::vulkan::{
    DescriptorPool, DescriptorSetAllocator, DescriptorSetLayout, DescriptorSetLayoutBuilder, GraphicsPipelineDesc,
    Pipeline, PipelineLayout, Sampler, ShaderModule, VulkanResult,
};
use crate::scene::MeshVertex;

/// Capacity per descriptor type for sets outside materials: cameras, G-buffer, tonemap
const FRAME_SETS: u32 = 8;

/// Set 0 of the geometry and lighting pipelines
pub fn camera_set_layout() -> DescriptorSetLayoutBuilder {
    DescriptorSetLayoutBuilder::new().add_uniform_buffer(0, vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
}

/// Set 1 of the geometry pipeline
pub fn material_set_layout() -> DescriptorSetLayoutBuilder {
    DescriptorSetLayoutBuilder::new()
        .add_uniform_buffer(0, vk::ShaderStageFlags::FRAGMENT)
        .add_combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT)
        .add_combined_image_sampler(2, vk::ShaderStageFlags::FRAGMENT)
}

/// Set 1 of the lighting pipeline
pub fn gbuffer_set_layout() -> DescriptorSetLayoutBuilder {
    (0..4).fold(DescriptorSetLayoutBuilder::new(), |builder, binding| {
        builder.add_combined_image_sampler(binding, vk::ShaderStageFlags::FRAGMENT)
    })
}

/// Set 0 of the tonemap pipeline
pub fn tonemap_set_layout() -> DescriptorSetLayoutBuilder {
    DescriptorSetLayoutBuilder::new()
        .add_storage_image(0, vk::ShaderStageFlags::COMPUTE)
        .add_storage_image(1, vk::ShaderStageFlags::COMPUTE)
}

/// Descriptor capacity for `max_material_sets` materials plus the per-renderer sets
pub fn pool_sizes(max_material_sets: u32) -> [vk::DescriptorPoolSize; 3] {
    [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: max_material_sets + FRAME_SETS,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: max_material_sets * 2 + FRAME_SETS * 4,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::STORAGE_IMAGE,
            descriptor_count: FRAME_SETS * 2,
        },
    ]
}

/// Raw handles of every deferred pass object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassPipelines {
    /// Writes the G-buffer
    pub geometry: vk::Pipeline,
    /// Camera set, material set, model push constant
    pub geometry_layout: vk::PipelineLayout,
    /// Full-screen lighting into the HDR target
    pub lighting: vk::Pipeline,
    /// Camera set, G-buffer set
    pub lighting_layout: vk::PipelineLayout,
    /// Compute tonemap
    pub tonemap: vk::Pipeline,
    /// Tonemap set
    pub tonemap_layout: vk::PipelineLayout,
    /// Layout of camera sets
    pub camera_set_layout: vk::DescriptorSetLayout,
    /// Layout of material sets
    pub material_set_layout: vk::DescriptorSetLayout,
    /// Layout of the G-buffer set
    pub gbuffer_set_layout: vk::DescriptorSetLayout,
    /// Layout of the tonemap set
    pub tonemap_set_layout: vk::DescriptorSetLayout,
    /// Pool every set above is allocated from
    pub descriptor_pool: vk::DescriptorPool,
    /// Nearest sampler for G-buffer reads
    pub gbuffer_sampler: vk::Sampler,
    /// Linear repeating sampler for material textures
    pub material_sampler: vk::Sampler,
}

impl PassPipelines {
    /// Allocator for camera sets
    pub const fn camera_sets(&self) -> DescriptorSetAllocator {
        DescriptorSetAllocator {
            pool: self.descriptor_pool,
            layout: self.camera_set_layout,
        }
    }

    /// Allocator for material sets
    pub const fn material_sets(&self) -> DescriptorSetAllocator {
        DescriptorSetAllocator {
            pool: self.descriptor_pool,
            layout: self.material_set_layout,
        }
    }

    /// Allocator for the G-buffer set
    pub const fn gbuffer_sets(&self) -> DescriptorSetAllocator {
        DescriptorSetAllocator {
            pool: self.descriptor_pool,
            layout: self.gbuffer_set_layout,
        }
    }

    /// Allocator for the tonemap set
    pub const fn tonemap_sets(&self) -> DescriptorSetAllocator {
        DescriptorSetAllocator {
            pool: self.descriptor_pool,
            layout: self.tonemap_set_layout,
        }
    }
}

/// Owner of the Vulkan objects behind [`PassPipelines`]
///
/// Fields drop in declaration order: pipelines before their layouts, layouts before the set
/// layouts they reference.
pub struct DeferredPipelines {
    geometry: Pipeline,
    lighting: Pipeline,
    tonemap: Pipeline,
    geometry_layout: PipelineLayout,
    lighting_layout: PipelineLayout,
    tonemap_layout: PipelineLayout,
    descriptor_pool: DescriptorPool,
    camera_set_layout: DescriptorSetLayout,
    material_set_layout: DescriptorSetLayout,
    gbuffer_set_layout: DescriptorSetLayout,
    tonemap_set_layout: DescriptorSetLayout,
    gbuffer_sampler: Sampler,
    material_sampler: Sampler,
}

impl DeferredPipelines {
    /// Load the SPIR-V from `config.shader_dir` and build every pass object
    pub fn new(device: &Device, config: &RendererConfig) -> VulkanResult<Self> {
        let camera_set_layout = camera_set_layout().build(device)?;
        let material_set_layout = material_set_layout().build(device)?;
        let gbuffer_set_layout = gbuffer_set_layout().build(device)?;
        let tonemap_set_layout = tonemap_set_layout().build(device)?;

        let max_sets = config.max_material_sets + FRAME_SETS * 3;
        let descriptor_pool = DescriptorPool::new(device, max_sets, &pool_sizes(config.max_material_sets))?;

        let geometry_layout = PipelineLayout::new(
            device,
            &[camera_set_layout.handle(), material_set_layout.handle()],
            &[ModelPushConstant::range()],
        )?;
        let lighting_layout =
            PipelineLayout::new(device, &[camera_set_layout.handle(), gbuffer_set_layout.handle()], &[])?;
        let tonemap_layout = PipelineLayout::new(device, &[tonemap_set_layout.handle()], &[])?;

        let shader = |name: &str| ShaderModule::from_file(device, config.shader_path(name));

        let geometry = {
            let vertex_shader = shader("geometry.vert.spv")?;
            let fragment_shader = shader("geometry.frag.spv")?;
            let bindings = [MeshVertex::binding_description()];
            let attributes = MeshVertex::attribute_descriptions();
            let desc = GraphicsPipelineDesc {
                vertex_shader: &vertex_shader,
                fragment_shader: &fragment_shader,
                vertex_bindings: &bindings,
                vertex_attributes: &attributes,
                color_formats: &GBuffer::COLOR_FORMATS,
                depth_format: Some(GBuffer::DEPTH_FORMAT),
                cull_mode: vk::CullModeFlags::NONE,
            };
            Pipeline::graphics(device, &desc, geometry_layout.handle())?
        };

        let lighting = {
            let vertex_shader = shader("lighting.vert.spv")?;
            let fragment_shader = shader("lighting.frag.spv")?;
            let desc = GraphicsPipelineDesc {
                vertex_shader: &vertex_shader,
                fragment_shader: &fragment_shader,
                vertex_bindings: &[],
                vertex_attributes: &[],
                color_formats: &[HdrTarget::FORMAT],
                depth_format: None,
                cull_mode: vk::CullModeFlags::NONE,
            };
            Pipeline::graphics(device, &desc, lighting_layout.handle())?
        };

        let tonemap = Pipeline::compute(device, &shader("tonemap.comp.spv")?, tonemap_layout.handle())?;

        let gbuffer_sampler = Sampler::new(device, vk::Filter::NEAREST, vk::SamplerAddressMode::CLAMP_TO_EDGE)?;
        let material_sampler = Sampler::new(device, vk::Filter::LINEAR, vk::SamplerAddressMode::REPEAT)?;

        log::info!("Created deferred pipelines from {}", config.shader_dir.display());

        Ok(Self {
            geometry,
            lighting,
            tonemap,
            geometry_layout,
            lighting_layout,
            tonemap_layout,
            descriptor_pool,
            camera_set_layout,
            material_set_layout,
            gbuffer_set_layout,
            tonemap_set_layout,
            gbuffer_sampler,
            material_sampler,
        })
    }

    /// Handles for recording
    pub const fn handles(&self) -> PassPipelines {
        PassPipelines {
            geometry: self.geometry.handle(),
            geometry_layout: self.geometry_layout.handle(),
            lighting: self.lighting.handle(),
            lighting_layout: self.lighting_layout.handle(),
            tonemap: self.tonemap.handle(),
            tonemap_layout: self.tonemap_layout.handle(),
            camera_set_layout: self.camera_set_layout.handle(),
            material_set_layout: self.material_set_layout.handle(),
            gbuffer_set_layout: self.gbuffer_set_layout.handle(),
            tonemap_set_layout: self.tonemap_set_layout.handle(),
            descriptor_pool: self.descriptor_pool.handle(),
            gbuffer_sampler: self.gbuffer_sampler.handle(),
            material_sampler: self.material_sampler.handle(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(builder: &DescriptorSetLayoutBuilder) -> Vec<(u32, vk::DescriptorType)> {
        builder
            .bindings()
            .iter()
            .map(|binding| (binding.binding, binding.descriptor_type))
            .collect()
    }

    #[test]
    fn test_material_layout_matches_material_writes() {
        assert_eq!(
            types(&material_set_layout()),
            [
                (0, vk::DescriptorType::UNIFORM_BUFFER),
                (1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER),
                (2, vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            ]
        );
    }

    #[test]
    fn test_gbuffer_layout_samples_four_targets() {
        let layout = gbuffer_set_layout();
        assert_eq!(layout.bindings().len(), 4);
        assert!(layout
            .bindings()
            .iter()
            .all(|binding| binding.stage_flags == vk::ShaderStageFlags::FRAGMENT));
    }

    #[test]
    fn test_tonemap_layout_is_compute_storage() {
        assert_eq!(
            types(&tonemap_set_layout()),
            [(0, vk::DescriptorType::STORAGE_IMAGE), (1, vk::DescriptorType::STORAGE_IMAGE)]
        );
        let camera = camera_set_layout();
        assert!(camera.bindings()[0]
            .stage_flags
            .contains(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT));
    }

    #[test]
    fn test_pool_holds_every_material_texture() {
        let sizes = pool_sizes(10);
        assert_eq!(sizes[0].descriptor_count, 10 + FRAME_SETS);
        assert_eq!(sizes[1].descriptor_count, 20 + FRAME_SETS * 4);
    }

    #[test]
    fn test_allocators_share_the_pool() {
        use ash::vk::Handle;

        let pipelines = PassPipelines {
            geometry: vk::Pipeline::null(),
            geometry_layout: vk::PipelineLayout::null(),
            lighting: vk::Pipeline::null(),
            lighting_layout: vk::PipelineLayout::null(),
            tonemap: vk::Pipeline::null(),
            tonemap_layout: vk::PipelineLayout::null(),
            camera_set_layout: vk::DescriptorSetLayout::from_raw(1),
            material_set_layout: vk::DescriptorSetLayout::from_raw(2),
            gbuffer_set_layout: vk::DescriptorSetLayout::from_raw(3),
            tonemap_set_layout: vk::DescriptorSetLayout::from_raw(4),
            descriptor_pool: vk::DescriptorPool::from_raw(9),
            gbuffer_sampler: vk::Sampler::null(),
            material_sampler: vk::Sampler::null(),
        };
        assert_eq!(pipelines.camera_sets().layout, pipelines.camera_set_layout);
        assert_eq!(pipelines.material_sets().layout, pipelines.material_set_layout);
        assert_eq!(pipelines.tonemap_sets().pool, pipelines.descriptor_pool);
        assert_eq!(pipelines.gbuffer_sets().pool, pipelines.descriptor_pool);
    }
}
