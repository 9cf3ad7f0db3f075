//! Surface materials
//!
//! A material binds, in its own descriptor set at slot 1 of the geometry pipeline:
//!
//! | binding | contents                |
//! |---------|-------------------------|
//! | 0       | [`MaterialData`] UBO    |
//! | 1       | base color texture      |
//! | 2       | tangent-space normals   |

use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::sync::Arc;

use super::uniform::Uniform;
use crate::render::vulkan::{
    DescriptorSetAllocator, DescriptorWrite, GpuDevice, Image, MemoryAllocator, VulkanResult,
};

/// Uniform part of a material
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MaterialData {
    /// Base color factor, multiplied with the color texture
    pub color: [f32; 4],
}

impl Default for MaterialData {
    fn default() -> Self {
        Self { color: [1.0; 4] }
    }
}

/// Material uniform, textures and descriptor set
pub struct Material {
    uniform: Uniform<MaterialData>,
    color_texture: Arc<Image>,
    normal_texture: Arc<Image>,
    descriptor_set: vk::DescriptorSet,
}

impl Material {
    /// Allocate the uniform and a descriptor set, then bind everything
    ///
    /// `sampler` is borrowed; it must outlive the material.
    pub fn new<D: GpuDevice>(
        device: &D,
        allocator: &dyn MemoryAllocator,
        sets: &DescriptorSetAllocator,
        data: &MaterialData,
        color_texture: Arc<Image>,
        normal_texture: Arc<Image>,
        sampler: vk::Sampler,
    ) -> VulkanResult<Self> {
        let uniform = Uniform::new(allocator, data)?;
        let descriptor_set = sets.allocate(device)?;

        device.write_descriptor_sets(&[
            uniform.descriptor_write(descriptor_set, 0),
            DescriptorWrite::CombinedImageSampler {
                set: descriptor_set,
                binding: 1,
                view: color_texture.view(),
                sampler,
                layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            },
            DescriptorWrite::CombinedImageSampler {
                set: descriptor_set,
                binding: 2,
                view: normal_texture.view(),
                sampler,
                layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            },
        ]);

        Ok(Self {
            uniform,
            color_texture,
            normal_texture,
            descriptor_set,
        })
    }

    /// Current uniform data
    pub fn data(&self) -> VulkanResult<MaterialData> {
        self.uniform.get()
    }

    /// Replace the uniform data
    pub fn set_data(&self, data: &MaterialData) -> VulkanResult<()> {
        self.uniform.set(data)
    }

    /// Base color texture
    pub fn color_texture(&self) -> &Arc<Image> {
        &self.color_texture
    }

    /// Normal texture
    pub fn normal_texture(&self) -> &Arc<Image> {
        &self.normal_texture
    }

    /// Set bound at slot 1 of the geometry pipeline
    pub const fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }
}
