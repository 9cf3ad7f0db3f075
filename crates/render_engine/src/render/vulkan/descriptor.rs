//! Descriptor set layouts, pools and samplers

use ash::{vk, Device};

use super::device::GpuDevice;
use super::error::{VulkanError, VulkanResult};

/// Descriptor set layout builder
#[derive(Default)]
pub struct DescriptorSetLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding>,
}

impl DescriptorSetLayoutBuilder {
    /// Empty layout
    pub fn new() -> Self {
        Self::default()
    }

    fn add(mut self, binding: u32, descriptor_type: vk::DescriptorType, stage_flags: vk::ShaderStageFlags) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::builder()
                .binding(binding)
                .descriptor_type(descriptor_type)
                .descriptor_count(1)
                .stage_flags(stage_flags)
                .build(),
        );
        self
    }

    /// Add a uniform buffer binding
    #[must_use]
    pub fn add_uniform_buffer(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags)
    }

    /// Add a combined image sampler binding
    #[must_use]
    pub fn add_combined_image_sampler(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stage_flags)
    }

    /// Add a storage image binding
    #[must_use]
    pub fn add_storage_image(self, binding: u32, stage_flags: vk::ShaderStageFlags) -> Self {
        self.add(binding, vk::DescriptorType::STORAGE_IMAGE, stage_flags)
    }

    /// Bindings added so far
    pub fn bindings(&self) -> &[vk::DescriptorSetLayoutBinding] {
        &self.bindings
    }

    /// Create the layout
    pub fn build(self, device: &Device) -> VulkanResult<DescriptorSetLayout> {
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&self.bindings);

        let layout = unsafe { device.create_descriptor_set_layout(&layout_info, None) }.map_err(VulkanError::Api)?;

        Ok(DescriptorSetLayout {
            layout,
            device: device.clone(),
        })
    }
}

/// Descriptor set layout with automatic cleanup
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    device: Device,
}

impl DescriptorSetLayout {
    /// Raw handle
    pub const fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

/// Descriptor pool with automatic cleanup
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    device: Device,
}

impl DescriptorPool {
    /// Create a pool for `max_sets` sets drawing from `pool_sizes`
    pub fn new(device: &Device, max_sets: u32, pool_sizes: &[vk::DescriptorPoolSize]) -> VulkanResult<Self> {
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }.map_err(VulkanError::Api)?;
        log::debug!("Created descriptor pool for {} sets", max_sets);

        Ok(Self {
            pool,
            device: device.clone(),
        })
    }

    /// Raw handle
    pub const fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// Sampler with automatic cleanup
pub struct Sampler {
    sampler: vk::Sampler,
    device: Device,
}

impl Sampler {
    /// Sampler with the given filter, clamped to edge, single mip
    pub fn new(device: &Device, filter: vk::Filter, address_mode: vk::SamplerAddressMode) -> VulkanResult<Self> {
        let sampler_create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(filter)
            .min_filter(filter)
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::NEAREST);

        let sampler = unsafe {
            device
                .create_sampler(&sampler_create_info, None)
                .map_err(|e| VulkanError::InitializationFailed(format!("Failed to create sampler: {e:?}")))?
        };

        Ok(Self {
            sampler,
            device: device.clone(),
        })
    }

    /// Raw handle
    pub const fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
    }
}

/// Allocates sets of one layout from one pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorSetAllocator {
    /// Pool the sets come from
    pub pool: vk::DescriptorPool,
    /// Layout of every set
    pub layout: vk::DescriptorSetLayout,
}

impl DescriptorSetAllocator {
    /// Allocate one set
    pub fn allocate<D: GpuDevice>(&self, device: &D) -> VulkanResult<vk::DescriptorSet> {
        device.allocate_descriptor_set(self.pool, self.layout)
    }
}
