//! Queue submission surface
//!
//! [`GpuDevice`] is the narrow set of device calls the synchronizer, the stager and the
//! material code rely on. [`VulkanContext`](super::VulkanContext) implements it over `ash`.

use ash::vk;

use super::commands::CommandRecorder;
use super::error::VulkanResult;
use crate::render::submit::SubmissionInfo;

/// One descriptor update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorWrite {
    /// Uniform buffer bound from offset 0
    UniformBuffer {
        /// Target set
        set: vk::DescriptorSet,
        /// Binding slot
        binding: u32,
        /// Source buffer
        buffer: vk::Buffer,
        /// Bytes visible to the shader
        range: vk::DeviceSize,
    },
    /// Sampled image paired with a sampler
    CombinedImageSampler {
        /// Target set
        set: vk::DescriptorSet,
        /// Binding slot
        binding: u32,
        /// Sampled view
        view: vk::ImageView,
        /// Sampler
        sampler: vk::Sampler,
        /// Layout the image is in while sampled
        layout: vk::ImageLayout,
    },
    /// Storage image
    StorageImage {
        /// Target set
        set: vk::DescriptorSet,
        /// Binding slot
        binding: u32,
        /// Storage view
        view: vk::ImageView,
        /// Layout the image is in while accessed
        layout: vk::ImageLayout,
    },
}

impl DescriptorWrite {
    /// Set being written
    pub const fn set(&self) -> vk::DescriptorSet {
        match *self {
            Self::UniformBuffer { set, .. }
            | Self::CombinedImageSampler { set, .. }
            | Self::StorageImage { set, .. } => set,
        }
    }

    /// Binding being written
    pub const fn binding(&self) -> u32 {
        match *self {
            Self::UniformBuffer { binding, .. }
            | Self::CombinedImageSampler { binding, .. }
            | Self::StorageImage { binding, .. } => binding,
        }
    }
}

/// Device operations needed to submit work and wait for it
pub trait GpuDevice: Send + Sync {
    /// Recorder type produced for a command buffer
    type Recorder<'a>: CommandRecorder
    where
        Self: 'a;

    /// Create a fence, optionally already signaled
    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence>;

    /// Destroy a fence that is not in use
    fn destroy_fence(&self, fence: vk::Fence);

    /// Return a fence to the unsignaled state
    fn reset_fence(&self, fence: vk::Fence) -> VulkanResult<()>;

    /// Wait for `fence`; `Ok(false)` when `timeout_ns` elapses first
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VulkanResult<bool>;

    /// Submit one command buffer to the graphics queue, signaling `fence` on completion
    fn submit(&self, info: &SubmissionInfo, fence: vk::Fence) -> VulkanResult<()>;

    /// Allocate a primary command buffer from `pool`
    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VulkanResult<vk::CommandBuffer>;

    /// Return a command buffer to `pool`
    fn free_command_buffer(&self, pool: vk::CommandPool, command_buffer: vk::CommandBuffer);

    /// Allocate one descriptor set
    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VulkanResult<vk::DescriptorSet>;

    /// Apply descriptor updates
    fn write_descriptor_sets(&self, writes: &[DescriptorWrite]);

    /// Recorder for `command_buffer`
    fn recorder(&self, command_buffer: vk::CommandBuffer) -> Self::Recorder<'_>;
}
