//! Vulkan backend
//!
//! Thin RAII wrappers over `ash` plus the [`GpuDevice`], [`CommandRecorder`] and
//! [`MemoryAllocator`] seams the renderer is written against.

mod barrier;
mod commands;
mod context;
mod descriptor;
mod device;
mod error;
mod memory;
mod shader;
mod swapchain;
mod sync;
mod vma;
mod window;

pub use barrier::{BarrierBatch, ImageBarrier};
pub use commands::{
    ActiveRendering, AttachmentLoad, ColorAttachment, CommandPool, CommandRecorder, DepthAttachment, RenderingPass,
    VulkanCommandRecorder,
};
pub use context::VulkanContext;
pub use descriptor::{DescriptorPool, DescriptorSetAllocator, DescriptorSetLayout, DescriptorSetLayoutBuilder, Sampler};
pub use device::{DescriptorWrite, GpuDevice};
pub use error::{VulkanError, VulkanResult};
pub use memory::{
    AllocationInfo, AllocationPriority, Buffer, BufferMemory, Image, ImageMemory, MemoryAllocator, MemoryPreference,
};
pub use shader::{GraphicsPipelineDesc, Pipeline, PipelineLayout, ShaderModule};
pub use swapchain::Swapchain;
pub use sync::Semaphore;
pub use vma::VmaAllocator;
pub use window::{Window, WindowError, WindowResult};
