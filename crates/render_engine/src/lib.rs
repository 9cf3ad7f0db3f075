//! # Render Engine
//!
//! Deferred Vulkan renderer core used by the mesh viewer.
//!
//! ## Features
//!
//! - **Frame synchronization**: one in-flight submission per [`FrameSynchronizer`], polled or waited
//! - **Transfer staging**: batched host to device uploads through a single staging buffer
//! - **Deferred rendering**: G-buffer, lighting, tonemap, UI and present passes with explicit barriers
//! - **Scene graph**: owned node tree with a lazy descendants-first traversal
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use render_engine::prelude::*;
//!
//! fn upload(
//!     context: std::sync::Arc<VulkanContext>,
//!     allocator: std::sync::Arc<VmaAllocator>,
//!     pool: &CommandPool,
//! ) -> VulkanResult<Buffer> {
//!     let payload = [0u8; 64];
//!     let mut stager = TransferStager::new(context, allocator)?;
//!     let handle = stager.add_buffer_transfer(&payload, ash::vk::BufferUsageFlags::VERTEX_BUFFER)?;
//!     stager.submit(pool.handle())?;
//!     stager.wait()?;
//!     Ok(stager.get_buffer(handle))
//! }
//! ```
//!
//! [`FrameSynchronizer`]: render::submit::FrameSynchronizer

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod foundation;
pub mod render;
pub mod scene;

/// Commonly used types
pub mod prelude {
    pub use crate::config::{Config, ConfigError, RendererConfig};
    pub use crate::foundation::math::{Mat4, Quat, Transform, Vec3, Vec4};
    pub use crate::render::deferred::{DeferredPipelines, DeferredRenderer, PassPipelines, PresentTarget, UiOverlay};
    pub use crate::render::pacing::{FramePacer, PacerStep};
    pub use crate::render::submit::{FrameSynchronizer, SubmissionInfo, WaitSemaphore};
    pub use crate::render::transfer::{BufferTransferHandle, ImageTransferHandle, TransferStager};
    pub use crate::render::vulkan::{
        AllocationInfo, Buffer, CommandPool, CommandRecorder, GpuDevice, Image, MemoryAllocator,
        VmaAllocator, VulkanContext, VulkanError, VulkanResult,
    };
    pub use crate::scene::{CameraData, CameraUniform, Material, MaterialData, Mesh, MeshBuilder, Node, NodePath, Scene};
}
