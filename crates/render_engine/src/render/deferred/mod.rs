//! Deferred rendering
//!
//! One frame runs geometry, lighting, tonemapping and UI passes in a fixed order, with every
//! layout transition recorded explicitly:
//!
//! ```text
//! G-buffer -> attachment | geometry | G-buffer -> sampled | HDR -> attachment | lighting
//!   | tonemap (compute) | output -> attachment | UI | output -> present
//! ```

mod gbuffer;
mod hdr;
mod orchestrator;
mod pipelines;
mod push_constant;
mod tonemap;

pub use gbuffer::GBuffer;
pub use hdr::HdrTarget;
pub use orchestrator::DeferredRenderer;
pub use pipelines::{
    camera_set_layout, gbuffer_set_layout, material_set_layout, tonemap_set_layout, DeferredPipelines, PassPipelines,
};
pub use push_constant::ModelPushConstant;
pub use tonemap::{group_counts, Tonemapper, WORKGROUP_SIZE};

use ash::vk;

use crate::render::vulkan::CommandRecorder;

/// Image a frame ends up in, normally an acquired swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PresentTarget {
    /// Image written by the tonemapper and presented afterwards
    pub image: vk::Image,
    /// Storage and attachment view of `image`
    pub view: vk::ImageView,
    /// Size of `image`; the renderer's targets follow it
    pub extent: vk::Extent2D,
}

/// Hook recording on top of the tonemapped image
///
/// Called inside a dynamic rendering scope that loads the output, so anything drawn here is
/// composited over the scene.
pub trait UiOverlay {
    /// Record UI draws
    fn record(&mut self, recorder: &mut dyn CommandRecorder, extent: vk::Extent2D);
}

/// Overlay that records nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOverlay;

impl UiOverlay for NoOverlay {
    fn record(&mut self, _recorder: &mut dyn CommandRecorder, _extent: vk::Extent2D) {}
}
