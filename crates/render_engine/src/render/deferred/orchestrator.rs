//! Per-frame pass orchestration

use ash::vk;
use std::sync::Arc;

use super::gbuffer::GBuffer;
use super::hdr::HdrTarget;
use super::pipelines::PassPipelines;
use super::push_constant::ModelPushConstant;
use super::tonemap::Tonemapper;
use super::{PresentTarget, UiOverlay};
use crate::render::vulkan::{
    ActiveRendering, AttachmentLoad, BarrierBatch, ColorAttachment, CommandRecorder, GpuDevice, ImageBarrier,
    MemoryAllocator, RenderingPass, VulkanResult,
};
use crate::scene::{Mesh, Node, Scene};

/// Screen-sized targets plus the recording of one deferred frame
///
/// The targets are shared by every frame, so a frame may only be recorded once the previous
/// one has finished on the GPU. Driving the renderer from a [`FramePacer`] guarantees that.
///
/// [`FramePacer`]: crate::render::pacing::FramePacer
pub struct DeferredRenderer<D: GpuDevice> {
    device: Arc<D>,
    allocator: Arc<dyn MemoryAllocator>,
    pipelines: PassPipelines,
    gbuffer: GBuffer,
    gbuffer_set: vk::DescriptorSet,
    hdr: HdrTarget,
    tonemapper: Tonemapper,
}

impl<D: GpuDevice> DeferredRenderer<D> {
    /// Allocate targets of `extent` and their descriptor sets
    pub fn new(
        device: Arc<D>,
        allocator: Arc<dyn MemoryAllocator>,
        pipelines: PassPipelines,
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        assert!(extent.width > 0 && extent.height > 0, "renderer created with an empty extent");

        let gbuffer = GBuffer::new(allocator.as_ref(), extent)?;
        let gbuffer_set = pipelines.gbuffer_sets().allocate(device.as_ref())?;
        device.write_descriptor_sets(&gbuffer.descriptor_writes(gbuffer_set, pipelines.gbuffer_sampler));

        let hdr = HdrTarget::new(allocator.as_ref(), extent)?;
        let tonemapper = Tonemapper::new(device.as_ref(), &pipelines.tonemap_sets(), hdr.image().view())?;

        log::info!("Deferred renderer ready at {}x{}", extent.width, extent.height);
        Ok(Self {
            device,
            allocator,
            pipelines,
            gbuffer,
            gbuffer_set,
            hdr,
            tonemapper,
        })
    }

    /// Size of the G-buffer and HDR targets
    pub const fn extent(&self) -> vk::Extent2D {
        self.gbuffer.extent()
    }

    /// Reallocate the targets when `extent` differs from the current one
    ///
    /// Returns `false` without touching anything when the extent is unchanged.
    pub fn resize(&mut self, extent: vk::Extent2D) -> VulkanResult<bool> {
        assert!(extent.width > 0 && extent.height > 0, "resize to an empty extent");
        if extent == self.extent() {
            return Ok(false);
        }

        self.gbuffer = GBuffer::new(self.allocator.as_ref(), extent)?;
        self.device.write_descriptor_sets(
            &self
                .gbuffer
                .descriptor_writes(self.gbuffer_set, self.pipelines.gbuffer_sampler),
        );
        self.hdr = HdrTarget::new(self.allocator.as_ref(), extent)?;
        self.tonemapper.bind_hdr(self.device.as_ref(), self.hdr.image().view());

        log::debug!("Resized deferred targets to {}x{}", extent.width, extent.height);
        Ok(true)
    }

    /// Rewrite the output binding on the next frame even if the view handle is unchanged
    ///
    /// Call after the presentable images' views were destroyed and recreated.
    pub fn invalidate_output(&mut self) {
        self.tonemapper.invalidate_output();
    }

    /// Record one frame of `scene` into `target`
    ///
    /// The caller owns `begin`/`end` of the command buffer. `target.image` is left in
    /// `PRESENT_SRC_KHR`.
    pub fn record_frame(
        &mut self,
        recorder: &mut dyn CommandRecorder,
        scene: &Scene,
        target: &PresentTarget,
        overlay: &mut dyn UiOverlay,
    ) -> VulkanResult<()> {
        self.resize(target.extent)?;

        let extent = self.extent();
        let pipelines = self.pipelines;
        let camera = scene
            .find_camera()
            .and_then(|node| node.camera.as_ref())
            .map(|camera| camera.descriptor_set());

        recorder.pipeline_barrier(&self.gbuffer.to_attachment_barriers());
        {
            let mut pass = ActiveRendering::begin(&mut *recorder, &self.gbuffer.rendering_pass());
            pass.set_viewport_and_scissor(extent);
            pass.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, pipelines.geometry);

            if let Some(camera_set) = camera {
                pass.bind_descriptor_sets(
                    vk::PipelineBindPoint::GRAPHICS,
                    pipelines.geometry_layout,
                    0,
                    &[camera_set],
                );
                for (node, mesh) in scene.drawables() {
                    record_mesh(&mut *pass, pipelines.geometry_layout, node, mesh);
                }
            }
        }
        recorder.pipeline_barrier(&self.gbuffer.to_sampled_barriers());

        recorder.pipeline_barrier(&self.hdr.to_attachment_barrier());
        {
            let mut pass = ActiveRendering::begin(&mut *recorder, &self.hdr.rendering_pass());
            if let Some(camera_set) = camera {
                pass.set_viewport_and_scissor(extent);
                pass.bind_pipeline(vk::PipelineBindPoint::GRAPHICS, pipelines.lighting);
                pass.bind_descriptor_sets(
                    vk::PipelineBindPoint::GRAPHICS,
                    pipelines.lighting_layout,
                    0,
                    &[camera_set, self.gbuffer_set],
                );
                pass.draw(3, 1, 0, 0);
            }
        }

        self.tonemapper.bind_output(self.device.as_ref(), target.view);
        self.tonemapper.record(
            recorder,
            pipelines.tonemap,
            pipelines.tonemap_layout,
            (self.hdr.image().handle(), target.image),
            extent,
        );

        recorder.pipeline_barrier(&BarrierBatch::by_region().with(ImageBarrier::storage_to_attachment(target.image)));
        {
            let ui_pass = RenderingPass {
                extent,
                color_attachments: vec![ColorAttachment {
                    view: target.view,
                    load: AttachmentLoad::Load,
                }],
                depth_attachment: None,
            };
            let mut pass = ActiveRendering::begin(&mut *recorder, &ui_pass);
            overlay.record(&mut *pass, extent);
        }

        recorder.pipeline_barrier(&BarrierBatch::by_region().with(ImageBarrier::attachment_to_present(target.image)));
        Ok(())
    }
}

fn record_mesh(recorder: &mut dyn CommandRecorder, layout: vk::PipelineLayout, node: &Node, mesh: &Mesh) {
    let constant = ModelPushConstant::from_matrix(&node.matrix());
    recorder.push_constants(layout, vk::ShaderStageFlags::VERTEX, 0, bytemuck::bytes_of(&constant));
    recorder.bind_vertex_buffer(mesh.vertex_buffer());
    recorder.bind_index_buffer(mesh.index_buffer(), Mesh::INDEX_TYPE);

    for primitive in mesh.primitives() {
        recorder.bind_descriptor_sets(
            vk::PipelineBindPoint::GRAPHICS,
            layout,
            1,
            &[primitive.material.descriptor_set()],
        );
        let span = primitive.span;
        recorder.draw_indexed(span.index_count, 1, span.first_index, span.first_vertex as i32, 0);
    }
}
