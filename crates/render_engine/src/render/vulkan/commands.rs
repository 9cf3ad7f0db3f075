//! Command buffer recording
//!
//! [`CommandRecorder`] is the recording surface every pass is written against. The Vulkan
//! implementation forwards each call to `ash`; tests substitute a recorder that logs calls.

use ash::{vk, Device};
use std::ops::{Deref, DerefMut};

use super::barrier::{BarrierBatch, ImageBarrier};
use super::error::{VulkanError, VulkanResult};

/// How a color attachment is initialized when rendering begins
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AttachmentLoad {
    /// Clear to the given RGBA value
    Clear([f32; 4]),
    /// Keep the existing contents
    Load,
}

/// Color target of a dynamic rendering pass
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorAttachment {
    /// View rendered into, in `COLOR_ATTACHMENT_OPTIMAL`
    pub view: vk::ImageView,
    /// Load behaviour
    pub load: AttachmentLoad,
}

/// Depth target of a dynamic rendering pass, always cleared
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthAttachment {
    /// View rendered into, in `DEPTH_ATTACHMENT_OPTIMAL`
    pub view: vk::ImageView,
    /// Clear depth value
    pub clear_depth: f32,
}

/// Targets of one dynamic rendering scope
#[derive(Debug, Clone, PartialEq)]
pub struct RenderingPass {
    /// Render area, anchored at the origin
    pub extent: vk::Extent2D,
    /// Color targets in attachment order
    pub color_attachments: Vec<ColorAttachment>,
    /// Optional depth target
    pub depth_attachment: Option<DepthAttachment>,
}

/// Recording surface for a single command buffer
pub trait CommandRecorder {
    /// Begin one-time-submit recording
    fn begin(&mut self) -> VulkanResult<()>;

    /// Finish recording
    fn end(&mut self) -> VulkanResult<()>;

    /// Return the command buffer to the initial state
    fn reset(&mut self) -> VulkanResult<()>;

    /// Record a batch of image layout transitions
    fn pipeline_barrier(&mut self, batch: &BarrierBatch);

    /// Copy a region between buffers
    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, region: vk::BufferCopy);

    /// Copy a buffer region into an image in `dst_layout`
    fn copy_buffer_to_image(
        &mut self,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        region: vk::BufferImageCopy,
    );

    /// Start a dynamic rendering scope
    fn begin_rendering(&mut self, pass: &RenderingPass);

    /// Close the current dynamic rendering scope
    fn end_rendering(&mut self);

    /// Full-extent viewport and scissor
    fn set_viewport_and_scissor(&mut self, extent: vk::Extent2D);

    /// Bind a pipeline
    fn bind_pipeline(&mut self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline);

    /// Bind descriptor sets starting at `first_set`
    fn bind_descriptor_sets(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    );

    /// Update push constant bytes
    fn push_constants(
        &mut self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    );

    /// Bind a vertex buffer at binding 0, offset 0
    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer);

    /// Bind an index buffer at offset 0
    fn bind_index_buffer(&mut self, buffer: vk::Buffer, index_type: vk::IndexType);

    /// Indexed draw
    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );

    /// Non-indexed draw without vertex buffers
    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);

    /// Compute dispatch
    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32);
}

/// Dynamic rendering scope that ends when dropped
pub struct ActiveRendering<'r, R: CommandRecorder + ?Sized> {
    recorder: &'r mut R,
}

impl<'r, R: CommandRecorder + ?Sized> ActiveRendering<'r, R> {
    /// Begin `pass` on `recorder`
    pub fn begin(recorder: &'r mut R, pass: &RenderingPass) -> Self {
        recorder.begin_rendering(pass);
        Self { recorder }
    }
}

impl<R: CommandRecorder + ?Sized> Deref for ActiveRendering<'_, R> {
    type Target = R;

    fn deref(&self) -> &Self::Target {
        self.recorder
    }
}

impl<R: CommandRecorder + ?Sized> DerefMut for ActiveRendering<'_, R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.recorder
    }
}

impl<R: CommandRecorder + ?Sized> Drop for ActiveRendering<'_, R> {
    fn drop(&mut self) {
        self.recorder.end_rendering();
    }
}

/// Vulkan command pool with RAII cleanup
pub struct CommandPool {
    device: Device,
    command_pool: vk::CommandPool,
}

impl CommandPool {
    /// Create a pool whose buffers can be reset individually
    pub fn new(device: Device, queue_family_index: u32) -> VulkanResult<Self> {
        let pool_create_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(queue_family_index);

        let command_pool = unsafe {
            device
                .create_command_pool(&pool_create_info, None)
                .map_err(VulkanError::Api)?
        };

        log::debug!("Created command pool {:?} for queue family {}", command_pool, queue_family_index);
        Ok(Self { device, command_pool })
    }

    /// Raw pool handle
    pub fn handle(&self) -> vk::CommandPool {
        self.command_pool
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// [`CommandRecorder`] that records into a Vulkan command buffer
pub struct VulkanCommandRecorder<'d> {
    device: &'d Device,
    command_buffer: vk::CommandBuffer,
}

impl<'d> VulkanCommandRecorder<'d> {
    /// Record into `command_buffer`
    pub const fn new(device: &'d Device, command_buffer: vk::CommandBuffer) -> Self {
        Self { device, command_buffer }
    }

    /// Command buffer being recorded
    pub const fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }
}

impl CommandRecorder for VulkanCommandRecorder<'_> {
    fn begin(&mut self) -> VulkanResult<()> {
        let begin_info =
            vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            self.device
                .begin_command_buffer(self.command_buffer, &begin_info)
                .map_err(VulkanError::Api)
        }
    }

    fn end(&mut self) -> VulkanResult<()> {
        unsafe { self.device.end_command_buffer(self.command_buffer).map_err(VulkanError::Api) }
    }

    fn reset(&mut self) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(self.command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)
        }
    }

    fn pipeline_barrier(&mut self, batch: &BarrierBatch) {
        if batch.is_empty() {
            return;
        }

        let barriers: Vec<vk::ImageMemoryBarrier2> =
            batch.image_barriers().iter().map(ImageBarrier::to_vk).collect();
        let dependency_info = vk::DependencyInfo::builder()
            .dependency_flags(batch.dependency_flags())
            .image_memory_barriers(&barriers);

        unsafe {
            self.device.cmd_pipeline_barrier2(self.command_buffer, &dependency_info);
        }
    }

    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, region: vk::BufferCopy) {
        unsafe {
            self.device.cmd_copy_buffer(self.command_buffer, src, dst, &[region]);
        }
    }

    fn copy_buffer_to_image(
        &mut self,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        region: vk::BufferImageCopy,
    ) {
        unsafe {
            self.device
                .cmd_copy_buffer_to_image(self.command_buffer, src, dst, dst_layout, &[region]);
        }
    }

    fn begin_rendering(&mut self, pass: &RenderingPass) {
        let color_attachments: Vec<vk::RenderingAttachmentInfo> = pass
            .color_attachments
            .iter()
            .map(|attachment| {
                let (load_op, clear) = match attachment.load {
                    AttachmentLoad::Clear(color) => (vk::AttachmentLoadOp::CLEAR, color),
                    AttachmentLoad::Load => (vk::AttachmentLoadOp::LOAD, [0.0; 4]),
                };
                vk::RenderingAttachmentInfo::builder()
                    .image_view(attachment.view)
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .load_op(load_op)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .clear_value(vk::ClearValue {
                        color: vk::ClearColorValue { float32: clear },
                    })
                    .build()
            })
            .collect();

        let depth_attachment = pass.depth_attachment.map(|depth| {
            vk::RenderingAttachmentInfo::builder()
                .image_view(depth.view)
                .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: depth.clear_depth,
                        stencil: 0,
                    },
                })
                .build()
        });

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: pass.extent,
        };
        let mut rendering_info = vk::RenderingInfo::builder()
            .render_area(render_area)
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some(depth) = depth_attachment.as_ref() {
            rendering_info = rendering_info.depth_attachment(depth);
        }

        unsafe {
            self.device.cmd_begin_rendering(self.command_buffer, &rendering_info);
        }
    }

    fn end_rendering(&mut self) {
        unsafe {
            self.device.cmd_end_rendering(self.command_buffer);
        }
    }

    fn set_viewport_and_scissor(&mut self, extent: vk::Extent2D) {
        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };

        unsafe {
            self.device.cmd_set_viewport(self.command_buffer, 0, &[viewport]);
            self.device.cmd_set_scissor(self.command_buffer, 0, &[scissor]);
        }
    }

    fn bind_pipeline(&mut self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe {
            self.device.cmd_bind_pipeline(self.command_buffer, bind_point, pipeline);
        }
    }

    fn bind_descriptor_sets(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device
                .cmd_bind_descriptor_sets(self.command_buffer, bind_point, layout, first_set, sets, &[]);
        }
    }

    fn push_constants(
        &mut self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        unsafe {
            self.device.cmd_push_constants(self.command_buffer, layout, stages, offset, data);
        }
    }

    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer) {
        unsafe {
            self.device.cmd_bind_vertex_buffers(self.command_buffer, 0, &[buffer], &[0]);
        }
    }

    fn bind_index_buffer(&mut self, buffer: vk::Buffer, index_type: vk::IndexType) {
        unsafe {
            self.device.cmd_bind_index_buffer(self.command_buffer, buffer, 0, index_type);
        }
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(
                self.command_buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            );
        }
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.device
                .cmd_draw(self.command_buffer, vertex_count, instance_count, first_vertex, first_instance);
        }
    }

    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        unsafe {
            self.device
                .cmd_dispatch(self.command_buffer, group_count_x, group_count_y, group_count_z);
        }
    }
}
