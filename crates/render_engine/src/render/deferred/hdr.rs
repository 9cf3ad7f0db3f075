//! Lighting output

use ash::vk;

use super::gbuffer::render_target;
use crate::render::vulkan::{
    AttachmentLoad, BarrierBatch, ColorAttachment, Image, ImageBarrier, MemoryAllocator, RenderingPass, VulkanResult,
};

/// High dynamic range target written by the lighting pass and read by the tonemapper
pub struct HdrTarget {
    image: Image,
}

impl HdrTarget {
    /// Format of the lit image
    pub const FORMAT: vk::Format = vk::Format::R16G16B16A16_UNORM;

    /// Allocate a target of `extent`
    pub fn new(allocator: &dyn MemoryAllocator, extent: vk::Extent2D) -> VulkanResult<Self> {
        let image = render_target(
            allocator,
            Self::FORMAT,
            vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::COLOR_ATTACHMENT,
            vk::ImageAspectFlags::COLOR,
            extent,
        )?;
        Ok(Self { image })
    }

    /// Backing image
    pub const fn image(&self) -> &Image {
        &self.image
    }

    /// Size of the target
    pub const fn extent(&self) -> vk::Extent2D {
        self.image.extent_2d()
    }

    /// Prepare for the lighting pass, discarding the previous frame
    pub fn to_attachment_barrier(&self) -> BarrierBatch {
        BarrierBatch::by_region().with(ImageBarrier::color_to_attachment(self.image.handle()))
    }

    /// Lighting pass target, cleared to black
    pub fn rendering_pass(&self) -> RenderingPass {
        RenderingPass {
            extent: self.extent(),
            color_attachments: vec![ColorAttachment {
                view: self.image.view(),
                load: AttachmentLoad::Clear([0.0; 4]),
            }],
            depth_attachment: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::testing::{AllocationKind, MockDevice};

    #[test]
    fn test_target_is_storage_and_attachment() {
        let device = MockDevice::new();
        let allocator = device.allocator();
        let hdr = HdrTarget::new(allocator.as_ref(), vk::Extent2D { width: 8, height: 4 }).unwrap();

        assert_eq!(hdr.extent(), vk::Extent2D { width: 8, height: 4 });
        match allocator.allocations()[0].kind {
            AllocationKind::Image { usage, format, .. } => {
                assert_eq!(format, HdrTarget::FORMAT);
                assert!(usage.contains(vk::ImageUsageFlags::STORAGE | vk::ImageUsageFlags::COLOR_ATTACHMENT));
            }
            AllocationKind::Buffer { .. } => panic!("expected an image"),
        }

        let pass = hdr.rendering_pass();
        assert_eq!(pass.color_attachments.len(), 1);
        assert!(pass.depth_attachment.is_none());
        assert_eq!(
            hdr.to_attachment_barrier().image_barriers()[0].new_layout,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
    }
}
