//! Image layout transitions expressed as synchronization2 barriers
//!
//! Every transition the renderer performs is one of the presets on [`ImageBarrier`]; a
//! [`BarrierBatch`] groups them into a single `vkCmdPipelineBarrier2` call.

use ash::vk;

/// One image layout transition with its stage and access scopes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageBarrier {
    /// Image being transitioned
    pub image: vk::Image,
    /// Aspect covered by the barrier
    pub aspect: vk::ImageAspectFlags,
    /// Stages that must complete before the transition
    pub src_stage: vk::PipelineStageFlags2,
    /// Writes made available by the transition
    pub src_access: vk::AccessFlags2,
    /// Stages that wait for the transition
    pub dst_stage: vk::PipelineStageFlags2,
    /// Accesses the transition makes the image visible to
    pub dst_access: vk::AccessFlags2,
    /// Layout before the barrier
    pub old_layout: vk::ImageLayout,
    /// Layout after the barrier
    pub new_layout: vk::ImageLayout,
}

impl ImageBarrier {
    /// Discard previous contents and prepare a color image for attachment writes
    pub const fn color_to_attachment(image: vk::Image) -> Self {
        Self {
            image,
            aspect: vk::ImageAspectFlags::COLOR,
            src_stage: vk::PipelineStageFlags2::TOP_OF_PIPE,
            src_access: vk::AccessFlags2::NONE,
            dst_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            dst_access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }
    }

    /// Discard previous contents and prepare a depth image for depth writes
    pub const fn depth_to_attachment(image: vk::Image) -> Self {
        Self {
            image,
            aspect: vk::ImageAspectFlags::DEPTH,
            src_stage: vk::PipelineStageFlags2::TOP_OF_PIPE,
            src_access: vk::AccessFlags2::NONE,
            dst_stage: vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
            dst_access: vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        }
    }

    /// Color attachment output becomes readable by fragment shaders
    pub const fn color_to_sampled(image: vk::Image) -> Self {
        Self {
            image,
            aspect: vk::ImageAspectFlags::COLOR,
            src_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            src_access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            dst_stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
            dst_access: vk::AccessFlags2::SHADER_SAMPLED_READ,
            old_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    /// Depth attachment output becomes readable by fragment shaders
    pub const fn depth_to_sampled(image: vk::Image) -> Self {
        Self {
            image,
            aspect: vk::ImageAspectFlags::DEPTH,
            src_stage: vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS,
            src_access: vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
            dst_stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
            dst_access: vk::AccessFlags2::SHADER_SAMPLED_READ,
            old_layout: vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    /// Prepare a color image for storage writes from a compute shader
    pub const fn to_storage(image: vk::Image) -> Self {
        Self {
            image,
            aspect: vk::ImageAspectFlags::COLOR,
            src_stage: vk::PipelineStageFlags2::TOP_OF_PIPE,
            src_access: vk::AccessFlags2::NONE,
            dst_stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
            dst_access: vk::AccessFlags2::SHADER_STORAGE_WRITE,
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::GENERAL,
        }
    }

    /// Lit color attachment becomes readable as a storage image, contents kept
    pub const fn attachment_to_storage_read(image: vk::Image) -> Self {
        Self {
            image,
            aspect: vk::ImageAspectFlags::COLOR,
            src_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            src_access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            dst_stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
            dst_access: vk::AccessFlags2::SHADER_STORAGE_READ,
            old_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            new_layout: vk::ImageLayout::GENERAL,
        }
    }

    /// Storage image written by compute becomes a color attachment whose contents are kept
    pub const fn storage_to_attachment(image: vk::Image) -> Self {
        Self {
            image,
            aspect: vk::ImageAspectFlags::COLOR,
            src_stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
            src_access: vk::AccessFlags2::SHADER_STORAGE_WRITE,
            dst_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            dst_access: vk::AccessFlags2::from_raw(
                vk::AccessFlags2::COLOR_ATTACHMENT_READ.as_raw()
                    | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw(),
            ),
            old_layout: vk::ImageLayout::GENERAL,
            new_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }
    }

    /// Final transition of a swapchain image before presentation
    pub const fn attachment_to_present(image: vk::Image) -> Self {
        Self {
            image,
            aspect: vk::ImageAspectFlags::COLOR,
            src_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            src_access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            dst_stage: vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
            dst_access: vk::AccessFlags2::NONE,
            old_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        }
    }

    /// Prepare a freshly allocated image as a copy destination
    pub const fn undefined_to_transfer_dst(image: vk::Image, aspect: vk::ImageAspectFlags) -> Self {
        Self {
            image,
            aspect,
            src_stage: vk::PipelineStageFlags2::TOP_OF_PIPE,
            src_access: vk::AccessFlags2::NONE,
            dst_stage: vk::PipelineStageFlags2::TRANSFER,
            dst_access: vk::AccessFlags2::TRANSFER_WRITE,
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        }
    }

    /// Hand a copied image to its consumer at `dst_stage` / `dst_access`
    pub const fn transfer_dst_to_shader_read(
        image: vk::Image,
        aspect: vk::ImageAspectFlags,
        dst_stage: vk::PipelineStageFlags2,
        dst_access: vk::AccessFlags2,
    ) -> Self {
        Self {
            image,
            aspect,
            src_stage: vk::PipelineStageFlags2::TRANSFER,
            src_access: vk::AccessFlags2::TRANSFER_WRITE,
            dst_stage,
            dst_access,
            old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    /// Subresource range covered by every barrier: first mip, first layer
    pub const fn subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        }
    }

    /// Raw synchronization2 barrier
    pub fn to_vk(&self) -> vk::ImageMemoryBarrier2 {
        vk::ImageMemoryBarrier2::builder()
            .src_stage_mask(self.src_stage)
            .src_access_mask(self.src_access)
            .dst_stage_mask(self.dst_stage)
            .dst_access_mask(self.dst_access)
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(self.subresource_range())
            .build()
    }
}

/// Image barriers submitted together in one pipeline barrier command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BarrierBatch {
    image_barriers: Vec<ImageBarrier>,
    by_region: bool,
}

impl BarrierBatch {
    /// Empty batch without dependency flags
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty batch tagged `BY_REGION`
    pub fn by_region() -> Self {
        Self {
            image_barriers: Vec::new(),
            by_region: true,
        }
    }

    /// Append a barrier
    pub fn push(&mut self, barrier: ImageBarrier) {
        self.image_barriers.push(barrier);
    }

    /// Append a barrier, builder style
    #[must_use]
    pub fn with(mut self, barrier: ImageBarrier) -> Self {
        self.push(barrier);
        self
    }

    /// Barriers in submission order
    pub fn image_barriers(&self) -> &[ImageBarrier] {
        &self.image_barriers
    }

    /// True when no barrier has been added
    pub fn is_empty(&self) -> bool {
        self.image_barriers.is_empty()
    }

    /// Dependency flags for the whole batch
    pub fn dependency_flags(&self) -> vk::DependencyFlags {
        if self.by_region {
            vk::DependencyFlags::BY_REGION
        } else {
            vk::DependencyFlags::empty()
        }
    }
}

impl Extend<ImageBarrier> for BarrierBatch {
    fn extend<I: IntoIterator<Item = ImageBarrier>>(&mut self, iter: I) {
        self.image_barriers.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_attachment_presets_discard_contents() {
        let image = vk::Image::from_raw(7);
        let color = ImageBarrier::color_to_attachment(image);
        let depth = ImageBarrier::depth_to_attachment(image);
        assert_eq!(color.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(depth.old_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(depth.new_layout, vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL);
        assert_eq!(depth.dst_stage, vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS);
    }

    #[test]
    fn test_sampled_presets_continue_from_attachment_presets() {
        let image = vk::Image::from_raw(7);
        assert_eq!(
            ImageBarrier::color_to_attachment(image).new_layout,
            ImageBarrier::color_to_sampled(image).old_layout
        );
        assert_eq!(
            ImageBarrier::depth_to_attachment(image).dst_access,
            ImageBarrier::depth_to_sampled(image).src_access
        );
        assert_eq!(
            ImageBarrier::to_storage(image).new_layout,
            ImageBarrier::storage_to_attachment(image).old_layout
        );
    }

    #[test]
    fn test_to_vk_covers_single_mip_and_layer() {
        let barrier = ImageBarrier::transfer_dst_to_shader_read(
            vk::Image::from_raw(3),
            vk::ImageAspectFlags::COLOR,
            vk::PipelineStageFlags2::FRAGMENT_SHADER,
            vk::AccessFlags2::SHADER_SAMPLED_READ,
        );
        let raw = barrier.to_vk();
        assert_eq!(raw.subresource_range.level_count, 1);
        assert_eq!(raw.subresource_range.layer_count, 1);
        assert_eq!(raw.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(raw.dst_stage_mask, vk::PipelineStageFlags2::FRAGMENT_SHADER);
    }

    #[test]
    fn test_batch_flags() {
        let batch = BarrierBatch::by_region().with(ImageBarrier::to_storage(vk::Image::from_raw(1)));
        assert_eq!(batch.dependency_flags(), vk::DependencyFlags::BY_REGION);
        assert_eq!(batch.image_barriers().len(), 1);
        assert!(BarrierBatch::new().is_empty());
        assert_eq!(BarrierBatch::new().dependency_flags(), vk::DependencyFlags::empty());
    }
}
