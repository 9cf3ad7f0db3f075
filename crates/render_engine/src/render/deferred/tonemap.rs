//! Compute tonemapping from the HDR target into the presentable image

use ash::vk;

use crate::render::vulkan::{
    BarrierBatch, CommandRecorder, DescriptorSetAllocator, DescriptorWrite, GpuDevice, ImageBarrier, VulkanResult,
};

/// Local size of the tonemap compute shader in x and y
pub const WORKGROUP_SIZE: u32 = 16;

/// Workgroup counts covering `extent`
pub const fn group_counts(extent: vk::Extent2D) -> (u32, u32, u32) {
    (extent.width.div_ceil(WORKGROUP_SIZE), extent.height.div_ceil(WORKGROUP_SIZE), 1)
}

/// Tonemap descriptor set and the views currently written into it
///
/// Binding 0 is the HDR input, binding 1 the output, both storage images in `GENERAL`.
pub struct Tonemapper {
    descriptor_set: vk::DescriptorSet,
    hdr_view: vk::ImageView,
    output_view: Option<vk::ImageView>,
}

impl Tonemapper {
    /// Allocate the set and bind the HDR input
    pub fn new<D: GpuDevice>(device: &D, sets: &DescriptorSetAllocator, hdr_view: vk::ImageView) -> VulkanResult<Self> {
        let descriptor_set = sets.allocate(device)?;
        device.write_descriptor_sets(&[Self::storage_write(descriptor_set, 0, hdr_view)]);
        Ok(Self {
            descriptor_set,
            hdr_view,
            output_view: None,
        })
    }

    fn storage_write(set: vk::DescriptorSet, binding: u32, view: vk::ImageView) -> DescriptorWrite {
        DescriptorWrite::StorageImage {
            set,
            binding,
            view,
            layout: vk::ImageLayout::GENERAL,
        }
    }

    /// Point the input at a reallocated HDR target; returns whether the set was rewritten
    pub fn bind_hdr<D: GpuDevice>(&mut self, device: &D, view: vk::ImageView) -> bool {
        if self.hdr_view == view {
            return false;
        }
        device.write_descriptor_sets(&[Self::storage_write(self.descriptor_set, 0, view)]);
        self.hdr_view = view;
        true
    }

    /// Point the output at `view`; returns whether the set was rewritten
    pub fn bind_output<D: GpuDevice>(&mut self, device: &D, view: vk::ImageView) -> bool {
        if self.output_view == Some(view) {
            return false;
        }
        device.write_descriptor_sets(&[Self::storage_write(self.descriptor_set, 1, view)]);
        self.output_view = Some(view);
        true
    }

    /// Forget the bound output so the next [`Self::bind_output`] always writes
    ///
    /// Needed once the output views are destroyed, since new views may reuse their handles.
    pub fn invalidate_output(&mut self) {
        self.output_view = None;
    }

    /// Output view written by the last [`Self::bind_output`]
    pub const fn output_view(&self) -> Option<vk::ImageView> {
        self.output_view
    }

    /// Set bound at slot 0 of the tonemap pipeline
    pub const fn descriptor_set(&self) -> vk::DescriptorSet {
        self.descriptor_set
    }

    /// Barriers before the dispatch: lit pixels kept, output contents discarded
    pub fn barriers(hdr: vk::Image, output: vk::Image) -> BarrierBatch {
        BarrierBatch::by_region()
            .with(ImageBarrier::attachment_to_storage_read(hdr))
            .with(ImageBarrier::to_storage(output))
    }

    /// Record the barriers and the dispatch over `extent`
    pub fn record(
        &self,
        recorder: &mut dyn CommandRecorder,
        pipeline: vk::Pipeline,
        layout: vk::PipelineLayout,
        images: (vk::Image, vk::Image),
        extent: vk::Extent2D,
    ) {
        assert!(self.output_view.is_some(), "tonemap recorded before an output was bound");
        let (hdr, output) = images;
        recorder.pipeline_barrier(&Self::barriers(hdr, output));
        recorder.bind_pipeline(vk::PipelineBindPoint::COMPUTE, pipeline);
        recorder.bind_descriptor_sets(vk::PipelineBindPoint::COMPUTE, layout, 0, &[self.descriptor_set]);
        let (x, y, z) = group_counts(extent);
        recorder.dispatch(x, y, z);
    }
}
