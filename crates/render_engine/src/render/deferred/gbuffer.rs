//! Geometry buffer
//!
//! Four screen-sized targets written by the geometry pass and sampled by the lighting pass:
//!
//! | binding | target    | format                  |
//! |---------|-----------|-------------------------|
//! | 0       | positions | `R16G16B16A16_SFLOAT`   |
//! | 1       | normals   | `R16G16B16A16_SFLOAT`   |
//! | 2       | albedo    | `R16G16B16A16_UNORM`    |
//! | 3       | depth     | `D32_SFLOAT`            |

use ash::vk;

use crate::render::vulkan::{
    AllocationInfo, AttachmentLoad, BarrierBatch, ColorAttachment, DepthAttachment, DescriptorWrite, Image,
    ImageBarrier, MemoryAllocator, RenderingPass, VulkanResult,
};

/// Allocate one device-local 2D render target with a view over `aspect`
pub(super) fn render_target(
    allocator: &dyn MemoryAllocator,
    format: vk::Format,
    usage: vk::ImageUsageFlags,
    aspect: vk::ImageAspectFlags,
    extent: vk::Extent2D,
) -> VulkanResult<Image> {
    let create_info = vk::ImageCreateInfo::builder()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .build();

    allocator.allocate_image(&create_info, &AllocationInfo::default(), Some(aspect))
}

/// Position, normal, albedo and depth targets of one extent
pub struct GBuffer {
    positions: Image,
    normals: Image,
    albedo: Image,
    depth: Image,
    extent: vk::Extent2D,
}

impl GBuffer {
    /// World-space positions
    pub const POSITIONS_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
    /// World-space normals
    pub const NORMALS_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
    /// Surface color
    pub const ALBEDO_FORMAT: vk::Format = vk::Format::R16G16B16A16_UNORM;
    /// Depth
    pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;
    /// Color attachment formats in attachment order
    pub const COLOR_FORMATS: [vk::Format; 3] = [Self::POSITIONS_FORMAT, Self::NORMALS_FORMAT, Self::ALBEDO_FORMAT];

    /// Allocate all four targets
    pub fn new(allocator: &dyn MemoryAllocator, extent: vk::Extent2D) -> VulkanResult<Self> {
        let color_usage = vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED;
        let color = |format| render_target(allocator, format, color_usage, vk::ImageAspectFlags::COLOR, extent);

        let gbuffer = Self {
            positions: color(Self::POSITIONS_FORMAT)?,
            normals: color(Self::NORMALS_FORMAT)?,
            albedo: color(Self::ALBEDO_FORMAT)?,
            depth: render_target(
                allocator,
                Self::DEPTH_FORMAT,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
                vk::ImageAspectFlags::DEPTH,
                extent,
            )?,
            extent,
        };
        log::debug!("Allocated G-buffer {}x{}", extent.width, extent.height);
        Ok(gbuffer)
    }

    /// Size of every target
    pub const fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Color targets in attachment order
    pub const fn color_images(&self) -> [&Image; 3] {
        [&self.positions, &self.normals, &self.albedo]
    }

    /// Depth target
    pub const fn depth(&self) -> &Image {
        &self.depth
    }

    /// Discard last frame's contents and prepare every target for writing
    pub fn to_attachment_barriers(&self) -> BarrierBatch {
        let mut batch = BarrierBatch::by_region();
        batch.extend(
            self.color_images()
                .iter()
                .map(|image| ImageBarrier::color_to_attachment(image.handle())),
        );
        batch.with(ImageBarrier::depth_to_attachment(self.depth.handle()))
    }

    /// Make every target readable by the lighting pass
    pub fn to_sampled_barriers(&self) -> BarrierBatch {
        let mut batch = BarrierBatch::by_region();
        batch.extend(
            self.color_images()
                .iter()
                .map(|image| ImageBarrier::color_to_sampled(image.handle())),
        );
        batch.with(ImageBarrier::depth_to_sampled(self.depth.handle()))
    }

    /// Geometry pass targets: colors cleared to zero, depth cleared to 1.0
    pub fn rendering_pass(&self) -> RenderingPass {
        RenderingPass {
            extent: self.extent,
            color_attachments: self
                .color_images()
                .iter()
                .map(|image| ColorAttachment {
                    view: image.view(),
                    load: AttachmentLoad::Clear([0.0; 4]),
                })
                .collect(),
            depth_attachment: Some(DepthAttachment {
                view: self.depth.view(),
                clear_depth: 1.0,
            }),
        }
    }

    /// Bind all four targets into `set` for the lighting pass
    pub fn descriptor_writes(&self, set: vk::DescriptorSet, sampler: vk::Sampler) -> [DescriptorWrite; 4] {
        let write = |binding, image: &Image| DescriptorWrite::CombinedImageSampler {
            set,
            binding,
            view: image.view(),
            sampler,
            layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        };
        [
            write(0, &self.positions),
            write(1, &self.normals),
            write(2, &self.albedo),
            write(3, &self.depth),
        ]
    }
}
