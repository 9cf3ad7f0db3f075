//! Batched host to device uploads
//!
//! A [`TransferStager`] collects buffer and image uploads, creates their device resources up
//! front, and moves all payloads through one staging buffer and one command buffer. The
//! resources are handed out only after the upload has completed:
//!
//! 1. `add_buffer_transfer` / `add_image_transfer` for every payload
//! 2. `submit` with a command pool
//! 3. `wait`
//! 4. `get_buffer` / `get_image` with the returned handles

use ash::vk;
use std::sync::Arc;

use super::submit::{FrameSynchronizer, SubmissionInfo};
use super::vulkan::{
    AllocationInfo, BarrierBatch, Buffer, CommandRecorder, GpuDevice, Image, ImageBarrier, MemoryAllocator,
    VulkanResult,
};

/// Image copies start on this boundary inside the staging buffer
const IMAGE_OFFSET_ALIGNMENT: vk::DeviceSize = 16;

/// Bytes per texel for the uncompressed formats uploads use; `None` for anything else
pub const fn texel_size(format: vk::Format) -> Option<vk::DeviceSize> {
    match format {
        vk::Format::R8_UNORM => Some(1),
        vk::Format::R8G8_UNORM => Some(2),
        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SRGB
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB
        | vk::Format::D32_SFLOAT => Some(4),
        vk::Format::R16G16B16A16_SFLOAT | vk::Format::R16G16B16A16_UNORM => Some(8),
        vk::Format::R32G32B32A32_SFLOAT => Some(16),
        _ => None,
    }
}

/// Ticket for a buffer upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferTransferHandle {
    index: usize,
    buffer: vk::Buffer,
}

impl BufferTransferHandle {
    /// Destination buffer, valid to reference before the upload completes
    pub const fn buffer(&self) -> vk::Buffer {
        self.buffer
    }
}

/// Ticket for an image upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageTransferHandle {
    index: usize,
    image: vk::Image,
}

impl ImageTransferHandle {
    /// Destination image, valid to reference before the upload completes
    pub const fn image(&self) -> vk::Image {
        self.image
    }
}

struct BufferSlot<'d> {
    payload: Option<&'d [u8]>,
    buffer: Option<Buffer>,
}

struct ImageSlot<'d> {
    payload: Option<&'d [u8]>,
    image: Option<Image>,
    aspect: vk::ImageAspectFlags,
    dst_stage: vk::PipelineStageFlags2,
    dst_access: vk::AccessFlags2,
}

/// Pending copy with its place in the staging buffer
struct StagedCopy<'d> {
    payload: &'d [u8],
    offset: vk::DeviceSize,
    slot: usize,
}

/// Staging-buffer upload batch
pub struct TransferStager<'d, D: GpuDevice> {
    device: Arc<D>,
    allocator: Arc<dyn MemoryAllocator>,
    synchronizer: FrameSynchronizer<D>,
    buffers: Vec<BufferSlot<'d>>,
    images: Vec<ImageSlot<'d>>,
    staging: Option<Buffer>,
    command_pool: Option<vk::CommandPool>,
}

impl<'d, D: GpuDevice> TransferStager<'d, D> {
    /// Empty stager with its own synchronizer
    pub fn new(device: Arc<D>, allocator: Arc<dyn MemoryAllocator>) -> VulkanResult<Self> {
        let synchronizer = FrameSynchronizer::new(Arc::clone(&device))?;
        Ok(Self {
            device,
            allocator,
            synchronizer,
            buffers: Vec::new(),
            images: Vec::new(),
            staging: None,
            command_pool: None,
        })
    }

    /// Create a device-local buffer and queue `data` for upload into it
    ///
    /// `data` is read during [`Self::submit`].
    pub fn add_buffer_transfer(
        &mut self,
        data: &'d [u8],
        usage: vk::BufferUsageFlags,
    ) -> VulkanResult<BufferTransferHandle> {
        assert!(!data.is_empty(), "buffer transfers need a non-empty payload");

        let create_info = vk::BufferCreateInfo::builder()
            .size(data.len() as vk::DeviceSize)
            .usage(usage | vk::BufferUsageFlags::TRANSFER_DST)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .build();
        let buffer = self.allocator.allocate_buffer(&create_info, &AllocationInfo::default())?;

        let handle = BufferTransferHandle {
            index: self.buffers.len(),
            buffer: buffer.handle(),
        };
        self.buffers.push(BufferSlot {
            payload: Some(data),
            buffer: Some(buffer),
        });
        Ok(handle)
    }

    /// Create a device-local image and queue `data` for upload into its first mip and layer
    ///
    /// After the copy the image is in `SHADER_READ_ONLY_OPTIMAL`, visible to `dst_stage` /
    /// `dst_access`.
    ///
    /// # Panics
    /// When `data` is shorter than the first mip level of a format with a known texel size.
    pub fn add_image_transfer(
        &mut self,
        data: &'d [u8],
        create_info: &vk::ImageCreateInfo,
        aspect: vk::ImageAspectFlags,
        dst_stage: vk::PipelineStageFlags2,
        dst_access: vk::AccessFlags2,
    ) -> VulkanResult<ImageTransferHandle> {
        assert!(!data.is_empty(), "image transfers need a non-empty payload");
        if let Some(texel) = texel_size(create_info.format) {
            let extent = create_info.extent;
            let footprint = vk::DeviceSize::from(extent.width)
                * vk::DeviceSize::from(extent.height)
                * vk::DeviceSize::from(extent.depth.max(1))
                * texel;
            assert!(
                data.len() as vk::DeviceSize >= footprint,
                "image payload of {} bytes is shorter than its {footprint} byte footprint",
                data.len()
            );
        }

        let mut create_info = *create_info;
        create_info.usage |= vk::ImageUsageFlags::TRANSFER_DST;
        let image = self
            .allocator
            .allocate_image(&create_info, &AllocationInfo::default(), Some(aspect))?;

        let handle = ImageTransferHandle {
            index: self.images.len(),
            image: image.handle(),
        };
        self.images.push(ImageSlot {
            payload: Some(data),
            image: Some(image),
            aspect,
            dst_stage,
            dst_access,
        });
        Ok(handle)
    }

    /// Copy every pending payload into one staging buffer and submit the upload
    ///
    /// # Panics
    /// When the previous submission has not been waited on.
    pub fn submit(&mut self, command_pool: vk::CommandPool) -> VulkanResult<()> {
        assert!(
            !self.synchronizer.is_submitted(),
            "transfer batch submitted again before wait"
        );

        let (buffer_copies, image_copies, total_size) = self.layout_pending();

        let staging = if total_size > 0 {
            let create_info = vk::BufferCreateInfo::builder()
                .size(total_size)
                .usage(vk::BufferUsageFlags::TRANSFER_SRC)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .build();
            let staging = self.allocator.allocate_buffer(&create_info, &AllocationInfo::staging())?;
            for copy in buffer_copies.iter().chain(&image_copies) {
                staging.write(copy.offset, copy.payload)?;
            }
            Some(staging)
        } else {
            None
        };

        let device = Arc::clone(&self.device);
        let command_buffer = device.allocate_command_buffer(command_pool)?;
        let recorded = {
            let mut recorder = device.recorder(command_buffer);
            self.record(&mut recorder, staging.as_ref(), &buffer_copies, &image_copies)
        };
        if let Err(e) = recorded {
            device.free_command_buffer(command_pool, command_buffer);
            return Err(e);
        }

        if let Err(e) = self.synchronizer.submit(SubmissionInfo::new(command_buffer)) {
            device.free_command_buffer(command_pool, command_buffer);
            return Err(e);
        }

        log::debug!(
            "Submitted {} buffer and {} image transfers ({} staging bytes)",
            buffer_copies.len(),
            image_copies.len(),
            total_size
        );
        for copy in &buffer_copies {
            self.buffers[copy.slot].payload = None;
        }
        for copy in &image_copies {
            self.images[copy.slot].payload = None;
        }
        self.staging = staging;
        self.command_pool = Some(command_pool);
        Ok(())
    }

    /// Block until the upload completes, then release the staging buffer and command buffer
    ///
    /// # Panics
    /// When nothing has been submitted.
    pub fn wait(&mut self) -> VulkanResult<()> {
        let info = self.synchronizer.wait()?;
        if let Some(pool) = self.command_pool.take() {
            self.device.free_command_buffer(pool, info.command_buffer);
        }
        self.staging = None;
        Ok(())
    }

    /// An upload is submitted and not yet waited on
    pub const fn is_submitted(&self) -> bool {
        self.synchronizer.is_submitted()
    }

    /// Take the uploaded buffer
    ///
    /// # Panics
    /// Before the upload was submitted and waited on, or when the handle was already used.
    pub fn get_buffer(&mut self, handle: BufferTransferHandle) -> Buffer {
        assert!(!self.synchronizer.is_submitted(), "transfer results taken before wait");
        let slot = &mut self.buffers[handle.index];
        assert!(slot.payload.is_none(), "buffer transfer {} was never submitted", handle.index);
        match slot.buffer.take() {
            Some(buffer) => buffer,
            None => panic!("buffer transfer {} already taken", handle.index),
        }
    }

    /// Take the uploaded image
    ///
    /// # Panics
    /// Before the upload was submitted and waited on, or when the handle was already used.
    pub fn get_image(&mut self, handle: ImageTransferHandle) -> Image {
        assert!(!self.synchronizer.is_submitted(), "transfer results taken before wait");
        let slot = &mut self.images[handle.index];
        assert!(slot.payload.is_none(), "image transfer {} was never submitted", handle.index);
        match slot.image.take() {
            Some(image) => image,
            None => panic!("image transfer {} already taken", handle.index),
        }
    }

    /// Staging offsets for every pending payload, buffers first
    fn layout_pending(&self) -> (Vec<StagedCopy<'d>>, Vec<StagedCopy<'d>>, vk::DeviceSize) {
        let mut offset = 0;

        let buffer_copies: Vec<StagedCopy<'d>> = self
            .buffers
            .iter()
            .enumerate()
            .filter_map(|(slot, buffer)| buffer.payload.map(|payload| (slot, payload)))
            .map(|(slot, payload)| {
                let copy = StagedCopy { payload, offset, slot };
                offset += payload.len() as vk::DeviceSize;
                copy
            })
            .collect();

        let image_copies: Vec<StagedCopy<'d>> = self
            .images
            .iter()
            .enumerate()
            .filter_map(|(slot, image)| image.payload.map(|payload| (slot, payload)))
            .map(|(slot, payload)| {
                offset = offset.next_multiple_of(IMAGE_OFFSET_ALIGNMENT);
                let copy = StagedCopy { payload, offset, slot };
                offset += payload.len() as vk::DeviceSize;
                copy
            })
            .collect();

        (buffer_copies, image_copies, offset)
    }

    fn record<R: CommandRecorder>(
        &self,
        recorder: &mut R,
        staging: Option<&Buffer>,
        buffer_copies: &[StagedCopy<'d>],
        image_copies: &[StagedCopy<'d>],
    ) -> VulkanResult<()> {
        recorder.begin()?;

        if let Some(staging) = staging {
            if !image_copies.is_empty() {
                let mut batch = BarrierBatch::by_region();
                batch.extend(image_copies.iter().map(|copy| {
                    let slot = &self.images[copy.slot];
                    ImageBarrier::undefined_to_transfer_dst(self.image_handle(copy.slot), slot.aspect)
                }));
                recorder.pipeline_barrier(&batch);
            }

            for copy in buffer_copies {
                let dst = self.buffers[copy.slot]
                    .buffer
                    .as_ref()
                    .map_or_else(vk::Buffer::null, Buffer::handle);
                let region = vk::BufferCopy {
                    src_offset: copy.offset,
                    dst_offset: 0,
                    size: copy.payload.len() as vk::DeviceSize,
                };
                recorder.copy_buffer(staging.handle(), dst, region);
            }

            for copy in image_copies {
                let slot = &self.images[copy.slot];
                let extent = slot.image.as_ref().map(Image::extent).unwrap_or_default();
                let region = vk::BufferImageCopy {
                    buffer_offset: copy.offset,
                    buffer_row_length: 0,
                    buffer_image_height: 0,
                    image_subresource: vk::ImageSubresourceLayers {
                        aspect_mask: slot.aspect,
                        mip_level: 0,
                        base_array_layer: 0,
                        layer_count: 1,
                    },
                    image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
                    image_extent: extent,
                };
                recorder.copy_buffer_to_image(
                    staging.handle(),
                    self.image_handle(copy.slot),
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    region,
                );
            }

            if !image_copies.is_empty() {
                let mut batch = BarrierBatch::by_region();
                batch.extend(image_copies.iter().map(|copy| {
                    let slot = &self.images[copy.slot];
                    ImageBarrier::transfer_dst_to_shader_read(
                        self.image_handle(copy.slot),
                        slot.aspect,
                        slot.dst_stage,
                        slot.dst_access,
                    )
                }));
                recorder.pipeline_barrier(&batch);
            }
        }

        recorder.end()
    }

    fn image_handle(&self, slot: usize) -> vk::Image {
        self.images[slot].image.as_ref().map_or_else(vk::Image::null, Image::handle)
    }
}

impl<D: GpuDevice> Drop for TransferStager<'_, D> {
    fn drop(&mut self) {
        if self.synchronizer.is_submitted() {
            if let Err(e) = self.wait() {
                log::error!("Failed to wait for transfer batch on drop: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::testing::{AllocationKind, Command, DeviceEvent, MockAllocator, MockDevice};
    use crate::render::vulkan::MemoryPreference;
    use ash::vk::Handle;

    fn setup() -> (Arc<MockDevice>, Arc<MockAllocator>, vk::CommandPool) {
        let device = Arc::new(MockDevice::new());
        let allocator = device.allocator();
        let pool = device.new_handle();
        (device, allocator, pool)
    }

    fn texture_info(width: u32, height: u32) -> vk::ImageCreateInfo {
        vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(vk::Format::R8G8B8A8_UNORM)
            .extent(vk::Extent3D { width, height, depth: 1 })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .usage(vk::ImageUsageFlags::SAMPLED)
            .build()
    }

    fn submitted_commands(device: &MockDevice) -> Vec<Command> {
        let command_buffer = device
            .events()
            .iter()
            .find_map(|event| match event {
                DeviceEvent::Submit(command_buffer) => Some(*command_buffer),
                _ => None,
            })
            .unwrap();
        device.commands(command_buffer)
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        let (device, allocator, pool) = setup();
        let vertices: Vec<u8> = (0..=255).collect();
        let indices = [1u8, 0, 2, 0, 3, 0];
        let texels: Vec<u8> = (0..4 * 4 * 4).map(|i| (i * 3) as u8).collect();

        let mut stager = TransferStager::new(Arc::clone(&device), allocator.clone()).unwrap();
        let vertex_handle = stager
            .add_buffer_transfer(&vertices, vk::BufferUsageFlags::VERTEX_BUFFER)
            .unwrap();
        let texture_handle = stager
            .add_image_transfer(
                &texels,
                &texture_info(4, 4),
                vk::ImageAspectFlags::COLOR,
                vk::PipelineStageFlags2::FRAGMENT_SHADER,
                vk::AccessFlags2::SHADER_SAMPLED_READ,
            )
            .unwrap();
        let index_handle = stager
            .add_buffer_transfer(&indices, vk::BufferUsageFlags::INDEX_BUFFER)
            .unwrap();

        stager.submit(pool).unwrap();
        stager.wait().unwrap();

        let vertex_buffer = stager.get_buffer(vertex_handle);
        let index_buffer = stager.get_buffer(index_handle);
        let texture = stager.get_image(texture_handle);
        assert_eq!(vertex_buffer.handle(), vertex_handle.buffer());
        assert_eq!(texture.handle(), texture_handle.image());
        assert_eq!(allocator.contents(vertex_buffer.handle().as_raw()).unwrap(), vertices);
        assert_eq!(allocator.contents(index_buffer.handle().as_raw()).unwrap(), indices);
        assert_eq!(allocator.contents(texture.handle().as_raw()).unwrap(), texels);
    }

    #[test]
    fn test_buffers_are_staged_before_images() {
        let (device, allocator, pool) = setup();
        let texels = [7u8; 4];
        let bytes = [9u8; 6];

        let mut stager = TransferStager::new(Arc::clone(&device), allocator).unwrap();
        stager
            .add_image_transfer(
                &texels,
                &texture_info(1, 1),
                vk::ImageAspectFlags::COLOR,
                vk::PipelineStageFlags2::FRAGMENT_SHADER,
                vk::AccessFlags2::SHADER_SAMPLED_READ,
            )
            .unwrap();
        stager.add_buffer_transfer(&bytes, vk::BufferUsageFlags::INDEX_BUFFER).unwrap();
        stager.submit(pool).unwrap();

        let commands = submitted_commands(&device);
        assert_eq!(commands.len(), 6);
        assert_eq!(commands[0], Command::Begin);
        assert!(matches!(&commands[1], Command::PipelineBarrier(batch)
            if batch.dependency_flags() == vk::DependencyFlags::BY_REGION
                && batch.image_barriers()[0].new_layout == vk::ImageLayout::TRANSFER_DST_OPTIMAL));
        assert!(matches!(commands[2], Command::CopyBuffer { src_offset: 0, size: 6, .. }));
        assert!(matches!(
            commands[3],
            Command::CopyBufferToImage {
                buffer_offset: 16,
                dst_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                extent: vk::Extent3D { width: 1, height: 1, depth: 1 },
                ..
            }
        ));
        assert!(matches!(&commands[4], Command::PipelineBarrier(batch)
            if batch.image_barriers()[0].new_layout == vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL));
        assert_eq!(commands[5], Command::End);
        stager.wait().unwrap();
    }

    #[test]
    fn test_two_buffers_without_images_record_no_barriers() {
        let (device, allocator, pool) = setup();
        let first = [1u8; 64];
        let second = [2u8; 64];

        let mut stager = TransferStager::new(Arc::clone(&device), allocator.clone()).unwrap();
        let first_handle = stager.add_buffer_transfer(&first, vk::BufferUsageFlags::STORAGE_BUFFER).unwrap();
        let second_handle = stager.add_buffer_transfer(&second, vk::BufferUsageFlags::STORAGE_BUFFER).unwrap();
        stager.submit(pool).unwrap();

        let commands = submitted_commands(&device);
        assert!(!commands.iter().any(|c| matches!(c, Command::PipelineBarrier(_))));
        assert!(matches!(commands[2], Command::CopyBuffer { src_offset: 64, size: 64, .. }));

        stager.wait().unwrap();
        let first_buffer = stager.get_buffer(first_handle);
        let second_buffer = stager.get_buffer(second_handle);
        assert_eq!(allocator.contents(first_buffer.handle().as_raw()).unwrap(), first);
        assert_eq!(allocator.contents(second_buffer.handle().as_raw()).unwrap(), second);
    }

    #[test]
    fn test_empty_batch_still_submits() {
        let (device, allocator, pool) = setup();
        let mut stager = TransferStager::new(Arc::clone(&device), allocator.clone()).unwrap();

        stager.submit(pool).unwrap();
        assert!(stager.is_submitted());
        assert_eq!(submitted_commands(&device), vec![Command::Begin, Command::End]);
        stager.wait().unwrap();

        assert!(allocator.allocations().is_empty());
        assert_eq!(device.live_command_buffers(), 0);
    }

    #[test]
    fn test_allocation_preferences() {
        let (device, allocator, pool) = setup();
        let bytes = [0u8; 12];
        let mut stager = TransferStager::new(Arc::clone(&device), allocator.clone()).unwrap();
        stager.add_buffer_transfer(&bytes, vk::BufferUsageFlags::VERTEX_BUFFER).unwrap();
        stager.submit(pool).unwrap();

        let allocations = allocator.allocations();
        assert_eq!(allocations.len(), 2);
        assert_eq!(allocations[0].info.preference, MemoryPreference::Device);
        assert_eq!(
            allocations[0].kind,
            AllocationKind::Buffer {
                usage: vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
                size: 12,
            }
        );
        assert_eq!(allocations[1].info, AllocationInfo::staging());
        assert_eq!(
            allocations[1].kind,
            AllocationKind::Buffer {
                usage: vk::BufferUsageFlags::TRANSFER_SRC,
                size: 12,
            }
        );

        // staging and command buffer live until wait
        assert_eq!(allocator.live_allocations(), 2);
        stager.wait().unwrap();
        assert_eq!(allocator.live_allocations(), 1);
        assert_eq!(device.live_command_buffers(), 0);
    }

    #[test]
    fn test_post_copy_barrier_keeps_per_request_destination() {
        let (device, allocator, pool) = setup();
        let color = [0u8; 4];
        let depth = [0u8; 4];
        let mut stager = TransferStager::new(Arc::clone(&device), allocator).unwrap();
        stager
            .add_image_transfer(
                &color,
                &texture_info(1, 1),
                vk::ImageAspectFlags::COLOR,
                vk::PipelineStageFlags2::FRAGMENT_SHADER,
                vk::AccessFlags2::SHADER_SAMPLED_READ,
            )
            .unwrap();
        let mut depth_info = texture_info(1, 1);
        depth_info.format = vk::Format::D32_SFLOAT;
        stager
            .add_image_transfer(
                &depth,
                &depth_info,
                vk::ImageAspectFlags::DEPTH,
                vk::PipelineStageFlags2::COMPUTE_SHADER,
                vk::AccessFlags2::SHADER_STORAGE_READ,
            )
            .unwrap();
        stager.submit(pool).unwrap();

        let commands = submitted_commands(&device);
        let Some(Command::PipelineBarrier(post)) = commands.iter().rev().nth(1) else {
            panic!("expected the post-copy barrier before end");
        };
        let barriers = post.image_barriers();
        assert_eq!(barriers.len(), 2);
        assert_eq!(barriers[0].dst_stage, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        assert_eq!(barriers[1].dst_stage, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert_eq!(barriers[1].dst_access, vk::AccessFlags2::SHADER_STORAGE_READ);
        assert_eq!(barriers[1].aspect, vk::ImageAspectFlags::DEPTH);
        stager.wait().unwrap();
    }

    #[test]
    fn test_stager_is_reusable_after_wait() {
        let (device, allocator, pool) = setup();
        let first = [3u8; 8];
        let second = [4u8; 8];
        let mut stager = TransferStager::new(Arc::clone(&device), allocator.clone()).unwrap();

        let first_handle = stager.add_buffer_transfer(&first, vk::BufferUsageFlags::UNIFORM_BUFFER).unwrap();
        stager.submit(pool).unwrap();
        stager.wait().unwrap();
        let second_handle = stager.add_buffer_transfer(&second, vk::BufferUsageFlags::UNIFORM_BUFFER).unwrap();
        stager.submit(pool).unwrap();
        stager.wait().unwrap();

        let first_buffer = stager.get_buffer(first_handle);
        let second_buffer = stager.get_buffer(second_handle);
        assert_eq!(allocator.contents(first_buffer.handle().as_raw()).unwrap(), first);
        assert_eq!(allocator.contents(second_buffer.handle().as_raw()).unwrap(), second);
    }

    #[test]
    fn test_submit_failure_propagates() {
        let (device, allocator, pool) = setup();
        let bytes = [0u8; 4];
        let mut stager = TransferStager::new(Arc::clone(&device), allocator).unwrap();
        stager.add_buffer_transfer(&bytes, vk::BufferUsageFlags::VERTEX_BUFFER).unwrap();
        device.fail_submissions(vk::Result::ERROR_DEVICE_LOST);

        let result = stager.submit(pool);
        assert!(matches!(
            result,
            Err(crate::render::vulkan::VulkanError::Api(vk::Result::ERROR_DEVICE_LOST))
        ));
        assert!(!stager.is_submitted());
        assert_eq!(device.live_command_buffers(), 0);
    }

    #[test]
    #[should_panic(expected = "shorter than its 64 byte footprint")]
    fn test_short_image_payload_panics() {
        let (device, allocator, _pool) = setup();
        let texels = [0u8; 60];
        let mut stager = TransferStager::new(Arc::clone(&device), allocator).unwrap();
        let _ = stager.add_image_transfer(
            &texels,
            &texture_info(4, 4),
            vk::ImageAspectFlags::COLOR,
            vk::PipelineStageFlags2::FRAGMENT_SHADER,
            vk::AccessFlags2::SHADER_SAMPLED_READ,
        );
    }

    #[test]
    fn test_texel_sizes() {
        assert_eq!(texel_size(vk::Format::R8G8B8A8_UNORM), Some(4));
        assert_eq!(texel_size(vk::Format::R16G16B16A16_SFLOAT), Some(8));
        assert_eq!(texel_size(vk::Format::BC1_RGB_UNORM_BLOCK), None);
    }

    #[test]
    #[should_panic(expected = "taken before wait")]
    fn test_get_before_wait_panics() {
        let (device, allocator, pool) = setup();
        let bytes = [0u8; 4];
        let mut stager = TransferStager::new(Arc::clone(&device), allocator).unwrap();
        let handle = stager.add_buffer_transfer(&bytes, vk::BufferUsageFlags::VERTEX_BUFFER).unwrap();
        stager.submit(pool).unwrap();
        let _ = stager.get_buffer(handle);
    }

    #[test]
    #[should_panic(expected = "already taken")]
    fn test_taking_a_handle_twice_panics() {
        let (device, allocator, pool) = setup();
        let bytes = [0u8; 4];
        let mut stager = TransferStager::new(Arc::clone(&device), allocator).unwrap();
        let handle = stager.add_buffer_transfer(&bytes, vk::BufferUsageFlags::VERTEX_BUFFER).unwrap();
        stager.submit(pool).unwrap();
        stager.wait().unwrap();
        let _first = stager.get_buffer(handle);
        let _second = stager.get_buffer(handle);
    }

    #[test]
    #[should_panic(expected = "submitted again before wait")]
    fn test_double_submit_panics() {
        let (device, allocator, pool) = setup();
        let mut stager = TransferStager::new(Arc::clone(&device), allocator).unwrap();
        stager.submit(pool).unwrap();
        stager.submit(pool).unwrap();
    }
}
