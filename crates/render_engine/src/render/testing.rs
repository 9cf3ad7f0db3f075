//! Host-memory stand-ins for the device and the allocator
//!
//! [`MockDevice`] logs every device call and keeps the commands recorded into each command
//! buffer. A submission stays pending until its fence is waited on; the wait then "executes"
//! the recorded copies against the memory handed out by [`MockAllocator`], so uploads can be
//! read back byte for byte.

use ash::vk::{self, Handle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::submit::SubmissionInfo;
use super::vulkan::{
    AllocationInfo, BarrierBatch, Buffer, BufferMemory, CommandRecorder, DescriptorWrite, GpuDevice, Image,
    ImageMemory, MemoryAllocator, RenderingPass, VulkanError, VulkanResult,
};

/// Device call, in the order it happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceEvent {
    CreateFence(vk::Fence),
    ResetFence(vk::Fence),
    DestroyFence(vk::Fence),
    Submit(vk::CommandBuffer),
    /// A pending submission ran during a fence wait
    Executed(vk::CommandBuffer),
    AllocateCommandBuffer(vk::CommandBuffer),
    FreeCommandBuffer(vk::CommandBuffer),
    AllocateDescriptorSet(vk::DescriptorSet),
    WriteDescriptor(DescriptorWrite),
}

/// Recorded command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Begin,
    End,
    Reset,
    PipelineBarrier(BarrierBatch),
    CopyBuffer {
        src: vk::Buffer,
        dst: vk::Buffer,
        src_offset: vk::DeviceSize,
        dst_offset: vk::DeviceSize,
        size: vk::DeviceSize,
    },
    CopyBufferToImage {
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        buffer_offset: vk::DeviceSize,
        aspect: vk::ImageAspectFlags,
        extent: vk::Extent3D,
    },
    BeginRendering(RenderingPass),
    EndRendering,
    SetViewportAndScissor(vk::Extent2D),
    BindPipeline(vk::PipelineBindPoint, vk::Pipeline),
    BindDescriptorSets {
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: Vec<vk::DescriptorSet>,
    },
    PushConstants {
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: Vec<u8>,
    },
    BindVertexBuffer(vk::Buffer),
    BindIndexBuffer(vk::Buffer, vk::IndexType),
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    },
    Draw {
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    },
    Dispatch(u32, u32, u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    Signaled,
    Unsignaled,
    Pending(vk::CommandBuffer),
}

#[derive(Default)]
struct MemoryRegistry {
    next_handle: u64,
    blocks: HashMap<u64, Vec<u8>>,
    allocations: Vec<AllocationRecord>,
}

impl MemoryRegistry {
    fn next(&mut self) -> u64 {
        self.next_handle += 1;
        0x1000_0000 + self.next_handle
    }
}

/// What an allocation was asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationKind {
    Buffer {
        usage: vk::BufferUsageFlags,
        size: vk::DeviceSize,
    },
    Image {
        usage: vk::ImageUsageFlags,
        format: vk::Format,
        extent: vk::Extent3D,
    },
}

/// One allocator call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRecord {
    pub kind: AllocationKind,
    pub info: AllocationInfo,
}

#[derive(Default)]
struct DeviceState {
    next_handle: u64,
    stalled: bool,
    submit_failure: Option<vk::Result>,
    fences: HashMap<u64, FenceState>,
    command_buffers: HashMap<u64, Vec<Command>>,
    events: Vec<DeviceEvent>,
    last_semaphores: (Option<vk::Semaphore>, Option<vk::Semaphore>),
}

impl DeviceState {
    fn next(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Recording device whose queue runs when a fence is waited on
pub struct MockDevice {
    state: Mutex<DeviceState>,
    memory: Arc<Mutex<MemoryRegistry>>,
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDevice {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DeviceState::default()),
            memory: Arc::new(Mutex::new(MemoryRegistry::default())),
        }
    }

    /// Allocator sharing this device's memory
    pub fn allocator(&self) -> Arc<MockAllocator> {
        Arc::new(MockAllocator {
            memory: Arc::clone(&self.memory),
        })
    }

    /// Command buffer not tied to any pool
    pub fn new_command_buffer(&self) -> vk::CommandBuffer {
        let mut state = lock(&self.state);
        let raw = state.next();
        state.command_buffers.insert(raw, Vec::new());
        vk::CommandBuffer::from_raw(raw)
    }

    pub fn new_semaphore(&self) -> vk::Semaphore {
        vk::Semaphore::from_raw(lock(&self.state).next())
    }

    /// Fresh raw handle of any type
    pub fn new_handle<H: Handle>(&self) -> H {
        H::from_raw(lock(&self.state).next())
    }

    /// A stalled queue only completes work on unbounded waits
    pub fn set_stalled(&self, stalled: bool) {
        lock(&self.state).stalled = stalled;
    }

    /// Make every following submit fail with `result`
    pub fn fail_submissions(&self, result: vk::Result) {
        lock(&self.state).submit_failure = Some(result);
    }

    pub fn events(&self) -> Vec<DeviceEvent> {
        lock(&self.state).events.clone()
    }

    pub fn commands(&self, command_buffer: vk::CommandBuffer) -> Vec<Command> {
        lock(&self.state)
            .command_buffers
            .get(&command_buffer.as_raw())
            .cloned()
            .unwrap_or_default()
    }

    pub fn last_submission_semaphores(&self) -> (Option<vk::Semaphore>, Option<vk::Semaphore>) {
        lock(&self.state).last_semaphores
    }

    pub fn live_fences(&self) -> usize {
        lock(&self.state).fences.len()
    }

    pub fn live_command_buffers(&self) -> usize {
        lock(&self.state).command_buffers.len()
    }

    fn execute(&self, command_buffer: vk::CommandBuffer, commands: &[Command]) {
        let mut memory = lock(&self.memory);
        for command in commands {
            match *command {
                Command::CopyBuffer {
                    src,
                    dst,
                    src_offset,
                    dst_offset,
                    size,
                } => {
                    let (src_offset, dst_offset, size) = (src_offset as usize, dst_offset as usize, size as usize);
                    let bytes = memory.blocks[&src.as_raw()][src_offset..src_offset + size].to_vec();
                    if let Some(block) = memory.blocks.get_mut(&dst.as_raw()) {
                        block[dst_offset..dst_offset + size].copy_from_slice(&bytes);
                    }
                }
                Command::CopyBufferToImage {
                    src, dst, buffer_offset, ..
                } => {
                    let offset = buffer_offset as usize;
                    let len = memory.blocks.get(&dst.as_raw()).map_or(0, Vec::len);
                    let bytes = memory.blocks[&src.as_raw()][offset..offset + len].to_vec();
                    if let Some(block) = memory.blocks.get_mut(&dst.as_raw()) {
                        block.copy_from_slice(&bytes);
                    }
                }
                _ => {}
            }
        }
        log::trace!("Mock queue executed {:?}", command_buffer);
    }
}

impl GpuDevice for MockDevice {
    type Recorder<'a> = MockRecorder<'a>;

    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence> {
        let mut state = lock(&self.state);
        let raw = state.next();
        let initial = if signaled {
            FenceState::Signaled
        } else {
            FenceState::Unsignaled
        };
        state.fences.insert(raw, initial);
        let fence = vk::Fence::from_raw(raw);
        state.events.push(DeviceEvent::CreateFence(fence));
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = lock(&self.state);
        let previous = state.fences.remove(&fence.as_raw());
        assert!(
            !matches!(previous, Some(FenceState::Pending(_))),
            "destroyed fence {fence:?} while its submission was pending"
        );
        state.events.push(DeviceEvent::DestroyFence(fence));
    }

    fn reset_fence(&self, fence: vk::Fence) -> VulkanResult<()> {
        let mut state = lock(&self.state);
        let entry = state.fences.get_mut(&fence.as_raw()).expect("unknown fence");
        assert!(
            !matches!(entry, FenceState::Pending(_)),
            "reset fence {fence:?} while its submission was pending"
        );
        *entry = FenceState::Unsignaled;
        state.events.push(DeviceEvent::ResetFence(fence));
        Ok(())
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VulkanResult<bool> {
        let mut state = lock(&self.state);
        match state.fences.get(&fence.as_raw()).copied().expect("unknown fence") {
            FenceState::Signaled => Ok(true),
            FenceState::Unsignaled => Ok(false),
            FenceState::Pending(command_buffer) => {
                if timeout_ns == 0 || (state.stalled && timeout_ns != u64::MAX) {
                    return Ok(false);
                }
                let commands = state
                    .command_buffers
                    .get(&command_buffer.as_raw())
                    .cloned()
                    .unwrap_or_default();
                self.execute(command_buffer, &commands);
                state.fences.insert(fence.as_raw(), FenceState::Signaled);
                state.events.push(DeviceEvent::Executed(command_buffer));
                Ok(true)
            }
        }
    }

    fn submit(&self, info: &SubmissionInfo, fence: vk::Fence) -> VulkanResult<()> {
        let mut state = lock(&self.state);
        if let Some(result) = state.submit_failure {
            return Err(VulkanError::Api(result));
        }
        let entry = state.fences.get_mut(&fence.as_raw()).expect("unknown fence");
        assert_eq!(*entry, FenceState::Unsignaled, "submitted with a fence that was not reset");
        *entry = FenceState::Pending(info.command_buffer);
        state.last_semaphores = (info.wait.as_ref().map(|w| w.semaphore), info.signal);
        state.events.push(DeviceEvent::Submit(info.command_buffer));
        Ok(())
    }

    fn allocate_command_buffer(&self, _pool: vk::CommandPool) -> VulkanResult<vk::CommandBuffer> {
        let mut state = lock(&self.state);
        let raw = state.next();
        state.command_buffers.insert(raw, Vec::new());
        let command_buffer = vk::CommandBuffer::from_raw(raw);
        state.events.push(DeviceEvent::AllocateCommandBuffer(command_buffer));
        Ok(command_buffer)
    }

    fn free_command_buffer(&self, _pool: vk::CommandPool, command_buffer: vk::CommandBuffer) {
        let mut state = lock(&self.state);
        state.command_buffers.remove(&command_buffer.as_raw());
        state.events.push(DeviceEvent::FreeCommandBuffer(command_buffer));
    }

    fn allocate_descriptor_set(
        &self,
        _pool: vk::DescriptorPool,
        _layout: vk::DescriptorSetLayout,
    ) -> VulkanResult<vk::DescriptorSet> {
        let mut state = lock(&self.state);
        let set = vk::DescriptorSet::from_raw(state.next());
        state.events.push(DeviceEvent::AllocateDescriptorSet(set));
        Ok(set)
    }

    fn write_descriptor_sets(&self, writes: &[DescriptorWrite]) {
        let mut state = lock(&self.state);
        state
            .events
            .extend(writes.iter().copied().map(DeviceEvent::WriteDescriptor));
    }

    fn recorder(&self, command_buffer: vk::CommandBuffer) -> Self::Recorder<'_> {
        MockRecorder {
            device: self,
            command_buffer,
        }
    }
}

/// Appends to the command list the device keeps for one command buffer
pub struct MockRecorder<'a> {
    device: &'a MockDevice,
    command_buffer: vk::CommandBuffer,
}

impl MockRecorder<'_> {
    fn record(&mut self, command: Command) {
        lock(&self.device.state)
            .command_buffers
            .entry(self.command_buffer.as_raw())
            .or_default()
            .push(command);
    }
}

impl CommandRecorder for MockRecorder<'_> {
    fn begin(&mut self) -> VulkanResult<()> {
        lock(&self.device.state)
            .command_buffers
            .insert(self.command_buffer.as_raw(), vec![Command::Begin]);
        Ok(())
    }

    fn end(&mut self) -> VulkanResult<()> {
        self.record(Command::End);
        Ok(())
    }

    fn reset(&mut self) -> VulkanResult<()> {
        lock(&self.device.state)
            .command_buffers
            .insert(self.command_buffer.as_raw(), vec![Command::Reset]);
        Ok(())
    }

    fn pipeline_barrier(&mut self, batch: &BarrierBatch) {
        self.record(Command::PipelineBarrier(batch.clone()));
    }

    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, region: vk::BufferCopy) {
        self.record(Command::CopyBuffer {
            src,
            dst,
            src_offset: region.src_offset,
            dst_offset: region.dst_offset,
            size: region.size,
        });
    }

    fn copy_buffer_to_image(
        &mut self,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        region: vk::BufferImageCopy,
    ) {
        self.record(Command::CopyBufferToImage {
            src,
            dst,
            dst_layout,
            buffer_offset: region.buffer_offset,
            aspect: region.image_subresource.aspect_mask,
            extent: region.image_extent,
        });
    }

    fn begin_rendering(&mut self, pass: &RenderingPass) {
        self.record(Command::BeginRendering(pass.clone()));
    }

    fn end_rendering(&mut self) {
        self.record(Command::EndRendering);
    }

    fn set_viewport_and_scissor(&mut self, extent: vk::Extent2D) {
        self.record(Command::SetViewportAndScissor(extent));
    }

    fn bind_pipeline(&mut self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        self.record(Command::BindPipeline(bind_point, pipeline));
    }

    fn bind_descriptor_sets(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        self.record(Command::BindDescriptorSets {
            bind_point,
            layout,
            first_set,
            sets: sets.to_vec(),
        });
    }

    fn push_constants(
        &mut self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        self.record(Command::PushConstants {
            layout,
            stages,
            offset,
            data: data.to_vec(),
        });
    }

    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer) {
        self.record(Command::BindVertexBuffer(buffer));
    }

    fn bind_index_buffer(&mut self, buffer: vk::Buffer, index_type: vk::IndexType) {
        self.record(Command::BindIndexBuffer(buffer, index_type));
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.record(Command::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        });
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.record(Command::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        self.record(Command::Dispatch(group_count_x, group_count_y, group_count_z));
    }
}

/// Standalone recorder for code that only needs a command list
#[derive(Default)]
pub struct CommandLog {
    pub commands: Vec<Command>,
}

impl CommandRecorder for CommandLog {
    fn begin(&mut self) -> VulkanResult<()> {
        self.commands.push(Command::Begin);
        Ok(())
    }

    fn end(&mut self) -> VulkanResult<()> {
        self.commands.push(Command::End);
        Ok(())
    }

    fn reset(&mut self) -> VulkanResult<()> {
        self.commands.clear();
        Ok(())
    }

    fn pipeline_barrier(&mut self, batch: &BarrierBatch) {
        self.commands.push(Command::PipelineBarrier(batch.clone()));
    }

    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, region: vk::BufferCopy) {
        self.commands.push(Command::CopyBuffer {
            src,
            dst,
            src_offset: region.src_offset,
            dst_offset: region.dst_offset,
            size: region.size,
        });
    }

    fn copy_buffer_to_image(
        &mut self,
        src: vk::Buffer,
        dst: vk::Image,
        dst_layout: vk::ImageLayout,
        region: vk::BufferImageCopy,
    ) {
        self.commands.push(Command::CopyBufferToImage {
            src,
            dst,
            dst_layout,
            buffer_offset: region.buffer_offset,
            aspect: region.image_subresource.aspect_mask,
            extent: region.image_extent,
        });
    }

    fn begin_rendering(&mut self, pass: &RenderingPass) {
        self.commands.push(Command::BeginRendering(pass.clone()));
    }

    fn end_rendering(&mut self) {
        self.commands.push(Command::EndRendering);
    }

    fn set_viewport_and_scissor(&mut self, extent: vk::Extent2D) {
        self.commands.push(Command::SetViewportAndScissor(extent));
    }

    fn bind_pipeline(&mut self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        self.commands.push(Command::BindPipeline(bind_point, pipeline));
    }

    fn bind_descriptor_sets(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: &[vk::DescriptorSet],
    ) {
        self.commands.push(Command::BindDescriptorSets {
            bind_point,
            layout,
            first_set,
            sets: sets.to_vec(),
        });
    }

    fn push_constants(
        &mut self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &[u8],
    ) {
        self.commands.push(Command::PushConstants {
            layout,
            stages,
            offset,
            data: data.to_vec(),
        });
    }

    fn bind_vertex_buffer(&mut self, buffer: vk::Buffer) {
        self.commands.push(Command::BindVertexBuffer(buffer));
    }

    fn bind_index_buffer(&mut self, buffer: vk::Buffer, index_type: vk::IndexType) {
        self.commands.push(Command::BindIndexBuffer(buffer, index_type));
    }

    fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        self.commands.push(Command::DrawIndexed {
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        });
    }

    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        self.commands.push(Command::Draw {
            vertex_count,
            instance_count,
            first_vertex,
            first_instance,
        });
    }

    fn dispatch(&mut self, group_count_x: u32, group_count_y: u32, group_count_z: u32) {
        self.commands.push(Command::Dispatch(group_count_x, group_count_y, group_count_z));
    }
}

/// Allocator backed by plain byte vectors
pub struct MockAllocator {
    memory: Arc<Mutex<MemoryRegistry>>,
}

impl MockAllocator {
    /// Current bytes of a buffer or image
    pub fn contents(&self, raw_handle: u64) -> Option<Vec<u8>> {
        lock(&self.memory).blocks.get(&raw_handle).cloned()
    }

    /// Every allocation made so far
    pub fn allocations(&self) -> Vec<AllocationRecord> {
        lock(&self.memory).allocations.clone()
    }

    /// Buffers and images not yet dropped
    pub fn live_allocations(&self) -> usize {
        lock(&self.memory).blocks.len()
    }
}

/// Bytes per texel, assuming four for formats the stager does not size
pub fn texel_size(format: vk::Format) -> usize {
    crate::render::transfer::texel_size(format).map_or(4, |size| size as usize)
}

impl MemoryAllocator for MockAllocator {
    fn allocate_buffer(&self, create_info: &vk::BufferCreateInfo, info: &AllocationInfo) -> VulkanResult<Buffer> {
        let mut memory = lock(&self.memory);
        let raw = memory.next();
        memory.blocks.insert(raw, vec![0; create_info.size as usize]);
        memory.allocations.push(AllocationRecord {
            kind: AllocationKind::Buffer {
                usage: create_info.usage,
                size: create_info.size,
            },
            info: *info,
        });

        Ok(Buffer::new(
            Box::new(MockBuffer {
                handle: vk::Buffer::from_raw(raw),
                memory: Arc::clone(&self.memory),
            }),
            create_info.size,
        ))
    }

    fn allocate_image(
        &self,
        create_info: &vk::ImageCreateInfo,
        info: &AllocationInfo,
        view_aspect: Option<vk::ImageAspectFlags>,
    ) -> VulkanResult<Image> {
        let mut memory = lock(&self.memory);
        let raw = memory.next();
        let extent = create_info.extent;
        let size = (extent.width * extent.height * extent.depth) as usize * texel_size(create_info.format);
        memory.blocks.insert(raw, vec![0; size]);
        memory.allocations.push(AllocationRecord {
            kind: AllocationKind::Image {
                usage: create_info.usage,
                format: create_info.format,
                extent,
            },
            info: *info,
        });
        let view = view_aspect.map(|_| vk::ImageView::from_raw(memory.next()));

        Ok(Image::new(
            Box::new(MockImage {
                handle: vk::Image::from_raw(raw),
                view,
                memory: Arc::clone(&self.memory),
            }),
            create_info.format,
            extent,
        ))
    }
}

struct MockBuffer {
    handle: vk::Buffer,
    memory: Arc<Mutex<MemoryRegistry>>,
}

impl BufferMemory for MockBuffer {
    fn handle(&self) -> vk::Buffer {
        self.handle
    }

    fn write(&self, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()> {
        let mut memory = lock(&self.memory);
        let block = memory.blocks.get_mut(&self.handle.as_raw()).expect("buffer memory");
        let offset = offset as usize;
        block[offset..offset + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read(&self, offset: vk::DeviceSize, out: &mut [u8]) -> VulkanResult<()> {
        let memory = lock(&self.memory);
        let block = &memory.blocks[&self.handle.as_raw()];
        let offset = offset as usize;
        out.copy_from_slice(&block[offset..offset + out.len()]);
        Ok(())
    }
}

impl Drop for MockBuffer {
    fn drop(&mut self) {
        lock(&self.memory).blocks.remove(&self.handle.as_raw());
    }
}

struct MockImage {
    handle: vk::Image,
    view: Option<vk::ImageView>,
    memory: Arc<Mutex<MemoryRegistry>>,
}

impl ImageMemory for MockImage {
    fn handle(&self) -> vk::Image {
        self.handle
    }

    fn view(&self) -> Option<vk::ImageView> {
        self.view
    }
}

impl Drop for MockImage {
    fn drop(&mut self) {
        lock(&self.memory).blocks.remove(&self.handle.as_raw());
    }
}
