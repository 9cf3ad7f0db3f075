//! Host-visible uniform buffers

use ash::vk;
use bytemuck::Pod;
use std::marker::PhantomData;

use crate::render::vulkan::{AllocationInfo, Buffer, DescriptorWrite, MemoryAllocator, VulkanResult};

/// Persistently mapped uniform buffer holding one `T`
pub struct Uniform<T: Pod> {
    buffer: Buffer,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Pod> Uniform<T> {
    /// Allocate and initialize with `value`
    pub fn new(allocator: &dyn MemoryAllocator, value: &T) -> VulkanResult<Self> {
        let create_info = vk::BufferCreateInfo::builder()
            .size(std::mem::size_of::<T>() as vk::DeviceSize)
            .usage(vk::BufferUsageFlags::UNIFORM_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .build();
        let buffer = allocator.allocate_buffer(&create_info, &AllocationInfo::persistent_host())?;
        let uniform = Self {
            buffer,
            _marker: PhantomData,
        };
        uniform.set(value)?;
        Ok(uniform)
    }

    /// Overwrite the contents; visible to the next submission
    pub fn set(&self, value: &T) -> VulkanResult<()> {
        self.buffer.write(0, bytemuck::bytes_of(value))
    }

    /// Read the contents back
    pub fn get(&self) -> VulkanResult<T> {
        let mut value = T::zeroed();
        self.buffer.read(0, bytemuck::bytes_of_mut(&mut value))?;
        Ok(value)
    }

    /// Raw buffer handle
    pub fn buffer(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Descriptor update binding the whole buffer at `binding`
    pub fn descriptor_write(&self, set: vk::DescriptorSet, binding: u32) -> DescriptorWrite {
        DescriptorWrite::UniformBuffer {
            set,
            binding,
            buffer: self.buffer.handle(),
            range: self.buffer.size(),
        }
    }
}
