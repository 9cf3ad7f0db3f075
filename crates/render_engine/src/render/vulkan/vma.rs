//! [`MemoryAllocator`] backed by the Vulkan Memory Allocator

use ash::vk;
use std::sync::{Arc, Mutex, PoisonError};
use vk_mem::Alloc;

use super::context::VulkanContext;
use super::error::{VulkanError, VulkanResult};
use super::memory::{
    AllocationInfo, AllocationPriority, Buffer, BufferMemory, Image, ImageMemory, MemoryAllocator, MemoryPreference,
};

/// VMA allocator tied to one [`VulkanContext`]
pub struct VmaAllocator {
    // Dropped before the context it was created from
    allocator: Arc<vk_mem::Allocator>,
    context: Arc<VulkanContext>,
}

impl VmaAllocator {
    /// Create an allocator for the context's device
    pub fn new(context: Arc<VulkanContext>) -> VulkanResult<Self> {
        let create_info =
            vk_mem::AllocatorCreateInfo::new(context.instance(), context.device(), context.physical_device());
        let allocator = vk_mem::Allocator::new(create_info).map_err(VulkanError::Api)?;
        log::debug!("Created VMA allocator");

        Ok(Self {
            allocator: Arc::new(allocator),
            context,
        })
    }

    fn create_info(info: &AllocationInfo) -> vk_mem::AllocationCreateInfo {
        let mut flags = match info.priority {
            AllocationPriority::Time => vk_mem::AllocationCreateFlags::STRATEGY_MIN_TIME,
            AllocationPriority::Memory => vk_mem::AllocationCreateFlags::STRATEGY_MIN_MEMORY,
        };
        if info.persistently_mapped {
            flags |= vk_mem::AllocationCreateFlags::MAPPED;
        }
        if info.random_access {
            flags |= vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM;
        } else if info.able_to_be_mapped || info.persistently_mapped {
            flags |= vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE;
        }

        let (usage, required_flags) = match info.preference {
            MemoryPreference::Device => (vk_mem::MemoryUsage::AutoPreferDevice, vk::MemoryPropertyFlags::empty()),
            MemoryPreference::Host => (
                vk_mem::MemoryUsage::AutoPreferHost,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            ),
        };

        vk_mem::AllocationCreateInfo {
            flags,
            usage,
            required_flags,
            ..Default::default()
        }
    }
}

impl MemoryAllocator for VmaAllocator {
    fn allocate_buffer(&self, create_info: &vk::BufferCreateInfo, info: &AllocationInfo) -> VulkanResult<Buffer> {
        let (buffer, allocation) = unsafe {
            self.allocator
                .create_buffer(create_info, &Self::create_info(info))
                .map_err(|e| VulkanError::from_allocation(e, create_info.size))?
        };

        let mapped = if info.persistently_mapped {
            let mapped_data = self.allocator.get_allocation_info(&allocation).mapped_data;
            (!mapped_data.is_null()).then_some(mapped_data.cast::<u8>())
        } else {
            None
        };

        log::debug!("Allocated buffer {:?} ({} bytes)", buffer, create_info.size);
        Ok(Buffer::new(
            Box::new(VmaBuffer {
                allocator: Arc::clone(&self.allocator),
                buffer,
                allocation: Mutex::new(allocation),
                mapped,
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
        let (image, mut allocation) = unsafe {
            self.allocator
                .create_image(create_info, &Self::create_info(info))
                .map_err(VulkanError::Api)?
        };

        let view = match view_aspect {
            Some(aspect) => {
                let view_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(create_info.format)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: aspect,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });
                match unsafe { self.context.device().create_image_view(&view_info, None) } {
                    Ok(view) => Some(view),
                    Err(e) => {
                        unsafe { self.allocator.destroy_image(image, &mut allocation) };
                        return Err(VulkanError::Api(e));
                    }
                }
            }
            None => None,
        };

        log::debug!(
            "Allocated image {:?} {:?} {}x{}",
            image,
            create_info.format,
            create_info.extent.width,
            create_info.extent.height
        );
        Ok(Image::new(
            Box::new(VmaImage {
                allocator: Arc::clone(&self.allocator),
                device: self.context.device().clone(),
                image,
                view,
                allocation: Mutex::new(allocation),
            }),
            create_info.format,
            create_info.extent,
        ))
    }
}

struct VmaBuffer {
    allocator: Arc<vk_mem::Allocator>,
    buffer: vk::Buffer,
    allocation: Mutex<vk_mem::Allocation>,
    mapped: Option<*mut u8>,
}

// SAFETY: the mapped pointer is only dereferenced while the allocation lock is held, and VMA
// allocations may be used from any thread.
unsafe impl Send for VmaBuffer {}
unsafe impl Sync for VmaBuffer {}

impl VmaBuffer {
    fn with_mapping<R>(&self, access: impl FnOnce(*mut u8) -> R) -> VulkanResult<R> {
        let mut allocation = self.allocation.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(mapped) = self.mapped {
            return Ok(access(mapped));
        }

        unsafe {
            let mapped = self.allocator.map_memory(&mut allocation).map_err(VulkanError::Api)?;
            let result = access(mapped);
            self.allocator.unmap_memory(&mut allocation);
            Ok(result)
        }
    }
}

impl BufferMemory for VmaBuffer {
    fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    fn write(&self, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()> {
        let offset = usize::try_from(offset).map_err(|_| VulkanError::InvalidOperation {
            reason: format!("offset {offset} does not fit the host address space"),
        })?;
        self.with_mapping(|mapped| unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.add(offset), data.len());
        })
    }

    fn read(&self, offset: vk::DeviceSize, out: &mut [u8]) -> VulkanResult<()> {
        let offset = usize::try_from(offset).map_err(|_| VulkanError::InvalidOperation {
            reason: format!("offset {offset} does not fit the host address space"),
        })?;
        self.with_mapping(|mapped| unsafe {
            std::ptr::copy_nonoverlapping(mapped.add(offset), out.as_mut_ptr(), out.len());
        })
    }
}

impl Drop for VmaBuffer {
    fn drop(&mut self) {
        let allocation = self.allocation.get_mut().unwrap_or_else(PoisonError::into_inner);
        unsafe { self.allocator.destroy_buffer(self.buffer, allocation) };
        log::debug!("Freed buffer {:?}", self.buffer);
    }
}

struct VmaImage {
    allocator: Arc<vk_mem::Allocator>,
    device: ash::Device,
    image: vk::Image,
    view: Option<vk::ImageView>,
    allocation: Mutex<vk_mem::Allocation>,
}

// SAFETY: the allocation is only touched on drop, through exclusive access.
unsafe impl Send for VmaImage {}
unsafe impl Sync for VmaImage {}

impl ImageMemory for VmaImage {
    fn handle(&self) -> vk::Image {
        self.image
    }

    fn view(&self) -> Option<vk::ImageView> {
        self.view
    }
}

impl Drop for VmaImage {
    fn drop(&mut self) {
        unsafe {
            if let Some(view) = self.view.take() {
                self.device.destroy_image_view(view, None);
            }
            let allocation = self.allocation.get_mut().unwrap_or_else(PoisonError::into_inner);
            self.allocator.destroy_image(self.image, allocation);
        }
        log::debug!("Freed image {:?}", self.image);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_maps_to_host_sequential_writes() {
        let info = VmaAllocator::create_info(&AllocationInfo::staging());
        assert!(matches!(info.usage, vk_mem::MemoryUsage::AutoPreferHost));
        assert!(info.flags.contains(vk_mem::AllocationCreateFlags::STRATEGY_MIN_TIME));
        assert!(info.flags.contains(vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE));
        assert!(!info.flags.contains(vk_mem::AllocationCreateFlags::MAPPED));
        assert!(info.required_flags.contains(vk::MemoryPropertyFlags::HOST_COHERENT));
    }

    #[test]
    fn test_device_default_has_no_host_access() {
        let info = VmaAllocator::create_info(&AllocationInfo::default());
        assert!(matches!(info.usage, vk_mem::MemoryUsage::AutoPreferDevice));
        assert!(!info.flags.contains(vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE));
        assert!(info.required_flags.is_empty());
    }

    #[test]
    fn test_random_access_and_memory_priority() {
        let info = VmaAllocator::create_info(&AllocationInfo {
            priority: AllocationPriority::Memory,
            able_to_be_mapped: true,
            persistently_mapped: true,
            random_access: true,
            ..AllocationInfo::persistent_host()
        });
        assert!(info.flags.contains(vk_mem::AllocationCreateFlags::STRATEGY_MIN_MEMORY));
        assert!(info.flags.contains(vk_mem::AllocationCreateFlags::HOST_ACCESS_RANDOM));
        assert!(info.flags.contains(vk_mem::AllocationCreateFlags::MAPPED));
    }
}
