//! Allocation interface
//!
//! The renderer never talks to a memory allocator directly; it asks a [`MemoryAllocator`] for
//! buffers and images and gets back owning [`Buffer`] / [`Image`] values that release their
//! memory on drop.

use ash::vk;
use std::fmt;

use super::error::VulkanResult;

/// Which heap an allocation should land in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryPreference {
    /// Device-local memory
    #[default]
    Device,
    /// Host-visible, host-coherent memory
    Host,
}

/// Placement strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AllocationPriority {
    /// Find a slot quickly
    #[default]
    Time,
    /// Pack tightly
    Memory,
}

/// Placement hints for one allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AllocationInfo {
    /// Device-local or host-visible
    pub preference: MemoryPreference,
    /// Allocation strategy
    pub priority: AllocationPriority,
    /// The host will map this allocation
    pub able_to_be_mapped: bool,
    /// Keep the mapping alive for the allocation's lifetime
    pub persistently_mapped: bool,
    /// Host access is random rather than sequential writes
    pub random_access: bool,
}

impl AllocationInfo {
    /// Host-visible, write-once source of a copy
    pub const fn staging() -> Self {
        Self {
            preference: MemoryPreference::Host,
            priority: AllocationPriority::Time,
            able_to_be_mapped: true,
            persistently_mapped: false,
            random_access: false,
        }
    }

    /// Host-visible memory rewritten every frame
    pub const fn persistent_host() -> Self {
        Self {
            preference: MemoryPreference::Host,
            priority: AllocationPriority::Time,
            able_to_be_mapped: true,
            persistently_mapped: true,
            random_access: false,
        }
    }
}

/// Backing memory of a buffer
pub trait BufferMemory: Send + Sync {
    /// Raw buffer handle
    fn handle(&self) -> vk::Buffer;

    /// Copy `data` into the mapped buffer at `offset`
    fn write(&self, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()>;

    /// Copy mapped bytes starting at `offset` into `out`
    fn read(&self, offset: vk::DeviceSize, out: &mut [u8]) -> VulkanResult<()>;
}

/// Backing memory of an image and its optional default view
pub trait ImageMemory: Send + Sync {
    /// Raw image handle
    fn handle(&self) -> vk::Image;

    /// Default 2D view, when one was requested
    fn view(&self) -> Option<vk::ImageView>;
}

/// Allocates buffers and images
pub trait MemoryAllocator: Send + Sync {
    /// Create a buffer with bound memory
    fn allocate_buffer(&self, create_info: &vk::BufferCreateInfo, info: &AllocationInfo) -> VulkanResult<Buffer>;

    /// Create an image with bound memory; `view_aspect` also creates a 2D view over it
    fn allocate_image(
        &self,
        create_info: &vk::ImageCreateInfo,
        info: &AllocationInfo,
        view_aspect: Option<vk::ImageAspectFlags>,
    ) -> VulkanResult<Image>;
}

/// Owned buffer; memory is released when dropped
pub struct Buffer {
    memory: Box<dyn BufferMemory>,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Wrap allocator-specific memory
    pub fn new(memory: Box<dyn BufferMemory>, size: vk::DeviceSize) -> Self {
        Self { memory, size }
    }

    /// Raw handle
    pub fn handle(&self) -> vk::Buffer {
        self.memory.handle()
    }

    /// Size in bytes
    pub const fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Write through the host mapping
    pub fn write(&self, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()> {
        assert!(
            offset + data.len() as vk::DeviceSize <= self.size,
            "write of {} bytes at {} overruns a {} byte buffer",
            data.len(),
            offset,
            self.size
        );
        self.memory.write(offset, data)
    }

    /// Read through the host mapping
    pub fn read(&self, offset: vk::DeviceSize, out: &mut [u8]) -> VulkanResult<()> {
        assert!(
            offset + out.len() as vk::DeviceSize <= self.size,
            "read of {} bytes at {} overruns a {} byte buffer",
            out.len(),
            offset,
            self.size
        );
        self.memory.read(offset, out)
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("handle", &self.handle())
            .field("size", &self.size)
            .finish()
    }
}

/// Owned image; memory and view are released when dropped
pub struct Image {
    memory: Box<dyn ImageMemory>,
    format: vk::Format,
    extent: vk::Extent3D,
}

impl Image {
    /// Wrap allocator-specific memory
    pub fn new(memory: Box<dyn ImageMemory>, format: vk::Format, extent: vk::Extent3D) -> Self {
        Self { memory, format, extent }
    }

    /// Raw handle
    pub fn handle(&self) -> vk::Image {
        self.memory.handle()
    }

    /// Default view
    ///
    /// # Panics
    /// When the image was allocated without a view aspect.
    pub fn view(&self) -> vk::ImageView {
        match self.memory.view() {
            Some(view) => view,
            None => panic!("image {:?} was allocated without a view", self.handle()),
        }
    }

    /// Texel format
    pub const fn format(&self) -> vk::Format {
        self.format
    }

    /// Full extent
    pub const fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    /// Width and height
    pub const fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.extent.width,
            height: self.extent.height,
        }
    }
}

impl fmt::Debug for Image {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("handle", &self.handle())
            .field("format", &self.format)
            .field("extent", &self.extent)
            .finish()
    }
}
