//! Swapchain whose images the tonemapper writes directly

use ash::vk;
use std::sync::Arc;

use super::context::VulkanContext;
use super::error::{VulkanError, VulkanResult};

/// Images are written by a compute shader and then used as UI attachments
const IMAGE_USAGE: vk::ImageUsageFlags =
    vk::ImageUsageFlags::from_raw(vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw() | vk::ImageUsageFlags::STORAGE.as_raw());

fn headless() -> VulkanError {
    VulkanError::InvalidOperation {
        reason: "swapchain requested on a headless context".to_string(),
    }
}

/// Presentable images for the context's surface
pub struct Swapchain {
    context: Arc<VulkanContext>,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Unorm so that storage writes are supported; the tonemap shader encodes sRGB itself
    pub const FORMAT: vk::Format = vk::Format::B8G8R8A8_UNORM;

    /// Create a swapchain sized to `framebuffer` where the surface leaves the choice open
    pub fn new(context: Arc<VulkanContext>, framebuffer: vk::Extent2D) -> VulkanResult<Self> {
        let mut swapchain = Self {
            context,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            extent: framebuffer,
        };
        swapchain.recreate(framebuffer)?;
        Ok(swapchain)
    }

    fn loader(&self) -> VulkanResult<&ash::extensions::khr::Swapchain> {
        self.context.swapchain_loader().ok_or_else(headless)
    }

    /// Replace the swapchain after a resize or an out-of-date result
    ///
    /// Waits for the device to go idle, since views of the old images may still be in use.
    pub fn recreate(&mut self, framebuffer: vk::Extent2D) -> VulkanResult<()> {
        let context = Arc::clone(&self.context);
        let (Some(surface_loader), Some(surface), Some(loader)) =
            (context.surface_loader(), context.surface(), context.swapchain_loader())
        else {
            return Err(headless());
        };
        let physical_device = context.physical_device();

        let (caps, formats, present_modes) = unsafe {
            (
                surface_loader
                    .get_physical_device_surface_capabilities(physical_device, surface)
                    .map_err(VulkanError::Api)?,
                surface_loader
                    .get_physical_device_surface_formats(physical_device, surface)
                    .map_err(VulkanError::Api)?,
                surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)
                    .map_err(VulkanError::Api)?,
            )
        };

        let format = formats
            .iter()
            .copied()
            .find(|sf| sf.format == Self::FORMAT)
            .ok_or_else(|| VulkanError::InitializationFailed(format!("Surface does not offer {:?}", Self::FORMAT)))?;
        if !caps.supported_usage_flags.contains(IMAGE_USAGE) {
            return Err(VulkanError::InitializationFailed(
                "Surface images cannot be used as storage images".to_string(),
            ));
        }

        let present_mode = present_modes
            .iter()
            .copied()
            .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
            .unwrap_or(vk::PresentModeKHR::FIFO);

        let extent = if caps.current_extent.width == u32::MAX {
            vk::Extent2D {
                width: framebuffer
                    .width
                    .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
                height: framebuffer
                    .height
                    .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
            }
        } else {
            caps.current_extent
        };

        let image_count = if caps.max_image_count > 0 {
            (caps.min_image_count + 1).min(caps.max_image_count)
        } else {
            caps.min_image_count + 1
        };

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(IMAGE_USAGE)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(self.swapchain);

        context.wait_idle()?;
        let swapchain = unsafe { loader.create_swapchain(&create_info, None).map_err(VulkanError::Api)? };
        self.destroy_views();
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe { loader.destroy_swapchain(self.swapchain, None) };
        }
        self.swapchain = swapchain;
        self.extent = extent;
        self.images = unsafe { loader.get_swapchain_images(swapchain).map_err(VulkanError::Api)? };
        self.image_views = self.create_views()?;

        log::info!(
            "Created swapchain: {}x{}, {} images, {:?}",
            extent.width,
            extent.height,
            self.images.len(),
            present_mode
        );
        Ok(())
    }

    fn create_views(&self) -> VulkanResult<Vec<vk::ImageView>> {
        let device = self.context.device();
        self.images
            .iter()
            .map(|&image| {
                let create_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(Self::FORMAT)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });
                unsafe { device.create_image_view(&create_info, None).map_err(VulkanError::Api) }
            })
            .collect()
    }

    fn destroy_views(&mut self) {
        let device = self.context.device();
        for view in self.image_views.drain(..) {
            unsafe { device.destroy_image_view(view, None) };
        }
    }

    /// Acquire the next image, signaling `semaphore` once it is ready
    ///
    /// Returns `None` when the swapchain no longer matches the surface and must be recreated.
    pub fn acquire(&self, semaphore: vk::Semaphore) -> VulkanResult<Option<u32>> {
        let loader = self.loader()?;
        match unsafe { loader.acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null()) } {
            Ok((index, _suboptimal)) => Ok(Some(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(None),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Queue image `index` for presentation after `wait` signals
    ///
    /// Returns `false` when the swapchain is suboptimal or out of date.
    pub fn present(&self, index: u32, wait: vk::Semaphore) -> VulkanResult<bool> {
        let loader = self.loader()?;
        let swapchains = [self.swapchain];
        let indices = [index];
        let waits = [wait];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&indices);

        let queue = self.context.queue();
        match unsafe { loader.queue_present(*queue, &present_info) } {
            Ok(suboptimal) => Ok(!suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(false),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Image at `index`
    pub fn image(&self, index: u32) -> vk::Image {
        self.images[index as usize]
    }

    /// View of the image at `index`
    pub fn image_view(&self, index: u32) -> vk::ImageView {
        self.image_views[index as usize]
    }

    /// Number of images
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Current image size
    pub const fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        if let Err(e) = self.context.wait_idle() {
            log::error!("Failed to wait for device idle before destroying swapchain: {}", e);
        }
        self.destroy_views();
        if let Some(loader) = self.context.swapchain_loader() {
            unsafe { loader.destroy_swapchain(self.swapchain, None) };
        }
    }
}
