//! Vulkan context management
//!
//! [`VulkanContext`] owns the instance, the optional window surface, the selected physical
//! device and a logical device with one queue that handles graphics, compute, transfer and
//! presentation. Vulkan 1.3 is required for dynamic rendering and synchronization2.

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Entry, Instance};
use std::ffi::{c_char, CStr, CString};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::commands::VulkanCommandRecorder;
use super::device::{DescriptorWrite, GpuDevice};
use super::error::{VulkanError, VulkanResult};
use super::window::Window;
use crate::config::RendererConfig;
use crate::render::submit::SubmissionInfo;

const VALIDATION_LAYER: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };
const ENGINE_NAME: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"render_engine\0") };

/// Instance with its optional debug messenger
struct InstanceParts {
    entry: Entry,
    instance: Instance,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl InstanceParts {
    fn create(config: &RendererConfig, window_extensions: &[String]) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {e}")))?;

        let app_name = CString::new(config.application_name.as_str())
            .map_err(|_| VulkanError::InitializationFailed("Application name contains a nul byte".to_string()))?;
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_3);

        let mut extension_names = window_extensions
            .iter()
            .map(|name| CString::new(name.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| VulkanError::InitializationFailed("Extension name contains a nul byte".to_string()))?;

        let validation = config.enable_validation && Self::has_validation_layer(&entry);
        if config.enable_validation && !validation {
            log::warn!("Validation requested but {:?} is not installed", VALIDATION_LAYER);
        }
        if validation {
            extension_names.push(DebugUtils::name().to_owned());
        }

        let extension_ptrs: Vec<*const c_char> = extension_names.iter().map(|name| name.as_ptr()).collect();
        let layer_ptrs: Vec<*const c_char> = if validation { vec![VALIDATION_LAYER.as_ptr()] } else { Vec::new() };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None).map_err(VulkanError::Api)? };

        let debug = if validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            match Self::create_messenger(&debug_utils) {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        log::info!("Created Vulkan 1.3 instance (validation: {})", validation);
        Ok(Self { entry, instance, debug })
    }

    fn has_validation_layer(entry: &Entry) -> bool {
        entry.enumerate_instance_layer_properties().is_ok_and(|layers| {
            layers
                .iter()
                .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER)
        })
    }

    fn create_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    fn destroy(self) {
        unsafe {
            if let Some((debug_utils, messenger)) = &self.debug {
                debug_utils.destroy_debug_utils_messenger(*messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Routes validation messages into `log`
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Physical device chosen for rendering
struct SelectedDevice {
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
    name: String,
}

impl SelectedDevice {
    /// First suitable device, discrete GPUs ahead of the rest
    fn select(instance: &Instance, surface: Option<(&Surface, vk::SurfaceKHR)>) -> VulkanResult<Self> {
        let mut devices = unsafe { instance.enumerate_physical_devices().map_err(VulkanError::Api)? };
        devices.sort_by_key(|&device| {
            let properties = unsafe { instance.get_physical_device_properties(device) };
            properties.device_type != vk::PhysicalDeviceType::DISCRETE_GPU
        });

        devices
            .into_iter()
            .find_map(|device| Self::check(instance, device, surface))
            .ok_or_else(|| VulkanError::InitializationFailed("No suitable Vulkan 1.3 device found".to_string()))
    }

    fn check(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: Option<(&Surface, vk::SurfaceKHR)>,
    ) -> Option<Self> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        if properties.api_version < vk::API_VERSION_1_3 {
            log::debug!("Skipping {}: Vulkan 1.3 not supported", name);
            return None;
        }

        let mut features13 = vk::PhysicalDeviceVulkan13Features::default();
        let mut features = vk::PhysicalDeviceFeatures2::builder().push_next(&mut features13);
        unsafe { instance.get_physical_device_features2(device, &mut features) };
        let storage_without_format = features.features.shader_storage_image_write_without_format;
        if features13.dynamic_rendering == vk::FALSE
            || features13.synchronization2 == vk::FALSE
            || storage_without_format == vk::FALSE
        {
            log::debug!("Skipping {}: required features missing", name);
            return None;
        }

        if surface.is_some() && !Self::supports_swapchain(instance, device) {
            log::debug!("Skipping {}: no swapchain support", name);
            return None;
        }

        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
        let required = vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE;
        let queue_family = families.iter().enumerate().find_map(|(index, family)| {
            let index = u32::try_from(index).ok()?;
            let presents = surface.map_or(Ok(true), |(loader, surface)| unsafe {
                loader.get_physical_device_surface_support(device, index, surface)
            });
            (family.queue_flags.contains(required) && presents == Ok(true)).then_some(index)
        })?;

        Some(Self {
            physical_device: device,
            queue_family,
            name,
        })
    }

    fn supports_swapchain(instance: &Instance, device: vk::PhysicalDevice) -> bool {
        unsafe { instance.enumerate_device_extension_properties(device) }.is_ok_and(|extensions| {
            extensions
                .iter()
                .any(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) } == SwapchainLoader::name())
        })
    }
}

/// Instance, device and queue shared by the renderer
pub struct VulkanContext {
    entry: Entry,
    instance: Instance,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    surface: Option<(Surface, vk::SurfaceKHR)>,
    physical_device: vk::PhysicalDevice,
    device_name: String,
    device: Device,
    queue: Mutex<vk::Queue>,
    queue_family: u32,
    swapchain_loader: Option<SwapchainLoader>,
}

impl VulkanContext {
    /// Context presenting to `window`
    pub fn new(window: &Window, config: &RendererConfig) -> VulkanResult<Self> {
        let extensions = window
            .required_instance_extensions()
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;
        let parts = InstanceParts::create(config, &extensions)?;

        let surface = match window.create_vulkan_surface(parts.instance.handle()) {
            Ok(surface) => surface,
            Err(e) => {
                parts.destroy();
                return Err(VulkanError::InitializationFailed(e.to_string()));
            }
        };
        let surface_loader = Surface::new(&parts.entry, &parts.instance);

        Self::with_parts(parts, Some((surface_loader, surface)))
    }

    /// Context without a surface, for offscreen work
    pub fn headless(config: &RendererConfig) -> VulkanResult<Self> {
        let parts = InstanceParts::create(config, &[])?;
        Self::with_parts(parts, None)
    }

    fn with_parts(parts: InstanceParts, surface: Option<(Surface, vk::SurfaceKHR)>) -> VulkanResult<Self> {
        let created = SelectedDevice::select(&parts.instance, surface.as_ref().map(|(loader, s)| (loader, *s)))
            .and_then(|selected| {
                Self::create_device(&parts.instance, &selected).map(|device| (selected, device))
            });

        let (selected, device) = match created {
            Ok(created) => created,
            Err(e) => {
                if let Some((loader, surface)) = &surface {
                    unsafe { loader.destroy_surface(*surface, None) };
                }
                parts.destroy();
                return Err(e);
            }
        };

        let queue = unsafe { device.get_device_queue(selected.queue_family, 0) };
        let swapchain_loader = surface.as_ref().map(|_| SwapchainLoader::new(&parts.instance, &device));
        log::info!("Using {} (queue family {})", selected.name, selected.queue_family);

        let InstanceParts { entry, instance, debug } = parts;
        Ok(Self {
            entry,
            instance,
            debug,
            surface,
            physical_device: selected.physical_device,
            device_name: selected.name,
            device,
            queue: Mutex::new(queue),
            queue_family: selected.queue_family,
            swapchain_loader,
        })
    }

    fn create_device(instance: &Instance, selected: &SelectedDevice) -> VulkanResult<Device> {
        let priorities = [1.0];
        let queue_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(selected.queue_family)
            .queue_priorities(&priorities);
        let queue_infos = [queue_info.build()];

        // Also enabled headless where available, so offscreen frames may end in PRESENT_SRC_KHR
        let extensions: Vec<*const c_char> = if SelectedDevice::supports_swapchain(instance, selected.physical_device) {
            vec![SwapchainLoader::name().as_ptr()]
        } else {
            Vec::new()
        };
        let mut features13 = vk::PhysicalDeviceVulkan13Features::builder()
            .dynamic_rendering(true)
            .synchronization2(true);

        // Swapchain images are written by the tonemapper without a format qualifier
        let features = vk::PhysicalDeviceFeatures::builder().shader_storage_image_write_without_format(true);

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features)
            .push_next(&mut features13);

        unsafe {
            instance
                .create_device(selected.physical_device, &create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    /// Loader entry points
    pub const fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Instance
    pub const fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Logical device
    pub const fn device(&self) -> &Device {
        &self.device
    }

    /// Selected physical device
    pub const fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Name reported by the driver
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Exclusive access to the queue for submission and presentation
    pub fn queue(&self) -> MutexGuard<'_, vk::Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Family of [`Self::queue`]
    pub const fn queue_family(&self) -> u32 {
        self.queue_family
    }

    /// Window surface, absent for headless contexts
    pub fn surface(&self) -> Option<vk::SurfaceKHR> {
        self.surface.as_ref().map(|(_, surface)| *surface)
    }

    /// Surface extension loader, absent for headless contexts
    pub fn surface_loader(&self) -> Option<&Surface> {
        self.surface.as_ref().map(|(loader, _)| loader)
    }

    /// Swapchain extension loader, absent for headless contexts
    pub const fn swapchain_loader(&self) -> Option<&SwapchainLoader> {
        self.swapchain_loader.as_ref()
    }

    /// Block until the device has finished all work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle().map_err(VulkanError::Api) }
    }
}

/// Storage for descriptor infos referenced by `vk::WriteDescriptorSet`
enum DescriptorInfo {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorType, vk::DescriptorImageInfo),
}

impl From<&DescriptorWrite> for DescriptorInfo {
    fn from(write: &DescriptorWrite) -> Self {
        match *write {
            DescriptorWrite::UniformBuffer { buffer, range, .. } => Self::Buffer(vk::DescriptorBufferInfo {
                buffer,
                offset: 0,
                range,
            }),
            DescriptorWrite::CombinedImageSampler {
                view, sampler, layout, ..
            } => Self::Image(
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::DescriptorImageInfo {
                    sampler,
                    image_view: view,
                    image_layout: layout,
                },
            ),
            DescriptorWrite::StorageImage { view, layout, .. } => Self::Image(
                vk::DescriptorType::STORAGE_IMAGE,
                vk::DescriptorImageInfo {
                    sampler: vk::Sampler::null(),
                    image_view: view,
                    image_layout: layout,
                },
            ),
        }
    }
}

impl GpuDevice for VulkanContext {
    type Recorder<'a> = VulkanCommandRecorder<'a>;

    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        unsafe { self.device.create_fence(&create_info, None).map_err(VulkanError::Api) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn reset_fence(&self, fence: vk::Fence) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[fence]).map_err(VulkanError::Api) }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VulkanResult<bool> {
        match unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) } {
            Ok(()) => Ok(true),
            Err(vk::Result::TIMEOUT) => Ok(false),
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    fn submit(&self, info: &SubmissionInfo, fence: vk::Fence) -> VulkanResult<()> {
        let command_buffers = [info.command_buffer];
        let (wait_semaphores, wait_stages) = info
            .wait
            .as_ref()
            .map(|wait| (vec![wait.semaphore], vec![wait.stage]))
            .unwrap_or_default();
        let signal_semaphores: Vec<vk::Semaphore> = info.signal.into_iter().collect();

        let submit_info = vk::SubmitInfo::builder()
            .command_buffers(&command_buffers)
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .signal_semaphores(&signal_semaphores);

        let queue = self.queue();
        unsafe {
            self.device
                .queue_submit(*queue, &[submit_info.build()], fence)
                .map_err(VulkanError::Api)
        }
    }

    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VulkanResult<vk::CommandBuffer> {
        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let mut buffers = unsafe { self.device.allocate_command_buffers(&allocate_info).map_err(VulkanError::Api)? };
        buffers.pop().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "driver returned no command buffer".to_string(),
        })
    }

    fn free_command_buffer(&self, pool: vk::CommandPool, command_buffer: vk::CommandBuffer) {
        unsafe { self.device.free_command_buffers(pool, &[command_buffer]) };
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VulkanResult<vk::DescriptorSet> {
        let layouts = [layout];
        let allocate_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        let mut sets = unsafe { self.device.allocate_descriptor_sets(&allocate_info).map_err(VulkanError::Api)? };
        sets.pop().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "driver returned no descriptor set".to_string(),
        })
    }

    fn write_descriptor_sets(&self, writes: &[DescriptorWrite]) {
        let infos: Vec<DescriptorInfo> = writes.iter().map(DescriptorInfo::from).collect();
        let raw: Vec<vk::WriteDescriptorSet> = writes
            .iter()
            .zip(&infos)
            .map(|(write, info)| {
                let builder = vk::WriteDescriptorSet::builder()
                    .dst_set(write.set())
                    .dst_binding(write.binding());
                match info {
                    DescriptorInfo::Buffer(buffer) => builder
                        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                        .buffer_info(std::slice::from_ref(buffer))
                        .build(),
                    DescriptorInfo::Image(ty, image) => builder
                        .descriptor_type(*ty)
                        .image_info(std::slice::from_ref(image))
                        .build(),
                }
            })
            .collect();

        unsafe { self.device.update_descriptor_sets(&raw, &[]) };
    }

    fn recorder(&self, command_buffer: vk::CommandBuffer) -> Self::Recorder<'_> {
        VulkanCommandRecorder::new(&self.device, command_buffer)
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                log::error!("Failed to wait for device idle on drop: {:?}", e);
            }
            self.device.destroy_device(None);
            if let Some((loader, surface)) = &self.surface {
                loader.destroy_surface(*surface, None);
            }
            if let Some((debug_utils, messenger)) = &self.debug {
                debug_utils.destroy_debug_utils_messenger(*messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        log::debug!("Destroyed Vulkan context");
    }
}
