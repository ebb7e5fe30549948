// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Physical device selection (prefer discrete GPU, else first enumerated)
// - Queue family selection (first family with graphics + present)
// - Logical device + queue creation
// - Graphics command pool
//
// The device owns the instance and (optionally) the surface so that
// teardown happens in the one order Vulkan accepts.

use super::error::{RenderError, Result, VkResultExt};
use super::instance::VulkanInstance;
use super::surface::Surface;
use ash::vk;
use std::ffi::CStr;
use std::sync::Arc;

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,

    // One queue handles both graphics submission and presentation
    pub queue: vk::Queue,
    pub queue_family: u32,

    /// Pool for the frame command buffer and one-shot upload buffers
    pub command_pool: vk::CommandPool,

    // Device properties (cached)
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,

    surface: Option<Surface>,
    // Dropped last
    instance: VulkanInstance,
}

impl VulkanDevice {
    /// Create a device able to present to `surface`.
    pub fn new(instance: VulkanInstance, surface: Surface) -> Result<Arc<Self>> {
        Self::create(instance, Some(surface))
    }

    /// Create a device without presentation support (offscreen work, tests).
    pub fn headless(instance: VulkanInstance) -> Result<Arc<Self>> {
        Self::create(instance, None)
    }

    fn create(instance: VulkanInstance, surface: Option<Surface>) -> Result<Arc<Self>> {
        let parts = match DeviceParts::new(&instance.instance, surface.as_ref()) {
            Ok(parts) => parts,
            Err(e) => {
                // The surface must not outlive the instance dropped below
                if let Some(surface) = surface {
                    unsafe { surface.destroy() };
                }
                return Err(e);
            }
        };

        Ok(Arc::new(Self {
            device: parts.device,
            physical_device: parts.physical_device,
            queue: parts.queue,
            queue_family: parts.queue_family,
            command_pool: parts.command_pool,
            properties: parts.properties,
            memory_properties: parts.memory_properties,
            surface,
            instance,
        }))
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.instance.instance
    }

    pub fn surface(&self) -> Result<&Surface> {
        self.surface.as_ref().ok_or(RenderError::Headless)
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.vk_context("vkDeviceWaitIdle")
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        let _ = self.wait_idle();

        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
            if let Some(surface) = self.surface.take() {
                surface.destroy();
            }
        }
        // instance is destroyed when the field drops
    }
}

struct DeviceParts {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    queue: vk::Queue,
    queue_family: u32,
    command_pool: vk::CommandPool,
    properties: vk::PhysicalDeviceProperties,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl DeviceParts {
    fn new(vk_instance: &ash::Instance, surface: Option<&Surface>) -> Result<Self> {
        // Step 1: Pick physical device (GPU)
        let devices = unsafe { vk_instance.enumerate_physical_devices() }
            .vk_context("vkEnumeratePhysicalDevices")?;
        let device_types: Vec<_> = devices
            .iter()
            .map(|&d| unsafe { vk_instance.get_physical_device_properties(d) }.device_type)
            .collect();
        let physical_device = select_physical_device(&device_types)
            .map(|i| devices[i])
            .ok_or(RenderError::NoPhysicalDevice)?;

        let properties = unsafe { vk_instance.get_physical_device_properties(physical_device) };
        let memory_properties =
            unsafe { vk_instance.get_physical_device_memory_properties(physical_device) };

        log::info!("Selected GPU: {} ({:?})",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy(),
            properties.device_type);
        log::info!("API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version));

        // Step 2: Find the graphics + present queue family
        let families = unsafe {
            vk_instance.get_physical_device_queue_family_properties(physical_device)
        };
        let queue_family = select_queue_family(&families, |index| match surface {
            Some(surface) => surface.supports_present(physical_device, index),
            None => Ok(true),
        })?
        .ok_or(RenderError::NoSuitableQueueFamily)?;
        log::info!("Using queue family {} of {}", queue_family, families.len());

        // Step 3: Create logical device
        let (device, queue) = create_logical_device(
            vk_instance,
            physical_device,
            queue_family,
            surface.is_some(),
        )?;

        // Step 4: Command pool
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(queue_family)
            // RESET: the frame command buffer is reset and re-recorded every frame
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = match unsafe { device.create_command_pool(&pool_info, None) } {
            Ok(pool) => pool,
            Err(result) => {
                unsafe { device.destroy_device(None) };
                return Err(RenderError::Vulkan { call: "vkCreateCommandPool", result });
            }
        };

        Ok(Self {
            device,
            physical_device,
            queue,
            queue_family,
            command_pool,
            properties,
            memory_properties,
        })
    }
}

/// Pick a physical device: the first discrete GPU, else the first device.
///
/// Returns `None` only when `device_types` is empty.
pub fn select_physical_device(device_types: &[vk::PhysicalDeviceType]) -> Option<usize> {
    device_types
        .iter()
        .position(|&t| t == vk::PhysicalDeviceType::DISCRETE_GPU)
        .or(if device_types.is_empty() { None } else { Some(0) })
}

/// First queue family with graphics support that can also present.
///
/// No scoring: when several families qualify, the lowest index wins.
pub fn select_queue_family(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> Result<bool>,
) -> Result<Option<u32>> {
    for (index, family) in families.iter().enumerate() {
        let index = index as u32;
        if family.queue_count == 0 || !family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            continue;
        }
        if supports_present(index)? {
            return Ok(Some(index));
        }
    }
    Ok(None)
}

fn create_logical_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    queue_family: u32,
    enable_swapchain: bool,
) -> Result<(ash::Device, vk::Queue)> {
    let queue_priorities = [1.0];
    let queue_create_info = vk::DeviceQueueCreateInfo::builder()
        .queue_family_index(queue_family)
        .queue_priorities(&queue_priorities)
        .build();

    let extensions = if enable_swapchain {
        vec![ash::extensions::khr::Swapchain::name().as_ptr()]
    } else {
        vec![]
    };

    let create_info = vk::DeviceCreateInfo::builder()
        .queue_create_infos(std::slice::from_ref(&queue_create_info))
        .enabled_extension_names(&extensions);

    let device = unsafe { instance.create_device(physical_device, &create_info, None) }
        .vk_context("vkCreateDevice")?;

    let queue = unsafe { device.get_device_queue(queue_family, 0) };

    Ok((device, queue))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn prefers_discrete_gpu() {
        let types = [
            vk::PhysicalDeviceType::INTEGRATED_GPU,
            vk::PhysicalDeviceType::CPU,
            vk::PhysicalDeviceType::DISCRETE_GPU,
            vk::PhysicalDeviceType::DISCRETE_GPU,
        ];
        assert_eq!(select_physical_device(&types), Some(2));
    }

    #[test]
    fn falls_back_to_first_device() {
        let types = [vk::PhysicalDeviceType::VIRTUAL_GPU, vk::PhysicalDeviceType::INTEGRATED_GPU];
        assert_eq!(select_physical_device(&types), Some(0));
    }

    #[test]
    fn no_devices_selects_nothing() {
        assert_eq!(select_physical_device(&[]), None);
    }

    #[test]
    fn first_graphics_family_with_present_wins() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        // family 1 can't present, 2 and 3 can
        let chosen = select_queue_family(&families, |i| Ok(i >= 2)).unwrap();
        assert_eq!(chosen, Some(2));
    }

    #[test]
    fn present_only_family_is_rejected() {
        let families = [family(vk::QueueFlags::COMPUTE), family(vk::QueueFlags::TRANSFER)];
        let mut queried = Vec::new();
        let chosen = select_queue_family(&families, |i| {
            queried.push(i);
            Ok(true)
        })
        .unwrap();
        assert_eq!(chosen, None);
        assert!(queried.is_empty());
    }

    #[test]
    fn present_query_errors_propagate() {
        let families = [family(vk::QueueFlags::GRAPHICS)];
        let result = select_queue_family(&families, |_| {
            Err(RenderError::Vulkan {
                call: "vkGetPhysicalDeviceSurfaceSupportKHR",
                result: vk::Result::ERROR_SURFACE_LOST_KHR,
            })
        });
        assert!(result.is_err());
    }
}
