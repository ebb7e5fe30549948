// Surface - connection between Vulkan and the native window
//
// The windowing layer hands us raw display/window handles; we turn them
// into a VkSurfaceKHR for whichever window system is running.

use super::error::{RenderError, Result, VkResultExt};
use super::instance::VulkanInstance;
use ash::vk;
use raw_window_handle::{
    HasDisplayHandle, HasWindowHandle, RawDisplayHandle, RawWindowHandle,
};

/// Native surface-creation token supplied by the windowing layer.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceTarget {
    pub display: RawDisplayHandle,
    pub window: RawWindowHandle,
}

impl SurfaceTarget {
    pub fn from_window(window: &(impl HasDisplayHandle + HasWindowHandle)) -> Result<Self> {
        let display = window
            .display_handle()
            .map_err(|e| RenderError::UnsupportedPlatform(e.to_string()))?
            .as_raw();
        let window = window
            .window_handle()
            .map_err(|e| RenderError::UnsupportedPlatform(e.to_string()))?
            .as_raw();
        Ok(Self { display, window })
    }
}

pub struct Surface {
    pub surface: vk::SurfaceKHR,
    pub loader: ash::extensions::khr::Surface,
}

impl Surface {
    /// Create a surface for the target window.
    ///
    /// The window behind `target` must outlive the returned surface.
    pub fn new(instance: &VulkanInstance, target: &SurfaceTarget) -> Result<Self> {
        let surface = unsafe { create_platform_surface(instance, target) }?;
        let loader = ash::extensions::khr::Surface::new(&instance.entry, &instance.instance);
        Ok(Self { surface, loader })
    }

    /// Whether `queue_family` of `physical_device` can present to this surface.
    pub fn supports_present(
        &self,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> Result<bool> {
        unsafe {
            self.loader
                .get_physical_device_surface_support(physical_device, queue_family, self.surface)
        }
        .vk_context("vkGetPhysicalDeviceSurfaceSupportKHR")
    }

    pub fn capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)
        }
        .vk_context("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")
    }

    pub fn formats(&self, physical_device: vk::PhysicalDevice) -> Result<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.loader
                .get_physical_device_surface_formats(physical_device, self.surface)
        }
        .vk_context("vkGetPhysicalDeviceSurfaceFormatsKHR")
    }

    /// Destroy the surface. The instance must still be alive.
    pub unsafe fn destroy(&self) {
        self.loader.destroy_surface(self.surface, None);
    }
}

unsafe fn create_platform_surface(
    instance: &VulkanInstance,
    target: &SurfaceTarget,
) -> Result<vk::SurfaceKHR> {
    use ash::extensions::khr;

    let entry = &instance.entry;
    let instance = &instance.instance;

    match (target.display, target.window) {
        (RawDisplayHandle::Windows(_), RawWindowHandle::Win32(handle)) => {
            let hinstance = handle.hinstance.map(|h| h.get()).unwrap_or(0) as vk::HINSTANCE;
            let hwnd = handle.hwnd.get() as vk::HWND;
            let create_info = vk::Win32SurfaceCreateInfoKHR::builder()
                .hinstance(hinstance)
                .hwnd(hwnd);
            khr::Win32Surface::new(entry, instance)
                .create_win32_surface(&create_info, None)
                .vk_context("vkCreateWin32SurfaceKHR")
        }
        (RawDisplayHandle::Xlib(display), RawWindowHandle::Xlib(window)) => {
            let dpy = display
                .display
                .ok_or_else(|| RenderError::UnsupportedPlatform("Xlib display is null".into()))?;
            let create_info = vk::XlibSurfaceCreateInfoKHR::builder()
                .dpy(dpy.as_ptr() as *mut vk::Display)
                .window(window.window);
            khr::XlibSurface::new(entry, instance)
                .create_xlib_surface(&create_info, None)
                .vk_context("vkCreateXlibSurfaceKHR")
        }
        (RawDisplayHandle::Xcb(display), RawWindowHandle::Xcb(window)) => {
            let connection = display
                .connection
                .ok_or_else(|| RenderError::UnsupportedPlatform("XCB connection is null".into()))?;
            let create_info = vk::XcbSurfaceCreateInfoKHR::builder()
                .connection(connection.as_ptr())
                .window(window.window.get());
            khr::XcbSurface::new(entry, instance)
                .create_xcb_surface(&create_info, None)
                .vk_context("vkCreateXcbSurfaceKHR")
        }
        (RawDisplayHandle::Wayland(display), RawWindowHandle::Wayland(window)) => {
            let create_info = vk::WaylandSurfaceCreateInfoKHR::builder()
                .display(display.display.as_ptr())
                .surface(window.surface.as_ptr());
            khr::WaylandSurface::new(entry, instance)
                .create_wayland_surface(&create_info, None)
                .vk_context("vkCreateWaylandSurfaceKHR")
        }
        (display, window) => Err(RenderError::UnsupportedPlatform(format!(
            "{display:?} / {window:?}"
        ))),
    }
}
