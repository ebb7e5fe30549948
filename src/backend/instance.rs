// Vulkan Instance - entry point into the API
//
// Responsibilities:
// - Load the Vulkan library
// - Enable the surface extensions the window system needs
// - Optional validation layer + debug messenger feeding the `log` facade

use super::error::{RenderError, Result, VkResultExt};
use ash::{vk, Entry};
use raw_window_handle::RawDisplayHandle;
use std::ffi::{CStr, CString};

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance wrapper with automatic cleanup
pub struct VulkanInstance {
    pub instance: ash::Instance,
    pub entry: Entry,
    debug_utils: Option<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create an instance.
    ///
    /// `display` selects the platform surface extension; pass `None` for a
    /// headless instance that never presents.
    pub fn new(
        app_name: &str,
        enable_validation: bool,
        display: Option<RawDisplayHandle>,
    ) -> Result<Self> {
        log::info!("Creating Vulkan instance: {}", app_name);

        let entry = unsafe { Entry::load() }?;

        if enable_validation {
            check_validation_layer(&entry)?;
        }

        let app_name_cstr = CString::new(app_name).unwrap_or_default();
        let engine_name = c"quad-renderer";

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let mut extensions: Vec<*const std::ffi::c_char> = match display {
            Some(display) => required_surface_extensions(display)?
                .iter()
                .map(|name| name.as_ptr())
                .collect(),
            None => Vec::new(),
        };
        if enable_validation {
            extensions.push(ash::extensions::ext::DebugUtils::name().as_ptr());
        }

        let layer_names = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .vk_context("vkCreateInstance")?;

        let debug_utils = if enable_validation {
            match setup_debug_messenger(&entry, &instance) {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(Self {
            instance,
            entry,
            debug_utils,
        })
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Instance extensions needed to create a surface for this display.
pub fn required_surface_extensions(display: RawDisplayHandle) -> Result<[&'static CStr; 2]> {
    use ash::extensions::khr;

    let platform = match display {
        RawDisplayHandle::Windows(_) => khr::Win32Surface::name(),
        RawDisplayHandle::Xlib(_) => khr::XlibSurface::name(),
        RawDisplayHandle::Xcb(_) => khr::XcbSurface::name(),
        RawDisplayHandle::Wayland(_) => khr::WaylandSurface::name(),
        other => return Err(RenderError::UnsupportedPlatform(format!("{other:?}"))),
    };

    Ok([khr::Surface::name(), platform])
}

fn check_validation_layer(entry: &Entry) -> Result<()> {
    let layers = entry
        .enumerate_instance_layer_properties()
        .vk_context("vkEnumerateInstanceLayerProperties")?;

    let found = layers.iter().any(|layer| {
        let name = unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) };
        name == VALIDATION_LAYER
    });

    if !found {
        return Err(RenderError::ValidationLayerMissing(
            VALIDATION_LAYER.to_string_lossy().into_owned(),
        ));
    }
    Ok(())
}

fn setup_debug_messenger(
    entry: &Entry,
    instance: &ash::Instance,
) -> Result<(ash::extensions::ext::DebugUtils, vk::DebugUtilsMessengerEXT)> {
    let debug_utils = ash::extensions::ext::DebugUtils::new(entry, instance);

    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback));

    let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
        .vk_context("vkCreateDebugUtilsMessengerEXT")?;

    Ok((debug_utils, messenger))
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message).to_string_lossy();

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan][{:?}] {}", message_type, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan][{:?}] {}", message_type, message);
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            log::info!("[Vulkan][{:?}] {}", message_type, message);
        }
        _ => {
            log::debug!("[Vulkan][{:?}] {}", message_type, message);
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;
    use raw_window_handle::{WaylandDisplayHandle, WindowsDisplayHandle, XlibDisplayHandle};
    use std::ptr::NonNull;

    #[test]
    fn surface_extensions_follow_display_handle() {
        let xlib = RawDisplayHandle::Xlib(XlibDisplayHandle::new(None, 0));
        let [surface, platform] = required_surface_extensions(xlib).unwrap();
        assert_eq!(surface, c"VK_KHR_surface");
        assert_eq!(platform, c"VK_KHR_xlib_surface");

        let windows = RawDisplayHandle::Windows(WindowsDisplayHandle::new());
        assert_eq!(required_surface_extensions(windows).unwrap()[1], c"VK_KHR_win32_surface");

        let wayland = RawDisplayHandle::Wayland(WaylandDisplayHandle::new(NonNull::dangling()));
        assert_eq!(required_surface_extensions(wayland).unwrap()[1], c"VK_KHR_wayland_surface");
    }

    #[test]
    fn unknown_display_is_unsupported() {
        let web = RawDisplayHandle::Web(raw_window_handle::WebDisplayHandle::new());
        let err = required_surface_extensions(web).unwrap_err();
        assert!(matches!(err, RenderError::UnsupportedPlatform(_)));
    }
}
