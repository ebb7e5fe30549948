// Graphics context - everything the rest of the renderer needs from Vulkan
//
// Bundles the device (with its queue and command pool) and the swapchain.

use super::error::Result;
use super::instance::VulkanInstance;
use super::surface::{Surface, SurfaceTarget};
use super::swapchain::Swapchain;
use super::VulkanDevice;
use ash::vk;
use std::sync::Arc;

pub struct GraphicsContext {
    // Declared first: the swapchain must go before the device it holds
    pub swapchain: Swapchain,
    pub device: Arc<VulkanDevice>,
}

impl GraphicsContext {
    /// Bring up instance, surface, device and swapchain for `target`.
    ///
    /// `extent_hint` is only used when the surface does not report its own size.
    pub fn acquire(
        app_name: &str,
        enable_validation: bool,
        target: &SurfaceTarget,
        extent_hint: vk::Extent2D,
    ) -> Result<Self> {
        let instance = VulkanInstance::new(app_name, enable_validation, Some(target.display))?;
        let surface = Surface::new(&instance, target)?;
        let device = VulkanDevice::new(instance, surface)?;
        let swapchain = Swapchain::new(Arc::clone(&device), extent_hint)?;

        Ok(Self { swapchain, device })
    }

    pub fn format(&self) -> vk::Format {
        self.swapchain.format
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.swapchain.image_views
    }

    pub fn queue(&self) -> vk::Queue {
        self.device.queue
    }
}
