// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// Fixed shape: exactly 2 images, B8G8R8A8_SRGB, FIFO (vsync).

use super::error::{RenderError, Result, VkResultExt};
use super::VulkanDevice;
use ash::vk;
use std::sync::Arc;

pub const SWAPCHAIN_IMAGE_COUNT: u32 = 2;

pub const SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Index of a swapchain image, always `< SWAPCHAIN_IMAGE_COUNT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageIndex(u32);

impl ImageIndex {
    pub fn new(raw: u32) -> Result<Self> {
        if raw < SWAPCHAIN_IMAGE_COUNT {
            Ok(Self(raw))
        } else {
            Err(RenderError::ImageIndexOutOfRange {
                index: raw,
                count: SWAPCHAIN_IMAGE_COUNT,
            })
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl TryFrom<u32> for ImageIndex {
    type Error = RenderError;

    fn try_from(raw: u32) -> Result<Self> {
        Self::new(raw)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Image { index: ImageIndex, suboptimal: bool },
    Outdated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented { suboptimal: bool },
    Outdated,
}

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::extensions::khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    device: Arc<VulkanDevice>,
}

impl Swapchain {
    pub fn new(device: Arc<VulkanDevice>, extent_hint: vk::Extent2D) -> Result<Self> {
        let surface = device.surface()?;

        // Query surface capabilities
        let surface_caps = surface.capabilities(device.physical_device)?;
        check_image_count_support(&surface_caps)?;

        // The format is fixed; refuse to fall back to something else silently
        let formats = surface.formats(device.physical_device)?;
        if !supports_surface_format(&formats) {
            return Err(RenderError::UnsupportedSurfaceFormat {
                format: SURFACE_FORMAT.format,
                color_space: SURFACE_FORMAT.color_space,
            });
        }

        let extent = choose_extent(&surface_caps, extent_hint);
        log::info!(
            "Creating swapchain: {}x{} {:?} FIFO",
            extent.width,
            extent.height,
            SURFACE_FORMAT.format
        );

        let swapchain_loader =
            ash::extensions::khr::Swapchain::new(device.instance(), &device.device);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.surface)
            .min_image_count(SWAPCHAIN_IMAGE_COUNT)
            .image_format(SURFACE_FORMAT.format)
            .image_color_space(SURFACE_FORMAT.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            // FIFO is always supported
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .vk_context("vkCreateSwapchainKHR")?;

        let destroy_swapchain = |err: RenderError| {
            unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
            err
        };

        // Get swapchain images
        let images = unsafe { swapchain_loader.get_swapchain_images(swapchain) }
            .vk_context("vkGetSwapchainImagesKHR")
            .map_err(destroy_swapchain)?;

        // The driver may hand out more than we asked for
        if images.len() as u32 != SWAPCHAIN_IMAGE_COUNT {
            return Err(destroy_swapchain(RenderError::SwapchainImageCount {
                expected: SWAPCHAIN_IMAGE_COUNT,
                actual: images.len() as u32,
            }));
        }

        log::info!("Created swapchain with {} images", images.len());

        // Create image views
        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            match create_image_view(&device.device, image, SURFACE_FORMAT.format) {
                Ok(view) => image_views.push(view),
                Err(e) => {
                    for view in image_views {
                        unsafe { device.device.destroy_image_view(view, None) };
                    }
                    return Err(destroy_swapchain(e));
                }
            }
        }

        Ok(Self {
            swapchain,
            swapchain_loader,
            images,
            image_views,
            format: SURFACE_FORMAT.format,
            extent,
            device,
        })
    }

    /// Acquire next image for rendering, signaling `semaphore` when it is ready.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<AcquireOutcome> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, suboptimal)) => Ok(AcquireOutcome::Image {
                index: ImageIndex::new(index)?,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::Outdated),
            Err(result) => Err(RenderError::Vulkan {
                call: "vkAcquireNextImageKHR",
                result,
            }),
        }
    }

    /// Present rendered image to screen
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: ImageIndex,
        wait_semaphore: vk::Semaphore,
    ) -> Result<PresentOutcome> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [self.swapchain];
        let image_indices = [image_index.get()];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) };

        match result {
            Ok(suboptimal) => Ok(PresentOutcome::Presented { suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Outdated),
            Err(result) => Err(RenderError::Vulkan {
                call: "vkQueuePresentKHR",
                result,
            }),
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

/// Fail unless the surface can hold exactly [`SWAPCHAIN_IMAGE_COUNT`] images.
pub fn check_image_count_support(caps: &vk::SurfaceCapabilitiesKHR) -> Result<()> {
    let too_few_allowed = caps.max_image_count != 0 && caps.max_image_count < SWAPCHAIN_IMAGE_COUNT;
    if caps.min_image_count > SWAPCHAIN_IMAGE_COUNT || too_few_allowed {
        let actual = if too_few_allowed {
            caps.max_image_count
        } else {
            caps.min_image_count
        };
        return Err(RenderError::SwapchainImageCount {
            expected: SWAPCHAIN_IMAGE_COUNT,
            actual,
        });
    }
    Ok(())
}

pub fn supports_surface_format(formats: &[vk::SurfaceFormatKHR]) -> bool {
    // A single UNDEFINED entry means "anything goes"
    if let [only] = formats {
        if only.format == vk::Format::UNDEFINED {
            return true;
        }
    }
    formats.iter().any(|f| {
        f.format == SURFACE_FORMAT.format && f.color_space == SURFACE_FORMAT.color_space
    })
}

/// The surface's current extent, or the hint clamped to its limits when the
/// surface leaves the choice to us.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, hint: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: hint
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: hint
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

pub(crate) fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
) -> Result<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    unsafe { device.create_image_view(&create_info, None) }.vk_context("vkCreateImageView")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::error::ErrorKind;

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D { width: 800, height: 600 },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
            ..Default::default()
        }
    }

    #[test]
    fn image_index_rejects_out_of_range() {
        assert_eq!(ImageIndex::new(0).unwrap().get(), 0);
        assert_eq!(ImageIndex::try_from(1).unwrap().as_usize(), 1);
        assert!(matches!(
            ImageIndex::new(2),
            Err(RenderError::ImageIndexOutOfRange { index: 2, count: 2 })
        ));
        assert!(ImageIndex::new(u32::MAX).is_err());
    }

    #[test]
    fn two_images_fit_common_surfaces() {
        assert!(check_image_count_support(&caps(1, 0)).is_ok());
        assert!(check_image_count_support(&caps(2, 8)).is_ok());
        assert!(check_image_count_support(&caps(1, 2)).is_ok());
    }

    #[test]
    fn image_count_outside_limits_is_exhaustion() {
        let err = check_image_count_support(&caps(3, 8)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceExhaustion);
        let err = check_image_count_support(&caps(1, 1)).unwrap_err();
        assert!(matches!(
            err,
            RenderError::SwapchainImageCount { expected: 2, actual: 1 }
        ));
    }

    #[test]
    fn format_support() {
        assert!(supports_surface_format(&[SURFACE_FORMAT]));
        assert!(supports_surface_format(&[vk::SurfaceFormatKHR {
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }]));
        assert!(!supports_surface_format(&[vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }]));
        assert!(!supports_surface_format(&[]));
    }

    #[test]
    fn extent_uses_current_or_clamped_hint() {
        let hint = vk::Extent2D { width: 10_000, height: 300 };
        assert_eq!(choose_extent(&caps(2, 0), hint), vk::Extent2D { width: 800, height: 600 });

        let mut free = caps(2, 0);
        free.current_extent = vk::Extent2D { width: u32::MAX, height: u32::MAX };
        assert_eq!(choose_extent(&free, hint), vk::Extent2D { width: 4096, height: 300 });
    }
}
