// Images: texture storage, views, samplers and layout transitions
//
// Layouts only move forward along
//   UNDEFINED -> TRANSFER_DST_OPTIMAL -> SHADER_READ_ONLY_OPTIMAL (-> TRANSFER_SRC_OPTIMAL for read-back)
// Skipping or reordering a step is an error, not a silent fix-up.

use super::buffer::allocate_memory;
use super::error::{RenderError, Result, VkResultExt};
use super::VulkanDevice;
use ash::vk;

pub const COLOR_SUBRESOURCE_RANGE: vk::ImageSubresourceRange = vk::ImageSubresourceRange {
    aspect_mask: vk::ImageAspectFlags::COLOR,
    base_mip_level: 0,
    level_count: 1,
    base_array_layer: 0,
    layer_count: 1,
};

/// Access masks and pipeline stages for one layout transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BarrierMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Barrier parameters for `from -> to`, or an error if the step isn't allowed.
pub fn barrier_masks(from: vk::ImageLayout, to: vk::ImageLayout) -> Result<BarrierMasks> {
    use vk::ImageLayout as L;

    let masks = match (from, to) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => BarrierMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        },
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => BarrierMasks {
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        },
        (L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_SRC_OPTIMAL) => BarrierMasks {
            src_access: vk::AccessFlags::SHADER_READ,
            dst_access: vk::AccessFlags::TRANSFER_READ,
            src_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        },
        _ => return Err(RenderError::LayoutTransition { from, to }),
    };
    Ok(masks)
}

/// A 2D single-mip image with dedicated memory.
#[derive(Debug)]
pub struct GpuImage {
    pub image: vk::Image,
    pub memory: vk::DeviceMemory,
    pub view: Option<vk::ImageView>,
    pub sampler: Option<vk::Sampler>,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    layout: vk::ImageLayout,
}

impl GpuImage {
    pub fn new(
        device: &VulkanDevice,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Result<Self> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .samples(vk::SampleCountFlags::TYPE_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = unsafe { device.device.create_image(&image_info, None) }
            .vk_context("vkCreateImage")?;

        let mem_requirements = unsafe { device.device.get_image_memory_requirements(image) };
        let (memory, _) = match allocate_memory(
            device,
            mem_requirements,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        if let Err(result) = unsafe { device.device.bind_image_memory(image, memory, 0) } {
            unsafe {
                device.device.destroy_image(image, None);
                device.device.free_memory(memory, None);
            }
            return Err(RenderError::Vulkan { call: "vkBindImageMemory", result });
        }

        Ok(Self {
            image,
            memory,
            view: None,
            sampler: None,
            extent,
            format,
            layout: vk::ImageLayout::UNDEFINED,
        })
    }

    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    /// Note a layout change done by a render pass (its final layout) rather
    /// than by a barrier.
    pub fn finish_render_pass(&mut self, final_layout: vk::ImageLayout) {
        self.layout = final_layout;
    }

    /// Record a pipeline barrier moving the image to `new_layout`.
    ///
    /// The tracked layout advances immediately; the barrier takes effect when
    /// `cmd` executes.
    pub fn record_transition(
        &mut self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        new_layout: vk::ImageLayout,
    ) -> Result<()> {
        let masks = barrier_masks(self.layout, new_layout)?;

        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(self.layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(COLOR_SUBRESOURCE_RANGE)
            .src_access_mask(masks.src_access)
            .dst_access_mask(masks.dst_access)
            .build();

        unsafe {
            device.cmd_pipeline_barrier(
                cmd,
                masks.src_stage,
                masks.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }

        log::trace!("Image {:?}: {:?} -> {:?}", self.image, self.layout, new_layout);
        self.layout = new_layout;
        Ok(())
    }

    /// Create a view over the full color subresource.
    pub fn create_view(&mut self, device: &ash::Device) -> Result<vk::ImageView> {
        let view = super::swapchain::create_image_view(device, self.image, self.format)?;
        self.view = Some(view);
        Ok(view)
    }

    /// Create the texture sampler: nearest filtering, repeat addressing.
    pub fn create_sampler(&mut self, device: &ash::Device) -> Result<vk::Sampler> {
        let sampler = unsafe { device.create_sampler(&sampler_info(), None) }
            .vk_context("vkCreateSampler")?;
        self.sampler = Some(sampler);
        Ok(sampler)
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            if let Some(sampler) = self.sampler {
                device.destroy_sampler(sampler, None);
            }
            if let Some(view) = self.view {
                device.destroy_image_view(view, None);
            }
            device.destroy_image(self.image, None);
            device.free_memory(self.memory, None);
        }
    }
}

pub fn sampler_info() -> vk::SamplerCreateInfo {
    vk::SamplerCreateInfo::builder()
        .mag_filter(vk::Filter::NEAREST)
        .min_filter(vk::Filter::NEAREST)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .mip_lod_bias(0.0)
        .anisotropy_enable(false)
        .max_anisotropy(1.0)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .min_lod(0.0)
        .max_lod(vk::LOD_CLAMP_NONE)
        .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
        .unnormalized_coordinates(false)
        .build()
}
