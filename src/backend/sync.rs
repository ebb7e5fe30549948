// Synchronization primitives
//
// One frame in flight: one fence for CPU<->GPU, two semaphores for
// acquire -> render -> present ordering on the GPU.

use super::error::{Result, VkResultExt};
use super::VulkanDevice;
use ash::vk;

pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    pub fn new(device: &VulkanDevice) -> Result<Self> {
        let device = &device.device;
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Start signaled so the first wait doesn't block forever
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        unsafe {
            let image_available = device
                .create_semaphore(&semaphore_info, None)
                .vk_context("vkCreateSemaphore")?;
            let render_finished = match device.create_semaphore(&semaphore_info, None) {
                Ok(s) => s,
                Err(result) => {
                    device.destroy_semaphore(image_available, None);
                    return Err(result).vk_context("vkCreateSemaphore");
                }
            };
            let in_flight_fence = match device.create_fence(&fence_info, None) {
                Ok(f) => f,
                Err(result) => {
                    device.destroy_semaphore(image_available, None);
                    device.destroy_semaphore(render_finished, None);
                    return Err(result).vk_context("vkCreateFence");
                }
            };

            Ok(Self {
                image_available,
                render_finished,
                in_flight_fence,
            })
        }
    }

    /// Block until the previous frame's work is done, then reset the fence.
    pub fn wait_and_reset(&self, device: &ash::Device) -> Result<()> {
        let fences = [self.in_flight_fence];
        unsafe {
            device
                .wait_for_fences(&fences, true, u64::MAX)
                .vk_context("vkWaitForFences")?;
            device.reset_fences(&fences).vk_context("vkResetFences")
        }
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_semaphore(self.image_available, None);
            device.destroy_semaphore(self.render_finished, None);
            device.destroy_fence(self.in_flight_fence, None);
        }
    }
}
