// One-shot command buffers for startup uploads
//
// Each call allocates a primary buffer from the graphics pool, submits it with
// no semaphores and blocks until the queue is idle. Never use per frame.

use super::error::{RenderError, Result, VkResultExt};
use super::VulkanDevice;
use ash::vk;

pub fn begin_single_time(device: &VulkanDevice) -> Result<vk::CommandBuffer> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(device.command_pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(1);

    let cmd = unsafe { device.device.allocate_command_buffers(&alloc_info) }
        .vk_context("vkAllocateCommandBuffers")?[0];

    let begin_info = vk::CommandBufferBeginInfo::builder()
        .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

    if let Err(result) = unsafe { device.device.begin_command_buffer(cmd, &begin_info) } {
        unsafe { device.device.free_command_buffers(device.command_pool, &[cmd]) };
        return Err(RenderError::Vulkan { call: "vkBeginCommandBuffer", result });
    }

    Ok(cmd)
}

/// End, submit and wait for `cmd`, then free it. The buffer is freed on error too.
pub fn end_single_time(device: &VulkanDevice, cmd: vk::CommandBuffer) -> Result<()> {
    let result = submit_and_wait(device, cmd);
    unsafe { device.device.free_command_buffers(device.command_pool, &[cmd]) };
    result
}

fn submit_and_wait(device: &VulkanDevice, cmd: vk::CommandBuffer) -> Result<()> {
    unsafe {
        device
            .device
            .end_command_buffer(cmd)
            .vk_context("vkEndCommandBuffer")?;

        let command_buffers = [cmd];
        let submit_info = vk::SubmitInfo::builder()
            .command_buffers(&command_buffers)
            .build();

        device
            .device
            .queue_submit(device.queue, &[submit_info], vk::Fence::null())
            .vk_context("vkQueueSubmit")?;

        device
            .device
            .queue_wait_idle(device.queue)
            .vk_context("vkQueueWaitIdle")
    }
}

/// Record `record` into a one-shot command buffer and run it to completion.
pub fn execute_single_time<T>(
    device: &VulkanDevice,
    record: impl FnOnce(vk::CommandBuffer) -> Result<T>,
) -> Result<T> {
    let cmd = begin_single_time(device)?;
    let value = match record(cmd) {
        Ok(value) => value,
        Err(e) => {
            unsafe { device.device.free_command_buffers(device.command_pool, &[cmd]) };
            return Err(e);
        }
    };
    end_single_time(device, cmd)?;
    Ok(value)
}
