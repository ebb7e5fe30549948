// Buffer utilities for vertex, staging and uniform buffers
//
// Memory is allocated directly with vkAllocateMemory, one allocation per
// buffer, from the first memory type that fits.

use super::error::{RenderError, Result, VkResultExt};
use super::VulkanDevice;
use ash::vk;

/// A buffer with its own dedicated memory allocation.
#[derive(Debug)]
pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    /// Requested size in bytes
    pub size: vk::DeviceSize,
    /// Size of the bound allocation, `>= size`
    pub allocation_size: vk::DeviceSize,
    /// Property flags of the chosen memory type (superset of the requested ones)
    pub memory_flags: vk::MemoryPropertyFlags,
}

impl GpuBuffer {
    /// Copy `data` into host-visible memory, starting at offset 0.
    ///
    /// Fails with `UploadSizeMismatch` if `data` is longer than the buffer.
    pub fn write(&self, device: &ash::Device, data: &[u8]) -> Result<()> {
        check_fits(self.size, data.len())?;
        unsafe {
            let ptr = device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .vk_context("vkMapMemory")? as *mut u8;
            ptr.copy_from_nonoverlapping(data.as_ptr(), data.len());
            device.unmap_memory(self.memory);
        }
        Ok(())
    }

    /// Read the whole buffer back from host-visible memory.
    pub fn read(&self, device: &ash::Device) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.size as usize];
        unsafe {
            let ptr = device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .vk_context("vkMapMemory")? as *const u8;
            ptr.copy_to_nonoverlapping(out.as_mut_ptr(), out.len());
            device.unmap_memory(self.memory);
        }
        Ok(out)
    }

    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_buffer(self.buffer, None);
            device.free_memory(self.memory, None);
        }
    }
}

/// `len` bytes must fit into `capacity`.
fn check_fits(capacity: vk::DeviceSize, len: usize) -> Result<()> {
    let actual = len as vk::DeviceSize;
    if actual > capacity {
        return Err(RenderError::UploadSizeMismatch { expected: capacity, actual });
    }
    Ok(())
}

/// Create a buffer and bind freshly allocated memory with at least `memory_flags`.
///
/// A zero `size` is rejected with `EmptyBuffer`.
pub fn create_buffer(
    device: &VulkanDevice,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    memory_flags: vk::MemoryPropertyFlags,
) -> Result<GpuBuffer> {
    if size == 0 {
        return Err(RenderError::EmptyBuffer);
    }

    let buffer_info = vk::BufferCreateInfo::builder()
        .size(size)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = unsafe { device.device.create_buffer(&buffer_info, None) }
        .vk_context("vkCreateBuffer")?;

    let mem_requirements = unsafe { device.device.get_buffer_memory_requirements(buffer) };

    let (memory, memory_type) = match allocate_memory(device, mem_requirements, memory_flags) {
        Ok(allocation) => allocation,
        Err(e) => {
            unsafe { device.device.destroy_buffer(buffer, None) };
            return Err(e);
        }
    };

    if let Err(result) = unsafe { device.device.bind_buffer_memory(buffer, memory, 0) } {
        unsafe {
            device.device.destroy_buffer(buffer, None);
            device.device.free_memory(memory, None);
        }
        return Err(RenderError::Vulkan { call: "vkBindBufferMemory", result });
    }

    Ok(GpuBuffer {
        buffer,
        memory,
        size,
        allocation_size: mem_requirements.size,
        memory_flags: device.memory_properties.memory_types[memory_type as usize].property_flags,
    })
}

/// Allocate memory for `requirements`, returning the allocation and its memory type index.
pub(crate) fn allocate_memory(
    device: &VulkanDevice,
    requirements: vk::MemoryRequirements,
    flags: vk::MemoryPropertyFlags,
) -> Result<(vk::DeviceMemory, u32)> {
    let memory_type_index = find_memory_type(
        &device.memory_properties,
        requirements.memory_type_bits,
        flags,
    )
    .ok_or(RenderError::NoCompatibleMemoryType {
        type_filter: requirements.memory_type_bits,
        flags,
    })?;

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(requirements.size)
        .memory_type_index(memory_type_index);

    let memory = unsafe { device.device.allocate_memory(&alloc_info, None) }
        .vk_context("vkAllocateMemory")?;

    Ok((memory, memory_type_index))
}

/// Find a suitable memory type index.
///
/// Scans in ascending order and returns the first type whose bit is set in
/// `type_filter` and whose flags contain all of `flags`.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    let count = memory_properties
        .memory_type_count
        .min(vk::MAX_MEMORY_TYPES as u32);

    (0..count).find(|&i| {
        let has_type = (type_filter & (1 << i)) != 0;
        let has_properties = memory_properties.memory_types[i as usize]
            .property_flags
            .contains(flags);
        has_type && has_properties
    })
}
