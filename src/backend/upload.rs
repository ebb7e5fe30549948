// Staged transfers between host memory and device-local resources
//
// Upload: host-visible staging buffer -> one-shot copy -> device-local target.
// Download is the mirror image and exists to verify uploads.

use super::buffer::{create_buffer, GpuBuffer};
use super::command::execute_single_time;
use super::error::{RenderError, Result};
use super::image::{GpuImage, COLOR_SUBRESOURCE_RANGE};
use super::VulkanDevice;
use ash::vk;

const HOST_VISIBLE_COHERENT: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw()
        | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

/// Bytes per texel for the 8-bit four-channel formats we upload and read back.
pub fn texel_size(format: vk::Format) -> Option<u32> {
    match format {
        vk::Format::R8G8B8A8_SRGB
        | vk::Format::R8G8B8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB
        | vk::Format::B8G8R8A8_UNORM => Some(4),
        _ => None,
    }
}

fn image_byte_size(extent: vk::Extent2D, format: vk::Format) -> Result<vk::DeviceSize> {
    let texel = texel_size(format).ok_or(RenderError::UnsupportedTextureFormat(format))?;
    Ok(extent.width as vk::DeviceSize * extent.height as vk::DeviceSize * texel as vk::DeviceSize)
}

/// Texel data must cover the image exactly.
fn check_image_bytes(expected: vk::DeviceSize, bytes: &[u8]) -> Result<()> {
    let actual = bytes.len() as vk::DeviceSize;
    if actual != expected {
        return Err(RenderError::UploadSizeMismatch { expected, actual });
    }
    Ok(())
}

fn create_staging(device: &VulkanDevice, size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> Result<GpuBuffer> {
    create_buffer(device, size, usage, HOST_VISIBLE_COHERENT)
}

fn full_image_copy(extent: vk::Extent2D) -> vk::BufferImageCopy {
    vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: COLOR_SUBRESOURCE_RANGE.base_mip_level,
            base_array_layer: COLOR_SUBRESOURCE_RANGE.base_array_layer,
            layer_count: COLOR_SUBRESOURCE_RANGE.layer_count,
        },
        image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
        image_extent: vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        },
    }
}

/// Copy `bytes` into a new device-local buffer usable as `usage`.
///
/// An empty slice is rejected with `EmptyBuffer`.
pub fn upload_via_staging(
    device: &VulkanDevice,
    bytes: &[u8],
    usage: vk::BufferUsageFlags,
) -> Result<GpuBuffer> {
    let size = bytes.len() as vk::DeviceSize;
    if size == 0 {
        return Err(RenderError::EmptyBuffer);
    }

    let staging = create_staging(device, size, vk::BufferUsageFlags::TRANSFER_SRC)?;
    let result = staging.write(&device.device, bytes).and_then(|()| {
        let destination = create_buffer(
            device,
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let copied = execute_single_time(device, |cmd| {
            let region = vk::BufferCopy { src_offset: 0, dst_offset: 0, size };
            unsafe {
                device
                    .device
                    .cmd_copy_buffer(cmd, staging.buffer, destination.buffer, &[region]);
            }
            Ok(())
        });

        match copied {
            Ok(()) => Ok(destination),
            Err(e) => {
                destination.destroy(&device.device);
                Err(e)
            }
        }
    });
    staging.destroy(&device.device);

    if result.is_ok() {
        log::debug!("Uploaded {} bytes to device-local buffer ({:?})", size, usage);
    }
    result
}

/// Create a sampled texture from tightly packed texels.
///
/// The image ends in SHADER_READ_ONLY_OPTIMAL, going through
/// TRANSFER_DST_OPTIMAL for the copy. `bytes` must be exactly
/// width * height texels of `format`.
pub fn upload_image(
    device: &VulkanDevice,
    bytes: &[u8],
    extent: vk::Extent2D,
    format: vk::Format,
) -> Result<GpuImage> {
    let size = image_byte_size(extent, format)?;
    check_image_bytes(size, bytes)?;

    let staging = create_staging(device, size, vk::BufferUsageFlags::TRANSFER_SRC)?;
    let result = staging.write(&device.device, bytes).and_then(|()| {
        let mut image = GpuImage::new(
            device,
            extent,
            format,
            // TRANSFER_SRC so the texture can be read back for verification
            vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::SAMPLED
                | vk::ImageUsageFlags::TRANSFER_SRC,
        )?;

        let copied = execute_single_time(device, |cmd| {
            image.record_transition(&device.device, cmd, vk::ImageLayout::TRANSFER_DST_OPTIMAL)?;
            unsafe {
                device.device.cmd_copy_buffer_to_image(
                    cmd,
                    staging.buffer,
                    image.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[full_image_copy(extent)],
                );
            }
            image.record_transition(
                &device.device,
                cmd,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )
        });

        match copied {
            Ok(()) => Ok(image),
            Err(e) => {
                image.destroy(&device.device);
                Err(e)
            }
        }
    });
    staging.destroy(&device.device);

    if result.is_ok() {
        log::debug!(
            "Uploaded {}x{} {:?} texture",
            extent.width,
            extent.height,
            format
        );
    }
    result
}

/// Read a device-local buffer back through a staging buffer.
///
/// `buffer` must have been created with TRANSFER_SRC usage.
pub fn download_buffer(device: &VulkanDevice, buffer: &GpuBuffer) -> Result<Vec<u8>> {
    let staging = create_staging(device, buffer.size, vk::BufferUsageFlags::TRANSFER_DST)?;

    let result = execute_single_time(device, |cmd| {
        let region = vk::BufferCopy { src_offset: 0, dst_offset: 0, size: buffer.size };
        unsafe {
            device
                .device
                .cmd_copy_buffer(cmd, buffer.buffer, staging.buffer, &[region]);
        }
        Ok(())
    })
    .and_then(|()| staging.read(&device.device));

    staging.destroy(&device.device);
    result
}

/// Read an image back through a staging buffer, tightly packed row-major.
///
/// Moves the image to TRANSFER_SRC_OPTIMAL first unless it is already there.
pub fn download_image(device: &VulkanDevice, image: &mut GpuImage) -> Result<Vec<u8>> {
    let size = image_byte_size(image.extent, image.format)?;
    let staging = create_staging(device, size, vk::BufferUsageFlags::TRANSFER_DST)?;

    let result = execute_single_time(device, |cmd| {
        if image.layout() != vk::ImageLayout::TRANSFER_SRC_OPTIMAL {
            image.record_transition(&device.device, cmd, vk::ImageLayout::TRANSFER_SRC_OPTIMAL)?;
        }
        unsafe {
            device.device.cmd_copy_image_to_buffer(
                cmd,
                image.image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                staging.buffer,
                &[full_image_copy(image.extent)],
            );
        }
        Ok(())
    })
    .and_then(|()| staging.read(&device.device));

    staging.destroy(&device.device);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_byte_formats_only() {
        assert_eq!(texel_size(vk::Format::R8G8B8A8_SRGB), Some(4));
        assert_eq!(texel_size(vk::Format::B8G8R8A8_UNORM), Some(4));
        assert_eq!(texel_size(vk::Format::R32G32_SFLOAT), None);
    }

    #[test]
    fn image_size_covers_every_texel() {
        let extent = vk::Extent2D { width: 2, height: 2 };
        assert_eq!(image_byte_size(extent, vk::Format::R8G8B8A8_SRGB).unwrap(), 16);
        assert!(matches!(
            image_byte_size(extent, vk::Format::D32_SFLOAT),
            Err(RenderError::UnsupportedTextureFormat(vk::Format::D32_SFLOAT))
        ));
    }

    #[test]
    fn texel_bytes_must_match_image_exactly() {
        assert!(check_image_bytes(16, &[0u8; 16]).is_ok());
        assert!(matches!(
            check_image_bytes(16, &[0u8; 32]),
            Err(RenderError::UploadSizeMismatch { expected: 16, actual: 32 })
        ));
        assert!(matches!(
            check_image_bytes(16, &[0u8; 12]),
            Err(RenderError::UploadSizeMismatch { expected: 16, actual: 12 })
        ));
    }

    #[test]
    fn copy_region_spans_whole_image() {
        let region = full_image_copy(vk::Extent2D { width: 100, height: 50 });
        assert_eq!(region.image_extent.width, 100);
        assert_eq!(region.image_extent.height, 50);
        assert_eq!(region.image_extent.depth, 1);
        assert_eq!(region.image_subresource.layer_count, 1);
        // zero row length means tightly packed
        assert_eq!(region.buffer_row_length, 0);
    }
}
