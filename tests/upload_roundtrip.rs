//! Integration test: staged uploads read back byte-for-byte
//!
//! Run with: cargo test --test upload_roundtrip -- --nocapture

mod common;

use ash::vk;
use quad_renderer::backend::buffer::{create_buffer, find_memory_type};
use quad_renderer::backend::command::execute_single_time;
use quad_renderer::backend::image::GpuImage;
use quad_renderer::backend::upload::{download_buffer, download_image, upload_image, upload_via_staging};
use quad_renderer::backend::RenderError;
use quad_renderer::quad::{checker_bytes, quad_vertices, CHECKER_HEIGHT, CHECKER_WIDTH};
use quad_renderer::renderer::TEXTURE_FORMAT;

#[test]
fn vertex_buffer_round_trip() {
    let Some(device) = common::headless_device("vertex_buffer_round_trip") else {
        return;
    };

    let vertices = quad_vertices(100.0);
    let bytes: &[u8] = bytemuck::cast_slice(&vertices);

    let buffer = upload_via_staging(
        &device,
        bytes,
        vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_SRC,
    )
    .unwrap();

    assert!(buffer.memory_flags.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL));
    assert_eq!(buffer.size, bytes.len() as vk::DeviceSize);
    assert!(buffer.allocation_size >= buffer.size);

    let read_back = download_buffer(&device, &buffer).unwrap();
    assert_eq!(read_back, bytes);

    buffer.destroy(&device.device);
}

#[test]
fn texture_round_trip() {
    let Some(device) = common::headless_device("texture_round_trip") else {
        return;
    };

    let texels = checker_bytes();
    let extent = vk::Extent2D { width: CHECKER_WIDTH, height: CHECKER_HEIGHT };

    let mut texture = upload_image(&device, &texels, extent, TEXTURE_FORMAT).unwrap();
    assert_eq!(texture.layout(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

    let read_back = download_image(&device, &mut texture).unwrap();
    assert_eq!(read_back, texels);
    assert_eq!(texture.layout(), vk::ImageLayout::TRANSFER_SRC_OPTIMAL);

    texture.destroy(&device.device);
}

#[test]
fn host_buffer_flags_are_a_superset() {
    let Some(device) = common::headless_device("host_buffer_flags_are_a_superset") else {
        return;
    };

    let wanted = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
    let buffer = create_buffer(&device, 64, vk::BufferUsageFlags::UNIFORM_BUFFER, wanted).unwrap();
    assert!(buffer.memory_flags.contains(wanted));
    assert!(buffer.allocation_size >= 64);

    let data: Vec<u8> = (0..64).collect();
    buffer.write(&device.device, &data).unwrap();
    assert_eq!(buffer.read(&device.device).unwrap(), data);

    buffer.destroy(&device.device);
}

#[test]
fn impossible_memory_request_is_reported() {
    let Some(device) = common::headless_device("impossible_memory_request_is_reported") else {
        return;
    };

    // No memory type can match an empty filter
    assert_eq!(
        find_memory_type(&device.memory_properties, 0, vk::MemoryPropertyFlags::empty()),
        None
    );
}

#[test]
fn skipped_layout_transition_is_rejected() {
    let Some(device) = common::headless_device("skipped_layout_transition_is_rejected") else {
        return;
    };

    let mut image = GpuImage::new(
        &device,
        vk::Extent2D { width: 2, height: 2 },
        TEXTURE_FORMAT,
        vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
    )
    .unwrap();

    let result = execute_single_time(&device, |cmd| {
        image.record_transition(&device.device, cmd, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
    });
    assert!(matches!(result, Err(RenderError::LayoutTransition { .. })));
    assert_eq!(image.layout(), vk::ImageLayout::UNDEFINED);

    image.destroy(&device.device);
}

#[test]
fn headless_device_has_no_surface() {
    let Some(device) = common::headless_device("headless_device_has_no_surface") else {
        return;
    };
    assert!(matches!(device.surface(), Err(RenderError::Headless)));
}

#[test]
fn texture_bytes_must_cover_image_exactly() {
    let Some(device) = common::headless_device("texture_bytes_must_cover_image_exactly") else {
        return;
    };

    let extent = vk::Extent2D { width: CHECKER_WIDTH, height: CHECKER_HEIGHT };

    // Twice the texels of a 2x2 RGBA8 image
    let long = upload_image(&device, &[0u8; 32], extent, TEXTURE_FORMAT);
    assert!(matches!(
        long,
        Err(RenderError::UploadSizeMismatch { expected: 16, actual: 32 })
    ));

    // Three texels short of a full image
    let short = upload_image(&device, &[0u8; 4], extent, TEXTURE_FORMAT);
    assert!(matches!(
        short,
        Err(RenderError::UploadSizeMismatch { expected: 16, actual: 4 })
    ));
}

#[test]
fn oversized_write_is_rejected() {
    let Some(device) = common::headless_device("oversized_write_is_rejected") else {
        return;
    };

    let wanted = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
    let buffer = create_buffer(&device, 16, vk::BufferUsageFlags::UNIFORM_BUFFER, wanted).unwrap();

    let result = buffer.write(&device.device, &[0xAB; 64]);
    assert!(matches!(
        result,
        Err(RenderError::UploadSizeMismatch { expected: 16, actual: 64 })
    ));
    // Buffer stays usable after the rejected write
    assert_eq!(buffer.read(&device.device).unwrap().len(), 16);

    buffer.destroy(&device.device);
}

#[test]
fn empty_buffers_are_rejected() {
    let Some(device) = common::headless_device("empty_buffers_are_rejected") else {
        return;
    };

    let staged = upload_via_staging(&device, &[], vk::BufferUsageFlags::VERTEX_BUFFER);
    assert!(matches!(staged, Err(RenderError::EmptyBuffer)));

    let created = create_buffer(
        &device,
        0,
        vk::BufferUsageFlags::UNIFORM_BUFFER,
        vk::MemoryPropertyFlags::HOST_VISIBLE,
    );
    assert!(matches!(created, Err(RenderError::EmptyBuffer)));
}
