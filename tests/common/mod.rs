//! Shared setup for tests that need a real Vulkan device.
//!
//! Machines without a loader or a usable GPU skip instead of failing.

#![allow(dead_code)]

use quad_renderer::backend::instance::VulkanInstance;
use quad_renderer::backend::shader::load_binary;
use quad_renderer::backend::VulkanDevice;
use std::path::PathBuf;
use std::sync::Arc;

pub fn headless_device(test: &str) -> Option<Arc<VulkanDevice>> {
    let _ = env_logger::builder().is_test(true).try_init();

    let instance = match VulkanInstance::new(test, false, None) {
        Ok(instance) => instance,
        Err(e) => {
            eprintln!("skipping {test}: no Vulkan instance ({e})");
            return None;
        }
    };
    match VulkanDevice::headless(instance) {
        Ok(device) => Some(device),
        Err(e) => {
            eprintln!("skipping {test}: no Vulkan device ({e})");
            None
        }
    }
}

/// Compiled shaders from build.rs, if glslc was available.
pub fn quad_shaders(test: &str) -> Option<(Vec<u8>, Vec<u8>)> {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("shaders");
    match (
        load_binary(dir.join("quad.vert.spv")),
        load_binary(dir.join("quad.frag.spv")),
    ) {
        (Ok(vert), Ok(frag)) => Some((vert, frag)),
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("skipping {test}: {e}");
            None
        }
    }
}
