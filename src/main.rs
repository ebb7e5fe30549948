// =============================================================================
// QUAD RENDERER - Vulkan bootstrap drawing one textured quad
// =============================================================================
//
// STARTUP:
// 1. Config + logging
// 2. Window (winit), then instance/surface/device/swapchain
// 3. Shaders from disk, uploads (vertices, projection, texture), pipeline
//
// FRAME FLOW (one frame in flight):
//   wait fence -> acquire image -> record -> submit -> present -> pump events
//
// =============================================================================

use anyhow::{Context, Result};
use quad_renderer::backend::shader::load_binary;
use quad_renderer::backend::{GraphicsContext, RenderError};
use quad_renderer::config::Config;
use quad_renderer::frame::{CancellationToken, FrameLoop};
use quad_renderer::renderer::QuadRenderer;
use quad_renderer::window::WinitHost;
use std::fs::OpenOptions;
use std::io::Write;

fn main() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();

    init_logging(&config);
    log::info!("Starting quad renderer");
    log::info!(
        "Window: {}x{} at ({}, {})",
        config.window.width,
        config.window.height,
        config.window.x,
        config.window.y
    );

    // Declared first so it is dropped last: the surface needs the window
    let mut host = WinitHost::open(&config)?;

    let context = GraphicsContext::acquire(
        &config.window.title,
        config.validation_enabled(),
        &host.surface_target()?,
        host.extent()?,
    )
    .context("Failed to initialize Vulkan")?;

    let vert_code = load_binary(&config.shaders.vertex)?;
    let frag_code = load_binary(&config.shaders.fragment)?;

    let mut renderer = QuadRenderer::new(context, &config.graphics, &vert_code, &frag_code)
        .context("Failed to build renderer")?;

    let token = CancellationToken::new();
    let result = FrameLoop::new().run(&mut renderer, &mut host, &token);

    let stats = finish_run(result, renderer.wait_idle())?;
    log::info!("Presented {} frames", stats.presented);
    Ok(())
}

/// Combine the frame-loop result with the shutdown idle wait.
///
/// A frame-loop error wins; an idle-wait failure is logged and only
/// returned when the loop itself succeeded.
fn finish_run<T>(
    frame_result: std::result::Result<T, RenderError>,
    idle_result: std::result::Result<(), RenderError>,
) -> Result<T> {
    if let Err(e) = idle_result {
        log::error!("Failed to wait for device idle: {}", e);
        if frame_result.is_ok() {
            return Err(e.into());
        }
    }
    Ok(frame_result?)
}

/// Initialize logging, optionally into a file instead of stderr
fn init_logging(config: &Config) {
    use env_logger::{Builder, Env, Target};

    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));

    if config.debug.log_to_file {
        match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
        {
            Ok(mut file) => {
                let _ = writeln!(file, "=== Quad Renderer Log ===");
                let _ = writeln!(file, "Started: {:?}", std::time::SystemTime::now());
                let _ = writeln!(file);
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!("Cannot open log file {}: {}", config.debug.log_file, e),
        }
    }

    builder.init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn frame_loop_error_survives_failed_idle_wait() {
        let err = finish_run::<()>(
            Err(RenderError::SubmitRejected(vk::Result::ERROR_DEVICE_LOST)),
            Err(RenderError::Vulkan {
                call: "vkDeviceWaitIdle",
                result: vk::Result::ERROR_DEVICE_LOST,
            }),
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RenderError>(),
            Some(RenderError::SubmitRejected(_))
        ));
    }

    #[test]
    fn idle_failure_reported_after_clean_run() {
        let err = finish_run(
            Ok(7),
            Err(RenderError::Vulkan {
                call: "vkDeviceWaitIdle",
                result: vk::Result::ERROR_DEVICE_LOST,
            }),
        )
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RenderError>(),
            Some(RenderError::Vulkan { call: "vkDeviceWaitIdle", .. })
        ));
        assert_eq!(finish_run(Ok(7), Ok(())).unwrap(), 7);
    }
}
