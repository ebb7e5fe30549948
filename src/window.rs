// Window host - winit on the calling thread, pumped between frames
//
// The frame loop owns control flow, so instead of `run_app` we pump winit's
// event queue once per frame with a zero timeout.

use crate::backend::surface::SurfaceTarget;
use crate::config::Config;
use crate::frame::{CancellationToken, EventPump};
use anyhow::{bail, Context, Result};
use ash::vk;
use std::time::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    dpi::{PhysicalPosition, PhysicalSize},
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Window, WindowId},
};

/// Frames-per-second over one-second windows.
#[derive(Debug)]
pub struct FpsCounter {
    frame_count: u32,
    last_update: Instant,
}

impl FpsCounter {
    pub fn new(now: Instant) -> Self {
        Self {
            frame_count: 0,
            last_update: now,
        }
    }

    /// Count a frame; returns the rate once at least a second has passed.
    pub fn tick(&mut self, now: Instant) -> Option<f32> {
        self.frame_count += 1;
        let elapsed = now.duration_since(self.last_update).as_secs_f32();
        if elapsed < 1.0 {
            return None;
        }
        let fps = self.frame_count as f32 / elapsed;
        self.frame_count = 0;
        self.last_update = now;
        Some(fps)
    }
}

struct HostState {
    title: String,
    size: PhysicalSize<u32>,
    position: PhysicalPosition<i32>,
    show_fps: bool,
    window: Option<Window>,
    close_requested: bool,
    create_error: Option<winit::error::OsError>,
    fps: FpsCounter,
}

impl ApplicationHandler for HostState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attributes = Window::default_attributes()
            .with_title(&self.title)
            .with_inner_size(self.size)
            .with_position(self.position)
            .with_resizable(false);

        match event_loop.create_window(attributes) {
            Ok(window) => {
                log::info!("Window created: {}x{}", self.size.width, self.size.height);
                self.window = Some(window);
            }
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                self.create_error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                log::info!("Close requested, shutting down...");
                self.close_requested = true;
                event_loop.exit();
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape)
                {
                    log::info!("ESC pressed, exiting...");
                    self.close_requested = true;
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }
}

/// The windowing collaborator: one non-resizable window and its event queue.
pub struct WinitHost {
    // Window before event loop: it must not outlive the loop's connection
    state: HostState,
    event_loop: EventLoop<()>,
}

impl WinitHost {
    /// Create the event loop and pump it until the window exists.
    pub fn open(config: &Config) -> Result<Self> {
        let event_loop = EventLoop::new().context("Failed to create event loop")?;

        let mut host = Self {
            state: HostState {
                title: config.window.title.clone(),
                size: PhysicalSize::new(config.window.width, config.window.height),
                position: PhysicalPosition::new(config.window.x, config.window.y),
                show_fps: config.debug.show_fps,
                window: None,
                close_requested: false,
                create_error: None,
                fps: FpsCounter::new(Instant::now()),
            },
            event_loop,
        };

        while host.state.window.is_none() {
            let status = host
                .event_loop
                .pump_app_events(Some(Duration::from_millis(10)), &mut host.state);
            if let Some(e) = host.state.create_error.take() {
                return Err(e).context("Failed to create window");
            }
            if let PumpStatus::Exit(code) = status {
                bail!("Event loop exited (code {}) before a window was created", code);
            }
        }

        Ok(host)
    }

    fn window(&self) -> Result<&Window> {
        self.state.window.as_ref().context("Window not created")
    }

    pub fn surface_target(&self) -> Result<SurfaceTarget> {
        Ok(SurfaceTarget::from_window(self.window()?)?)
    }

    /// Current drawable size in pixels.
    pub fn extent(&self) -> Result<vk::Extent2D> {
        let size = self.window()?.inner_size();
        Ok(vk::Extent2D {
            width: size.width,
            height: size.height,
        })
    }

    fn update_fps(&mut self) {
        if !self.state.show_fps {
            return;
        }
        if let Some(fps) = self.state.fps.tick(Instant::now()) {
            if let Some(ref window) = self.state.window {
                window.set_title(&format!("{} - {:.0} FPS", self.state.title, fps));
            }
        }
    }
}

impl EventPump for WinitHost {
    fn pump_events(&mut self, token: &CancellationToken) {
        let status = self
            .event_loop
            .pump_app_events(Some(Duration::ZERO), &mut self.state);

        if self.state.close_requested || matches!(status, PumpStatus::Exit(_)) {
            token.cancel();
            return;
        }
        self.update_fps();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fps_reported_once_per_second() {
        let start = Instant::now();
        let mut fps = FpsCounter::new(start);
        for i in 1..60 {
            assert_eq!(fps.tick(start + Duration::from_millis(i * 16)), None);
        }
        let rate = fps.tick(start + Duration::from_secs(1)).unwrap();
        assert!((rate - 60.0).abs() < 1e-3);

        // counter restarts after a report
        assert_eq!(fps.tick(start + Duration::from_millis(1500)), None);
        let rate = fps.tick(start + Duration::from_secs(3)).unwrap();
        assert!((rate - 1.0).abs() < 1e-3);
    }
}
