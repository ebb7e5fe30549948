// Quad renderer - startup uploads plus the Vulkan side of the frame loop
//
// `QuadScene` owns everything needed to draw the quad into any color target
// (vertex buffer, projection uniform, texture, pipeline). `QuadRenderer` adds
// the swapchain framebuffers, the single command buffer and the frame sync
// objects, and implements `FrameBackend`.

use crate::backend::buffer::{create_buffer, GpuBuffer};
use crate::backend::context::GraphicsContext;
use crate::backend::error::{RenderError, Result, VkResultExt};
use crate::backend::image::GpuImage;
use crate::backend::pipeline::{create_framebuffers, QuadPipeline};
use crate::backend::shader::create_shader_module;
use crate::backend::swapchain::{AcquireOutcome, ImageIndex, PresentOutcome};
use crate::backend::sync::FrameSync;
use crate::backend::upload::{upload_image, upload_via_staging};
use crate::backend::VulkanDevice;
use crate::config::GraphicsConfig;
use crate::frame::FrameBackend;
use crate::quad::{self, QUAD_VERTEX_COUNT};
use ash::vk;

pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Description of the color target a scene renders into.
#[derive(Debug, Clone, Copy)]
pub struct RenderTarget {
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    /// Layout the render pass leaves the target in
    pub final_layout: vk::ImageLayout,
}

/// GPU-resident quad, texture and pipeline. Written once, never mutated.
pub struct QuadScene {
    pub vertex_buffer: GpuBuffer,
    pub uniform: GpuBuffer,
    pub texture: GpuImage,
    pub pipeline: QuadPipeline,
}

impl QuadScene {
    pub fn new(
        device: &VulkanDevice,
        target: RenderTarget,
        quad_size: f32,
        vert_code: &[u8],
        frag_code: &[u8],
    ) -> Result<Self> {
        let dev = &device.device;

        // Vertex buffer (device local, via staging)
        let vertices = quad::quad_vertices(quad_size);
        let vertex_buffer = upload_via_staging(
            device,
            bytemuck::cast_slice(&vertices),
            // TRANSFER_SRC so uploads can be verified by reading back
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_SRC,
        )?;

        // Projection uniform (host visible, written once)
        let uniform = match create_projection_uniform(device, target.extent) {
            Ok(uniform) => uniform,
            Err(e) => {
                vertex_buffer.destroy(dev);
                return Err(e);
            }
        };

        let (texture, view, sampler) = match create_checker_texture(device) {
            Ok(created) => created,
            Err(e) => {
                uniform.destroy(dev);
                vertex_buffer.destroy(dev);
                return Err(e);
            }
        };

        let pipeline = match build_pipeline(device, target, vert_code, frag_code) {
            Ok(pipeline) => pipeline,
            Err(e) => {
                texture.destroy(dev);
                uniform.destroy(dev);
                vertex_buffer.destroy(dev);
                return Err(e);
            }
        };

        pipeline.write_descriptors(dev, view, sampler, uniform.buffer, uniform.size);

        log::info!("Quad scene ready: {} px quad, {:?} texture", quad_size, TEXTURE_FORMAT);

        Ok(Self {
            vertex_buffer,
            uniform,
            texture,
            pipeline,
        })
    }

    /// Record the render pass that clears `framebuffer` and draws the quad.
    ///
    /// `cmd` must already be in the recording state.
    pub fn record_render_pass(
        &self,
        device: &ash::Device,
        cmd: vk::CommandBuffer,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    ) {
        let clear_values = [vk::ClearValue {
            color: vk::ClearColorValue { float32: clear_color },
        }];

        let render_pass_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.pipeline.render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .clear_values(&clear_values);

        unsafe {
            device.cmd_begin_render_pass(cmd, &render_pass_info, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.pipeline);
            device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline.pipeline_layout,
                0,
                &[self.pipeline.descriptor_set],
                &[],
            );
            device.cmd_bind_vertex_buffers(cmd, 0, &[self.vertex_buffer.buffer], &[0]);
            device.cmd_draw(cmd, QUAD_VERTEX_COUNT, 1, 0, 0);
            device.cmd_end_render_pass(cmd);
        }
    }

    pub fn destroy(&self, device: &ash::Device) {
        self.pipeline.destroy(device);
        self.texture.destroy(device);
        self.uniform.destroy(device);
        self.vertex_buffer.destroy(device);
    }
}

fn create_projection_uniform(device: &VulkanDevice, extent: vk::Extent2D) -> Result<GpuBuffer> {
    let projection = quad::projection(extent.width as f32, extent.height as f32);
    let columns = projection.to_cols_array();
    let bytes: &[u8] = bytemuck::cast_slice(&columns);

    let uniform = create_buffer(
        device,
        bytes.len() as vk::DeviceSize,
        vk::BufferUsageFlags::UNIFORM_BUFFER,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )?;
    if let Err(e) = uniform.write(&device.device, bytes) {
        uniform.destroy(&device.device);
        return Err(e);
    }
    Ok(uniform)
}

fn create_checker_texture(
    device: &VulkanDevice,
) -> Result<(GpuImage, vk::ImageView, vk::Sampler)> {
    let extent = vk::Extent2D {
        width: quad::CHECKER_WIDTH,
        height: quad::CHECKER_HEIGHT,
    };
    let mut texture = upload_image(device, &quad::checker_bytes(), extent, TEXTURE_FORMAT)?;

    let finished = texture.create_view(&device.device).and_then(|view| {
        let sampler = texture.create_sampler(&device.device)?;
        Ok((view, sampler))
    });
    match finished {
        Ok((view, sampler)) => Ok((texture, view, sampler)),
        Err(e) => {
            texture.destroy(&device.device);
            Err(e)
        }
    }
}

fn build_pipeline(
    device: &VulkanDevice,
    target: RenderTarget,
    vert_code: &[u8],
    frag_code: &[u8],
) -> Result<QuadPipeline> {
    let dev = &device.device;

    let vert = create_shader_module(device, vert_code)?;
    let frag = match create_shader_module(device, frag_code) {
        Ok(frag) => frag,
        Err(e) => {
            unsafe { dev.destroy_shader_module(vert, None) };
            return Err(e);
        }
    };

    let pipeline = QuadPipeline::build(
        device,
        target.format,
        target.extent,
        target.final_layout,
        vert,
        frag,
    );

    // Modules are only needed while the pipeline is compiled
    unsafe {
        dev.destroy_shader_module(vert, None);
        dev.destroy_shader_module(frag, None);
    }

    pipeline
}

/// Renders the quad to the window every frame.
pub struct QuadRenderer {
    scene: QuadScene,
    framebuffers: Vec<vk::Framebuffer>,
    command_buffer: vk::CommandBuffer,
    frame_sync: FrameSync,
    clear_color: [f32; 4],
    wait_stages: [vk::PipelineStageFlags; 1],
    // Dropped last, after the Drop impl released everything above
    context: GraphicsContext,
}

impl QuadRenderer {
    pub fn new(
        context: GraphicsContext,
        graphics: &GraphicsConfig,
        vert_code: &[u8],
        frag_code: &[u8],
    ) -> Result<Self> {
        let device = &context.device;
        let dev = &device.device;

        let target = RenderTarget {
            format: context.format(),
            extent: context.extent(),
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        };
        let scene = QuadScene::new(device, target, graphics.quad_size, vert_code, frag_code)?;

        let framebuffers = match create_framebuffers(
            dev,
            context.image_views(),
            scene.pipeline.render_pass,
            target.extent,
        ) {
            Ok(framebuffers) => framebuffers,
            Err(e) => {
                scene.destroy(dev);
                return Err(e);
            }
        };

        let release = |err: RenderError| {
            for &framebuffer in &framebuffers {
                unsafe { dev.destroy_framebuffer(framebuffer, None) };
            }
            scene.destroy(dev);
            err
        };

        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(device.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let command_buffer = unsafe { dev.allocate_command_buffers(&alloc_info) }
            .vk_context("vkAllocateCommandBuffers")
            .map_err(release)?[0];

        let frame_sync = match FrameSync::new(device) {
            Ok(sync) => sync,
            Err(e) => {
                unsafe { dev.free_command_buffers(device.command_pool, &[command_buffer]) };
                return Err(release(e));
            }
        };

        Ok(Self {
            scene,
            framebuffers,
            command_buffer,
            frame_sync,
            clear_color: graphics.clear_color,
            wait_stages: [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
            context,
        })
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.context.device.wait_idle()
    }
}

impl FrameBackend for QuadRenderer {
    fn wait_for_frame(&mut self) -> Result<()> {
        self.frame_sync.wait_and_reset(&self.context.device.device)
    }

    fn acquire_image(&mut self) -> Result<AcquireOutcome> {
        self.context
            .swapchain
            .acquire_next_image(self.frame_sync.image_available)
    }

    fn record(&mut self, image: ImageIndex) -> Result<()> {
        let device = &self.context.device.device;
        let cmd = self.command_buffer;

        let framebuffer = *self.framebuffers.get(image.as_usize()).ok_or(
            RenderError::ImageIndexOutOfRange {
                index: image.get(),
                count: self.framebuffers.len() as u32,
            },
        )?;

        unsafe {
            device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .vk_context("vkResetCommandBuffer")?;
            device
                .begin_command_buffer(cmd, &vk::CommandBufferBeginInfo::builder())
                .vk_context("vkBeginCommandBuffer")?;
        }

        self.scene.record_render_pass(
            device,
            cmd,
            framebuffer,
            self.context.extent(),
            self.clear_color,
        );

        unsafe { device.end_command_buffer(cmd) }.vk_context("vkEndCommandBuffer")
    }

    fn submit(&mut self) -> Result<()> {
        let device = &self.context.device;

        let wait_semaphores = [self.frame_sync.image_available];
        let signal_semaphores = [self.frame_sync.render_finished];
        let command_buffers = [self.command_buffer];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)      // Wait for image to be available
            .wait_dst_stage_mask(&self.wait_stages) // Which stage waits
            .command_buffers(&command_buffers)      // Commands to execute
            .signal_semaphores(&signal_semaphores); // Signal when done

        unsafe {
            device.device.queue_submit(
                device.queue,
                &[submit_info.build()],
                self.frame_sync.in_flight_fence, // Signal this fence when GPU is done
            )
        }
        .map_err(RenderError::SubmitRejected)
    }

    fn present(&mut self, image: ImageIndex) -> Result<PresentOutcome> {
        self.context.swapchain.present(
            self.context.queue(),
            image,
            self.frame_sync.render_finished,
        )
    }

    fn rearm_fence(&mut self) -> Result<()> {
        let device = &self.context.device;
        // An empty submission still signals the fence once the queue drains
        unsafe {
            device
                .device
                .queue_submit(device.queue, &[], self.frame_sync.in_flight_fence)
        }
        .vk_context("vkQueueSubmit")
    }
}

impl Drop for QuadRenderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        let device = &self.context.device;
        // Wait for GPU to finish before destroying anything
        let _ = device.wait_idle();

        let dev = &device.device;
        // Destroy in reverse order of creation
        self.frame_sync.destroy(dev);
        unsafe {
            dev.free_command_buffers(device.command_pool, &[self.command_buffer]);
            for &framebuffer in &self.framebuffers {
                dev.destroy_framebuffer(framebuffer, None);
            }
        }
        self.scene.destroy(dev);

        // Swapchain, device, surface and instance follow as `context` drops
        log::info!("Cleanup complete");
    }
}
