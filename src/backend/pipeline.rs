// Graphics pipeline creation
//
// Builds, in order: descriptor-set layout, descriptor pool + set, render pass,
// pipeline layout, graphics pipeline. Everything is fixed at build time:
// static viewport/scissor, no depth, standard alpha blending.

use super::error::{RenderError, Result, VkResultExt};
use super::VulkanDevice;
use ash::vk;

pub const TEXTURE_BINDING: u32 = 0;
pub const UNIFORM_BINDING: u32 = 1;

/// Stride of one interleaved vertex: position.xy + uv.xy
pub const VERTEX_STRIDE: u32 = 4 * std::mem::size_of::<f32>() as u32;

pub struct QuadPipeline {
    pub descriptor_set_layout: vk::DescriptorSetLayout,
    pub descriptor_pool: vk::DescriptorPool,
    pub descriptor_set: vk::DescriptorSet,
    pub render_pass: vk::RenderPass,
    pub pipeline_layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
}

impl QuadPipeline {
    /// Build the pipeline for a color target of `format`/`extent`.
    ///
    /// `final_layout` is the layout the render pass leaves the target in:
    /// PRESENT_SRC_KHR for swapchain images, TRANSFER_SRC_OPTIMAL for
    /// offscreen targets that get read back.
    pub fn build(
        device: &VulkanDevice,
        format: vk::Format,
        extent: vk::Extent2D,
        final_layout: vk::ImageLayout,
        vert_shader: vk::ShaderModule,
        frag_shader: vk::ShaderModule,
    ) -> Result<Self> {
        let dev = &device.device;

        // Partially built objects are destroyed on the way out
        let mut built = Self {
            descriptor_set_layout: vk::DescriptorSetLayout::null(),
            descriptor_pool: vk::DescriptorPool::null(),
            descriptor_set: vk::DescriptorSet::null(),
            render_pass: vk::RenderPass::null(),
            pipeline_layout: vk::PipelineLayout::null(),
            pipeline: vk::Pipeline::null(),
        };

        let result = (|| -> Result<()> {
            built.descriptor_set_layout = create_descriptor_set_layout(dev)?;
            built.descriptor_pool = create_descriptor_pool(dev)?;
            built.descriptor_set =
                allocate_descriptor_set(dev, built.descriptor_pool, built.descriptor_set_layout)?;
            built.render_pass = create_render_pass(dev, format, final_layout)?;

            let set_layouts = [built.descriptor_set_layout];
            // No push constants
            let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(&set_layouts);
            built.pipeline_layout = unsafe { dev.create_pipeline_layout(&layout_info, None) }
                .vk_context("vkCreatePipelineLayout")?;

            built.pipeline = create_graphics_pipeline(
                dev,
                built.render_pass,
                built.pipeline_layout,
                extent,
                vert_shader,
                frag_shader,
            )?;
            Ok(())
        })();

        match result {
            Ok(()) => {
                log::info!("Graphics pipeline ready ({:?}, {}x{})", format, extent.width, extent.height);
                Ok(built)
            }
            Err(e) => {
                built.destroy(dev);
                Err(e)
            }
        }
    }

    /// Point the descriptor set at the texture and the projection uniform.
    pub fn write_descriptors(
        &self,
        device: &ash::Device,
        texture_view: vk::ImageView,
        sampler: vk::Sampler,
        uniform: vk::Buffer,
        uniform_size: vk::DeviceSize,
    ) {
        let image_info = [vk::DescriptorImageInfo {
            sampler,
            image_view: texture_view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }];
        let buffer_info = [vk::DescriptorBufferInfo {
            buffer: uniform,
            offset: 0,
            range: uniform_size,
        }];

        let writes = [
            vk::WriteDescriptorSet::builder()
                .dst_set(self.descriptor_set)
                .dst_binding(TEXTURE_BINDING)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(&image_info)
                .build(),
            vk::WriteDescriptorSet::builder()
                .dst_set(self.descriptor_set)
                .dst_binding(UNIFORM_BINDING)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&buffer_info)
                .build(),
        ];

        unsafe { device.update_descriptor_sets(&writes, &[]) };
    }

    /// Null handles are ignored by Vulkan, so this is safe on a partial build.
    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            device.destroy_pipeline(self.pipeline, None);
            device.destroy_pipeline_layout(self.pipeline_layout, None);
            device.destroy_render_pass(self.render_pass, None);
            // Frees the set as well
            device.destroy_descriptor_pool(self.descriptor_pool, None);
            device.destroy_descriptor_set_layout(self.descriptor_set_layout, None);
        }
    }
}

/// Binding 0: texture for the fragment stage. Binding 1: projection for the vertex stage.
pub fn descriptor_bindings() -> [vk::DescriptorSetLayoutBinding; 2] {
    [
        vk::DescriptorSetLayoutBinding::builder()
            .binding(TEXTURE_BINDING)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT)
            .build(),
        vk::DescriptorSetLayoutBinding::builder()
            .binding(UNIFORM_BINDING)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .build(),
    ]
}

/// One set's worth of each descriptor type.
pub fn descriptor_pool_sizes() -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            descriptor_count: 1,
        },
        vk::DescriptorPoolSize {
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            descriptor_count: 1,
        },
    ]
}

fn create_descriptor_set_layout(device: &ash::Device) -> Result<vk::DescriptorSetLayout> {
    let bindings = descriptor_bindings();
    let info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
    unsafe { device.create_descriptor_set_layout(&info, None) }
        .vk_context("vkCreateDescriptorSetLayout")
}

fn create_descriptor_pool(device: &ash::Device) -> Result<vk::DescriptorPool> {
    let sizes = descriptor_pool_sizes();
    let info = vk::DescriptorPoolCreateInfo::builder()
        .pool_sizes(&sizes)
        .max_sets(1);
    unsafe { device.create_descriptor_pool(&info, None) }.vk_context("vkCreateDescriptorPool")
}

fn allocate_descriptor_set(
    device: &ash::Device,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
) -> Result<vk::DescriptorSet> {
    let layouts = [layout];
    let info = vk::DescriptorSetAllocateInfo::builder()
        .descriptor_pool(pool)
        .set_layouts(&layouts);
    let sets = unsafe { device.allocate_descriptor_sets(&info) }
        .vk_context("vkAllocateDescriptorSets")?;
    Ok(sets[0])
}

/// Single subpass, one color attachment, clear then store.
pub fn color_attachment(format: vk::Format, final_layout: vk::ImageLayout) -> vk::AttachmentDescription {
    vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(final_layout)
        .build()
}

fn create_render_pass(
    device: &ash::Device,
    format: vk::Format,
    final_layout: vk::ImageLayout,
) -> Result<vk::RenderPass> {
    let color_attachment_ref = vk::AttachmentReference::builder()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    let color_attachments = &[color_attachment_ref];
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(color_attachments)
        .build();

    // Wait for the acquire semaphore's stage before writing the attachment
    let dependency = vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .build();

    let attachments = &[color_attachment(format, final_layout)];
    let subpasses = &[subpass];
    let dependencies = &[dependency];

    let render_pass_info = vk::RenderPassCreateInfo::builder()
        .attachments(attachments)
        .subpasses(subpasses)
        .dependencies(dependencies);

    unsafe { device.create_render_pass(&render_pass_info, None) }
        .vk_context("vkCreateRenderPass")
}

/// Create one framebuffer per color view, full extent, 1 layer
pub fn create_framebuffers(
    device: &ash::Device,
    image_views: &[vk::ImageView],
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
) -> Result<Vec<vk::Framebuffer>> {
    let mut framebuffers = Vec::with_capacity(image_views.len());
    for &image_view in image_views {
        let attachments = &[image_view];
        let framebuffer_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        match unsafe { device.create_framebuffer(&framebuffer_info, None) } {
            Ok(framebuffer) => framebuffers.push(framebuffer),
            Err(result) => {
                for framebuffer in framebuffers {
                    unsafe { device.destroy_framebuffer(framebuffer, None) };
                }
                return Err(RenderError::Vulkan { call: "vkCreateFramebuffer", result });
            }
        }
    }
    Ok(framebuffers)
}

/// Vertex input description for quad vertices (position + uv)
pub fn vertex_input_description() -> (
    vk::VertexInputBindingDescription,
    [vk::VertexInputAttributeDescription; 2],
) {
    let binding = vk::VertexInputBindingDescription::builder()
        .binding(0)
        .stride(VERTEX_STRIDE)
        .input_rate(vk::VertexInputRate::VERTEX)
        .build();

    // Position attribute (location 0)
    let position_attr = vk::VertexInputAttributeDescription::builder()
        .binding(0)
        .location(0)
        .format(vk::Format::R32G32_SFLOAT)
        .offset(0)
        .build();

    // UV attribute (location 1)
    let uv_attr = vk::VertexInputAttributeDescription::builder()
        .binding(0)
        .location(1)
        .format(vk::Format::R32G32_SFLOAT)
        .offset(8) // After 2 floats
        .build();

    (binding, [position_attr, uv_attr])
}

/// src-alpha / one-minus-src-alpha for both color and alpha
pub fn color_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(true)
        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .alpha_blend_op(vk::BlendOp::ADD)
        .build()
}

pub fn rasterization_state() -> vk::PipelineRasterizationStateCreateInfo {
    vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::CLOCKWISE)
        .depth_bias_enable(false)
        .build()
}

fn create_graphics_pipeline(
    device: &ash::Device,
    render_pass: vk::RenderPass,
    pipeline_layout: vk::PipelineLayout,
    extent: vk::Extent2D,
    vert_shader: vk::ShaderModule,
    frag_shader: vk::ShaderModule,
) -> Result<vk::Pipeline> {
    let entry_point = c"main";

    let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::VERTEX)
        .module(vert_shader)
        .name(entry_point)
        .build();

    let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::FRAGMENT)
        .module(frag_shader)
        .name(entry_point)
        .build();

    let shader_stages = &[vert_stage, frag_stage];

    // Vertex input
    let (binding, attributes) = vertex_input_description();
    let bindings = [binding];
    let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
        .vertex_binding_descriptions(&bindings)
        .vertex_attribute_descriptions(&attributes);

    // Input assembly
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    // Viewport and scissor: static, full extent
    let viewport = vk::Viewport::builder()
        .x(0.0)
        .y(0.0)
        .width(extent.width as f32)
        .height(extent.height as f32)
        .min_depth(0.0)
        .max_depth(1.0)
        .build();

    let scissor = vk::Rect2D::builder()
        .offset(vk::Offset2D { x: 0, y: 0 })
        .extent(extent)
        .build();

    let viewports = &[viewport];
    let scissors = &[scissor];
    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewports(viewports)
        .scissors(scissors);

    let rasterizer = rasterization_state();

    // Multisampling (disabled)
    let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let color_blend_attachments = &[color_blend_attachment()];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .attachments(color_blend_attachments);

    // No depth/stencil state, no dynamic state
    let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(shader_stages)
        .vertex_input_state(&vertex_input_info)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .color_blend_state(&color_blending)
        .layout(pipeline_layout)
        .render_pass(render_pass)
        .subpass(0)
        .build();

    let pipelines = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    }
    .map_err(|(_, result)| RenderError::Vulkan {
        call: "vkCreateGraphicsPipelines",
        result,
    })?;

    Ok(pipelines[0])
}
