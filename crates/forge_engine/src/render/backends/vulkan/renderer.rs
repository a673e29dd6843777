//! Vulkan renderer
//!
//! [`VulkanRenderer`] owns the context and every object built on top of it and
//! drives the per-frame loop: wait on the slot's fence, acquire an image, record
//! the forward pass, submit, present, and recreate the swapchain when the
//! surface changes underneath it.

use ash::vk;

use super::rendering::command_recycler::RecyclingPool;
use super::rendering::commands::{CommandRecorder, FrameCommands};
use super::rendering::render_pass::RenderPass;
use super::rendering::shader::{full_scissor, full_viewport, GraphicsPipeline, ShaderModule};
use super::resources::descriptor_set::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder};
use super::resources::image::{GpuImage, ImageKind};
use super::resources::mesh_resources::{GpuMesh, MeshBindings};
use super::resources::sampler::Sampler;
use super::resources::uniform_buffer::CameraUniformData;
use super::state::frame_scheduler::{recreate_after_present, AcquireAction, FrameScheduler};
use super::state::swapchain_manager::{find_depth_format, SwapchainManager};
use super::state::sync::FrameSync;
use super::{VulkanContext, VulkanError, VulkanResult};

use crate::assets::ImageData;
use crate::config::{ShaderConfig, VulkanRendererConfig};
use crate::foundation::math::Mat4;
use crate::render::{MeshHandle, RenderAsset, RenderBackend, Window};
use crate::scene::{Camera, SceneGraph};
use crate::EngineError;

/// Meshes a renderer can hold; sizes the descriptor pool
pub const MAX_MESHES: u32 = 256;

/// Whether a framebuffer of this size can be rendered to
pub fn is_renderable_size((width, height): (u32, u32)) -> bool {
    width > 0 && height > 0
}

/// Swapchain-dependent objects to rebuild after the swapchain was recreated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildScope {
    /// Depth and MSAA targets plus framebuffers
    Targets,
    /// The surface format changed, so the render pass and pipeline go too
    PassAndPipeline,
}

impl RebuildScope {
    /// Decide what a swapchain now using `swapchain_format` invalidates
    pub fn after_recreate(pass_color_format: vk::Format, swapchain_format: vk::Format) -> Self {
        if pass_color_format == swapchain_format {
            Self::Targets
        } else {
            Self::PassAndPipeline
        }
    }
}

/// Forward renderer over a single window
///
/// Fields drop top to bottom: meshes free their descriptor sets before the pool
/// goes, per-frame objects go before the pipeline objects they reference, and
/// the context (device, surface, instance) goes last.
pub struct VulkanRenderer {
    meshes: Vec<GpuMesh>,
    recycler: RecyclingPool<FrameCommands>,
    frame_syncs: Vec<FrameSync>,
    descriptor_pool: DescriptorPool,
    default_texture: GpuImage,
    sampler: Sampler,
    pipeline: GraphicsPipeline,
    descriptor_layout: DescriptorSetLayout,
    swapchain_manager: SwapchainManager,
    render_pass: RenderPass,
    context: VulkanContext,

    scheduler: FrameScheduler,
    samples: vk::SampleCountFlags,
    camera: CameraUniformData,
    draw_list: Vec<(MeshHandle, Mat4)>,
    framebuffer_size: (u32, u32),
    resize_pending: bool,
    clear_color: [f32; 4],
    prefer_mailbox: bool,
    shaders: ShaderConfig,
}

impl VulkanRenderer {
    /// Create a renderer for `window`
    pub fn new(window: &Window, config: &VulkanRendererConfig) -> VulkanResult<Self> {
        config
            .validate()
            .map_err(|e| VulkanError::InitializationFailed(e.to_string()))?;
        log::debug!("Creating VulkanRenderer...");

        let context = VulkanContext::new(window, config)?;
        let device = context.raw_device().clone();
        let frames_in_flight = config.max_frames_in_flight;

        let samples = if config.msaa {
            context.physical_device.max_sample_count()
        } else {
            vk::SampleCountFlags::TYPE_1
        };
        let depth_format = find_depth_format(&context)?;
        let color_format = context.swapchain().format().format;

        let render_pass = RenderPass::new_forward_pass(device.clone(), color_format, depth_format, samples)?;
        let swapchain_manager = SwapchainManager::new(&context, &render_pass, depth_format, samples)?;

        let descriptor_layout = DescriptorSetLayoutBuilder::forward().build(&device)?;
        let pipeline = build_pipeline(&context, &render_pass, &descriptor_layout, &config.shaders, samples)?;

        let max_anisotropy = context
            .physical_device
            .sampler_anisotropy
            .then_some(context.physical_device.limits.max_sampler_anisotropy);
        let sampler = Sampler::new(device.clone(), max_anisotropy, vk::LOD_CLAMP_NONE)?;

        let white = ImageData::solid_color(1, 1, [255, 255, 255, 255]);
        let default_texture =
            GpuImage::texture_from_rgba(&context, white.width, white.height, &white.data, ImageKind::Texture2D)?;

        let max_sets = MAX_MESHES.saturating_mul(u32::try_from(frames_in_flight).unwrap_or(u32::MAX));
        let descriptor_pool = DescriptorPool::new(device.clone(), &descriptor_layout, max_sets)?;

        let frame_syncs = (0..frames_in_flight)
            .map(|_| FrameSync::new(device.clone()))
            .collect::<VulkanResult<Vec<_>>>()?;
        let scheduler = FrameScheduler::new(frames_in_flight, context.swapchain().image_count());

        log::info!(
            "VulkanRenderer ready: {} frames in flight, {:?}, depth {:?}, present mode {:?}",
            frames_in_flight,
            samples,
            depth_format,
            context.swapchain().present_mode()
        );

        Ok(Self {
            meshes: Vec::new(),
            recycler: RecyclingPool::new(),
            frame_syncs,
            descriptor_pool,
            default_texture,
            sampler,
            pipeline,
            descriptor_layout,
            swapchain_manager,
            render_pass,
            framebuffer_size: window.framebuffer_size(),
            context,
            scheduler,
            samples,
            camera: CameraUniformData::default(),
            draw_list: Vec::new(),
            resize_pending: false,
            clear_color: config.clear_color,
            prefer_mailbox: config.prefer_mailbox,
            shaders: config.shaders.clone(),
        })
    }

    /// Upload a mesh and its texture, returning the handle scene nodes refer to
    pub fn upload_asset(&mut self, asset: &RenderAsset) -> VulkanResult<MeshHandle> {
        if self.meshes.len() >= MAX_MESHES as usize {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Mesh limit of {MAX_MESHES} reached"),
            });
        }

        let bindings = MeshBindings {
            layout: &self.descriptor_layout,
            pool: &self.descriptor_pool,
            sampler: &self.sampler,
            default_texture: &self.default_texture,
        };
        let mesh = GpuMesh::new(
            &self.context,
            &asset.mesh,
            asset.texture.as_ref(),
            self.scheduler.slot_count(),
            &bindings,
        )?;

        self.meshes.push(mesh);
        Ok(MeshHandle(self.meshes.len() - 1))
    }

    /// Render and present one frame
    ///
    /// Returns without drawing while the framebuffer has a zero dimension.
    pub fn render_frame(&mut self) -> VulkanResult<()> {
        if !is_renderable_size(self.framebuffer_size) {
            return Ok(());
        }
        if self.resize_pending {
            self.recreate_swapchain()?;
        }

        let slot = self.scheduler.current_slot();
        let (image_index, acquired_suboptimal) = loop {
            let sync = &self.frame_syncs[slot];
            sync.in_flight.wait(u64::MAX)?;
            self.scheduler.begin_recording(slot, sync.in_flight.is_signaled()?)?;

            let acquired = self
                .context
                .swapchain()
                .acquire_next_image(sync.image_available.handle());
            match AcquireAction::from_result(acquired) {
                Ok(AcquireAction::Proceed { image_index, suboptimal }) => {
                    if suboptimal {
                        log::debug!("Acquired image from a suboptimal swapchain");
                    }
                    break (image_index, suboptimal);
                }
                Ok(AcquireAction::Recreate) => {
                    log::debug!("Swapchain out of date on acquire, recreating");
                    self.scheduler.cancel_recording(slot)?;
                    if !self.recreate_swapchain()? {
                        return Ok(());
                    }
                }
                Err(e) => {
                    self.scheduler.cancel_recording(slot)?;
                    return Err(e);
                }
            }
        };

        if let Some(owner) = self.scheduler.claim_image(image_index as usize, slot)? {
            self.frame_syncs[owner].in_flight.wait(u64::MAX)?;
        }

        for mesh in &self.meshes {
            mesh.update_uniforms(slot, &self.camera)?;
        }

        let device = self.context.raw_device().clone();
        let graphics_family = self.context.device.graphics_family;
        let commands = self
            .recycler
            .request(self.scheduler.completed_value(), || {
                FrameCommands::new(device.clone(), graphics_family)
            })?;

        let command_buffer = match self.record_commands(&commands, slot, image_index) {
            Ok(command_buffer) => command_buffer,
            Err(e) => {
                self.scheduler.cancel_recording(slot)?;
                return Err(e);
            }
        };

        let sync = &self.frame_syncs[slot];
        let wait_semaphores = [sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [sync.render_finished.handle()];
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        sync.in_flight.reset()?;
        unsafe {
            device.queue_submit(
                self.context.graphics_queue(),
                &[submit_info.build()],
                sync.in_flight.handle(),
            )
        }
        .map_err(VulkanError::Api)?;

        let value = self.scheduler.mark_submitted(slot)?;
        self.recycler.discard(value, commands);

        let present_suboptimal = self.context.swapchain().present(
            self.context.present_queue(),
            image_index,
            sync.render_finished.handle(),
        )?;
        self.scheduler.mark_presented(slot)?;

        if recreate_after_present(acquired_suboptimal, present_suboptimal, self.resize_pending) {
            self.recreate_swapchain()?;
        }

        self.scheduler.advance();
        Ok(())
    }

    fn record_commands(&self, commands: &FrameCommands, slot: usize, image_index: u32) -> VulkanResult<vk::CommandBuffer> {
        let framebuffer = self
            .swapchain_manager
            .framebuffer(image_index as usize)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("No framebuffer for swapchain image {image_index}"),
            })?;
        let extent = self.context.swapchain().extent();

        commands.reset()?;
        let mut recorder = CommandRecorder::new(commands.command_buffer(), self.context.raw_device().clone());
        recorder.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        ];

        {
            let mut pass = recorder.begin_render_pass(
                self.render_pass.handle(),
                framebuffer,
                full_scissor(extent),
                &clear_values,
            )?;
            pass.bind_pipeline(self.pipeline.handle());
            pass.set_viewport(full_viewport(extent));
            pass.set_scissor(full_scissor(extent));

            for (handle, model) in &self.draw_list {
                match self.meshes.get(handle.0) {
                    Some(mesh) => mesh.record_draw(&mut pass, self.pipeline.layout(), slot, model)?,
                    None => log::trace!("Skipping unknown mesh {:?}", handle),
                }
            }
        }

        recorder.end()
    }

    /// Rebuild the swapchain and everything sized from it
    ///
    /// Returns `false`, leaving the resize pending, while the framebuffer is zero-sized.
    fn recreate_swapchain(&mut self) -> VulkanResult<bool> {
        if !is_renderable_size(self.framebuffer_size) {
            self.resize_pending = true;
            return Ok(false);
        }

        self.context
            .recreate_swapchain(self.framebuffer_size, self.prefer_mailbox)?;

        let swapchain_format = self.context.swapchain().format().format;
        if RebuildScope::after_recreate(self.render_pass.color_format(), swapchain_format)
            == RebuildScope::PassAndPipeline
        {
            log::info!(
                "Surface format changed from {:?} to {:?}, rebuilding render pass and pipeline",
                self.render_pass.color_format(),
                swapchain_format
            );
            let render_pass = RenderPass::new_forward_pass(
                self.context.raw_device().clone(),
                swapchain_format,
                self.swapchain_manager.depth_format(),
                self.samples,
            )?;
            let pipeline = build_pipeline(
                &self.context,
                &render_pass,
                &self.descriptor_layout,
                &self.shaders,
                self.samples,
            )?;
            self.pipeline = pipeline;
            self.render_pass = render_pass;
        }

        self.swapchain_manager
            .recreate(&self.context, &self.render_pass)?;
        self.scheduler
            .reset_images(self.context.swapchain().image_count());
        self.resize_pending = false;
        Ok(true)
    }

    /// Record a new framebuffer size; the swapchain is rebuilt before the next frame
    pub fn handle_resize(&mut self, width: u32, height: u32) {
        self.framebuffer_size = (width, height);
        self.resize_pending = true;
    }

    /// Current swapchain extent
    pub fn swapchain_extent(&self) -> (u32, u32) {
        let extent = self.context.swapchain().extent();
        (extent.width, extent.height)
    }

    /// Sample count of the colour and depth targets
    pub fn sample_count(&self) -> vk::SampleCountFlags {
        self.samples
    }

    /// Number of frame slots
    pub fn frames_in_flight(&self) -> usize {
        self.scheduler.slot_count()
    }

    /// Number of uploaded meshes
    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// Borrow the Vulkan context
    pub fn context(&self) -> &VulkanContext {
        &self.context
    }

    /// Wait for device idle
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.context.wait_idle()
    }
}

/// Forward pipeline for `render_pass`, loading the configured SPIR-V
fn build_pipeline(
    context: &VulkanContext,
    render_pass: &RenderPass,
    descriptor_layout: &DescriptorSetLayout,
    shaders: &ShaderConfig,
    samples: vk::SampleCountFlags,
) -> VulkanResult<GraphicsPipeline> {
    let device = context.raw_device().clone();
    let vertex_shader = ShaderModule::from_file(device.clone(), &shaders.vertex_shader_path)?;
    let fragment_shader = ShaderModule::from_file(device.clone(), &shaders.fragment_shader_path)?;
    GraphicsPipeline::new(
        device,
        render_pass.handle(),
        &vertex_shader,
        &fragment_shader,
        descriptor_layout.handle(),
        context.swapchain().extent(),
        samples,
    )
}

impl RenderBackend for VulkanRenderer {
    fn add_asset(&mut self, asset: RenderAsset) -> Result<MeshHandle, EngineError> {
        Ok(self.upload_asset(&asset)?)
    }

    fn set_camera(&mut self, camera: &Camera) {
        self.camera = CameraUniformData::from_camera(camera);
    }

    fn submit_scene(&mut self, scene: &SceneGraph) {
        self.draw_list = scene.mesh_nodes();
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.handle_resize(width, height);
    }

    fn draw_frame(&mut self) -> Result<(), EngineError> {
        Ok(self.render_frame()?)
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        if let Err(e) = self.context.wait_idle() {
            log::error!("Failed to wait for device idle during renderer teardown: {}", e);
        }
        if let Err(e) = unsafe { self.context.raw_device().queue_wait_idle(self.context.graphics_queue()) } {
            log::error!("Failed to flush graphics queue during renderer teardown: {:?}", e);
        }
        log::debug!("Destroying VulkanRenderer ({} meshes)", self.meshes.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_sized_framebuffer_is_not_renderable() {
        assert!(!is_renderable_size((0, 0)));
        assert!(!is_renderable_size((800, 0)));
        assert!(!is_renderable_size((0, 600)));
        assert!(is_renderable_size((1, 1)));
    }

    #[test]
    fn test_format_change_rebuilds_pass_and_pipeline() {
        assert_eq!(
            RebuildScope::after_recreate(vk::Format::B8G8R8A8_SRGB, vk::Format::B8G8R8A8_SRGB),
            RebuildScope::Targets
        );
        assert_eq!(
            RebuildScope::after_recreate(vk::Format::B8G8R8A8_SRGB, vk::Format::R8G8B8A8_UNORM),
            RebuildScope::PassAndPipeline
        );
    }
}
