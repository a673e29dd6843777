//! Vulkan backend implementation
//!
//! Organized into initialization, state, rendering and resources modules, with
//! [`VulkanRenderer`] tying them together into the per-frame loop.

/// Vulkan initialization types (instance, surface, device, context)
pub mod initialization;

/// Vulkan resource management (memory, buffers, images, descriptors)
pub mod resources;

/// Vulkan rendering operations (render pass, pipeline, commands)
pub mod rendering;

/// Swapchain and frame synchronization state
pub mod state;

/// Main Vulkan renderer implementation
pub mod renderer;

pub use renderer::{RebuildScope, VulkanRenderer, MAX_MESHES};

pub use initialization::context::{VulkanContext, VulkanError, VulkanInstance, VulkanResult};
pub use initialization::device::{
    max_usable_sample_count, queried_candidates, select_device, DeviceCandidate, LogicalDevice,
    QueueFamilyIndices, SelectionPolicy, SuitabilityReport, SwapchainSupport,
};
pub use initialization::surface::Surface;

pub use resources::buffer::{Buffer, IndexBuffer, VertexBuffer};
pub use resources::descriptor_set::{
    pool_sizes, DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorSetWriter,
};
pub use resources::image::{mip_blit_plan, mip_level_count, GpuImage, ImageKind, LayoutTransition, MipBlit};
pub use resources::memory::find_memory_type;
pub use resources::mesh_resources::{GpuMesh, MeshBindings};
pub use resources::sampler::Sampler;
pub use resources::uniform_buffer::{CameraUniformData, UniformBuffer};

pub use rendering::command_recycler::RecyclingPool;
pub use rendering::commands::{ActiveRenderPass, CommandPool, CommandRecorder, FrameCommands};
pub use rendering::render_pass::{AttachmentPlan, RenderPass};
pub use rendering::shader::{spirv_words, GraphicsPipeline, ShaderModule};
pub use rendering::vertex_layout::VulkanVertexLayout;

pub use state::frame_scheduler::{recreate_after_present, AcquireAction, FrameScheduler, SlotState};
pub use state::framebuffer::Framebuffer;
pub use state::swapchain::{Swapchain, SwapchainPlan};
pub use state::swapchain_manager::{find_depth_format, SwapchainManager};
pub use state::sync::{Fence, FrameSync, Semaphore};
