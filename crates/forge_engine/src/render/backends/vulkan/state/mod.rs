// Vulkan state management

pub mod frame_scheduler;
pub mod framebuffer;
pub mod swapchain;
pub mod swapchain_manager;
pub mod sync;
