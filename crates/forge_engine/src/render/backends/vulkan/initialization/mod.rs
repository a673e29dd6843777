// Vulkan initialization components

pub mod context;
pub mod device;
pub mod surface;
