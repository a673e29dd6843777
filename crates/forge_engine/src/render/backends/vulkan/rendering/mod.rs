// Vulkan rendering components

pub mod command_recycler;
pub mod commands;
pub mod render_pass;
pub mod shader;
pub mod vertex_layout;
