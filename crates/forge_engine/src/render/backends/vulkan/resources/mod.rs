//! Vulkan resource management
//!
//! GPU memory, buffers, images, samplers and descriptor sets. Every type owns its
//! Vulkan handles and destroys them on drop.

/// Memory type selection
pub mod memory;

/// Buffer types (generic, vertex, index) and staged uploads
pub mod buffer;

/// Persistently mapped uniform buffers
pub mod uniform_buffer;

/// Images, layout transitions and mipmap generation
pub mod image;

/// Texture samplers
pub mod sampler;

/// Descriptor set management
pub mod descriptor_set;

/// Per-mesh GPU resources
pub mod mesh_resources;
