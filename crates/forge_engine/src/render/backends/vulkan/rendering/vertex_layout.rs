//! Vulkan vertex input layout for [`Vertex`]
//!
//! The mesh module stays backend-agnostic; this is where its memory layout is
//! described to the pipeline.

use ash::vk;
use std::mem::{offset_of, size_of};

use crate::render::mesh::Vertex;

/// Vertex input description of the engine's [`Vertex`]
pub struct VulkanVertexLayout;

impl VulkanVertexLayout {
    /// Single interleaved binding advancing per vertex
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Locations 0..=4: position, normal, colour, uv, tangent
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 5] {
        let attribute = |location, format, offset: usize| vk::VertexInputAttributeDescription {
            binding: 0,
            location,
            format,
            offset: offset as u32,
        };

        [
            attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, position)),
            attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, normal)),
            attribute(2, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, color)),
            attribute(3, vk::Format::R32G32_SFLOAT, offset_of!(Vertex, uv)),
            attribute(4, vk::Format::R32G32B32A32_SFLOAT, offset_of!(Vertex, tangent)),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stride_matches_vertex_size() {
        assert_eq!(VulkanVertexLayout::binding_description().stride, 60);
    }

    #[test]
    fn test_attribute_offsets() {
        let offsets: Vec<u32> = VulkanVertexLayout::attribute_descriptions()
            .iter()
            .map(|a| a.offset)
            .collect();
        assert_eq!(offsets, vec![0, 12, 24, 36, 44]);
    }

    #[test]
    fn test_locations_are_sequential() {
        for (i, attribute) in VulkanVertexLayout::attribute_descriptions().iter().enumerate() {
            assert_eq!(attribute.location as usize, i);
            assert_eq!(attribute.binding, 0);
        }
    }
}
