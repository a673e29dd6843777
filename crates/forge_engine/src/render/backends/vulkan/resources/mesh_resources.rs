//! Per-mesh GPU resources
//!
//! A [`GpuMesh`] owns the device-local vertex and index buffers of one mesh,
//! one camera uniform buffer and descriptor set per frame slot, and its base
//! colour texture when it has one. Meshes without a texture sample the
//! renderer's shared white texture.

use ash::vk;

use super::buffer::{IndexBuffer, VertexBuffer};
use super::descriptor_set::{DescriptorPool, DescriptorSetLayout, DescriptorSetWriter};
use super::image::{GpuImage, ImageKind};
use super::sampler::Sampler;
use super::uniform_buffer::{CameraUniformData, UniformBuffer};
use crate::assets::ImageData;
use crate::foundation::math::{Mat4, Mat4Ext};
use crate::render::backends::vulkan::rendering::commands::ActiveRenderPass;
use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};
use crate::render::mesh::MeshData;

/// Size of the per-draw push constant block (one column-major `mat4`)
pub const MODEL_PUSH_CONSTANT_SIZE: u32 = 64;

/// Shared objects every mesh binds against
pub struct MeshBindings<'a> {
    /// Forward pipeline's set layout
    pub layout: &'a DescriptorSetLayout,
    /// Pool the mesh allocates its sets from
    pub pool: &'a DescriptorPool,
    /// Texture sampler
    pub sampler: &'a Sampler,
    /// Texture used when the mesh has none
    pub default_texture: &'a GpuImage,
}

/// GPU-side mesh
pub struct GpuMesh {
    descriptor_sets: Vec<vk::DescriptorSet>,
    descriptor_pool: vk::DescriptorPool,
    device: ash::Device,
    uniform_buffers: Vec<UniformBuffer<CameraUniformData>>,
    texture: Option<GpuImage>,
    index_buffer: IndexBuffer,
    vertex_buffer: VertexBuffer,
}

impl GpuMesh {
    /// Upload `mesh` (and `texture`) and bind one descriptor set per frame slot
    pub fn new(
        context: &VulkanContext,
        mesh: &MeshData,
        texture: Option<&ImageData>,
        frames_in_flight: usize,
        bindings: &MeshBindings<'_>,
    ) -> VulkanResult<Self> {
        mesh.validate()
            .map_err(|reason| VulkanError::InvalidOperation { reason })?;

        let vertex_buffer = VertexBuffer::new(context, &mesh.vertices)?;
        let index_buffer = IndexBuffer::new(context, &mesh.indices)?;

        let texture = texture
            .map(|image| {
                GpuImage::texture_from_rgba(context, image.width, image.height, &image.data, ImageKind::Texture2D)
            })
            .transpose()?;

        let uniform_buffers = (0..frames_in_flight)
            .map(|_| {
                UniformBuffer::new(
                    context.raw_device().clone(),
                    context.memory_properties(),
                    &CameraUniformData::default(),
                )
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        let layouts = vec![bindings.layout.handle(); frames_in_flight];
        let descriptor_sets = bindings.pool.allocate(&layouts)?;

        let image_view = texture.as_ref().unwrap_or(bindings.default_texture).view();
        let writer = descriptor_sets
            .iter()
            .zip(&uniform_buffers)
            .fold(DescriptorSetWriter::new(), |writer, (&set, uniform)| {
                writer
                    .write_buffer(set, 0, uniform.handle(), 0, uniform.size())
                    .write_image(
                        set,
                        1,
                        image_view,
                        bindings.sampler.handle(),
                        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    )
            });
        writer.update(context.raw_device());

        log::debug!(
            "Created GPU mesh: {} vertices, {} triangles, textured: {}",
            mesh.vertices.len(),
            mesh.triangle_count(),
            texture.is_some()
        );

        Ok(Self {
            descriptor_sets,
            descriptor_pool: bindings.pool.handle(),
            device: context.raw_device().clone(),
            uniform_buffers,
            texture,
            index_buffer,
            vertex_buffer,
        })
    }

    /// Write the camera data for frame slot `slot`
    pub fn update_uniforms(&self, slot: usize, data: &CameraUniformData) -> VulkanResult<()> {
        self.uniform_buffers
            .get(slot)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("No uniform buffer for frame slot {slot}"),
            })?
            .update(data)
    }

    /// Descriptor set bound when drawing in frame slot `slot`
    pub fn descriptor_set(&self, slot: usize) -> Option<vk::DescriptorSet> {
        self.descriptor_sets.get(slot).copied()
    }

    /// Bind this mesh's resources and draw it once with `model`
    pub fn record_draw(
        &self,
        pass: &mut ActiveRenderPass<'_>,
        pipeline_layout: vk::PipelineLayout,
        slot: usize,
        model: &Mat4,
    ) -> VulkanResult<()> {
        let set = self.descriptor_set(slot).ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!("No descriptor set for frame slot {slot}"),
        })?;

        pass.bind_descriptor_sets(pipeline_layout, &[set]);
        let columns = model.to_cols_array();
        pass.push_constants(
            pipeline_layout,
            vk::ShaderStageFlags::VERTEX,
            0,
            bytemuck::cast_slice(&columns),
        );
        pass.bind_vertex_buffers(0, &[self.vertex_buffer.handle()], &[0]);
        pass.bind_index_buffer(self.index_buffer.handle(), 0, vk::IndexType::UINT32);
        pass.draw_indexed(self.index_buffer.index_count(), 1, 0, 0, 0);
        Ok(())
    }

    /// Number of indices drawn
    pub fn index_count(&self) -> u32 {
        self.index_buffer.index_count()
    }

    /// Whether the mesh has its own texture
    pub fn has_texture(&self) -> bool {
        self.texture.is_some()
    }
}

impl Drop for GpuMesh {
    fn drop(&mut self) {
        if let Err(e) = unsafe {
            self.device
                .free_descriptor_sets(self.descriptor_pool, &self.descriptor_sets)
        } {
            log::warn!("Failed to free mesh descriptor sets: {:?}", e);
        }
    }
}
