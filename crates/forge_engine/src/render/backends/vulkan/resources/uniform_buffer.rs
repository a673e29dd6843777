//! Uniform buffer objects
//!
//! Uniform buffers are host-visible, coherent and mapped for their whole
//! lifetime; updates are plain memory copies.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::marker::PhantomData;

use super::buffer::{copy_into_mapped, Buffer};
use crate::foundation::math::{Mat4, Mat4Ext};
use crate::render::backends::vulkan::VulkanResult;
use crate::scene::Camera;

/// Camera uniform data - updated once per frame
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CameraUniformData {
    /// World to camera space
    pub view: [[f32; 4]; 4],
    /// Camera to clip space
    pub projection: [[f32; 4]; 4],
    /// `projection * view`
    pub view_projection: [[f32; 4]; 4],
    /// Camera position in world space (w = 1)
    pub camera_position: [f32; 4],
}

impl CameraUniformData {
    /// Snapshot `camera`
    pub fn from_camera(camera: &Camera) -> Self {
        let view = camera.view_matrix();
        let projection = camera.projection_matrix();
        let position = camera.position;
        Self {
            view: view.to_cols_array(),
            projection: projection.to_cols_array(),
            view_projection: (projection * view).to_cols_array(),
            camera_position: [position.x, position.y, position.z, 1.0],
        }
    }
}

impl Default for CameraUniformData {
    fn default() -> Self {
        let identity = Mat4::identity().to_cols_array();
        Self {
            view: identity,
            projection: identity,
            view_projection: identity,
            camera_position: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

/// Persistently mapped uniform buffer holding one `T`
pub struct UniformBuffer<T: Pod> {
    mapped: *mut u8,
    buffer: Buffer,
    _marker: PhantomData<T>,
}

impl<T: Pod> UniformBuffer<T> {
    /// Create the buffer, map it and write `initial`
    pub fn new(
        device: ash::Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        initial: &T,
    ) -> VulkanResult<Self> {
        let buffer = Buffer::new(
            device,
            memory_properties,
            std::mem::size_of::<T>() as vk::DeviceSize,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        let mapped = buffer.map()?.cast::<u8>();

        let uniform = Self {
            mapped,
            buffer,
            _marker: PhantomData,
        };
        uniform.update(initial)?;
        Ok(uniform)
    }

    /// Overwrite the buffer contents
    ///
    /// The caller must make sure no in-flight frame reads this buffer, which the
    /// renderer guarantees by keeping one buffer per frame slot.
    pub fn update(&self, data: &T) -> VulkanResult<()> {
        let mapped = unsafe { std::slice::from_raw_parts_mut(self.mapped, std::mem::size_of::<T>()) };
        copy_into_mapped(mapped, 0, bytemuck::bytes_of(data))
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Size of `T` in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }
}

impl<T: Pod> Drop for UniformBuffer<T> {
    fn drop(&mut self) {
        self.buffer.unmap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;

    #[test]
    fn test_camera_uniform_layout_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<CameraUniformData>(), 3 * 64 + 16);
    }

    #[test]
    fn test_camera_uniform_combines_view_and_projection() {
        let camera = Camera::perspective(Vec3::new(0.0, 2.0, 5.0), 60.0, 1.5, 0.1, 100.0);
        let data = CameraUniformData::from_camera(&camera);

        let expected = camera.projection_matrix() * camera.view_matrix();
        assert_eq!(data.view_projection, expected.to_cols_array());
        assert_eq!(data.camera_position, [0.0, 2.0, 5.0, 1.0]);
    }
}
