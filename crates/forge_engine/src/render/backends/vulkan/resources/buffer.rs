//! Buffer management for vertex, index and staging data
//!
//! Device-local buffers are filled through a transient host-visible staging
//! buffer and a blocking one-time submit, so the data is resident before the
//! call returns.

use ash::{vk, Device};
use std::ffi::c_void;

use super::memory;
use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};
use crate::render::mesh::Vertex;

const HOST_MEMORY: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

/// Copy `src` into a mapped region at `offset`, refusing writes past its end
pub fn copy_into_mapped(mapped: &mut [u8], offset: usize, src: &[u8]) -> VulkanResult<()> {
    let end = offset
        .checked_add(src.len())
        .filter(|&end| end <= mapped.len())
        .ok_or_else(|| VulkanError::InvalidOperation {
            reason: format!(
                "Write of {} bytes at offset {} exceeds buffer of {} bytes",
                src.len(),
                offset,
                mapped.len()
            ),
        })?;
    mapped[offset..end].copy_from_slice(src);
    Ok(())
}

/// Buffer wrapper with memory management
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    properties: vk::MemoryPropertyFlags,
}

impl Buffer {
    /// Create a buffer and bind freshly allocated memory to it
    ///
    /// The allocation is sized from the buffer's memory requirements, which may
    /// exceed `size`.
    pub fn new(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        if size == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "Cannot create an empty buffer".to_string(),
            });
        }

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.create_buffer(&buffer_info, None) }.map_err(VulkanError::Api)?;

        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let memory = match memory::allocate(&device, memory_properties, requirements, properties) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { device.bind_buffer_memory(buffer, memory, 0) } {
            unsafe {
                device.destroy_buffer(buffer, None);
                device.free_memory(memory, None);
            }
            return Err(VulkanError::Api(e));
        }

        Ok(Self {
            device,
            buffer,
            memory,
            size,
            properties,
        })
    }

    /// Host-visible, coherent staging buffer used as a transfer source
    pub fn staging(
        device: Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
    ) -> VulkanResult<Self> {
        Self::new(
            device,
            memory_properties,
            size,
            vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST,
            HOST_MEMORY,
        )
    }

    /// Create a device-local buffer holding `bytes`
    ///
    /// `TRANSFER_DST` is added to `usage`. Blocks until the copy has completed.
    pub fn device_local_with_data(
        context: &VulkanContext,
        usage: vk::BufferUsageFlags,
        bytes: &[u8],
    ) -> VulkanResult<Self> {
        let size = bytes.len() as vk::DeviceSize;
        let staging = Self::staging(context.raw_device().clone(), context.memory_properties(), size)?;
        staging.write_bytes(0, bytes)?;

        let buffer = Self::new(
            context.raw_device().clone(),
            context.memory_properties(),
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        buffer.copy_from(context, &staging, size)?;
        log::debug!("Uploaded {} bytes to device-local buffer", size);
        Ok(buffer)
    }

    /// Copy the first `size` bytes of `src` into this buffer with a blocking submit
    pub fn copy_from(&self, context: &VulkanContext, src: &Buffer, size: vk::DeviceSize) -> VulkanResult<()> {
        if size > src.size || size > self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Copy of {size} bytes exceeds source or destination buffer"),
            });
        }

        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        context.one_time_submit(|device, command_buffer| unsafe {
            device.cmd_copy_buffer(command_buffer, src.handle(), self.buffer, &[region]);
        })
    }

    /// Read the whole buffer back through a staging copy
    ///
    /// The buffer must have been created with `TRANSFER_SRC` usage.
    pub fn read_back(&self, context: &VulkanContext) -> VulkanResult<Vec<u8>> {
        let staging = Self::staging(context.raw_device().clone(), context.memory_properties(), self.size)?;
        staging.copy_from(context, self, self.size)?;
        staging.read_bytes()
    }

    /// Map the whole buffer; the memory must be host-visible
    pub fn map(&self) -> VulkanResult<*mut c_void> {
        if !self.properties.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
            return Err(VulkanError::InvalidOperation {
                reason: "Cannot map device-local buffer memory".to_string(),
            });
        }

        unsafe {
            self.device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
        }
        .map_err(VulkanError::Api)
    }

    /// Unmap memory
    pub fn unmap(&self) {
        unsafe {
            self.device.unmap_memory(self.memory);
        }
    }

    /// Write `bytes` at `offset` through a temporary mapping
    pub fn write_bytes(&self, offset: usize, bytes: &[u8]) -> VulkanResult<()> {
        let ptr = self.map()?;
        let mapped = unsafe { std::slice::from_raw_parts_mut(ptr.cast::<u8>(), self.size as usize) };
        let result = copy_into_mapped(mapped, offset, bytes);
        self.unmap();
        result
    }

    /// Copy the buffer contents out through a temporary mapping
    pub fn read_bytes(&self) -> VulkanResult<Vec<u8>> {
        let ptr = self.map()?;
        let contents = unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), self.size as usize) }.to_vec();
        self.unmap();
        Ok(contents)
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Requested size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Device-local vertex buffer
pub struct VertexBuffer {
    buffer: Buffer,
    vertex_count: u32,
}

impl VertexBuffer {
    /// Upload `vertices` through a staging buffer
    pub fn new(context: &VulkanContext, vertices: &[Vertex]) -> VulkanResult<Self> {
        let buffer = Buffer::device_local_with_data(
            context,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            bytemuck::cast_slice(vertices),
        )?;

        Ok(Self {
            buffer,
            vertex_count: vertices.len() as u32,
        })
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Number of vertices uploaded
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}

/// Device-local `u32` index buffer
pub struct IndexBuffer {
    buffer: Buffer,
    index_count: u32,
}

impl IndexBuffer {
    /// Upload `indices` through a staging buffer
    pub fn new(context: &VulkanContext, indices: &[u32]) -> VulkanResult<Self> {
        let buffer = Buffer::device_local_with_data(
            context,
            vk::BufferUsageFlags::INDEX_BUFFER,
            bytemuck::cast_slice(indices),
        )?;

        Ok(Self {
            buffer,
            index_count: indices.len() as u32,
        })
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Get index count
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapped_copy_preserves_bytes_for_all_sizes() {
        for n in [1usize, 64, 4096, 36 * std::mem::size_of::<Vertex>()] {
            let src: Vec<u8> = (0..n).map(|i| (i * 31 % 251) as u8).collect();
            let mut mapped = vec![0u8; n];
            copy_into_mapped(&mut mapped, 0, &src).unwrap();
            assert_eq!(mapped, src, "size {n}");
        }
    }

    #[test]
    fn test_mapped_copy_at_offset() {
        let mut mapped = vec![0u8; 8];
        copy_into_mapped(&mut mapped, 4, &[1, 2, 3, 4]).unwrap();
        assert_eq!(mapped, vec![0, 0, 0, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_mapped_copy_rejects_overflow() {
        let mut mapped = vec![0u8; 8];
        assert!(copy_into_mapped(&mut mapped, 5, &[0; 4]).is_err());
        assert!(copy_into_mapped(&mut mapped, usize::MAX, &[0; 2]).is_err());
        assert_eq!(mapped, vec![0u8; 8]);
    }
}
