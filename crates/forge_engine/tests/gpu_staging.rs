//! Staged uploads read back from device-local memory
//!
//! These need a Vulkan device and a display, so they are ignored by default:
//! `cargo test -p forge_engine -- --ignored`

use ash::vk;
use forge_engine::config::{VulkanRendererConfig, WindowConfig};
use forge_engine::render::backends::vulkan::{Buffer, GpuImage, ImageKind, VulkanContext};
use forge_engine::render::{MeshData, Vertex, Window};

fn context() -> (VulkanContext, Window) {
    let window = Window::new(&WindowConfig::new("staging test", 64, 64)).unwrap();
    let config = VulkanRendererConfig::new("staging test").with_validation(false);
    let context = VulkanContext::new(&window, &config).unwrap();
    (context, window)
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

#[test]
#[ignore = "requires a Vulkan device"]
fn staged_upload_round_trips() {
    let (context, _window) = context();
    let mesh_size = MeshData::cube().vertices.len() * std::mem::size_of::<Vertex>();

    for len in [1, 64, 4096, mesh_size] {
        let bytes = pattern(len);
        let buffer = Buffer::device_local_with_data(
            &context,
            vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_SRC,
            &bytes,
        )
        .unwrap();

        assert_eq!(buffer.size(), len as vk::DeviceSize);
        assert_eq!(buffer.read_back(&context).unwrap(), bytes, "length {len}");
    }
}

#[test]
#[ignore = "requires a Vulkan device"]
fn two_by_two_texture_gets_two_mips() {
    let (context, _window) = context();
    let pixels = pattern(2 * 2 * 4);

    let texture = GpuImage::texture_from_rgba(&context, 2, 2, &pixels, ImageKind::Texture2D).unwrap();

    let expected = if GpuImage::supports_linear_blit(&context, texture.format()) { 2 } else { 1 };
    assert_eq!(texture.mip_levels(), expected);
    assert_eq!(texture.extent(), vk::Extent2D { width: 2, height: 2 });
}
