//! GPU images: sampled textures and render-target attachments
//!
//! Texture uploads go through a staging buffer and one blocking submit that
//! transitions the image, copies level 0 and then either transitions it for
//! sampling or blits the full mip chain. Layout changes outside the small
//! table in [`LayoutTransition::for_layouts`] are rejected.

use ash::vk;

use super::buffer::Buffer;
use super::memory;
use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Colour format used for sampled textures
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Number of levels in a full mip chain: `floor(log2(max(width, height))) + 1`
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    u32::BITS - largest.leading_zeros()
}

/// One step of mip chain generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipBlit {
    /// Level read from
    pub src_level: u32,
    /// Level written to
    pub dst_level: u32,
    /// Size of the source level
    pub src_extent: (i32, i32),
    /// Size of the destination level
    pub dst_extent: (i32, i32),
}

/// Blits that fill levels `1..levels` of an image whose level 0 is `width`×`height`
///
/// Each level halves the previous one, never going below one texel.
pub fn mip_blit_plan(width: u32, height: u32, levels: u32) -> Vec<MipBlit> {
    let mut src = (to_offset(width), to_offset(height));
    (1..levels)
        .map(|dst_level| {
            let dst = ((src.0 / 2).max(1), (src.1 / 2).max(1));
            let blit = MipBlit {
                src_level: dst_level - 1,
                dst_level,
                src_extent: src,
                dst_extent: dst,
            };
            src = dst;
            blit
        })
        .collect()
}

fn to_offset(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Kind of sampled image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageKind {
    /// Single-layer 2D texture
    #[default]
    Texture2D,
    /// Six-layer cube-compatible image sampled through a cube view
    Cubemap,
}

impl ImageKind {
    /// Number of array layers
    pub fn layer_count(self) -> u32 {
        match self {
            Self::Texture2D => 1,
            Self::Cubemap => 6,
        }
    }

    /// View type used for sampling
    pub fn view_type(self) -> vk::ImageViewType {
        match self {
            Self::Texture2D => vk::ImageViewType::TYPE_2D,
            Self::Cubemap => vk::ImageViewType::CUBE,
        }
    }

    /// Image creation flags
    pub fn create_flags(self) -> vk::ImageCreateFlags {
        match self {
            Self::Texture2D => vk::ImageCreateFlags::empty(),
            Self::Cubemap => vk::ImageCreateFlags::CUBE_COMPATIBLE,
        }
    }
}

/// Access masks and pipeline stages for a supported layout change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutTransition {
    /// Layout the image is in
    pub old_layout: vk::ImageLayout,
    /// Layout the image moves to
    pub new_layout: vk::ImageLayout,
    /// Accesses that must complete first
    pub src_access: vk::AccessFlags,
    /// Accesses that wait for the transition
    pub dst_access: vk::AccessFlags,
    /// Stage producing `src_access`
    pub src_stage: vk::PipelineStageFlags,
    /// Stage consuming `dst_access`
    pub dst_stage: vk::PipelineStageFlags,
}

impl LayoutTransition {
    /// Look up the barrier parameters for `old` → `new`
    pub fn for_layouts(old: vk::ImageLayout, new: vk::ImageLayout) -> VulkanResult<Self> {
        let (src_access, dst_access, src_stage, dst_stage) = match (old, new) {
            (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => (
                vk::AccessFlags::empty(),
                vk::AccessFlags::TRANSFER_WRITE,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
            ),
            (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => (
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ),
            _ => return Err(VulkanError::UnsupportedLayoutTransition { old, new }),
        };

        Ok(Self {
            old_layout: old,
            new_layout: new,
            src_access,
            dst_access,
            src_stage,
            dst_stage,
        })
    }

    /// Record this transition for `range` of `image`
    pub fn record(
        &self,
        device: &ash::Device,
        command_buffer: vk::CommandBuffer,
        image: vk::Image,
        range: vk::ImageSubresourceRange,
    ) {
        record_barrier(
            device,
            command_buffer,
            image,
            range,
            (self.old_layout, self.new_layout),
            (self.src_access, self.dst_access),
            (self.src_stage, self.dst_stage),
        );
    }
}

fn record_barrier(
    device: &ash::Device,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    range: vk::ImageSubresourceRange,
    (old_layout, new_layout): (vk::ImageLayout, vk::ImageLayout),
    (src_access, dst_access): (vk::AccessFlags, vk::AccessFlags),
    (src_stage, dst_stage): (vk::PipelineStageFlags, vk::PipelineStageFlags),
) {
    let barrier = vk::ImageMemoryBarrier::builder()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
        .src_access_mask(src_access)
        .dst_access_mask(dst_access);

    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier.build()],
        );
    }
}

fn color_range(base_mip_level: u32, level_count: u32, layer_count: u32) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level,
        level_count,
        base_array_layer: 0,
        layer_count,
    }
}

/// Description of an image to allocate
struct ImageDesc {
    extent: vk::Extent2D,
    format: vk::Format,
    usage: vk::ImageUsageFlags,
    aspect: vk::ImageAspectFlags,
    samples: vk::SampleCountFlags,
    mip_levels: u32,
    kind: ImageKind,
}

/// Image with its own memory and a view over every level and layer
pub struct GpuImage {
    device: ash::Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    view: vk::ImageView,
    format: vk::Format,
    extent: vk::Extent2D,
    mip_levels: u32,
    kind: ImageKind,
}

impl GpuImage {
    fn allocate(
        device: ash::Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        desc: &ImageDesc,
    ) -> VulkanResult<Self> {
        let image_create_info = vk::ImageCreateInfo::builder()
            .flags(desc.kind.create_flags())
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(desc.kind.layer_count())
            .format(desc.format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(desc.samples);

        let image = unsafe { device.create_image(&image_create_info, None) }.map_err(VulkanError::Api)?;

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory = match memory::allocate(
            &device,
            memory_properties,
            requirements,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ) {
            Ok(memory) => memory,
            Err(e) => {
                unsafe { device.destroy_image(image, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { device.bind_image_memory(image, memory, 0) } {
            unsafe {
                device.destroy_image(image, None);
                device.free_memory(memory, None);
            }
            return Err(VulkanError::Api(e));
        }

        let view_create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(desc.kind.view_type())
            .format(desc.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: desc.aspect,
                base_mip_level: 0,
                level_count: desc.mip_levels,
                base_array_layer: 0,
                layer_count: desc.kind.layer_count(),
            });

        let view = match unsafe { device.create_image_view(&view_create_info, None) } {
            Ok(view) => view,
            Err(e) => {
                unsafe {
                    device.destroy_image(image, None);
                    device.free_memory(memory, None);
                }
                return Err(VulkanError::Api(e));
            }
        };

        Ok(Self {
            device,
            image,
            memory,
            view,
            format: desc.format,
            extent: desc.extent,
            mip_levels: desc.mip_levels,
            kind: desc.kind,
        })
    }

    /// Depth or colour render target for the current swapchain extent
    pub fn attachment(
        context: &VulkanContext,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
        samples: vk::SampleCountFlags,
    ) -> VulkanResult<Self> {
        Self::allocate(
            context.raw_device().clone(),
            context.memory_properties(),
            &ImageDesc {
                extent,
                format,
                usage,
                aspect,
                samples,
                mip_levels: 1,
                kind: ImageKind::Texture2D,
            },
        )
    }

    /// Upload tightly packed RGBA8 `pixels` as a sampled texture with a full mip chain
    ///
    /// Cubemaps expect six faces back to back. When the device cannot linearly
    /// filter the texture format, only level 0 is created. Blocks until the
    /// upload has finished.
    pub fn texture_from_rgba(
        context: &VulkanContext,
        width: u32,
        height: u32,
        pixels: &[u8],
        kind: ImageKind,
    ) -> VulkanResult<Self> {
        let layer_count = kind.layer_count();
        let expected = width as usize * height as usize * 4 * layer_count as usize;
        if width == 0 || height == 0 || pixels.len() != expected {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "Texture {}x{} ({:?}) needs {} bytes, got {}",
                    width,
                    height,
                    kind,
                    expected,
                    pixels.len()
                ),
            });
        }
        if kind == ImageKind::Cubemap && width != height {
            return Err(VulkanError::InvalidOperation {
                reason: format!("Cubemap faces must be square, got {width}x{height}"),
            });
        }

        let mut mip_levels = mip_level_count(width, height);
        if mip_levels > 1 && !Self::supports_linear_blit(context, TEXTURE_FORMAT) {
            log::warn!("{:?} does not support linear blits; skipping mipmap generation", TEXTURE_FORMAT);
            mip_levels = 1;
        }

        let staging = Buffer::staging(
            context.raw_device().clone(),
            context.memory_properties(),
            pixels.len() as vk::DeviceSize,
        )?;
        staging.write_bytes(0, pixels)?;

        let texture = Self::allocate(
            context.raw_device().clone(),
            context.memory_properties(),
            &ImageDesc {
                extent: vk::Extent2D { width, height },
                format: TEXTURE_FORMAT,
                usage: vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::SAMPLED,
                aspect: vk::ImageAspectFlags::COLOR,
                samples: vk::SampleCountFlags::TYPE_1,
                mip_levels,
                kind,
            },
        )?;

        let to_transfer =
            LayoutTransition::for_layouts(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)?;
        let to_sampled = LayoutTransition::for_layouts(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;
        let blits = mip_blit_plan(width, height, mip_levels);
        let image = texture.image;

        context.one_time_submit(|device, command_buffer| {
            to_transfer.record(device, command_buffer, image, color_range(0, mip_levels, layer_count));

            let region = vk::BufferImageCopy::builder()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count,
                })
                .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
                .image_extent(vk::Extent3D { width, height, depth: 1 });

            unsafe {
                device.cmd_copy_buffer_to_image(
                    command_buffer,
                    staging.handle(),
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region.build()],
                );
            }

            if blits.is_empty() {
                to_sampled.record(device, command_buffer, image, color_range(0, 1, layer_count));
            } else {
                record_mip_chain(device, command_buffer, image, layer_count, &blits);
            }
        })?;

        log::debug!(
            "Uploaded {:?} texture {}x{} with {} mip levels",
            kind,
            width,
            height,
            mip_levels
        );
        Ok(texture)
    }

    /// Whether `format` supports `SAMPLED_IMAGE_FILTER_LINEAR` with optimal tiling
    pub fn supports_linear_blit(context: &VulkanContext, format: vk::Format) -> bool {
        context
            .format_properties(format)
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
    }

    /// Image handle
    pub fn image(&self) -> vk::Image {
        self.image
    }

    /// View over all levels and layers
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Pixel format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Size of level 0
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Number of mip levels
    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    /// 2D texture or cubemap
    pub fn kind(&self) -> ImageKind {
        self.kind
    }
}

/// Record the blits of `blits`, leaving every level in `SHADER_READ_ONLY_OPTIMAL`
///
/// Level `i-1` moves to `TRANSFER_SRC_OPTIMAL`, is blitted into level `i`, and is
/// then made shader-readable; the last level is transitioned directly.
fn record_mip_chain(
    device: &ash::Device,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    layer_count: u32,
    blits: &[MipBlit],
) {
    for blit in blits {
        record_barrier(
            device,
            command_buffer,
            image,
            color_range(blit.src_level, 1, layer_count),
            (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
            (vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::TRANSFER_READ),
            (vk::PipelineStageFlags::TRANSFER, vk::PipelineStageFlags::TRANSFER),
        );

        let region = vk::ImageBlit::builder()
            .src_offsets([
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D {
                    x: blit.src_extent.0,
                    y: blit.src_extent.1,
                    z: 1,
                },
            ])
            .src_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: blit.src_level,
                base_array_layer: 0,
                layer_count,
            })
            .dst_offsets([
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D {
                    x: blit.dst_extent.0,
                    y: blit.dst_extent.1,
                    z: 1,
                },
            ])
            .dst_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: blit.dst_level,
                base_array_layer: 0,
                layer_count,
            });

        unsafe {
            device.cmd_blit_image(
                command_buffer,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region.build()],
                vk::Filter::LINEAR,
            );
        }

        record_barrier(
            device,
            command_buffer,
            image,
            color_range(blit.src_level, 1, layer_count),
            (vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            (vk::AccessFlags::TRANSFER_READ, vk::AccessFlags::SHADER_READ),
            (vk::PipelineStageFlags::TRANSFER, vk::PipelineStageFlags::FRAGMENT_SHADER),
        );
    }

    if let Some(last) = blits.last() {
        record_barrier(
            device,
            command_buffer,
            image,
            color_range(last.dst_level, 1, layer_count),
            (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            (vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::SHADER_READ),
            (vk::PipelineStageFlags::TRANSFER, vk::PipelineStageFlags::FRAGMENT_SHADER),
        );
    }
}

impl Drop for GpuImage {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_level_count() {
        assert_eq!(mip_level_count(512, 256), 10);
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 2), 2);
        assert_eq!(mip_level_count(3, 1), 2);
        assert_eq!(mip_level_count(1, 1024), 11);
        assert_eq!(mip_level_count(0, 0), 1);
    }

    #[test]
    fn test_two_by_two_texture_needs_one_blit() {
        let levels = mip_level_count(2, 2);
        let plan = mip_blit_plan(2, 2, levels);
        assert_eq!(
            plan,
            vec![MipBlit {
                src_level: 0,
                dst_level: 1,
                src_extent: (2, 2),
                dst_extent: (1, 1),
            }]
        );
    }

    #[test]
    fn test_blit_plan_halves_down_to_one_texel() {
        let plan = mip_blit_plan(8, 2, mip_level_count(8, 2));
        let extents: Vec<_> = plan.iter().map(|b| b.dst_extent).collect();
        assert_eq!(extents, vec![(4, 1), (2, 1), (1, 1)]);

        for pair in plan.windows(2) {
            assert_eq!(pair[0].dst_extent, pair[1].src_extent);
            assert_eq!(pair[0].dst_level, pair[1].src_level);
        }
    }

    #[test]
    fn test_single_level_has_no_blits() {
        assert!(mip_blit_plan(1, 1, 1).is_empty());
        assert!(mip_blit_plan(512, 512, 1).is_empty());
    }

    #[test]
    fn test_supported_layout_transitions() {
        let upload =
            LayoutTransition::for_layouts(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL)
                .unwrap();
        assert_eq!(upload.src_access, vk::AccessFlags::empty());
        assert_eq!(upload.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(upload.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(upload.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let sample = LayoutTransition::for_layouts(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(sample.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(sample.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(sample.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_other_layout_transitions_are_rejected() {
        let result = LayoutTransition::for_layouts(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert!(matches!(
            result,
            Err(VulkanError::UnsupportedLayoutTransition {
                old: vk::ImageLayout::UNDEFINED,
                new: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            })
        ));
        assert!(LayoutTransition::for_layouts(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL
        )
        .is_err());
    }

    #[test]
    fn test_cubemap_kind_properties() {
        assert_eq!(ImageKind::Cubemap.layer_count(), 6);
        assert_eq!(ImageKind::Cubemap.view_type(), vk::ImageViewType::CUBE);
        assert!(ImageKind::Cubemap
            .create_flags()
            .contains(vk::ImageCreateFlags::CUBE_COMPATIBLE));
        assert_eq!(ImageKind::Texture2D.layer_count(), 1);
        assert_eq!(ImageKind::Texture2D.create_flags(), vk::ImageCreateFlags::empty());
    }
}
