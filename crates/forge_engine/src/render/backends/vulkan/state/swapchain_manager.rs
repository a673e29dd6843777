//! Render targets that follow the swapchain
//!
//! Holds the depth buffer, the optional MSAA colour target and one framebuffer
//! per swapchain image view. All of it is rebuilt after the swapchain is.

use ash::vk;

use super::framebuffer::Framebuffer;
use crate::render::backends::vulkan::rendering::render_pass::RenderPass;
use crate::render::backends::vulkan::resources::image::GpuImage;
use crate::render::backends::vulkan::{VulkanContext, VulkanError, VulkanResult};

/// Depth formats in order of preference
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// First candidate usable as a depth attachment with optimal tiling
pub fn choose_depth_format<F>(candidates: &[vk::Format], mut properties: F) -> Option<vk::Format>
where
    F: FnMut(vk::Format) -> vk::FormatProperties,
{
    candidates.iter().copied().find(|&format| {
        properties(format)
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    })
}

/// Depth format supported by the context's GPU
pub fn find_depth_format(context: &VulkanContext) -> VulkanResult<vk::Format> {
    choose_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| context.format_properties(format)).ok_or_else(|| {
        VulkanError::InitializationFailed("No supported depth attachment format".to_string())
    })
}

/// Framebuffers and attachments for the current swapchain
pub struct SwapchainManager {
    framebuffers: Vec<Framebuffer>,
    color_target: Option<GpuImage>,
    depth_target: GpuImage,
    depth_format: vk::Format,
    samples: vk::SampleCountFlags,
}

impl SwapchainManager {
    /// Build attachments and framebuffers for `context`'s swapchain
    pub fn new(
        context: &VulkanContext,
        render_pass: &RenderPass,
        depth_format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> VulkanResult<Self> {
        let (depth_target, color_target, framebuffers) =
            Self::build(context, render_pass, depth_format, samples)?;

        log::debug!("SwapchainManager created with {} framebuffers", framebuffers.len());
        Ok(Self {
            framebuffers,
            color_target,
            depth_target,
            depth_format,
            samples,
        })
    }

    /// Rebuild everything for a recreated swapchain
    ///
    /// The old framebuffers are released before the new targets are created.
    pub fn recreate(&mut self, context: &VulkanContext, render_pass: &RenderPass) -> VulkanResult<()> {
        self.framebuffers.clear();
        self.color_target = None;

        let (depth_target, color_target, framebuffers) =
            Self::build(context, render_pass, self.depth_format, self.samples)?;
        self.depth_target = depth_target;
        self.color_target = color_target;
        self.framebuffers = framebuffers;

        log::debug!("Framebuffers recreated ({})", self.framebuffers.len());
        Ok(())
    }

    fn build(
        context: &VulkanContext,
        render_pass: &RenderPass,
        depth_format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> VulkanResult<(GpuImage, Option<GpuImage>, Vec<Framebuffer>)> {
        let swapchain = context.swapchain();
        let extent = swapchain.extent();

        let depth_target = GpuImage::attachment(
            context,
            extent,
            depth_format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
            samples,
        )?;

        let color_target = if render_pass.is_multisampled() {
            Some(GpuImage::attachment(
                context,
                extent,
                swapchain.format().format,
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
                vk::ImageAspectFlags::COLOR,
                samples,
            )?)
        } else {
            None
        };

        let framebuffers = swapchain
            .image_views()
            .iter()
            .map(|&view| {
                let attachments = match &color_target {
                    Some(color) => vec![color.view(), depth_target.view(), view],
                    None => vec![view, depth_target.view()],
                };
                Framebuffer::new(context.raw_device().clone(), render_pass.handle(), &attachments, extent)
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        Ok((depth_target, color_target, framebuffers))
    }

    /// Framebuffer for swapchain image `image_index`
    pub fn framebuffer(&self, image_index: usize) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index).map(Framebuffer::handle)
    }

    /// Get the number of framebuffers
    pub fn framebuffer_count(&self) -> usize {
        self.framebuffers.len()
    }

    /// Depth attachment format
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn depth_capable() -> vk::FormatProperties {
        vk::FormatProperties {
            optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            ..Default::default()
        }
    }

    #[test]
    fn test_preferred_depth_format_wins() {
        let chosen = choose_depth_format(&DEPTH_FORMAT_CANDIDATES, |_| depth_capable());
        assert_eq!(chosen, Some(vk::Format::D32_SFLOAT));
    }

    #[test]
    fn test_depth_format_falls_back() {
        let chosen = choose_depth_format(&DEPTH_FORMAT_CANDIDATES, |format| {
            if format == vk::Format::D24_UNORM_S8_UINT {
                depth_capable()
            } else {
                vk::FormatProperties::default()
            }
        });
        assert_eq!(chosen, Some(vk::Format::D24_UNORM_S8_UINT));

        assert_eq!(
            choose_depth_format(&DEPTH_FORMAT_CANDIDATES, |_| vk::FormatProperties::default()),
            None
        );
    }
}
