//! Render pass management
//!
//! The forward pass has a colour and a depth attachment; with multisampling the
//! colour attachment is an offscreen MSAA target resolved into the swapchain
//! image through a third attachment.

use ash::{vk, Device};

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Attachment descriptions and subpass references for the forward pass
#[derive(Debug, Clone)]
pub struct AttachmentPlan {
    /// Attachment descriptions in framebuffer order
    pub attachments: Vec<vk::AttachmentDescription>,
    /// Colour attachment used by the subpass
    pub color: vk::AttachmentReference,
    /// Depth attachment used by the subpass
    pub depth: vk::AttachmentReference,
    /// Single-sample resolve target, present only when multisampling
    pub resolve: Option<vk::AttachmentReference>,
    /// External dependency ordering this frame's attachment writes after the previous frame's
    pub dependency: vk::SubpassDependency,
}

impl AttachmentPlan {
    /// Describe the forward pass for `samples` samples per pixel
    ///
    /// Framebuffers must bind `[colour, depth]`, or `[msaa colour, depth,
    /// swapchain image]` when `samples` is above one.
    pub fn forward(color_format: vk::Format, depth_format: vk::Format, samples: vk::SampleCountFlags) -> Self {
        let multisampled = samples != vk::SampleCountFlags::TYPE_1;

        let color = vk::AttachmentDescription::builder()
            .format(color_format)
            .samples(samples)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(if multisampled {
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            } else {
                vk::ImageLayout::PRESENT_SRC_KHR
            })
            .build();

        let depth = vk::AttachmentDescription::builder()
            .format(depth_format)
            .samples(samples)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .build();

        let mut attachments = vec![color, depth];
        let resolve = multisampled.then(|| {
            attachments.push(
                vk::AttachmentDescription::builder()
                    .format(color_format)
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
                    .build(),
            );
            vk::AttachmentReference {
                attachment: 2,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            }
        });

        // The depth target is shared by every frame in flight, so the previous
        // frame's late depth writes must finish before this frame clears it.
        let dependency = vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                    | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            )
            .src_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
            .dst_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
            .build();

        Self {
            attachments,
            color: vk::AttachmentReference {
                attachment: 0,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            },
            depth: vk::AttachmentReference {
                attachment: 1,
                layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            },
            resolve,
            dependency,
        }
    }

    /// Whether a resolve attachment is part of the pass
    pub fn is_multisampled(&self) -> bool {
        self.resolve.is_some()
    }

    /// Format of the attachment that ends up presented
    pub fn color_format(&self) -> vk::Format {
        self.attachments[0].format
    }
}

/// Render pass wrapper with RAII cleanup
pub struct RenderPass {
    device: Device,
    render_pass: vk::RenderPass,
    multisampled: bool,
    color_format: vk::Format,
}

impl RenderPass {
    /// Create the forward render pass: one graphics subpass, one external dependency
    pub fn new_forward_pass(
        device: Device,
        color_format: vk::Format,
        depth_format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> VulkanResult<Self> {
        let plan = AttachmentPlan::forward(color_format, depth_format, samples);

        let color_attachments = [plan.color];
        let resolve_attachments: Vec<vk::AttachmentReference> = plan.resolve.into_iter().collect();
        let mut subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_attachments)
            .depth_stencil_attachment(&plan.depth);
        if !resolve_attachments.is_empty() {
            subpass = subpass.resolve_attachments(&resolve_attachments);
        }
        let subpasses = [subpass.build()];

        let dependencies = [plan.dependency];

        let render_pass_create_info = vk::RenderPassCreateInfo::builder()
            .attachments(&plan.attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass =
            unsafe { device.create_render_pass(&render_pass_create_info, None) }.map_err(VulkanError::Api)?;

        log::debug!(
            "Created forward render pass ({:?}, {:?}, {:?})",
            color_format,
            depth_format,
            samples
        );

        Ok(Self {
            device,
            render_pass,
            multisampled: plan.is_multisampled(),
            color_format: plan.color_format(),
        })
    }

    /// Get the render pass handle
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Whether framebuffers need the MSAA colour target and a resolve view
    pub fn is_multisampled(&self) -> bool {
        self.multisampled
    }

    /// Colour format the pass was created for
    pub fn color_format(&self) -> vk::Format {
        self.color_format
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_render_pass(self.render_pass, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COLOR: vk::Format = vk::Format::B8G8R8A8_SRGB;
    const DEPTH: vk::Format = vk::Format::D32_SFLOAT;

    #[test]
    fn test_single_sample_plan_presents_colour_directly() {
        let plan = AttachmentPlan::forward(COLOR, DEPTH, vk::SampleCountFlags::TYPE_1);

        assert_eq!(plan.attachments.len(), 2);
        assert!(!plan.is_multisampled());

        let color = plan.attachments[0];
        assert_eq!(color.format, COLOR);
        assert_eq!(color.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(color.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(color.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);

        let depth = plan.attachments[1];
        assert_eq!(depth.format, DEPTH);
        assert_eq!(depth.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(depth.store_op, vk::AttachmentStoreOp::DONT_CARE);
        assert_eq!(plan.depth.attachment, 1);
    }

    #[test]
    fn test_multisampled_plan_resolves_into_presentable_attachment() {
        let plan = AttachmentPlan::forward(COLOR, DEPTH, vk::SampleCountFlags::TYPE_4);

        assert_eq!(plan.attachments.len(), 3);
        assert_eq!(plan.attachments[0].samples, vk::SampleCountFlags::TYPE_4);
        assert_eq!(plan.attachments[1].samples, vk::SampleCountFlags::TYPE_4);
        assert_eq!(
            plan.attachments[0].final_layout,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );

        let resolve = plan.attachments[2];
        assert_eq!(resolve.samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(resolve.load_op, vk::AttachmentLoadOp::DONT_CARE);
        assert_eq!(resolve.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(resolve.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(plan.resolve.map(|r| r.attachment), Some(2));
    }

    #[test]
    fn test_dependency_waits_for_previous_depth_writes() {
        let plan = AttachmentPlan::forward(COLOR, DEPTH, vk::SampleCountFlags::TYPE_1);
        let dependency = plan.dependency;

        assert_eq!(dependency.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(dependency.dst_subpass, 0);
        assert!(dependency
            .src_stage_mask
            .contains(vk::PipelineStageFlags::LATE_FRAGMENT_TESTS));
        assert!(dependency
            .src_access_mask
            .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
        assert!(dependency
            .dst_stage_mask
            .contains(vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS));
        assert!(dependency
            .dst_access_mask
            .contains(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE));
    }

    #[test]
    fn test_plan_reports_presented_colour_format() {
        let plan = AttachmentPlan::forward(vk::Format::R8G8B8A8_UNORM, DEPTH, vk::SampleCountFlags::TYPE_4);
        assert_eq!(plan.color_format(), vk::Format::R8G8B8A8_UNORM);
        assert_eq!(plan.attachments[2].format, vk::Format::R8G8B8A8_UNORM);
    }
}
