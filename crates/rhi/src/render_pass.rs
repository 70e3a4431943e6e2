//! Render passes and framebuffers.
//!
//! [`RenderPass::create_default`] builds the single-subpass pass the renderer
//! draws into: one color attachment that ends in `PRESENT_SRC_KHR`, plus an
//! optional depth attachment that is cleared every frame and not stored.
//!
//! A [`Framebuffer`] binds one swapchain image view (and the shared depth
//! view) to a pass. Its attachments must match the pass's
//! [`AttachmentFormats`] in count and order.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Formats of the default pass's attachments.
///
/// Two passes with equal formats are compatible: framebuffers and pipelines
/// built for one can be used with the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentFormats {
    /// Format of the single color attachment, normally the swapchain format.
    pub color: vk::Format,
    /// Depth attachment format, or `None` for a color-only pass.
    pub depth: Option<vk::Format>,
}

impl AttachmentFormats {
    /// Creates the format set for a color attachment and an optional depth attachment.
    pub fn new(color: vk::Format, depth: Option<vk::Format>) -> Self {
        Self { color, depth }
    }

    /// Returns the total attachment count.
    ///
    /// This is also how many clear values `vkCmdBeginRenderPass` expects.
    #[inline]
    pub fn count(&self) -> usize {
        1 + usize::from(self.depth.is_some())
    }

    /// Returns the same set with a different color format.
    ///
    /// Used when a recreated swapchain comes back with a new surface format.
    pub fn with_color(self, color: vk::Format) -> Self {
        Self { color, ..self }
    }
}

/// Vulkan render pass wrapper.
///
/// Owned by the [`ResourceRegistry`](crate::registry::ResourceRegistry) and
/// referenced elsewhere through a `RenderPassKey`.
pub struct RenderPass {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan render pass handle.
    render_pass: vk::RenderPass,
    /// Attachment formats the pass was created with.
    formats: AttachmentFormats,
}

impl RenderPass {
    /// Creates a color + optional depth pass with a single graphics subpass.
    ///
    /// The external dependency covers both color output and early fragment
    /// tests, so the depth clear is ordered after the previous frame's use.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `color_format` - Format of the color attachment (the swapchain format)
    /// * `depth_format` - Depth attachment format, or `None` for no depth
    ///
    /// # Errors
    ///
    /// Returns an error if render pass creation fails.
    pub fn create_default(
        device: Arc<Device>,
        color_format: vk::Format,
        depth_format: Option<vk::Format>,
    ) -> RhiResult<Self> {
        let mut attachments = vec![
            vk::AttachmentDescription::default()
                .format(color_format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::PRESENT_SRC_KHR),
        ];

        if let Some(format) = depth_format {
            attachments.push(
                vk::AttachmentDescription::default()
                    .format(format)
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .load_op(vk::AttachmentLoadOp::CLEAR)
                    .store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .stencil_load_op(vk::AttachmentLoadOp::CLEAR)
                    .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                    .initial_layout(vk::ImageLayout::UNDEFINED)
                    .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
            );
        }

        let color_refs = [vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }];
        let depth_ref = vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(&color_refs);
        if depth_format.is_some() {
            subpass = subpass.depth_stencil_attachment(&depth_ref);
        }

        let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(stages)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(stages)
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            );

        let subpasses = [subpass];
        let dependencies = [dependency];
        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(&subpasses)
            .dependencies(&dependencies);

        let render_pass = unsafe { device.handle().create_render_pass(&create_info, None)? };

        debug!(
            "Render pass created (color {:?}, depth {:?})",
            color_format, depth_format
        );

        Ok(Self {
            device,
            render_pass,
            formats: AttachmentFormats::new(color_format, depth_format),
        })
    }

    /// Returns the Vulkan render pass handle.
    #[inline]
    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Returns the attachment formats the pass was created with.
    #[inline]
    pub fn formats(&self) -> AttachmentFormats {
        self.formats
    }

    /// Returns the total attachment count (color plus depth).
    #[inline]
    pub fn attachment_count(&self) -> usize {
        self.formats.count()
    }

    /// Returns the number of color attachments in the subpass.
    #[inline]
    pub fn color_attachment_count(&self) -> u32 {
        1
    }

    /// Returns the depth attachment format, if the pass has one.
    #[inline]
    pub fn depth_format(&self) -> Option<vk::Format> {
        self.formats.depth
    }

    /// Returns `true` if the subpass has a depth attachment.
    #[inline]
    pub fn has_depth(&self) -> bool {
        self.formats.depth.is_some()
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_render_pass(self.render_pass, None);
        }
        debug!("Render pass destroyed");
    }
}

/// Framebuffer bound to one swapchain image view (and the shared depth view).
pub struct Framebuffer {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan framebuffer handle.
    framebuffer: vk::Framebuffer,
    /// Size of every attachment.
    extent: vk::Extent2D,
}

impl Framebuffer {
    /// Creates a framebuffer for `render_pass`.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `render_pass` - The pass this framebuffer is used with
    /// * `attachments` - Image views in the pass's attachment order (color, then depth)
    /// * `extent` - Size of the attachments
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::CountMismatch`] if the number of views does not
    /// match the pass, or an error if framebuffer creation fails.
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        check_attachment_count(render_pass.attachment_count(), attachments.len())?;

        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.handle())
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe { device.handle().create_framebuffer(&create_info, None)? };

        Ok(Self {
            device,
            framebuffer,
            extent,
        })
    }

    /// Creates one framebuffer per swapchain image view, sharing `depth_view` if any.
    ///
    /// # Errors
    ///
    /// Returns an error if any framebuffer fails; those already created are dropped.
    pub fn for_swapchain(
        device: &Arc<Device>,
        render_pass: &RenderPass,
        image_views: &[vk::ImageView],
        depth_view: Option<vk::ImageView>,
        extent: vk::Extent2D,
    ) -> RhiResult<Vec<Self>> {
        let framebuffers = image_views
            .iter()
            .map(|&view| {
                let mut attachments = vec![view];
                attachments.extend(depth_view);
                Self::new(device.clone(), render_pass, &attachments, extent)
            })
            .collect::<RhiResult<Vec<_>>>()?;

        debug!(
            "Created {} framebuffers ({}x{})",
            framebuffers.len(),
            extent.width,
            extent.height
        );
        Ok(framebuffers)
    }

    /// Returns the Vulkan framebuffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    /// Returns the size of the attachments.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_framebuffer(self.framebuffer, None);
        }
    }
}

fn check_attachment_count(expected: usize, actual: usize) -> RhiResult<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(RhiError::CountMismatch {
            what: "framebuffer attachments",
            expected,
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_count_follows_depth() {
        let color_only = AttachmentFormats::new(vk::Format::B8G8R8A8_SRGB, None);
        let with_depth =
            AttachmentFormats::new(vk::Format::B8G8R8A8_SRGB, Some(vk::Format::D32_SFLOAT));
        assert_eq!(color_only.count(), 1);
        assert_eq!(with_depth.count(), 2);
    }

    #[test]
    fn test_with_color_keeps_depth() {
        let formats =
            AttachmentFormats::new(vk::Format::B8G8R8A8_SRGB, Some(vk::Format::D32_SFLOAT));
        let changed = formats.with_color(vk::Format::R8G8B8A8_SRGB);

        assert_ne!(formats, changed);
        assert_eq!(changed.color, vk::Format::R8G8B8A8_SRGB);
        assert_eq!(changed.depth, Some(vk::Format::D32_SFLOAT));
        assert_eq!(formats.with_color(vk::Format::B8G8R8A8_SRGB), formats);
    }

    #[test]
    fn test_attachment_count_mismatch_is_reported() {
        assert!(check_attachment_count(2, 2).is_ok());
        match check_attachment_count(2, 1) {
            Err(RhiError::CountMismatch {
                what,
                expected,
                actual,
            }) => {
                assert_eq!(what, "framebuffer attachments");
                assert_eq!((expected, actual), (2, 1));
            }
            other => panic!("expected CountMismatch, got {:?}", other),
        }
    }
}
