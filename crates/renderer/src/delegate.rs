//! Application hooks into the frame loop.
//!
//! A [`RendererDelegate`] is handed to the [`Renderer`](crate::Renderer) as a
//! boxed trait object. Every method has a no-op default, so a delegate only
//! implements the hooks it needs; the empty delegate clears the screen.

use std::sync::Arc;

use vkframe_rhi::RhiResult;
use vkframe_rhi::command::CommandBuffer;
use vkframe_rhi::context::Context;
use vkframe_rhi::device::Device;
use vkframe_rhi::pipeline::{Pipeline, PipelineState};
use vkframe_rhi::registry::{RenderPassKey, ResourceRegistry};
use vkframe_rhi::vk;

/// What a delegate gets when asked for its pipeline description.
///
/// Called once at start-up and again after every swapchain recreation.
pub struct PipelineSetup<'a> {
    /// The logical device, for shader modules and layouts.
    pub device: &'a Arc<Device>,
    /// Register pipeline layouts here and reference them by key.
    pub registry: &'a mut ResourceRegistry,
    /// The default render pass to build against.
    pub render_pass: RenderPassKey,
    /// Current swapchain format, the render pass's color format.
    pub color_format: vk::Format,
    /// Current swapchain extent.
    pub extent: vk::Extent2D,
}

/// Per-frame information passed to [`RendererDelegate::record_command_buffer`].
pub struct FrameContext<'a> {
    /// Frame slot index in `0..frame_count`.
    pub frame_index: usize,
    /// Acquired swapchain image.
    pub image_index: u32,
    /// Swapchain extent; viewport and scissor are already set to it when dynamic.
    pub extent: vk::Extent2D,
    /// Pipeline built from the delegate's description, already bound.
    pub pipeline: Option<&'a Pipeline>,
}

/// Application hooks called by the renderer.
///
/// Call order: `configure_pipeline`, `init_done`, then per frame
/// `update_uniform_buffers` and `record_command_buffer`, with
/// `configure_pipeline` again after each swapchain recreation, and finally
/// `cleanup`.
///
/// # Thread Safety
///
/// Called only from the render thread; implementors need not be `Sync`.
#[allow(unused_variables)]
pub trait RendererDelegate {
    /// Describe the pipeline to build. `None` renders a cleared frame only.
    ///
    /// Layouts the description references must already be in `setup.registry`.
    /// On recreation, layouts registered by an earlier call are still there.
    fn configure_pipeline(&mut self, setup: &mut PipelineSetup<'_>) -> RhiResult<Option<PipelineState>> {
        Ok(None)
    }

    /// Record draw calls inside the frame's render pass.
    fn record_command_buffer(
        &mut self,
        delta: f32,
        cmd: &mut CommandBuffer,
        frame: &FrameContext<'_>,
    ) -> RhiResult<()> {
        Ok(())
    }

    /// Update per-frame data before recording. The slot's previous
    /// submission has completed when this is called.
    fn update_uniform_buffers(&mut self, frame_index: usize) -> RhiResult<()> {
        Ok(())
    }

    /// The renderer is ready. Create per-frame resources here.
    fn init_done(&mut self, context: &Context, frame_count: usize) -> RhiResult<()> {
        Ok(())
    }

    /// Release GPU resources. Called after the device is idle and before
    /// the renderer tears down its own objects.
    fn cleanup(&mut self) {}
}

/// Delegate with every hook left at its default.
#[derive(Debug, Default)]
pub struct ClearOnly;

impl RendererDelegate for ClearOnly {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_only_hooks_are_no_ops() {
        let mut delegate: Box<dyn RendererDelegate> = Box::new(ClearOnly);
        for frame_index in 0..3 {
            assert!(delegate.update_uniform_buffers(frame_index).is_ok());
        }
        delegate.cleanup();
    }
}
