//! Frame loop.
//!
//! [`Renderer`] owns the context, swapchain, default render pass, depth
//! buffer, framebuffers, frame slots and the resource registry. Application
//! drawing goes through the [`RendererDelegate`].
//!
//! # Resource destruction order
//!
//! `Drop` waits for the device to go idle and calls the delegate's `cleanup`.
//! Fields then drop in declaration order:
//! 1. Delegate
//! 2. Frame slots (semaphores, fences, command buffers)
//! 3. Framebuffers and depth buffer
//! 4. Registry (pipelines, layouts, render passes)
//! 5. Swapchain
//! 6. Context (device, surface, instance)
//!
//! The command pool is shared by the frame slots' command buffers and is
//! destroyed with the last of them.

use ash::vk;
use tracing::{debug, error, info, trace, warn};

use vkframe_core::{EngineConfig, FrameTimer};
use vkframe_rhi::command::{ClearValues, CommandPool};
use vkframe_rhi::context::{Context, ContextDesc};
use vkframe_rhi::registry::{PipelineKey, RenderPassKey, ResourceRegistry};
use vkframe_rhi::render_pass::{AttachmentFormats, Framebuffer, RenderPass};
use vkframe_rhi::surface::WindowSurface;
use vkframe_rhi::swapchain::{Swapchain, preferred_present_mode};
use vkframe_rhi::{RhiError, RhiResult};

use crate::delegate::{FrameContext, PipelineSetup, RendererDelegate};
use crate::depth_buffer::{DepthBuffer, choose_depth_format};
use crate::frame_loop::{Acquired, FrameAction, FrameLoop};
use crate::frame_manager::FrameManager;

/// Owns every GPU object of the frame loop and runs one frame per call.
///
/// # Thread Safety
///
/// Not thread-safe; created and driven on the thread that owns the window.
pub struct Renderer {
    /// Application hooks. Dropped first.
    delegate: Box<dyn RendererDelegate>,
    /// Frame slots with their command buffers, semaphores and fences.
    frames: FrameManager,
    /// One framebuffer per swapchain image.
    framebuffers: Vec<Framebuffer>,
    /// Shared depth attachment, `None` for a color-only pass.
    depth_buffer: Option<DepthBuffer>,
    /// Owner of the render pass, pipeline layouts and pipelines.
    registry: ResourceRegistry,
    /// The default render pass.
    render_pass: RenderPassKey,
    /// The delegate's pipeline, if it configured one.
    pipeline: Option<PipelineKey>,
    /// Presentable images.
    swapchain: Swapchain,
    /// Instance, surface and device. Dropped last.
    context: Context,

    /// Delta time handed to the delegate.
    timer: FrameTimer,
    /// Clear values matching the render pass attachments.
    clear_values: ClearValues,
    /// Resize, minimize and recreate flags.
    state: FrameLoop,
}

impl Renderer {
    /// Brings up the GPU for `window` and hands control to `delegate`.
    ///
    /// # Arguments
    ///
    /// * `window` - Surface provider and initial framebuffer size
    /// * `config` - Engine configuration; `[renderer]` drives frame count,
    ///   present mode, clear values and validation
    /// * `delegate` - Application hooks
    ///
    /// # Errors
    ///
    /// Returns any context, swapchain or resource creation failure, and any
    /// error the delegate returns from `configure_pipeline` or `init_done`.
    pub fn new(
        window: &dyn WindowSurface,
        config: &EngineConfig,
        mut delegate: Box<dyn RendererDelegate>,
    ) -> RhiResult<Self> {
        let renderer_config = &config.renderer;
        let context = Context::create(
            &ContextDesc {
                app_name: config.app_name.clone(),
                debug: renderer_config.debug(),
                ..ContextDesc::default()
            },
            window,
        )?;
        let device = context.device().clone();

        let window_size = window.framebuffer_size();
        let swapchain = Swapchain::new(
            &context,
            window_size.0,
            window_size.1,
            preferred_present_mode(renderer_config.present_mode),
        )?;

        let depth_format = choose_depth_format(&device);
        if depth_format.is_none() {
            warn!("No supported depth format, rendering without depth");
        }

        let mut registry = ResourceRegistry::new();
        let render_pass = registry.insert_render_pass(RenderPass::create_default(
            device.clone(),
            swapchain.format(),
            depth_format,
        )?);

        let (depth_buffer, framebuffers) =
            create_targets(&context, &swapchain, registry.render_pass(render_pass)?)?;

        let command_pool = CommandPool::new(device.clone(), device.graphics_family())?;
        let frames = FrameManager::new(
            device.clone(),
            &command_pool,
            renderer_config.max_frames_in_flight,
        )?;

        let pipeline = build_delegate_pipeline(
            delegate.as_mut(),
            &context,
            &mut registry,
            render_pass,
            &swapchain,
            None,
        )?;

        delegate.init_done(&context, frames.frame_count())?;

        let clear_values = if depth_buffer.is_some() {
            ClearValues::ColorDepth(renderer_config.clear_color, renderer_config.clear_depth)
        } else {
            ClearValues::Color(renderer_config.clear_color)
        };

        info!(
            "Renderer initialized: {}x{}, {} frames in flight",
            swapchain.extent().width,
            swapchain.extent().height,
            frames.frame_count()
        );

        Ok(Self {
            delegate,
            frames,
            framebuffers,
            depth_buffer,
            registry,
            render_pass,
            pipeline,
            swapchain,
            context,
            timer: FrameTimer::new(),
            clear_values,
            state: FrameLoop::new(window_size.0, window_size.1),
        })
    }

    /// Records the new framebuffer size. A zero size pauses rendering.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.state.resize(width, height);
    }

    /// Acquires, records, submits and presents one frame.
    ///
    /// Returns `Ok(())` without drawing while minimized or when the swapchain
    /// had to be recreated after a failed acquire. In both cases nothing is
    /// submitted and the frame slot does not advance.
    ///
    /// # Errors
    ///
    /// Returns device loss and any other non-recoverable backend error.
    pub fn render_frame(&mut self) -> RhiResult<()> {
        if self.state.begin_frame() == FrameAction::Recreate {
            self.recreate_swapchain()?;
        }
        if self.state.begin_frame() != FrameAction::Render {
            return Ok(());
        }

        let frame_index = self.frames.current_index();

        // Acquire
        self.frames.wait_current()?;
        let acquired = self.frames.acquire(&self.swapchain);
        let image_index = match self.state.on_acquire(acquired)? {
            Acquired::Image(index) => index,
            Acquired::Abandon => return self.recreate_swapchain(),
        };
        let delta = self.timer.delta_secs();

        // Record
        self.delegate.update_uniform_buffers(frame_index)?;

        let framebuffer = self.framebuffers.get(image_index as usize).ok_or_else(|| {
            RhiError::InvalidHandle(format!("no framebuffer for swapchain image {image_index}"))
        })?;
        let render_pass = self.registry.render_pass(self.render_pass)?;
        let pipeline = match self.pipeline {
            Some(key) => Some(self.registry.pipeline(key)?),
            None => None,
        };
        let extent = self.swapchain.extent();

        let cmd = self.frames.begin_recording()?;
        cmd.begin_render_pass(
            render_pass,
            framebuffer,
            self.clear_values,
            vk::SubpassContents::INLINE,
        )?;

        if let Some(pipeline) = pipeline {
            cmd.bind_pipeline(pipeline)?;
            if pipeline.has_dynamic_state(vk::DynamicState::VIEWPORT) {
                cmd.set_viewport(&full_viewport(extent))?;
            }
            if pipeline.has_dynamic_state(vk::DynamicState::SCISSOR) {
                cmd.set_scissor(&vk::Rect2D {
                    offset: vk::Offset2D::default(),
                    extent,
                })?;
            }
        }

        let frame = FrameContext {
            frame_index,
            image_index,
            extent,
            pipeline,
        };
        self.delegate.record_command_buffer(delta, cmd, &frame)?;

        cmd.end_render_pass()?;
        cmd.end()?;
        trace!("Frame {} recorded: {:?}", frame_index, cmd.stats());

        // Submit
        self.frames.submit()?;

        // Present
        let presented = self.frames.present(&self.swapchain, image_index);
        self.state.on_present(presented)?;

        // Advance
        self.frames.advance();

        if self.state.needs_recreate() {
            self.recreate_swapchain()?;
        }
        Ok(())
    }

    /// Rebuilds everything that depends on the swapchain.
    ///
    /// The render pass is rebuilt too when the surface format changed.
    fn recreate_swapchain(&mut self) -> RhiResult<()> {
        let Some((width, height)) = self.state.recreate_target() else {
            return Ok(());
        };

        self.context.device().wait_idle()?;

        self.framebuffers.clear();
        self.depth_buffer = None;

        match self.swapchain.recreate(&self.context, width, height) {
            Ok(()) => {}
            Err(RhiError::SwapchainOutOfDate) => {
                // The surface currently reports a zero extent.
                self.state.surface_empty();
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        self.frames.reset_semaphores()?;

        let formats = self.registry.render_pass(self.render_pass)?.formats();
        if let Some(rebuilt) = rebuilt_formats(formats, self.swapchain.format()) {
            let render_pass = RenderPass::create_default(
                self.context.device().clone(),
                rebuilt.color,
                rebuilt.depth,
            )?;
            self.registry.replace_render_pass(self.render_pass, render_pass)?;
            info!(
                "Surface format changed from {:?} to {:?}, render pass rebuilt",
                formats.color, rebuilt.color
            );
        }

        let (depth_buffer, framebuffers) = create_targets(
            &self.context,
            &self.swapchain,
            self.registry.render_pass(self.render_pass)?,
        )?;
        self.depth_buffer = depth_buffer;
        self.framebuffers = framebuffers;

        self.pipeline = build_delegate_pipeline(
            self.delegate.as_mut(),
            &self.context,
            &mut self.registry,
            self.render_pass,
            &self.swapchain,
            self.pipeline,
        )?;

        self.state.recreated();

        info!(
            "Swapchain recreated: {}x{}",
            self.swapchain.extent().width,
            self.swapchain.extent().height
        );
        Ok(())
    }

    /// Blocks until the GPU has finished all submitted work.
    ///
    /// # Errors
    ///
    /// Returns an error on device loss.
    pub fn wait_idle(&self) -> RhiResult<()> {
        self.context.device().wait_idle()
    }

    /// Returns the context.
    #[inline]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Returns the swapchain.
    #[inline]
    pub fn swapchain(&self) -> &Swapchain {
        &self.swapchain
    }

    /// Returns the resource registry.
    #[inline]
    pub fn registry(&self) -> &ResourceRegistry {
        &self.registry
    }

    /// Returns the default render pass key.
    #[inline]
    pub fn render_pass(&self) -> RenderPassKey {
        self.render_pass
    }

    /// Returns the delegate's pipeline key, if it configured one.
    #[inline]
    pub fn pipeline(&self) -> Option<PipelineKey> {
        self.pipeline
    }

    /// Returns the number of frame slots.
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frames.frame_count()
    }

    /// Returns the slot index the next frame uses.
    #[inline]
    pub fn current_frame(&self) -> usize {
        self.frames.current_index()
    }

    /// Returns the swapchain extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Returns `true` while rendering is paused for lack of area.
    #[inline]
    pub fn is_minimized(&self) -> bool {
        self.state.is_minimized()
    }

    /// Returns the frame timer.
    #[inline]
    pub fn timer(&self) -> &FrameTimer {
        &self.timer
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.context.device().wait_idle() {
            error!("Failed to wait for device idle during drop: {}", e);
        }
        self.delegate.cleanup();
        info!(
            "Renderer shutting down after {} frames ({:.1} fps average)",
            self.timer.frame_count(),
            self.timer.average_fps()
        );
    }
}

/// Returns the render pass formats to rebuild with, or `None` if the current
/// pass still matches the swapchain format.
fn rebuilt_formats(
    current: AttachmentFormats,
    swapchain_format: vk::Format,
) -> Option<AttachmentFormats> {
    let wanted = current.with_color(swapchain_format);
    (wanted != current).then_some(wanted)
}

/// Creates the depth buffer (when the pass has depth) and one framebuffer per swapchain image.
fn create_targets(
    context: &Context,
    swapchain: &Swapchain,
    render_pass: &RenderPass,
) -> RhiResult<(Option<DepthBuffer>, Vec<Framebuffer>)> {
    let device = context.device();
    let extent = swapchain.extent();

    let depth_buffer = render_pass
        .depth_format()
        .map(|format| DepthBuffer::new(device.clone(), extent, format))
        .transpose()?;

    let framebuffers = Framebuffer::for_swapchain(
        device,
        render_pass,
        swapchain.image_views(),
        depth_buffer.as_ref().map(DepthBuffer::image_view),
        extent,
    )?;

    Ok((depth_buffer, framebuffers))
}

/// Asks the delegate for a pipeline description and build it into the registry.
///
/// `existing` is replaced in place so its key stays valid; a delegate that
/// returns `None` removes it.
fn build_delegate_pipeline(
    delegate: &mut dyn RendererDelegate,
    context: &Context,
    registry: &mut ResourceRegistry,
    render_pass: RenderPassKey,
    swapchain: &Swapchain,
    existing: Option<PipelineKey>,
) -> RhiResult<Option<PipelineKey>> {
    let mut setup = PipelineSetup {
        device: context.device(),
        registry: &mut *registry,
        render_pass,
        color_format: swapchain.format(),
        extent: swapchain.extent(),
    };

    let Some(state) = delegate.configure_pipeline(&mut setup)? else {
        if let Some(key) = existing {
            registry.remove_pipeline(key)?;
        }
        return Ok(None);
    };

    let pipeline = state.build(context.device(), registry)?;
    match existing {
        Some(key) => {
            registry.replace_pipeline(key, pipeline)?;
            debug!("Rebuilt delegate pipeline");
            Ok(Some(key))
        }
        None => {
            info!("Built delegate pipeline");
            Ok(Some(registry.insert_pipeline(pipeline)))
        }
    }
}

/// Returns a viewport covering `extent` with depth range `[0, 1]`.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_viewport() {
        let viewport = full_viewport(vk::Extent2D {
            width: 1024,
            height: 720,
        });
        assert_eq!(viewport.width, 1024.0);
        assert_eq!(viewport.height, 720.0);
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
    }

    #[test]
    fn test_render_pass_rebuilt_on_format_change() {
        let current =
            AttachmentFormats::new(vk::Format::B8G8R8A8_SRGB, Some(vk::Format::D32_SFLOAT));

        assert_eq!(rebuilt_formats(current, vk::Format::B8G8R8A8_SRGB), None);

        let rebuilt = rebuilt_formats(current, vk::Format::R8G8B8A8_UNORM).unwrap();
        assert_eq!(rebuilt.color, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(rebuilt.depth, Some(vk::Format::D32_SFLOAT));
        assert_eq!(rebuilt.count(), current.count());
    }

    #[test]
    fn test_clear_values_match_depth_pass() {
        let color = [0.0, 0.0, 0.0, 1.0];
        assert!(ClearValues::ColorDepth(color, 1.0).check(2).is_ok());
        assert!(ClearValues::Color(color).check(2).is_err());
    }
}
