//! Per-frame decisions of the frame loop.
//!
//! [`FrameLoop`] holds the flags that decide what a call to
//! `Renderer::render_frame` does: skip while the window has no area, rebuild
//! the swapchain first, or render. It also turns acquire and present results
//! into those flags. No GPU objects are involved, so every decision is
//! testable on its own.
//!
//! # Overview
//!
//! ```text
//! begin_frame()  Skip      -> return
//!                Recreate  -> recreate_target() / recreated() or surface_empty()
//!                Render    -> wait fence
//! on_acquire()   Abandon   -> recreate, no submit, no advance
//!                Image(i)  -> record, submit
//! on_present()   Ok        -> advance, recreate if flagged
//! ```

use tracing::{debug, warn};

use vkframe_rhi::RhiResult;

/// What the next `render_frame` call should do first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameAction {
    /// The window has no area; draw nothing.
    Skip,
    /// Rebuild the swapchain before drawing.
    Recreate,
    /// Draw with the current swapchain.
    Render,
}

/// Outcome of a swapchain acquire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    /// An image is ready; record and submit for it.
    Image(u32),
    /// The swapchain is out of date; the frame is dropped before anything is
    /// recorded, submitted or advanced.
    Abandon,
}

/// Resize, minimize and recreate flags of the frame loop.
///
/// # Thread Safety
///
/// Plain data, owned by the renderer on the render thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLoop {
    /// Last framebuffer size reported by the window.
    window_size: (u32, u32),
    /// Set by a resize or a suboptimal or out-of-date acquire or present.
    needs_recreate: bool,
    /// The window or surface currently has no area.
    minimized: bool,
}

impl FrameLoop {
    /// Creates the state for a window of the given framebuffer size.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            window_size: (width, height),
            needs_recreate: false,
            minimized: width == 0 || height == 0,
        }
    }

    /// Records a new framebuffer size.
    ///
    /// A zero size pauses rendering; any size schedules a recreation.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.window_size = (width, height);
        self.minimized = width == 0 || height == 0;
        self.needs_recreate = true;
        debug!("Resize requested: {}x{}", width, height);
    }

    /// Returns what the frame should do first.
    pub fn begin_frame(&self) -> FrameAction {
        if self.minimized {
            FrameAction::Skip
        } else if self.needs_recreate {
            FrameAction::Recreate
        } else {
            FrameAction::Render
        }
    }

    /// Returns the size to recreate the swapchain at.
    ///
    /// # Returns
    ///
    /// `None` while the window has no area, which also pauses rendering.
    pub fn recreate_target(&mut self) -> Option<(u32, u32)> {
        let (width, height) = self.window_size;
        if width == 0 || height == 0 {
            self.minimized = true;
            return None;
        }
        Some((width, height))
    }

    /// The surface reported no area during recreation. Pauses until the next resize.
    pub fn surface_empty(&mut self) {
        debug!("Surface has no area, pausing until the next resize");
        self.minimized = true;
    }

    /// The swapchain was rebuilt successfully.
    pub fn recreated(&mut self) {
        self.needs_recreate = false;
        self.minimized = false;
    }

    /// Interprets an acquire result.
    ///
    /// # Arguments
    ///
    /// * `result` - `(image_index, suboptimal)` or the acquire error
    ///
    /// # Errors
    ///
    /// Returns any error that recreating the swapchain cannot fix.
    pub fn on_acquire(&mut self, result: RhiResult<(u32, bool)>) -> RhiResult<Acquired> {
        match result {
            Ok((index, suboptimal)) => {
                self.needs_recreate |= suboptimal;
                Ok(Acquired::Image(index))
            }
            Err(e) if e.is_recoverable() => {
                warn!("Swapchain {} on acquire, recreating", e);
                self.needs_recreate = true;
                Ok(Acquired::Abandon)
            }
            Err(e) => Err(e),
        }
    }

    /// Interprets a present result. Suboptimal and out-of-date schedule a
    /// recreation instead of failing the frame.
    ///
    /// # Errors
    ///
    /// Returns any error that recreating the swapchain cannot fix.
    pub fn on_present(&mut self, result: RhiResult<bool>) -> RhiResult<()> {
        match result {
            Ok(suboptimal) => {
                self.needs_recreate |= suboptimal;
                Ok(())
            }
            Err(e) if e.is_recoverable() => {
                warn!("Swapchain {} on present, recreating", e);
                self.needs_recreate = true;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Returns `true` if the swapchain must be rebuilt.
    #[inline]
    pub fn needs_recreate(&self) -> bool {
        self.needs_recreate
    }

    /// Returns `true` while rendering is paused for lack of area.
    #[inline]
    pub fn is_minimized(&self) -> bool {
        self.minimized
    }
}
