//! winit window implementing the RHI's [`WindowSurface`] seam.

use std::ffi::c_char;

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use vkframe_core::{Error, Result, WindowConfig};
use vkframe_rhi::surface::{Surface, WindowSurface};
use vkframe_rhi::{RhiError, RhiResult};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window as WinitWindow, WindowAttributes};

/// A resizable winit window.
///
/// # Thread Safety
///
/// Created and driven on the event-loop thread. The renderer only reads its
/// size and raw handles.
pub struct Window {
    /// Underlying winit window.
    window: WinitWindow,
}

impl Window {
    /// Creates a resizable window.
    ///
    /// # Arguments
    ///
    /// * `event_loop` - The active event loop
    /// * `width` - Initial inner width in physical pixels
    /// * `height` - Initial inner height in physical pixels
    /// * `title` - Window title
    ///
    /// # Errors
    ///
    /// Returns [`Error::Window`] if the platform refuses to create the window.
    pub fn new(event_loop: &ActiveEventLoop, width: u32, height: u32, title: &str) -> Result<Self> {
        let window = event_loop
            .create_window(window_attributes(width, height, title))
            .map_err(|e| Error::Window(e.to_string()))?;

        tracing::info!("Window created: {}x{}", width, height);

        Ok(Self { window })
    }

    /// Creates a window from the `[window]` config section.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn from_config(event_loop: &ActiveEventLoop, config: &WindowConfig) -> Result<Self> {
        Self::new(event_loop, config.width, config.height, &config.title)
    }

    /// Returns the current inner size in physical pixels. Zero while minimized on some platforms.
    pub fn size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    /// Asks the event loop for another `RedrawRequested` event.
    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

impl WindowSurface for Window {
    /// Returns the inner size, which is the framebuffer size on every winit backend.
    fn framebuffer_size(&self) -> (u32, u32) {
        self.size()
    }

    fn required_extensions(&self) -> RhiResult<Vec<*const c_char>> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| RhiError::Surface(format!("failed to get display handle: {e}")))?;

        let extensions = ash_window::enumerate_required_extensions(display_handle.as_raw())
            .map_err(|e| {
                RhiError::Initialization(format!("failed to enumerate surface extensions: {e}"))
            })?;

        tracing::debug!(
            "Required surface extensions: {:?}",
            extensions
                .iter()
                .map(|&ext| unsafe { std::ffi::CStr::from_ptr(ext) })
                .collect::<Vec<_>>()
        );

        Ok(extensions.to_vec())
    }

    fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> RhiResult<Surface> {
        let display_handle = self
            .window
            .display_handle()
            .map_err(|e| RhiError::Surface(format!("failed to get display handle: {e}")))?;
        let window_handle = self
            .window
            .window_handle()
            .map_err(|e| RhiError::Surface(format!("failed to get window handle: {e}")))?;

        let handle = unsafe {
            ash_window::create_surface(
                entry,
                instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )?
        };

        tracing::info!("Vulkan surface created");

        unsafe { Surface::from_raw(entry, instance, handle) }
    }
}

fn window_attributes(width: u32, height: u32, title: &str) -> WindowAttributes {
    WindowAttributes::default()
        .with_title(title)
        .with_inner_size(PhysicalSize::new(width, height))
        .with_resizable(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::Size;

    #[test]
    fn test_window_attributes_from_config() {
        let config = WindowConfig::default();
        let attrs = window_attributes(config.width, config.height, &config.title);

        assert_eq!(attrs.title, "vkframe");
        assert!(attrs.resizable);
        assert_eq!(
            attrs.inner_size,
            Some(Size::Physical(PhysicalSize::new(1280, 720)))
        );
    }
}
