//! Platform layer for vkframe.
//!
//! Provides the winit [`Window`] that the renderer presents into. The window
//! implements `vkframe_rhi::surface::WindowSurface`, which is the only thing
//! the RHI and renderer know about windowing.

mod window;

pub use window::Window;
