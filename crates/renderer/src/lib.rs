//! Frame loop for vkframe.
//!
//! - [`Renderer`]: context, swapchain, render targets and the per-frame sequence
//! - [`frame_loop`]: resize, minimize and recreate decisions of each frame
//! - [`frame_manager`]: frame slots and their fences and semaphores
//! - [`delegate`]: the application's hooks into the frame loop
//! - [`depth_buffer`]: depth format selection and the depth attachment

pub mod delegate;
pub mod depth_buffer;
pub mod frame_loop;
pub mod frame_manager;
pub mod renderer;

pub use delegate::{ClearOnly, FrameContext, PipelineSetup, RendererDelegate};
pub use frame_loop::{Acquired, FrameAction, FrameLoop};
pub use frame_manager::{FrameManager, FrameRing};
pub use renderer::Renderer;
