//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! Safe wrappers over `ash`:
//! - [`context`]: instance, surface, physical device selection, logical device
//! - [`swapchain`]: presentable images and their recreation
//! - [`pipeline`], [`render_pass`], [`registry`]: pipeline state and the objects it references
//! - [`command`]: command pools and state-checked command buffer recording
//! - [`sync`], [`buffer`], [`descriptor`], [`shader`], [`vertex`]: supporting resources

mod error;

pub mod buffer;
pub mod command;
pub mod context;
pub mod descriptor;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod registry;
pub mod render_pass;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use error::{RhiError, RhiResult};

pub use ash::vk;
