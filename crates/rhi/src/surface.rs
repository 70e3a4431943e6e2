//! Presentation surface and the window seam.
//!
//! The RHI does not know about any windowing library. A window collaborator
//! implements [`WindowSurface`] to report its pixel size and required instance
//! extensions and to create a [`Surface`].

use std::ffi::c_char;

use ash::vk;

use crate::error::{RhiError, RhiResult};

/// Window collaborator consumed by [`Context`](crate::context::Context) and the renderer.
pub trait WindowSurface {
    /// Returns the current framebuffer size in physical pixels.
    fn framebuffer_size(&self) -> (u32, u32);

    /// Returns the instance extensions needed to present on this platform.
    ///
    /// The pointers must reference static NUL-terminated strings.
    fn required_extensions(&self) -> RhiResult<Vec<*const c_char>>;

    /// Creates a presentation surface for this window.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Surface`] if the platform call fails.
    fn create_surface(&self, entry: &ash::Entry, instance: &ash::Instance) -> RhiResult<Surface>;
}

/// RAII wrapper for a `VkSurfaceKHR`.
///
/// The instance that created it must outlive this value.
pub struct Surface {
    /// Vulkan surface handle.
    handle: vk::SurfaceKHR,
    /// Surface extension loader.
    loader: ash::khr::surface::Instance,
}

impl Surface {
    /// Takes ownership of a surface created from `instance`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Surface`] for a null handle.
    ///
    /// # Safety
    ///
    /// `handle` must be a valid surface created from `instance` and must not be
    /// destroyed elsewhere.
    pub unsafe fn from_raw(
        entry: &ash::Entry,
        instance: &ash::Instance,
        handle: vk::SurfaceKHR,
    ) -> RhiResult<Self> {
        if handle == vk::SurfaceKHR::null() {
            return Err(RhiError::Surface("null surface handle".into()));
        }
        Ok(Self {
            handle,
            loader: ash::khr::surface::Instance::new(entry, instance),
        })
    }

    /// Returns the Vulkan surface handle.
    #[inline]
    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Returns the surface extension loader, for capability/format/present-mode queries.
    #[inline]
    pub fn loader(&self) -> &ash::khr::surface::Instance {
        &self.loader
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_surface(self.handle, None);
        }
        tracing::debug!("Vulkan surface destroyed");
    }
}
