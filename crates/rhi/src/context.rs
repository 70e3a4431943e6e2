//! Device/instance context.
//!
//! [`Context`] is the root owner of the GPU: instance, surface, selected
//! physical device and logical device. It must outlive everything created from
//! it; fields drop in declaration order (device, surface, instance).

use std::ffi::{CStr, c_char};
use std::sync::Arc;

use tracing::{info, warn};
use vkframe_core::DebugSeverity;

use crate::device::Device;
use crate::error::RhiResult;
use crate::instance::{Instance, InstanceDesc};
use crate::physical_device::{PhysicalDeviceInfo, select_physical_device};
use crate::surface::{Surface, WindowSurface};

/// Context creation parameters.
#[derive(Debug, Clone, Default)]
pub struct ContextDesc {
    /// Application name reported to the driver.
    pub app_name: String,
    /// Instance extensions beyond what the window needs.
    pub required_extensions: Vec<&'static CStr>,
    /// Instance layers to enable besides validation.
    pub required_layers: Vec<&'static CStr>,
    /// Validation messenger threshold. `None` disables validation.
    pub debug: Option<DebugSeverity>,
}

/// Owns the instance, surface, physical device selection and logical device.
///
/// # Thread Safety
///
/// Read-only after creation. The device is shared through `Arc`.
pub struct Context {
    /// Logical device. Dropped first.
    device: Arc<Device>,
    /// The GPU chosen by first-fit selection.
    physical_device: PhysicalDeviceInfo,
    /// Window surface. Dropped after the device, before the instance.
    surface: Surface,
    /// Vulkan instance. Dropped last.
    instance: Instance,
}

impl Context {
    /// Creates the instance and the window surface, then selects and creates a device.
    ///
    /// # Arguments
    ///
    /// * `desc` - Application name, extra extensions and layers, validation threshold
    /// * `window` - Provides the surface extensions and creates the surface
    ///
    /// # Errors
    ///
    /// - [`RhiError::Initialization`](crate::RhiError::Initialization) if the
    ///   instance or logical device cannot be created
    /// - [`RhiError::NoSuitableDevice`](crate::RhiError::NoSuitableDevice) if no
    ///   GPU can both render and present to the window
    pub fn create(desc: &ContextDesc, window: &dyn WindowSurface) -> RhiResult<Self> {
        let mut extensions: Vec<*const c_char> = window.required_extensions()?;
        for ext in &desc.required_extensions {
            if !extensions
                .iter()
                .any(|&existing| unsafe { CStr::from_ptr(existing) } == *ext)
            {
                extensions.push(ext.as_ptr());
            }
        }

        let instance = Instance::new(&InstanceDesc {
            app_name: desc.app_name.clone(),
            extensions,
            layers: desc.required_layers.clone(),
            debug: desc.debug,
        })?;

        // The surface must exist before selection so present support can be queried.
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical_device =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &physical_device)?;

        info!("Context ready on '{}'", physical_device.device_name());

        Ok(Self {
            device,
            physical_device,
            surface,
            instance,
        })
    }

    /// Returns the Vulkan instance.
    #[inline]
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// Returns the window surface.
    #[inline]
    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    /// Returns the logical device.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    /// Returns the selected physical device.
    #[inline]
    pub fn physical_device(&self) -> &PhysicalDeviceInfo {
        &self.physical_device
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        let outstanding = Arc::strong_count(&self.device) - 1;
        if outstanding > 0 {
            warn!(
                "Context dropped while {} device reference(s) are still alive",
                outstanding
            );
        }
    }
}
