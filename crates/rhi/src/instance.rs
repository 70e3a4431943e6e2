//! Vulkan instance management.
//!
//! Owns the loader entry, the `VkInstance`, and the optional debug messenger.
//! The validation severity threshold is part of [`InstanceDesc`]; it is mapped
//! onto the messenger's severity mask so filtered messages never reach us.
//!
//! # Example
//!
//! ```no_run
//! use vkframe_core::DebugSeverity;
//! use vkframe_rhi::instance::{Instance, InstanceDesc};
//!
//! let desc = InstanceDesc {
//!     debug: Some(DebugSeverity::Warning),
//!     ..InstanceDesc::new("demo")
//! };
//! let instance = Instance::new(&desc).expect("Failed to create Vulkan instance");
//! ```

use std::ffi::{CStr, CString, c_char};

use ash::{Entry, vk};
use tracing::{debug, error, info, trace, warn};
use vkframe_core::DebugSeverity;

use crate::error::{RhiError, RhiResult};

/// The Khronos validation layer name.
pub const VALIDATION_LAYER_NAME: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Instance creation parameters.
#[derive(Debug, Clone)]
pub struct InstanceDesc {
    /// Application name reported to the driver.
    pub app_name: String,
    /// Extensions to enable, typically the window's surface extensions.
    pub extensions: Vec<*const c_char>,
    /// Extra layers to enable. The validation layer is added by `debug`.
    pub layers: Vec<&'static CStr>,
    /// Install a debug messenger reporting messages at or above this severity.
    pub debug: Option<DebugSeverity>,
}

impl InstanceDesc {
    /// Creates a headless description: no extensions, no layers, no messenger.
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            extensions: Vec::new(),
            layers: Vec::new(),
            debug: None,
        }
    }
}

/// Vulkan instance wrapper with optional validation support.
///
/// # Thread Safety
///
/// The instance is immutable after creation and is shared read-only.
pub struct Instance {
    /// Vulkan loader entry points. Must outlive the instance.
    entry: Entry,
    /// Instance function table.
    instance: ash::Instance,
    /// Debug utils loader, present when validation is active.
    debug_utils: Option<ash::ext::debug_utils::Instance>,
    /// Debug messenger forwarding validation messages to `tracing`.
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl Instance {
    /// Creates a Vulkan 1.3 instance.
    ///
    /// When `desc.debug` is set and the Khronos validation layer is
    /// installed, the layer and a debug messenger are enabled. A missing
    /// layer is logged and ignored.
    ///
    /// # Arguments
    ///
    /// * `desc` - Application name, extensions, layers and debug threshold
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Initialization`] if the loader cannot be found or
    /// instance creation is rejected by the driver.
    pub fn new(desc: &InstanceDesc) -> RhiResult<Self> {
        let entry = unsafe { Entry::load()? };

        if tracing::enabled!(tracing::Level::TRACE) {
            Self::log_available_extensions(&entry);
        }

        let validation = match desc.debug {
            Some(_) if Self::is_validation_layer_available(&entry)? => true,
            Some(_) => {
                warn!("Validation requested but VK_LAYER_KHRONOS_validation is not installed");
                false
            }
            None => false,
        };

        let app_name = CString::new(desc.app_name.as_str())
            .map_err(|_| RhiError::Initialization("application name contains NUL".into()))?;
        let app_info = vk::ApplicationInfo::default()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"vkframe")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let mut extensions = desc.extensions.clone();
        let mut layers: Vec<*const c_char> = desc.layers.iter().map(|l| l.as_ptr()).collect();
        if validation {
            extensions.push(ash::ext::debug_utils::NAME.as_ptr());
            layers.push(VALIDATION_LAYER_NAME.as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layers);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(|e| RhiError::Initialization(format!("vkCreateInstance: {e}")))?
        };

        info!(
            "Vulkan instance created (API 1.3, {} extensions, validation: {})",
            extensions.len(),
            validation
        );

        let (debug_utils, debug_messenger) = match desc.debug {
            Some(threshold) if validation => {
                let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
                match Self::setup_debug_messenger(&debug_utils, threshold) {
                    Ok(messenger) => {
                        debug!("Debug messenger installed (threshold: {:?})", threshold);
                        (Some(debug_utils), Some(messenger))
                    }
                    Err(e) => {
                        unsafe { instance.destroy_instance(None) };
                        return Err(e);
                    }
                }
            }
            _ => (None, None),
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
        })
    }

    /// Returns the instance function table.
    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    /// Returns the loader entry points.
    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Returns `true` if a debug messenger is installed.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.debug_messenger.is_some()
    }

    fn is_validation_layer_available(entry: &Entry) -> RhiResult<bool> {
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };

        Ok(available_layers.iter().any(|layer| {
            layer.layer_name_as_c_str().ok() == Some(VALIDATION_LAYER_NAME)
        }))
    }

    fn log_available_extensions(entry: &Entry) {
        let Ok(extensions) = (unsafe { entry.enumerate_instance_extension_properties(None) })
        else {
            return;
        };
        for ext in &extensions {
            if let Ok(name) = ext.extension_name_as_c_str() {
                trace!("Available instance extension: {:?}", name);
            }
        }
    }

    fn setup_debug_messenger(
        debug_utils: &ash::ext::debug_utils::Instance,
        threshold: DebugSeverity,
    ) -> RhiResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(severity_mask(threshold))
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None)? };
        Ok(messenger)
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger)
            {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

/// Returns the severity bits delivered for a given minimum severity.
///
/// # Arguments
///
/// * `threshold` - Lowest severity that should reach the log
pub fn severity_mask(threshold: DebugSeverity) -> vk::DebugUtilsMessageSeverityFlagsEXT {
    use vk::DebugUtilsMessageSeverityFlagsEXT as S;

    [
        (DebugSeverity::Verbose, S::VERBOSE),
        (DebugSeverity::Info, S::INFO),
        (DebugSeverity::Warning, S::WARNING),
        (DebugSeverity::Error, S::ERROR),
    ]
    .into_iter()
    .filter(|(severity, _)| *severity >= threshold)
    .fold(S::empty(), |mask, (_, bit)| mask | bit)
}

/// Forwards validation-layer messages to `tracing`.
///
/// # Safety
///
/// Called by the Vulkan loader with a valid (or null) callback data pointer.
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let callback_data = unsafe { &*p_callback_data };
    let message = if callback_data.p_message.is_null() {
        std::borrow::Cow::Borrowed("(no message)")
    } else {
        unsafe { CStr::from_ptr(callback_data.p_message).to_string_lossy() }
    };

    let kind = match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "General",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "Validation",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "Performance",
        _ => "Unknown",
    };

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => error!("[Vulkan {}] {}", kind, message),
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => warn!("[Vulkan {}] {}", kind, message),
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => info!("[Vulkan {}] {}", kind, message),
        _ => debug!("[Vulkan {}] {}", kind, message),
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;
    use vk::DebugUtilsMessageSeverityFlagsEXT as S;

    #[test]
    fn test_severity_mask_warning() {
        assert_eq!(severity_mask(DebugSeverity::Warning), S::WARNING | S::ERROR);
    }

    #[test]
    fn test_severity_mask_bounds() {
        assert_eq!(severity_mask(DebugSeverity::Error), S::ERROR);
        assert_eq!(
            severity_mask(DebugSeverity::Verbose),
            S::VERBOSE | S::INFO | S::WARNING | S::ERROR
        );
    }

    #[test]
    fn test_headless_desc_defaults() {
        let desc = InstanceDesc::new("test");
        assert!(desc.extensions.is_empty());
        assert!(desc.layers.is_empty());
        assert!(desc.debug.is_none());
    }

    #[test]
    fn test_instance_creation_without_validation() {
        match Instance::new(&InstanceDesc::new("vkframe-test")) {
            Ok(instance) => assert!(!instance.has_validation()),
            Err(RhiError::Initialization(msg)) => {
                eprintln!("Skipping test: Vulkan not available ({msg})");
            }
            Err(e) => panic!("Unexpected error: {e:?}"),
        }
    }

    #[test]
    fn test_instance_creation_with_validation() {
        let desc = InstanceDesc {
            debug: Some(DebugSeverity::Error),
            ..InstanceDesc::new("vkframe-test")
        };
        match Instance::new(&desc) {
            Ok(instance) => {
                if instance.has_validation() {
                    assert!(instance.debug_utils.is_some());
                }
            }
            Err(RhiError::Initialization(msg)) => {
                eprintln!("Skipping test: Vulkan not available ({msg})");
            }
            Err(e) => panic!("Unexpected error: {e:?}"),
        }
    }
}
