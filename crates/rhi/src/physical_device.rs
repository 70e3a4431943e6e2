//! Physical device (GPU) selection.
//!
//! Selection is first-fit: devices are visited in enumeration order and the
//! first one that passes both the render and the present predicate wins.
//! There is no ranking between several suitable devices.
//!
//! The predicates operate on a [`DeviceCandidate`] summary so they can be
//! exercised without a GPU.

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};

/// Device extensions every selected GPU must expose.
pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// Queue family indices used by the renderer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Queue family supporting graphics operations.
    pub graphics_family: Option<u32>,
    /// Queue family that can present to the window surface.
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Returns `true` if both families were found.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Returns the distinct family indices, graphics first.
    ///
    /// Used to create one queue per family.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);
        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(present) = self.present_family
            && !families.contains(&present)
        {
            families.push(present);
        }
        families
    }

    /// Returns `true` if graphics and present live on different families.
    pub fn is_split(&self) -> bool {
        self.is_complete() && self.graphics_family != self.present_family
    }
}

/// Summary of one enumerated device, enough to decide suitability.
#[derive(Clone, Debug, Default)]
pub struct DeviceCandidate {
    /// Device name, for logging.
    pub name: String,
    /// Queue families found for the window surface.
    pub queue_families: QueueFamilyIndices,
    /// Whether the device supports anisotropic sampling.
    pub sampler_anisotropy: bool,
    /// Whether every [`REQUIRED_DEVICE_EXTENSIONS`] entry is available.
    pub supports_swapchain: bool,
    /// Number of surface formats the device offers for the surface.
    pub surface_format_count: usize,
    /// Number of present modes the device offers for the surface.
    pub present_mode_count: usize,
}

impl DeviceCandidate {
    /// Returns `true` if the device can render: a graphics queue and anisotropic sampling.
    pub fn is_render_suitable(&self) -> bool {
        self.queue_families.graphics_family.is_some() && self.sampler_anisotropy
    }

    /// Returns `true` if the device can present: a present queue, the
    /// swapchain extension, and at least one surface format and present mode.
    pub fn is_present_suitable(&self) -> bool {
        self.queue_families.present_family.is_some()
            && self.supports_swapchain
            && self.surface_format_count > 0
            && self.present_mode_count > 0
    }

    /// Returns `true` if the device can both render and present.
    pub fn is_suitable(&self) -> bool {
        self.is_render_suitable() && self.is_present_suitable()
    }

    /// Returns a human-readable reason this candidate was rejected, if it was.
    pub fn rejection_reason(&self) -> Option<&'static str> {
        if self.queue_families.graphics_family.is_none() {
            Some("no graphics queue family")
        } else if !self.sampler_anisotropy {
            Some("sampler anisotropy not supported")
        } else if self.queue_families.present_family.is_none() {
            Some("no queue family can present to the surface")
        } else if !self.supports_swapchain {
            Some("VK_KHR_swapchain not supported")
        } else if self.surface_format_count == 0 {
            Some("no surface formats")
        } else if self.present_mode_count == 0 {
            Some("no present modes")
        } else {
            None
        }
    }
}

/// Returns the index of the first candidate satisfying both predicates.
pub fn first_fit(candidates: &[DeviceCandidate]) -> Option<usize> {
    candidates.iter().position(DeviceCandidate::is_suitable)
}

/// Information about the selected physical device.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, type, API version).
    pub properties: vk::PhysicalDeviceProperties,
    /// Queue families the logical device will use.
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Returns the device name reported by the driver.
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    /// Returns a readable name for the device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    /// Returns the supported Vulkan version as `(major, minor, patch)`.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Selects the first device that can both render and present to `surface`.
///
/// # Arguments
///
/// * `instance` - The Vulkan instance
/// * `surface` - The window surface
/// * `surface_loader` - Surface extension loader
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableDevice`] if enumeration yields nothing usable.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableDevice);
    }

    info!("Found {} GPU(s)", devices.len());

    let candidates: Vec<DeviceCandidate> = devices
        .iter()
        .map(|&device| describe_candidate(instance, device, surface, surface_loader))
        .collect();

    for candidate in &candidates {
        if let Some(reason) = candidate.rejection_reason() {
            debug!("GPU '{}' skipped: {}", candidate.name, reason);
        }
    }

    let index = first_fit(&candidates).ok_or_else(|| {
        warn!("No GPU satisfies both render and present requirements");
        RhiError::NoSuitableDevice
    })?;

    let device = devices[index];
    let selected = unsafe {
        PhysicalDeviceInfo {
            device,
            properties: instance.get_physical_device_properties(device),
            queue_families: candidates[index].queue_families,
        }
    };

    let (major, minor, patch) = selected.api_version();
    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}",
        selected.device_name(),
        selected.device_type_name(),
        major,
        minor,
        patch
    );

    Ok(selected)
}

fn describe_candidate(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> DeviceCandidate {
    unsafe {
        let properties = instance.get_physical_device_properties(device);
        let features = instance.get_physical_device_features(device);
        let name = properties
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "Unknown".to_string());

        let supports_swapchain = instance
            .enumerate_device_extension_properties(device)
            .map(|available| has_extensions(&available, REQUIRED_DEVICE_EXTENSIONS))
            .unwrap_or(false);

        let surface_format_count = surface_loader
            .get_physical_device_surface_formats(device, surface)
            .map(|f| f.len())
            .unwrap_or(0);
        let present_mode_count = surface_loader
            .get_physical_device_surface_present_modes(device, surface)
            .map(|m| m.len())
            .unwrap_or(0);

        DeviceCandidate {
            name,
            queue_families: find_queue_families(instance, device, surface, surface_loader),
            sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
            supports_swapchain,
            surface_format_count,
            present_mode_count,
        }
    }
}

/// Returns `true` if every name in `required` appears in `available`.
pub fn has_extensions(available: &[vk::ExtensionProperties], required: &[&CStr]) -> bool {
    required.iter().all(|&name| {
        available
            .iter()
            .any(|ext| ext.extension_name_as_c_str().ok() == Some(name))
    })
}

/// Pick queue families, preferring one family that does both graphics and present.
fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> QueueFamilyIndices {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let flags: Vec<(vk::QueueFlags, bool)> = families
        .iter()
        .enumerate()
        .map(|(i, family)| {
            let present = family.queue_count > 0
                && unsafe {
                    surface_loader
                        .get_physical_device_surface_support(device, i as u32, surface)
                        .unwrap_or(false)
                };
            let graphics = if family.queue_count > 0 {
                family.queue_flags
            } else {
                vk::QueueFlags::empty()
            };
            (graphics, present)
        })
        .collect();

    pick_queue_families(&flags)
}

/// Chooses queue families from `(flags, can_present)` per family.
///
/// A single family doing both graphics and present is preferred. Otherwise
/// the first graphics family and the first present family are taken.
pub fn pick_queue_families(families: &[(vk::QueueFlags, bool)]) -> QueueFamilyIndices {
    let is_graphics = |flags: &vk::QueueFlags| flags.contains(vk::QueueFlags::GRAPHICS);

    if let Some(shared) = families
        .iter()
        .position(|(flags, present)| is_graphics(flags) && *present)
    {
        return QueueFamilyIndices {
            graphics_family: Some(shared as u32),
            present_family: Some(shared as u32),
        };
    }

    QueueFamilyIndices {
        graphics_family: families
            .iter()
            .position(|(flags, _)| is_graphics(flags))
            .map(|i| i as u32),
        present_family: families
            .iter()
            .position(|(_, present)| *present)
            .map(|i| i as u32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suitable(name: &str) -> DeviceCandidate {
        DeviceCandidate {
            name: name.to_string(),
            queue_families: QueueFamilyIndices {
                graphics_family: Some(0),
                present_family: Some(0),
            },
            sampler_anisotropy: true,
            supports_swapchain: true,
            surface_format_count: 2,
            present_mode_count: 1,
        }
    }

    #[test]
    fn test_queue_family_indices_default() {
        let indices = QueueFamilyIndices::default();
        assert!(!indices.is_complete());
        assert!(indices.unique_families().is_empty());
    }

    #[test]
    fn test_unique_families_shared() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert_eq!(indices.unique_families(), vec![0]);
        assert!(!indices.is_split());
    }

    #[test]
    fn test_unique_families_split() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(2),
        };
        assert_eq!(indices.unique_families(), vec![0, 2]);
        assert!(indices.is_split());
    }

    #[test]
    fn test_first_fit_takes_first_suitable() {
        let mut no_present = suitable("integrated");
        no_present.queue_families.present_family = None;
        let candidates = vec![no_present, suitable("discrete-a"), suitable("discrete-b")];
        assert_eq!(first_fit(&candidates), Some(1));
    }

    #[test]
    fn test_first_fit_requires_both_predicates() {
        let mut render_only = suitable("render-only");
        render_only.present_mode_count = 0;
        let mut present_only = suitable("present-only");
        present_only.sampler_anisotropy = false;

        assert!(render_only.is_render_suitable());
        assert!(!render_only.is_present_suitable());
        assert!(present_only.is_present_suitable());
        assert!(!present_only.is_render_suitable());
        assert_eq!(first_fit(&[render_only, present_only]), None);
    }

    #[test]
    fn test_first_fit_empty() {
        assert_eq!(first_fit(&[]), None);
    }

    #[test]
    fn test_rejection_reasons() {
        assert_eq!(suitable("ok").rejection_reason(), None);

        let mut no_swapchain = suitable("x");
        no_swapchain.supports_swapchain = false;
        assert_eq!(
            no_swapchain.rejection_reason(),
            Some("VK_KHR_swapchain not supported")
        );

        let mut no_formats = suitable("y");
        no_formats.surface_format_count = 0;
        assert_eq!(no_formats.rejection_reason(), Some("no surface formats"));
    }

    #[test]
    fn test_pick_prefers_shared_family() {
        let families = [
            (vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, false),
            (vk::QueueFlags::TRANSFER, true),
            (vk::QueueFlags::GRAPHICS, true),
        ];
        let picked = pick_queue_families(&families);
        assert_eq!(picked.graphics_family, Some(2));
        assert_eq!(picked.present_family, Some(2));
    }

    #[test]
    fn test_pick_falls_back_to_split_families() {
        let families = [
            (vk::QueueFlags::GRAPHICS, false),
            (vk::QueueFlags::TRANSFER, true),
        ];
        let picked = pick_queue_families(&families);
        assert_eq!(picked.graphics_family, Some(0));
        assert_eq!(picked.present_family, Some(1));
    }

    #[test]
    fn test_pick_without_graphics() {
        let picked = pick_queue_families(&[(vk::QueueFlags::COMPUTE, true)]);
        assert!(picked.graphics_family.is_none());
        assert!(!picked.is_complete());
    }

    #[test]
    fn test_required_extensions_include_swapchain() {
        assert!(REQUIRED_DEVICE_EXTENSIONS.contains(&ash::khr::swapchain::NAME));
    }
}
