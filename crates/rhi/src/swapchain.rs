//! Swapchain management.
//!
//! [`Swapchain`] owns the `VkSwapchainKHR`, its images and one view per image.
//! It is never resized in place: [`Swapchain::recreate`] builds a new chain
//! (passing the old one as `old_swapchain`) after the device is idle, then
//! destroys the old chain.
//!
//! Format, present mode, extent and image count are decided by
//! [`SwapchainPlan`], a pure function of the surface support details.
//!
//! # Invariants
//!
//! A live swapchain has at least one image and exactly one view per image
//! (see [`parts_consistent`]). Views are destroyed before the chain.
//!
//! # Example
//!
//! ```no_run
//! # use vkframe_rhi::context::Context;
//! # use vkframe_rhi::swapchain::Swapchain;
//! # use vkframe_rhi::vk;
//! # fn example(context: &Context, image_available: vk::Semaphore, render_finished: vk::Semaphore)
//! #     -> vkframe_rhi::RhiResult<()> {
//! let mut swapchain = Swapchain::new(context, 800, 600, vk::PresentModeKHR::MAILBOX)?;
//!
//! match swapchain.acquire_next_image(image_available) {
//!     Ok((index, _suboptimal)) => {
//!         // ... record and submit ...
//!         swapchain.present(context.device().present_queue(), index, render_finished)?;
//!     }
//!     Err(e) if e.is_recoverable() => swapchain.recreate(context, 1024, 768)?,
//!     Err(e) => return Err(e),
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};
use vkframe_core::PresentModePreference;

use crate::context::Context;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::surface::Surface;

/// What a surface supports for swapchain creation.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Image count and extent limits, current extent and transform.
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported format / color space pairs.
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported presentation modes.
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support for a physical device and surface.
    ///
    /// # Arguments
    ///
    /// * `physical_device` - The device to query
    /// * `surface` - The window surface
    ///
    /// # Errors
    ///
    /// Returns an error if any of the surface queries fail.
    pub fn query(physical_device: vk::PhysicalDevice, surface: &Surface) -> RhiResult<Self> {
        let loader = surface.loader();
        let (capabilities, formats, present_modes) = unsafe {
            (
                loader.get_physical_device_surface_capabilities(physical_device, surface.handle())?,
                loader.get_physical_device_surface_formats(physical_device, surface.handle())?,
                loader.get_physical_device_surface_present_modes(physical_device, surface.handle())?,
            )
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            capabilities.max_image_count
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// Returns `true` if the surface offers at least one format and one present mode.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Resolved swapchain parameters for one (re)creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapchainPlan {
    /// Chosen by [`choose_surface_format`].
    pub surface_format: vk::SurfaceFormatKHR,
    /// Chosen by [`choose_present_mode`].
    pub present_mode: vk::PresentModeKHR,
    /// Chosen by [`choose_extent`]. May be zero while the window is minimized.
    pub extent: vk::Extent2D,
    /// Minimum image count requested, from [`determine_image_count`].
    pub image_count: u32,
}

impl SwapchainPlan {
    /// Decides parameters for a window of `width` x `height` pixels.
    ///
    /// # Arguments
    ///
    /// * `support` - What the surface supports
    /// * `width`, `height` - Window framebuffer size in pixels
    /// * `preferred_present_mode` - Used when the surface supports it
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Surface`] if the support details are inadequate.
    pub fn new(
        support: &SwapchainSupportDetails,
        width: u32,
        height: u32,
        preferred_present_mode: vk::PresentModeKHR,
    ) -> RhiResult<Self> {
        if !support.is_adequate() {
            return Err(RhiError::Surface(
                "surface reports no formats or no present modes".into(),
            ));
        }
        Ok(Self {
            surface_format: choose_surface_format(&support.formats),
            present_mode: choose_present_mode(&support.present_modes, preferred_present_mode),
            extent: choose_extent(&support.capabilities, width, height),
            image_count: determine_image_count(&support.capabilities),
        })
    }
}

/// Vulkan swapchain wrapper.
///
/// # Thread Safety
///
/// Not thread-safe; driven from the render thread only.
pub struct Swapchain {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Swapchain extension loader.
    swapchain_loader: ash::khr::swapchain::Device,
    /// Surface the chain presents to. Owned by the context.
    surface: vk::SurfaceKHR,
    /// Vulkan swapchain handle. Null only while a recreation failed.
    swapchain: vk::SwapchainKHR,
    /// Presentable images, owned by the chain.
    images: Vec<vk::Image>,
    /// One view per image, owned by this wrapper.
    image_views: Vec<vk::ImageView>,
    /// Image format.
    format: vk::Format,
    /// Current image size.
    extent: vk::Extent2D,
    /// Present mode in use.
    present_mode: vk::PresentModeKHR,
    /// Configured preference, reused on recreation.
    preferred_present_mode: vk::PresentModeKHR,
}

/// Handles produced by one creation, before they are moved into a [`Swapchain`].
struct SwapchainParts {
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    plan: SwapchainPlan,
}

impl Swapchain {
    /// Creates a swapchain for the context's surface.
    ///
    /// # Arguments
    ///
    /// * `context` - Provides the device, instance and surface
    /// * `width`, `height` - Window framebuffer size in pixels
    /// * `preferred_present_mode` - Used when the surface supports it, else FIFO
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SwapchainOutOfDate`] if the surface currently has
    /// no area, or an error if creation fails.
    pub fn new(
        context: &Context,
        width: u32,
        height: u32,
        preferred_present_mode: vk::PresentModeKHR,
    ) -> RhiResult<Self> {
        let device = context.device().clone();
        let swapchain_loader =
            ash::khr::swapchain::Device::new(context.instance().handle(), device.handle());

        let parts = Self::create_parts(
            &device,
            &swapchain_loader,
            context.surface(),
            width,
            height,
            preferred_present_mode,
            vk::SwapchainKHR::null(),
        )?;

        Ok(Self {
            device,
            swapchain_loader,
            surface: context.surface().handle(),
            swapchain: parts.swapchain,
            images: parts.images,
            image_views: parts.image_views,
            format: parts.plan.surface_format.format,
            extent: parts.plan.extent,
            present_mode: parts.plan.present_mode,
            preferred_present_mode,
        })
    }

    fn create_parts(
        device: &Device,
        swapchain_loader: &ash::khr::swapchain::Device,
        surface: &Surface,
        width: u32,
        height: u32,
        preferred_present_mode: vk::PresentModeKHR,
        old_swapchain: vk::SwapchainKHR,
    ) -> RhiResult<SwapchainParts> {
        let support = SwapchainSupportDetails::query(device.physical_device(), surface)?;
        let plan = SwapchainPlan::new(&support, width, height, preferred_present_mode)?;

        if plan.extent.width == 0 || plan.extent.height == 0 {
            // Minimized: nothing can be created until the surface has an area again.
            return Err(RhiError::SwapchainOutOfDate);
        }

        info!(
            "Creating swapchain: {}x{}, format {:?}, present mode {:?}, {} images",
            plan.extent.width,
            plan.extent.height,
            plan.surface_format.format,
            plan.present_mode,
            plan.image_count
        );

        let families = device.queue_families();
        let family_indices: Vec<u32> = families.unique_families();
        let (sharing_mode, shared_indices) = if families.is_split() {
            debug!("Using CONCURRENT sharing between families {:?}", family_indices);
            (vk::SharingMode::CONCURRENT, family_indices.as_slice())
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle())
            .min_image_count(plan.image_count)
            .image_format(plan.surface_format.format)
            .image_color_space(plan.surface_format.color_space)
            .image_extent(plan.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(shared_indices)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(plan.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };

        let images = match unsafe { swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e.into());
            }
        };

        let image_views = match create_image_views(device, &images, plan.surface_format.format) {
            Ok(views) => views,
            Err(e) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e);
            }
        };

        if !parts_consistent(images.len(), image_views.len()) {
            for &view in &image_views {
                unsafe { device.handle().destroy_image_view(view, None) };
            }
            unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
            return Err(RhiError::Surface(format!(
                "swapchain returned {} images and {} views",
                images.len(),
                image_views.len()
            )));
        }

        info!("Swapchain created with {} images", images.len());

        Ok(SwapchainParts {
            swapchain,
            images,
            image_views,
            plan,
        })
    }

    /// Replaces the chain with one matching the new window size.
    ///
    /// Waits for the device to go idle first, so no in-flight command buffer
    /// can still reference the old images. Everything that depends on the
    /// old images (framebuffers) must be destroyed by the caller beforehand.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SwapchainOutOfDate`] if the surface has no area;
    /// the chain is then left empty and [`is_valid`](Self::is_valid) is
    /// `false` until a later recreation succeeds.
    pub fn recreate(&mut self, context: &Context, width: u32, height: u32) -> RhiResult<()> {
        let surface = context.surface();
        debug_assert_eq!(surface.handle(), self.surface);
        self.device.wait_idle()?;

        info!("Recreating swapchain for {}x{}", width, height);

        self.destroy_image_views();

        let old_swapchain = self.swapchain;
        let result = Self::create_parts(
            &self.device,
            &self.swapchain_loader,
            surface,
            width,
            height,
            self.preferred_present_mode,
            old_swapchain,
        );

        // The old chain is retired either way.
        unsafe { self.swapchain_loader.destroy_swapchain(old_swapchain, None) };
        self.swapchain = vk::SwapchainKHR::null();
        self.images.clear();

        let parts = result?;
        self.swapchain = parts.swapchain;
        self.images = parts.images;
        self.image_views = parts.image_views;
        self.format = parts.plan.surface_format.format;
        self.extent = parts.plan.extent;
        self.present_mode = parts.plan.present_mode;
        Ok(())
    }

    /// Acquires the next presentable image, signalling `semaphore` when it is ready.
    ///
    /// # Returns
    ///
    /// `(image_index, suboptimal)`.
    ///
    /// # Errors
    ///
    /// [`RhiError::SwapchainOutOfDate`] when the chain must be recreated.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> RhiResult<(u32, bool)> {
        if !self.is_valid() {
            return Err(RhiError::SwapchainOutOfDate);
        }
        unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
                .map_err(RhiError::from_vk)
        }
    }

    /// Queues `image_index` for presentation after `wait_semaphore` signals.
    ///
    /// # Arguments
    ///
    /// * `queue` - The present queue
    /// * `image_index` - Index returned by [`acquire_next_image`](Self::acquire_next_image)
    /// * `wait_semaphore` - Signaled when rendering to the image finished
    ///
    /// # Returns
    ///
    /// `true` when the chain is suboptimal.
    ///
    /// # Errors
    ///
    /// [`RhiError::SwapchainOutOfDate`] when the chain must be recreated.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RhiResult<bool> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe {
            self.swapchain_loader
                .queue_present(queue, &present_info)
                .map_err(RhiError::from_vk)
        }
    }

    /// Returns `true` if the chain exists, has images, and every image has a view.
    pub fn is_valid(&self) -> bool {
        self.swapchain != vk::SwapchainKHR::null()
            && parts_consistent(self.images.len(), self.image_views.len())
    }

    /// Returns the image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the current image size.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the present mode in use.
    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Returns the number of presentable images.
    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Returns one view per image, in image index order.
    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    fn destroy_image_views(&mut self) {
        for &image_view in &self.image_views {
            unsafe {
                self.device.handle().destroy_image_view(image_view, None);
            }
        }
        self.image_views.clear();
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_image_views();

        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }
            info!(
                "Swapchain destroyed (was {}x{}, {} images)",
                self.extent.width,
                self.extent.height,
                self.images.len()
            );
        }
    }
}

/// Returns `true` if a chain with `images` images and `views` views is usable.
///
/// There must be at least one image and exactly one view per image.
#[inline]
pub fn parts_consistent(images: usize, views: usize) -> bool {
    images > 0 && images == views
}

/// Maps the configured preference to a Vulkan present mode.
pub fn preferred_present_mode(preference: PresentModePreference) -> vk::PresentModeKHR {
    match preference {
        PresentModePreference::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentModePreference::Fifo => vk::PresentModeKHR::FIFO,
        PresentModePreference::Immediate => vk::PresentModeKHR::IMMEDIATE,
    }
}

/// Chooses the surface format.
///
/// Prefers B8G8R8A8_SRGB / SRGB_NONLINEAR, then B8G8R8A8_UNORM, then the first format.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    let find = |format: vk::Format| {
        formats.iter().copied().find(|f| {
            f.format == format && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
    };

    if let Some(format) = find(vk::Format::B8G8R8A8_SRGB) {
        return format;
    }
    if let Some(format) = find(vk::Format::B8G8R8A8_UNORM) {
        warn!("Using fallback surface format B8G8R8A8_UNORM");
        return format;
    }

    let first = formats.first().copied().unwrap_or_default();
    warn!("Using first available surface format: {:?}", first.format);
    first
}

/// Chooses `preferred` when available; FIFO is always supported.
pub fn choose_present_mode(
    present_modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if present_modes.contains(&preferred) {
        preferred
    } else {
        debug!("{:?} unavailable, falling back to FIFO", preferred);
        vk::PresentModeKHR::FIFO
    }
}

/// Chooses the swapchain extent.
///
/// # Returns
///
/// The surface's current extent, or the window size clamped to the surface
/// bounds when the surface leaves it up to the swapchain (`u32::MAX`).
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// Returns one more than the minimum image count, capped by the maximum
/// unless it is 0 (unbounded).
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> RhiResult<Vec<vk::ImageView>> {
    let mut image_views = Vec::with_capacity(images.len());

    for &image in images {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping::default())
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .level_count(1)
                    .layer_count(1),
            );

        match unsafe { device.handle().create_image_view(&create_info, None) } {
            Ok(view) => image_views.push(view),
            Err(e) => {
                for view in image_views {
                    unsafe { device.handle().destroy_image_view(view, None) };
                }
                return Err(e.into());
            }
        }
    }

    Ok(image_views)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn srgb(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn undefined_extent_caps(min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            min_image_count: 2,
            max_image_count: 3,
            ..Default::default()
        }
    }

    fn support(capabilities: vk::SurfaceCapabilitiesKHR) -> SwapchainSupportDetails {
        SwapchainSupportDetails {
            capabilities,
            formats: vec![srgb(vk::Format::B8G8R8A8_UNORM), srgb(vk::Format::B8G8R8A8_SRGB)],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        }
    }

    #[test]
    fn test_choose_surface_format_prefers_srgb() {
        let formats = [
            srgb(vk::Format::R8G8B8A8_UNORM),
            srgb(vk::Format::B8G8R8A8_SRGB),
            srgb(vk::Format::B8G8R8A8_UNORM),
        ];
        assert_eq!(choose_surface_format(&formats).format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn test_choose_surface_format_second_choice() {
        let formats = [srgb(vk::Format::R8G8B8A8_UNORM), srgb(vk::Format::B8G8R8A8_UNORM)];
        assert_eq!(choose_surface_format(&formats).format, vk::Format::B8G8R8A8_UNORM);
    }

    #[test]
    fn test_choose_surface_format_first_available() {
        let formats = [srgb(vk::Format::R8G8B8A8_UNORM)];
        assert_eq!(choose_surface_format(&formats).format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_choose_present_mode_honors_preference() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
    }

    #[test]
    fn test_choose_present_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(
            choose_present_mode(&modes, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_preferred_present_mode_mapping() {
        assert_eq!(
            preferred_present_mode(PresentModePreference::Mailbox),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            preferred_present_mode(PresentModePreference::Fifo),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..Default::default()
        };
        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!((extent.width, extent.height), (1920, 1080));
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let capabilities = undefined_extent_caps((100, 100), (2000, 2000));

        let extent = choose_extent(&capabilities, 3000, 3000);
        assert_eq!((extent.width, extent.height), (2000, 2000));

        let extent = choose_extent(&capabilities, 50, 50);
        assert_eq!((extent.width, extent.height), (100, 100));

        let extent = choose_extent(&capabilities, 800, 600);
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_resize_800x600_to_1024x768_is_clamped() {
        let capabilities = undefined_extent_caps((1, 1), (1024, 720));
        let before = SwapchainPlan::new(&support(capabilities), 800, 600, vk::PresentModeKHR::MAILBOX)
            .unwrap();
        let after = SwapchainPlan::new(&support(capabilities), 1024, 768, vk::PresentModeKHR::MAILBOX)
            .unwrap();

        assert_eq!((before.extent.width, before.extent.height), (800, 600));
        assert_eq!((after.extent.width, after.extent.height), (1024, 720));
        assert_eq!(after.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(after.surface_format.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn test_resize_follows_surface_current_extent() {
        let mut capabilities = undefined_extent_caps((1, 1), (4096, 4096));
        capabilities.current_extent = vk::Extent2D {
            width: 1024,
            height: 768,
        };
        let plan =
            SwapchainPlan::new(&support(capabilities), 800, 600, vk::PresentModeKHR::FIFO).unwrap();
        assert_eq!((plan.extent.width, plan.extent.height), (1024, 768));
    }

    #[test]
    fn test_plan_rejects_inadequate_support() {
        let details = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(matches!(
            SwapchainPlan::new(&details, 800, 600, vk::PresentModeKHR::FIFO),
            Err(RhiError::Surface(_))
        ));
    }

    #[test]
    fn test_parts_consistent() {
        assert!(parts_consistent(3, 3));
        assert!(parts_consistent(1, 1));
        assert!(!parts_consistent(0, 0));
        assert!(!parts_consistent(3, 2));
        assert!(!parts_consistent(2, 3));
    }

    #[test]
    fn test_determine_image_count() {
        let caps = |min, max| vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&caps(2, 3)), 3);
        assert_eq!(determine_image_count(&caps(2, 8)), 3);
        assert_eq!(determine_image_count(&caps(2, 0)), 3);
        assert_eq!(determine_image_count(&caps(3, 3)), 3);
    }

    #[test]
    fn test_image_count_within_capabilities() {
        for (min, max) in [(1, 1), (1, 2), (2, 2), (2, 3), (3, 0), (4, 16)] {
            let caps = vk::SurfaceCapabilitiesKHR {
                min_image_count: min,
                max_image_count: max,
                ..Default::default()
            };
            let count = determine_image_count(&caps);
            assert!(count >= min);
            assert!(max == 0 || count <= max);
        }
    }
}
