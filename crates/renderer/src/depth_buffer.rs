//! Depth attachment for the default render pass.
//!
//! [`choose_depth_format`] picks the first format from
//! [`DEPTH_FORMAT_CANDIDATES`] the device can use as an optimal-tiling
//! depth/stencil attachment. [`DepthBuffer`] is a GPU-only image of that
//! format plus a view, recreated with the swapchain.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error, info};

use vkframe_rhi::device::Device;
use vkframe_rhi::{RhiError, RhiResult};

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Returns the first supported depth format, or `None` if the device supports none of them.
pub fn choose_depth_format(device: &Device) -> Option<vk::Format> {
    device.find_supported_format(
        &DEPTH_FORMAT_CANDIDATES,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
    )
}

/// Returns `true` if `format` also carries a stencil aspect.
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D16_UNORM_S8_UINT
    )
}

fn aspect_mask(format: vk::Format) -> vk::ImageAspectFlags {
    if has_stencil_component(format) {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::DEPTH
    }
}

/// Depth image, view and allocation.
///
/// Destroyed view first, then image, then memory.
pub struct DepthBuffer {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Depth image.
    image: vk::Image,
    /// View bound as the framebuffer's depth attachment.
    image_view: vk::ImageView,
    /// Backing memory, taken on drop.
    allocation: Option<Allocation>,
    /// Size, equal to the swapchain extent.
    extent: vk::Extent2D,
}

impl DepthBuffer {
    /// Creates a depth attachment matching the swapchain extent.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `extent` - Swapchain extent
    /// * `format` - One of [`DEPTH_FORMAT_CANDIDATES`] the device supports
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ResourceAllocation`] for a zero extent or a failed
    /// allocation, or an error if image or view creation fails.
    pub fn new(device: Arc<Device>, extent: vk::Extent2D, format: vk::Format) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::ResourceAllocation(
                "depth buffer dimensions must be greater than 0".to_string(),
            ));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = device
            .allocator()
            .lock()
            .map_err(|_| RhiError::ResourceAllocation("allocator mutex poisoned".into()))
            .and_then(|mut allocator| {
                allocator
                    .allocate(&AllocationCreateDesc {
                        name: "depth_buffer",
                        requirements,
                        location: MemoryLocation::GpuOnly,
                        linear: false,
                        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                    })
                    .map_err(RhiError::from)
            });

        let mut depth = Self {
            device,
            image,
            image_view: vk::ImageView::null(),
            allocation: None,
            extent,
        };
        // From here on, Drop releases whatever was created.
        depth.allocation = Some(allocation?);

        if let Some(allocation) = &depth.allocation {
            unsafe {
                depth.device.handle().bind_image_memory(
                    depth.image,
                    allocation.memory(),
                    allocation.offset(),
                )?;
            }
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(depth.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect_mask(format))
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        depth.image_view = unsafe { depth.device.handle().create_image_view(&view_info, None)? };

        info!(
            "Created depth buffer: {}x{} ({:?})",
            extent.width, extent.height, format
        );

        Ok(depth)
    }

    /// Returns the view to attach to framebuffers.
    #[inline]
    pub fn image_view(&self) -> vk::ImageView {
        self.image_view
    }
}

impl Drop for DepthBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_image_view(self.image_view, None);
            self.device.handle().destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            match self.device.allocator().lock() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free depth buffer allocation: {:?}", e);
                    }
                }
                Err(_) => error!("Leaking depth buffer allocation: allocator mutex poisoned"),
            }
        }

        debug!(
            "Destroyed depth buffer: {}x{}",
            self.extent.width, self.extent.height
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_prefer_pure_depth() {
        assert_eq!(DEPTH_FORMAT_CANDIDATES[0], vk::Format::D32_SFLOAT);
        assert!(!has_stencil_component(DEPTH_FORMAT_CANDIDATES[0]));
        assert!(
            DEPTH_FORMAT_CANDIDATES[1..]
                .iter()
                .all(|&f| has_stencil_component(f))
        );
    }

    #[test]
    fn test_aspect_mask_includes_stencil() {
        assert_eq!(aspect_mask(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            aspect_mask(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }
}
