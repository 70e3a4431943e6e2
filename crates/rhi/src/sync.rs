//! Synchronization primitives.
//!
//! This module wraps the two Vulkan synchronization objects the frame loop
//! needs:
//! - [`Semaphore`] orders GPU work against GPU work (acquire → render → present)
//! - [`Fence`] lets the CPU observe GPU completion
//!
//! # Overview
//!
//! Each frame slot owns two semaphores and one fence. The image-available
//! semaphore is signaled by the swapchain acquire and waited on by the
//! submit. The render-finished semaphore is signaled by the submit and
//! waited on by present. The in-flight fence is signaled by the submit and
//! waited on by the CPU before the slot is reused.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::sync::{Fence, Semaphore};
//!
//! # fn example(device: Arc<Device>) -> vkframe_rhi::RhiResult<()> {
//! let image_available = Semaphore::new(device.clone())?;
//! let in_flight = Fence::new(device, true)?;
//!
//! // Wait for the slot's previous frame, then reset right before submitting.
//! in_flight.wait(u64::MAX)?;
//! in_flight.reset()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::trace;

use crate::device::Device;
use crate::error::RhiResult;

/// Binary semaphore wrapper.
///
/// Semaphores are used for GPU-to-GPU synchronization between queue
/// operations:
/// - Image available: signaled when a swapchain image is ready
/// - Render finished: signaled when the frame's commands have executed
///
/// # Thread Safety
///
/// The semaphore is immutable after creation and can be shared between
/// threads.
pub struct Semaphore {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan semaphore handle.
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new semaphore in the unsignaled state.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();

        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
        trace!("Created semaphore");

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        trace!("Destroyed semaphore");
    }
}

/// Fence wrapper.
///
/// Fences let the host wait for GPU work to complete:
/// - Frame in flight: wait before reusing a slot's command buffer
/// - One-time submit: wait for an upload to finish
///
/// # Thread Safety
///
/// Wait and reset can be called from any thread. Resetting a fence that a
/// pending submission will signal is the caller's bug.
pub struct Fence {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan fence handle.
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `signaled` - Create signaled, so the first wait returns immediately
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);

        let fence = unsafe { device.handle().create_fence(&create_info, None)? };
        trace!("Created fence (signaled: {})", signaled);

        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Timeout in nanoseconds; `u64::MAX` waits indefinitely
    ///
    /// # Errors
    ///
    /// Returns an error on timeout or device loss.
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, timeout)?
        };
        Ok(())
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// Only call right before the submission that will signal it.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe { self.device.handle().reset_fences(&[self.fence])? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
        trace!("Destroyed fence");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
    }
}
