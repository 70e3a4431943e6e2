//! RHI error taxonomy.
//!
//! Backend result codes are translated into these kinds at the RHI boundary
//! (see [`RhiError::from_vk`]). Only swapchain staleness is recoverable; the
//! renderer handles it by recreating the swapchain.

use ash::vk;
use thiserror::Error;

use crate::command::CommandBufferState;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Instance creation failed or the Vulkan loader is unavailable.
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// No physical device satisfies both render and present requirements.
    #[error("No suitable GPU found")]
    NoSuitableDevice,

    /// The swapchain no longer matches the surface and must be recreated.
    #[error("Swapchain is out of date")]
    SwapchainOutOfDate,

    /// The swapchain still works but no longer matches the surface exactly.
    #[error("Swapchain is suboptimal")]
    SwapchainSuboptimal,

    /// `build()` was called before the pipeline description was complete.
    #[error("Incomplete pipeline: {0}")]
    IncompletePipeline(&'static str),

    /// A command buffer operation was issued in the wrong state.
    #[error("Invalid command buffer state: expected {expected}, found {actual}")]
    InvalidCommandBufferState {
        expected: &'static str,
        actual: CommandBufferState,
    },

    /// Clear values do not line up with the render pass attachments.
    #[error("Clear value count {actual} does not match render pass attachment count {expected}")]
    ClearValueMismatch { expected: usize, actual: usize },

    /// Two arguments that must line up have different lengths.
    ///
    /// `what` names the mismatched items, e.g. `"vertex buffer offsets"`.
    #[error("Mismatched {what}: expected {expected}, got {actual}")]
    CountMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Buffer, image or descriptor allocation failed.
    #[error("Resource allocation failed: {0}")]
    ResourceAllocation(String),

    /// A registry key no longer refers to a live object.
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Shader module creation failed or the SPIR-V is malformed.
    #[error("Shader error: {0}")]
    Shader(String),

    /// Surface creation or capability queries failed.
    #[error("Surface error: {0}")]
    Surface(String),

    /// The logical device was lost. Not recoverable.
    #[error("Device lost")]
    DeviceLost,

    /// Any other Vulkan error code.
    #[error("Vulkan error: {0}")]
    Vulkan(vk::Result),
}

impl RhiError {
    /// Translates a backend result code into the RHI taxonomy.
    ///
    /// # Arguments
    ///
    /// * `result` - The `vk::Result` returned by a failed call
    ///
    /// # Returns
    ///
    /// The matching error kind. Codes without a dedicated kind are kept
    /// as [`RhiError::Vulkan`].
    pub fn from_vk(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_DATE_KHR => Self::SwapchainOutOfDate,
            vk::Result::SUBOPTIMAL_KHR => Self::SwapchainSuboptimal,
            vk::Result::ERROR_OUT_OF_HOST_MEMORY
            | vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
            | vk::Result::ERROR_OUT_OF_POOL_MEMORY
            | vk::Result::ERROR_FRAGMENTED_POOL => Self::ResourceAllocation(result.to_string()),
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            vk::Result::ERROR_INITIALIZATION_FAILED
            | vk::Result::ERROR_INCOMPATIBLE_DRIVER
            | vk::Result::ERROR_LAYER_NOT_PRESENT
            | vk::Result::ERROR_EXTENSION_NOT_PRESENT => Self::Initialization(result.to_string()),
            other => Self::Vulkan(other),
        }
    }

    /// Returns `true` if the renderer can recover by recreating the swapchain.
    ///
    /// Only swapchain staleness qualifies; everything else ends the frame loop.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SwapchainOutOfDate | Self::SwapchainSuboptimal)
    }
}

impl From<vk::Result> for RhiError {
    fn from(result: vk::Result) -> Self {
        Self::from_vk(result)
    }
}

impl From<ash::LoadingError> for RhiError {
    fn from(err: ash::LoadingError) -> Self {
        Self::Initialization(format!("failed to load Vulkan: {err}"))
    }
}

impl From<gpu_allocator::AllocationError> for RhiError {
    fn from(err: gpu_allocator::AllocationError) -> Self {
        Self::ResourceAllocation(err.to_string())
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_date_translation() {
        let err = RhiError::from(vk::Result::ERROR_OUT_OF_DATE_KHR);
        assert!(matches!(err, RhiError::SwapchainOutOfDate));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_suboptimal_is_recoverable() {
        assert!(RhiError::from_vk(vk::Result::SUBOPTIMAL_KHR).is_recoverable());
    }

    #[test]
    fn test_memory_errors_map_to_allocation() {
        for code in [
            vk::Result::ERROR_OUT_OF_HOST_MEMORY,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
            vk::Result::ERROR_OUT_OF_POOL_MEMORY,
        ] {
            assert!(matches!(
                RhiError::from_vk(code),
                RhiError::ResourceAllocation(_)
            ));
        }
    }

    #[test]
    fn test_fatal_errors_not_recoverable() {
        assert!(!RhiError::DeviceLost.is_recoverable());
        assert!(!RhiError::NoSuitableDevice.is_recoverable());
        assert!(!RhiError::IncompletePipeline("no layout").is_recoverable());
        assert!(matches!(
            RhiError::from_vk(vk::Result::ERROR_DEVICE_LOST),
            RhiError::DeviceLost
        ));
    }

    #[test]
    fn test_initialization_codes() {
        assert!(matches!(
            RhiError::from_vk(vk::Result::ERROR_INCOMPATIBLE_DRIVER),
            RhiError::Initialization(_)
        ));
    }

    #[test]
    fn test_unmapped_code_is_preserved() {
        assert!(matches!(
            RhiError::from_vk(vk::Result::ERROR_FORMAT_NOT_SUPPORTED),
            RhiError::Vulkan(vk::Result::ERROR_FORMAT_NOT_SUPPORTED)
        ));
    }

    #[test]
    fn test_count_mismatch_message() {
        let err = RhiError::CountMismatch {
            what: "vertex buffer offsets",
            expected: 2,
            actual: 1,
        };
        assert!(!err.is_recoverable());
        assert_eq!(
            err.to_string(),
            "Mismatched vertex buffer offsets: expected 2, got 1"
        );
    }

    #[test]
    fn test_state_error_message() {
        let err = RhiError::InvalidCommandBufferState {
            expected: "Recording",
            actual: CommandBufferState::Executable,
        };
        assert_eq!(
            err.to_string(),
            "Invalid command buffer state: expected Recording, found Executable"
        );
    }
}
