//! GPU buffers backed by `gpu-allocator`.
//!
//! Host-visible buffers are written through their persistent mapping.
//! [`Buffer::device_local_with_data`] goes through a staging buffer and a
//! one-time command buffer instead.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::buffer::{Buffer, BufferUsage};
//! use vkframe_rhi::device::Device;
//!
//! # fn example(device: Arc<Device>) -> vkframe_rhi::RhiResult<()> {
//! let indices: [u16; 6] = [0, 1, 2, 2, 3, 0];
//! let index_buffer = Buffer::with_data(device, BufferUsage::Index, bytemuck::cast_slice(&indices))?;
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, MutexGuard};

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use tracing::{debug, error};

use crate::command::{CommandPool, submit_one_time};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// What a buffer is bound as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex buffer, also a transfer destination.
    Vertex,
    /// Index buffer, also a transfer destination.
    Index,
    /// Uniform buffer.
    Uniform,
    /// Transfer source for uploads.
    Staging,
}

impl BufferUsage {
    /// Converts to Vulkan usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// Returns a short name for logs and allocation labels.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Staging => "staging",
        }
    }
}

/// Vulkan buffer plus its allocation.
///
/// # Thread Safety
///
/// Writes go through the persistent mapping without locking. The caller
/// must not write while the GPU reads the same range.
pub struct Buffer {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan buffer handle.
    buffer: vk::Buffer,
    /// Backing memory, taken on drop.
    allocation: Option<Allocation>,
    /// Size in bytes.
    size: vk::DeviceSize,
    /// What the buffer is bound as.
    usage: BufferUsage,
}

impl Buffer {
    /// Creates a host-visible buffer (`CpuToGpu`), writable with [`write`](Self::write).
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `usage` - What the buffer is bound as
    /// * `size` - Size in bytes, greater than 0
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ResourceAllocation`] for a zero size or a failed allocation.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        Self::with_location(device, usage, size, MemoryLocation::CpuToGpu)
    }

    /// Creates a buffer in the given memory location.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ResourceAllocation`] for a zero size or a failed
    /// allocation, or an error if buffer creation or binding fails.
    pub fn with_location(
        device: Arc<Device>,
        usage: BufferUsage,
        size: vk::DeviceSize,
        location: MemoryLocation,
    ) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::ResourceAllocation(format!(
                "{} buffer size must be greater than 0",
                usage.name()
            )));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = lock_allocator(&device).and_then(|mut allocator| {
            allocator
                .allocate(&AllocationCreateDesc {
                    name: usage.name(),
                    requirements,
                    location,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(RhiError::from)
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe {
            device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        } {
            if let Ok(mut allocator) = lock_allocator(&device) {
                let _ = allocator.free(allocation);
            }
            unsafe { device.handle().destroy_buffer(buffer, None) };
            return Err(e.into());
        }

        debug!(
            "Created {} buffer: {} bytes ({:?})",
            usage.name(),
            size,
            location
        );

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
        })
    }

    /// Creates a host-visible buffer sized to and filled with `data`.
    ///
    /// # Errors
    ///
    /// Same as [`new`](Self::new).
    pub fn with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write(0, data)?;
        Ok(buffer)
    }

    /// Creates a `GpuOnly` buffer filled through a staging copy on `pool`'s queue.
    ///
    /// Blocks until the copy has completed.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `pool` - Pool for the one-time copy command buffer
    /// * `usage` - What the buffer is bound as
    /// * `data` - Initial contents
    ///
    /// # Errors
    ///
    /// Returns an error if either buffer or the copy submission fails.
    pub fn device_local_with_data(
        device: Arc<Device>,
        pool: &CommandPool,
        usage: BufferUsage,
        data: &[u8],
    ) -> RhiResult<Self> {
        let size = data.len() as vk::DeviceSize;
        let staging = Self::with_data(device.clone(), BufferUsage::Staging, data)?;
        let buffer = Self::with_location(device, usage, size, MemoryLocation::GpuOnly)?;

        submit_one_time(pool, |cmd| cmd.copy_buffer(&staging, &buffer))?;

        debug!("Uploaded {} bytes to device-local {} buffer", size, usage.name());
        Ok(buffer)
    }

    /// Copies `data` into the mapped memory at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ResourceAllocation`] if the range exceeds the
    /// buffer or the buffer is not host visible.
    pub fn write(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        check_write_range(offset, data.len(), self.size)?;

        let mapped = self
            .allocation
            .as_ref()
            .and_then(|a| a.mapped_ptr())
            .ok_or_else(|| {
                RhiError::ResourceAllocation(format!(
                    "{} buffer is not host visible",
                    self.usage.name()
                ))
            })?;

        unsafe {
            let dst = mapped.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        Ok(())
    }

    /// Writes a `Pod` value at offset 0.
    pub fn write_value<T: bytemuck::Pod>(&self, value: &T) -> RhiResult<()> {
        self.write(0, bytemuck::bytes_of(value))
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            match lock_allocator(&self.device) {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free buffer allocation: {:?}", e);
                    }
                }
                Err(e) => error!("Leaking buffer allocation: {}", e),
            }
        }

        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }
        debug!("Destroyed {} buffer", self.usage.name());
    }
}

fn lock_allocator(device: &Device) -> RhiResult<MutexGuard<'_, Allocator>> {
    device
        .allocator()
        .lock()
        .map_err(|_| RhiError::ResourceAllocation("allocator mutex poisoned".into()))
}

fn check_write_range(offset: vk::DeviceSize, len: usize, size: vk::DeviceSize) -> RhiResult<()> {
    let end = offset.checked_add(len as vk::DeviceSize);
    match end {
        Some(end) if end <= size => Ok(()),
        _ => Err(RhiError::ResourceAllocation(format!(
            "write of {len} bytes at offset {offset} exceeds buffer size {size}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_usage_flags() {
        assert!(
            BufferUsage::Vertex
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
        );
        assert!(
            BufferUsage::Index
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::INDEX_BUFFER)
        );
        assert!(
            BufferUsage::Uniform
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::UNIFORM_BUFFER)
        );
        assert_eq!(
            BufferUsage::Staging.to_vk_usage(),
            vk::BufferUsageFlags::TRANSFER_SRC
        );
    }

    #[test]
    fn test_write_range() {
        assert!(check_write_range(0, 64, 64).is_ok());
        assert!(check_write_range(32, 32, 64).is_ok());
        assert!(check_write_range(33, 32, 64).is_err());
        assert!(check_write_range(u64::MAX, 1, 64).is_err());
    }
}
