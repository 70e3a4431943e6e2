//! Descriptor set layouts, pools and uniform-buffer writes.
//!
//! Enough to bind one uniform buffer per frame slot:
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::buffer::Buffer;
//! use vkframe_rhi::descriptor::{DescriptorPool, DescriptorSetLayout, write_uniform_buffer};
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::vk;
//!
//! # fn example(device: Arc<Device>, ubo: &Buffer) -> vkframe_rhi::RhiResult<()> {
//! let layout = DescriptorSetLayout::uniform_buffer(device.clone(), 0, vk::ShaderStageFlags::VERTEX)?;
//! let pool = DescriptorPool::for_uniform_buffers(device.clone(), 2)?;
//! let sets = pool.allocate(&[layout.handle(), layout.handle()])?;
//! write_uniform_buffer(&device, sets[0], 0, ubo);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::buffer::Buffer;
use crate::device::Device;
use crate::error::RhiResult;

/// Vulkan descriptor set layout wrapper.
pub struct DescriptorSetLayout {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan descriptor set layout handle.
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Creates a layout from explicit bindings.
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(
        device: Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding<'_>],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self { device, layout })
    }

    /// Creates a layout with a single uniform buffer at `binding`.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `binding` - Binding index in the set
    /// * `stages` - Shader stages that read the buffer
    pub fn uniform_buffer(
        device: Arc<Device>,
        binding: u32,
        stages: vk::ShaderStageFlags,
    ) -> RhiResult<Self> {
        Self::new(device, &[uniform_buffer_binding(binding, stages)])
    }

    /// Returns the Vulkan descriptor set layout handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

/// Descriptor pool. Sets allocated from it are freed when the pool is dropped.
pub struct DescriptorPool {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan descriptor pool handle.
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    /// Creates a pool.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `max_sets` - Maximum number of sets allocated from the pool
    /// * `pool_sizes` - Descriptor counts per type across all sets
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={}",
            max_sets,
            pool_sizes.len()
        );

        Ok(Self { device, pool })
    }

    /// Creates a pool with room for `set_count` sets of one uniform buffer each.
    pub fn for_uniform_buffers(device: Arc<Device>, set_count: u32) -> RhiResult<Self> {
        Self::new(device, set_count, &uniform_pool_sizes(set_count))
    }

    /// Allocates one set per layout.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool is exhausted.
    pub fn allocate(&self, layouts: &[vk::DescriptorSetLayout]) -> RhiResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };
        debug!("Allocated {} descriptor set(s)", sets.len());

        Ok(sets)
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

/// Returns a one-descriptor uniform buffer binding.
pub fn uniform_buffer_binding(
    binding: u32,
    stages: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(binding)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .descriptor_count(1)
        .stage_flags(stages)
}

/// Returns pool sizes for `set_count` single-uniform-buffer sets.
pub fn uniform_pool_sizes(set_count: u32) -> [vk::DescriptorPoolSize; 1] {
    [vk::DescriptorPoolSize {
        ty: vk::DescriptorType::UNIFORM_BUFFER,
        descriptor_count: set_count,
    }]
}

/// Points `binding` of `set` at the whole of `buffer`.
pub fn write_uniform_buffer(device: &Device, set: vk::DescriptorSet, binding: u32, buffer: &Buffer) {
    let buffer_info = [vk::DescriptorBufferInfo::default()
        .buffer(buffer.handle())
        .offset(0)
        .range(buffer.size())];

    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .buffer_info(&buffer_info);

    unsafe {
        device.handle().update_descriptor_sets(&[write], &[]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_buffer_binding() {
        let binding = uniform_buffer_binding(0, vk::ShaderStageFlags::VERTEX);
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(binding.descriptor_count, 1);
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::VERTEX);
    }

    #[test]
    fn test_uniform_pool_sizes() {
        let sizes = uniform_pool_sizes(3);
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 3);
    }
}
