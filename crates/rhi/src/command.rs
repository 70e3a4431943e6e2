//! Command pools and validated command buffer recording.
//!
//! - [`CommandPool`] allocates [`CommandBuffer`]s for one queue family
//! - [`CommandBuffer`] records commands and refuses calls made in the wrong
//!   [`CommandBufferState`]
//! - [`CommandTracker`] is the state machine and statistics behind every
//!   command buffer, kept free of Vulkan calls
//!
//! # Lifecycle
//!
//! ```text
//! Initial --begin--> Recording --end--> Executable --submit--> Pending --complete--> Initial
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::command::CommandPool;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::vk;
//!
//! # fn example(device: Arc<Device>) -> vkframe_rhi::RhiResult<()> {
//! let pool = CommandPool::new(device.clone(), device.graphics_family())?;
//! let mut cmd = pool.allocate(vk::CommandBufferLevel::PRIMARY, 1)?.remove(0);
//!
//! cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
//! // ... record ...
//! cmd.end()?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use tracing::{debug, trace};

use crate::buffer::Buffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::pipeline::Pipeline;
use crate::render_pass::{Framebuffer, RenderPass};
use crate::sync::Fence;

/// Lifecycle state of a command buffer.
///
/// Mirrors the states Vulkan defines for `VkCommandBuffer`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandBufferState {
    /// Freshly allocated or reset; ready for `begin`.
    Initial,
    /// Between `begin` and `end`.
    Recording,
    /// Recorded and ready to submit.
    Executable,
    /// Submitted; owned by the GPU until its fence signals.
    Pending,
    /// A reset was attempted while pending. Must be reset again once complete.
    Invalid,
}

impl fmt::Display for CommandBufferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CommandBufferState::Initial => "Initial",
            CommandBufferState::Recording => "Recording",
            CommandBufferState::Executable => "Executable",
            CommandBufferState::Pending => "Pending",
            CommandBufferState::Invalid => "Invalid",
        };
        f.write_str(name)
    }
}

/// Counters for one recording. Reset by `begin`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RecordingStats {
    /// Number of `draw` and `draw_indexed` calls.
    pub draw_calls: u32,
    /// Vertices submitted by non-indexed draws, times their instance count.
    pub vertices: u64,
    /// Indices submitted by indexed draws, times their instance count.
    pub indices: u64,
    /// Sum of the instance counts of every draw.
    pub instances: u64,
    /// Number of `bind_pipeline` calls.
    pub pipeline_binds: u32,
    /// Number of `pipeline_barrier` calls.
    pub barriers: u32,
}

/// Clear values for a render pass, ordered like its attachments.
///
/// Depth and stencil share one attachment, so `ColorDepthStencil` yields two
/// values just like `ColorDepth`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ClearValues {
    /// RGBA color only, for a color-only pass.
    Color([f32; 4]),
    /// RGBA color and depth; stencil cleared to 0.
    ColorDepth([f32; 4], f32),
    /// RGBA color, depth and stencil.
    ColorDepthStencil([f32; 4], f32, u32),
}

impl ClearValues {
    /// Returns the number of attachments these values clear.
    pub fn count(&self) -> usize {
        match self {
            ClearValues::Color(_) => 1,
            ClearValues::ColorDepth(..) | ClearValues::ColorDepthStencil(..) => 2,
        }
    }

    /// Converts to the Vulkan clear values, one per attachment.
    pub fn to_vk(&self) -> Vec<vk::ClearValue> {
        let color = |float32| vk::ClearValue {
            color: vk::ClearColorValue { float32 },
        };
        let depth = |depth, stencil| vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
        };

        match *self {
            ClearValues::Color(c) => vec![color(c)],
            ClearValues::ColorDepth(c, d) => vec![color(c), depth(d, 0)],
            ClearValues::ColorDepthStencil(c, d, s) => vec![color(c), depth(d, s)],
        }
    }

    /// Checks that there is exactly one value per attachment.
    ///
    /// # Arguments
    ///
    /// * `attachment_count` - Attachment count of the render pass being begun
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ClearValueMismatch`] if the counts differ.
    pub fn check(&self, attachment_count: usize) -> RhiResult<()> {
        if self.count() == attachment_count {
            Ok(())
        } else {
            Err(RhiError::ClearValueMismatch {
                expected: attachment_count,
                actual: self.count(),
            })
        }
    }
}

const OUTSIDE_RENDER_PASS: &str = "Recording outside a render pass";
const INSIDE_RENDER_PASS: &str = "Recording inside a render pass";

/// Command buffer state machine plus recording statistics.
///
/// [`CommandBuffer`] consults the tracker before every Vulkan call, so an
/// invalid sequence is rejected before it reaches the driver.
#[derive(Debug)]
pub struct CommandTracker {
    /// Current lifecycle state.
    state: CommandBufferState,
    /// Whether a render pass is open.
    in_render_pass: bool,
    /// Whether a submission has not been observed complete. Survives a
    /// refused reset, unlike `state`.
    gpu_pending: bool,
    /// Counters for the current recording.
    stats: RecordingStats,
}

impl Default for CommandTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandTracker {
    /// Creates a tracker in the [`Initial`](CommandBufferState::Initial) state.
    pub fn new() -> Self {
        Self {
            state: CommandBufferState::Initial,
            in_render_pass: false,
            gpu_pending: false,
            stats: RecordingStats::default(),
        }
    }

    /// Returns the current lifecycle state.
    #[inline]
    pub fn state(&self) -> CommandBufferState {
        self.state
    }

    /// Returns the counters of the current (or last) recording.
    #[inline]
    pub fn stats(&self) -> &RecordingStats {
        &self.stats
    }

    /// Returns `true` between `begin_render_pass` and `end_render_pass`.
    #[inline]
    pub fn in_render_pass(&self) -> bool {
        self.in_render_pass
    }

    fn error(&self, expected: &'static str) -> RhiError {
        RhiError::InvalidCommandBufferState {
            expected,
            actual: self.state,
        }
    }

    fn expect(&self, state: CommandBufferState, expected: &'static str) -> RhiResult<()> {
        if self.state == state {
            Ok(())
        } else {
            Err(self.error(expected))
        }
    }

    /// Validates any recording call.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidCommandBufferState`] unless recording.
    pub fn record(&self) -> RhiResult<()> {
        self.expect(CommandBufferState::Recording, "Recording")
    }

    fn record_outside_pass(&self) -> RhiResult<()> {
        self.record()?;
        if self.in_render_pass {
            return Err(self.error(OUTSIDE_RENDER_PASS));
        }
        Ok(())
    }

    fn record_inside_pass(&self) -> RhiResult<()> {
        self.record()?;
        if !self.in_render_pass {
            return Err(self.error(INSIDE_RENDER_PASS));
        }
        Ok(())
    }

    /// `Initial` to `Recording`. Clears the statistics.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidCommandBufferState`] unless `Initial`.
    pub fn begin(&mut self) -> RhiResult<()> {
        self.expect(CommandBufferState::Initial, "Initial")?;
        self.state = CommandBufferState::Recording;
        self.in_render_pass = false;
        self.stats = RecordingStats::default();
        Ok(())
    }

    /// `Recording` to `Executable`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidCommandBufferState`] unless recording
    /// with no render pass open.
    pub fn end(&mut self) -> RhiResult<()> {
        self.record_outside_pass()?;
        self.state = CommandBufferState::Executable;
        Ok(())
    }

    /// Back to `Initial` from any state.
    ///
    /// # Errors
    ///
    /// While the GPU still owns the buffer the reset is refused and the
    /// buffer becomes `Invalid` until completion is observed.
    pub fn reset(&mut self) -> RhiResult<()> {
        if self.gpu_pending {
            let err = self.error("not Pending");
            self.state = CommandBufferState::Invalid;
            return Err(err);
        }
        self.state = CommandBufferState::Initial;
        self.in_render_pass = false;
        Ok(())
    }

    /// `Executable` to `Pending`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidCommandBufferState`] unless `Executable`.
    pub fn submit(&mut self) -> RhiResult<()> {
        self.expect(CommandBufferState::Executable, "Executable")?;
        self.state = CommandBufferState::Pending;
        self.gpu_pending = true;
        Ok(())
    }

    /// The GPU finished the last submission (its fence was observed signaled).
    pub fn complete(&mut self) {
        self.gpu_pending = false;
        if self.state == CommandBufferState::Pending {
            self.state = CommandBufferState::Initial;
        }
    }

    /// Opens a render pass. Passes do not nest.
    pub fn begin_render_pass(&mut self) -> RhiResult<()> {
        self.record_outside_pass()?;
        self.in_render_pass = true;
        Ok(())
    }

    /// Closes the open render pass.
    pub fn end_render_pass(&mut self) -> RhiResult<()> {
        self.record_inside_pass()?;
        self.in_render_pass = false;
        Ok(())
    }

    /// Validates a pipeline bind and counts it.
    pub fn bind_pipeline(&mut self) -> RhiResult<()> {
        self.record()?;
        self.stats.pipeline_binds += 1;
        Ok(())
    }

    /// Validates a draw (inside a render pass) and counts it.
    pub fn draw(&mut self, vertex_count: u32, instance_count: u32) -> RhiResult<()> {
        self.record_inside_pass()?;
        self.stats.draw_calls += 1;
        self.stats.vertices += u64::from(vertex_count) * u64::from(instance_count);
        self.stats.instances += u64::from(instance_count);
        Ok(())
    }

    /// Validates an indexed draw (inside a render pass) and counts it.
    pub fn draw_indexed(&mut self, index_count: u32, instance_count: u32) -> RhiResult<()> {
        self.record_inside_pass()?;
        self.stats.draw_calls += 1;
        self.stats.indices += u64::from(index_count) * u64::from(instance_count);
        self.stats.instances += u64::from(instance_count);
        Ok(())
    }

    /// Barriers and transfers are recorded outside render passes.
    pub fn transfer(&self) -> RhiResult<()> {
        self.record_outside_pass()
    }

    /// Validates a pipeline barrier (outside a render pass) and counts it.
    pub fn barrier(&mut self) -> RhiResult<()> {
        self.record_outside_pass()?;
        self.stats.barriers += 1;
        Ok(())
    }
}

/// Shared by the pool and every buffer allocated from it.
struct PoolInner {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan command pool handle.
    pool: vk::CommandPool,
    /// Queue family index this pool belongs to.
    queue_family_index: u32,
}

impl Drop for PoolInner {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
        debug!(
            "Command pool destroyed for queue family {}",
            self.queue_family_index
        );
    }
}

/// Vulkan command pool wrapper.
///
/// Created with `RESET_COMMAND_BUFFER` so buffers can be reset one by one.
/// The pool lives until its last command buffer is dropped.
///
/// # Thread Safety
///
/// Command pools are not thread-safe. Record from one thread per pool.
pub struct CommandPool {
    /// Pool handle, shared with the allocated buffers.
    inner: Arc<PoolInner>,
}

impl CommandPool {
    /// Creates a command pool for a queue family.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `queue_family_index` - Queue family the buffers will be submitted to
    ///
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(device: Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe { device.handle().create_command_pool(&create_info, None)? };

        debug!("Command pool created for queue family {}", queue_family_index);

        Ok(Self {
            inner: Arc::new(PoolInner {
                device,
                pool,
                queue_family_index,
            }),
        })
    }

    /// Returns the Vulkan command pool handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.inner.pool
    }

    /// Returns the queue family index this pool belongs to.
    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.inner.queue_family_index
    }

    /// Returns a reference to the device.
    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.inner.device
    }

    /// Allocates command buffers from this pool.
    ///
    /// # Arguments
    ///
    /// * `level` - Primary or secondary
    /// * `count` - Number of command buffers to allocate
    ///
    /// # Returns
    ///
    /// `count` buffers in the `Initial` state. Each keeps the pool alive.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn allocate(&self, level: vk::CommandBufferLevel, count: u32) -> RhiResult<Vec<CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.inner.pool)
            .level(level)
            .command_buffer_count(count);

        let buffers = unsafe { self.inner.device.handle().allocate_command_buffers(&alloc_info)? };

        trace!("Allocated {} {:?} command buffer(s)", buffers.len(), level);

        Ok(buffers
            .into_iter()
            .map(|buffer| CommandBuffer {
                pool: self.inner.clone(),
                buffer,
                level,
                tracker: CommandTracker::new(),
            })
            .collect())
    }
}

/// Vulkan command buffer with a validated recording interface.
///
/// Freed back to its pool on drop; the owner must make sure the GPU is done
/// with it first.
///
/// Every recording method returns [`RhiError::InvalidCommandBufferState`]
/// when called in the wrong state, before anything reaches the driver.
pub struct CommandBuffer {
    /// Owning pool, kept alive while the buffer exists.
    pool: Arc<PoolInner>,
    /// Vulkan command buffer handle.
    buffer: vk::CommandBuffer,
    /// Primary or secondary.
    level: vk::CommandBufferLevel,
    /// State machine and statistics.
    tracker: CommandTracker,
}

impl CommandBuffer {
    /// Returns the Vulkan command buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    /// Returns the level the buffer was allocated with.
    #[inline]
    pub fn level(&self) -> vk::CommandBufferLevel {
        self.level
    }

    /// Returns the current lifecycle state.
    #[inline]
    pub fn state(&self) -> CommandBufferState {
        self.tracker.state()
    }

    /// Returns the counters of the current (or last) recording.
    #[inline]
    pub fn stats(&self) -> &RecordingStats {
        self.tracker.stats()
    }

    #[inline]
    fn device(&self) -> &ash::Device {
        self.pool.device.handle()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Begins recording.
    ///
    /// # Arguments
    ///
    /// * `usage` - Usage flags, e.g. `ONE_TIME_SUBMIT` for per-frame buffers
    ///
    /// # Errors
    ///
    /// Returns an error unless the buffer is `Initial`, or if Vulkan fails.
    pub fn begin(&mut self, usage: vk::CommandBufferUsageFlags) -> RhiResult<()> {
        self.tracker.begin()?;
        let begin_info = vk::CommandBufferBeginInfo::default().flags(usage);
        unsafe { self.device().begin_command_buffer(self.buffer, &begin_info)? };
        Ok(())
    }

    /// Ends recording.
    ///
    /// # Errors
    ///
    /// Returns an error unless recording with no render pass open.
    pub fn end(&mut self) -> RhiResult<()> {
        self.tracker.end()?;
        unsafe { self.device().end_command_buffer(self.buffer)? };
        Ok(())
    }

    /// Resets the buffer to `Initial`.
    ///
    /// # Errors
    ///
    /// Returns an error, and marks the buffer `Invalid`, while a submission
    /// is still pending.
    pub fn reset(&mut self) -> RhiResult<()> {
        self.tracker.reset()?;
        unsafe {
            self.device()
                .reset_command_buffer(self.buffer, vk::CommandBufferResetFlags::empty())?
        };
        Ok(())
    }

    /// Submits the buffer to the graphics queue.
    ///
    /// # Arguments
    ///
    /// * `wait` - `(semaphore, stage)` pairs to wait on
    /// * `signal` - Semaphores signaled on completion
    /// * `fence` - Fence signaled on completion; must be unsignaled
    ///
    /// # Errors
    ///
    /// Returns an error unless the buffer is `Executable`, or if the queue
    /// submission fails.
    pub fn submit(
        &mut self,
        wait: &[(vk::Semaphore, vk::PipelineStageFlags)],
        signal: &[vk::Semaphore],
        fence: vk::Fence,
    ) -> RhiResult<()> {
        if self.tracker.state() != CommandBufferState::Executable {
            return Err(self.tracker.error("Executable"));
        }

        let wait_semaphores: Vec<vk::Semaphore> = wait.iter().map(|&(s, _)| s).collect();
        let wait_stages: Vec<vk::PipelineStageFlags> = wait.iter().map(|&(_, st)| st).collect();
        let command_buffers = [self.buffer];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(signal);

        unsafe { self.pool.device.submit_graphics(&[submit_info], fence)? };
        self.tracker.submit()
    }

    /// Records that the fence guarding the last submission was observed signaled.
    pub fn mark_complete(&mut self) {
        self.tracker.complete();
    }

    // =========================================================================
    // Render Pass
    // =========================================================================

    /// Begins a render pass over the whole framebuffer.
    ///
    /// # Arguments
    ///
    /// * `render_pass` - The pass to begin
    /// * `framebuffer` - A framebuffer created for `render_pass`
    /// * `clear_values` - One value per attachment
    /// * `contents` - Inline or secondary command buffers
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::ClearValueMismatch`] if the clear values do not
    /// match the attachments, or a state error unless recording outside a pass.
    pub fn begin_render_pass(
        &mut self,
        render_pass: &RenderPass,
        framebuffer: &Framebuffer,
        clear_values: ClearValues,
        contents: vk::SubpassContents,
    ) -> RhiResult<()> {
        clear_values.check(render_pass.attachment_count())?;
        self.tracker.begin_render_pass()?;

        let clear_values = clear_values.to_vk();
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass.handle())
            .framebuffer(framebuffer.handle())
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: framebuffer.extent(),
            })
            .clear_values(&clear_values);

        unsafe {
            self.device()
                .cmd_begin_render_pass(self.buffer, &begin_info, contents)
        };
        Ok(())
    }

    /// Ends the open render pass.
    pub fn end_render_pass(&mut self) -> RhiResult<()> {
        self.tracker.end_render_pass()?;
        unsafe { self.device().cmd_end_render_pass(self.buffer) };
        Ok(())
    }

    // =========================================================================
    // Binding
    // =========================================================================

    /// Binds a pipeline at its own bind point.
    pub fn bind_pipeline(&mut self, pipeline: &Pipeline) -> RhiResult<()> {
        self.tracker.bind_pipeline()?;
        unsafe {
            self.device()
                .cmd_bind_pipeline(self.buffer, pipeline.bind_point(), pipeline.handle())
        };
        Ok(())
    }

    /// Binds a single vertex buffer.
    pub fn bind_vertex_buffer(&mut self, binding: u32, buffer: &Buffer, offset: vk::DeviceSize) -> RhiResult<()> {
        self.bind_vertex_buffers(binding, &[buffer], &[offset])
    }

    /// Binds vertex buffers to consecutive bindings.
    ///
    /// # Arguments
    ///
    /// * `first_binding` - Binding of `buffers[0]`
    /// * `buffers` - Vertex buffers
    /// * `offsets` - Byte offset into each buffer
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::CountMismatch`] if there is not one offset per buffer.
    pub fn bind_vertex_buffers(
        &mut self,
        first_binding: u32,
        buffers: &[&Buffer],
        offsets: &[vk::DeviceSize],
    ) -> RhiResult<()> {
        self.tracker.record()?;
        check_offsets(buffers.len(), offsets.len())?;
        let handles: Vec<vk::Buffer> = buffers.iter().map(|b| b.handle()).collect();
        unsafe {
            self.device()
                .cmd_bind_vertex_buffers(self.buffer, first_binding, &handles, offsets)
        };
        Ok(())
    }

    /// Binds an index buffer.
    pub fn bind_index_buffer(
        &mut self,
        buffer: &Buffer,
        offset: vk::DeviceSize,
        index_type: vk::IndexType,
    ) -> RhiResult<()> {
        self.tracker.record()?;
        unsafe {
            self.device()
                .cmd_bind_index_buffer(self.buffer, buffer.handle(), offset, index_type)
        };
        Ok(())
    }

    /// Binds one descriptor set at `first_set`.
    pub fn bind_descriptor_set(
        &mut self,
        bind_point: vk::PipelineBindPoint,
        layout: vk::PipelineLayout,
        first_set: u32,
        set: vk::DescriptorSet,
    ) -> RhiResult<()> {
        self.tracker.record()?;
        unsafe {
            self.device()
                .cmd_bind_descriptor_sets(self.buffer, bind_point, layout, first_set, &[set], &[])
        };
        Ok(())
    }

    // =========================================================================
    // Dynamic State
    // =========================================================================

    /// Sets viewport 0. The pipeline must declare the viewport dynamic.
    pub fn set_viewport(&mut self, viewport: &vk::Viewport) -> RhiResult<()> {
        self.tracker.record()?;
        unsafe {
            self.device()
                .cmd_set_viewport(self.buffer, 0, std::slice::from_ref(viewport))
        };
        Ok(())
    }

    /// Sets scissor 0. The pipeline must declare the scissor dynamic.
    pub fn set_scissor(&mut self, scissor: &vk::Rect2D) -> RhiResult<()> {
        self.tracker.record()?;
        unsafe {
            self.device()
                .cmd_set_scissor(self.buffer, 0, std::slice::from_ref(scissor))
        };
        Ok(())
    }

    /// Pushes `data` as constants at `offset` for `stages`.
    pub fn push_constants<T: Pod>(
        &mut self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        offset: u32,
        data: &T,
    ) -> RhiResult<()> {
        self.tracker.record()?;
        unsafe {
            self.device().cmd_push_constants(
                self.buffer,
                layout,
                stages,
                offset,
                bytemuck::bytes_of(data),
            )
        };
        Ok(())
    }

    // =========================================================================
    // Draw
    // =========================================================================

    /// Records a non-indexed draw. Must be inside a render pass.
    pub fn draw(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> RhiResult<()> {
        self.tracker.draw(vertex_count, instance_count)?;
        unsafe {
            self.device().cmd_draw(
                self.buffer,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            )
        };
        Ok(())
    }

    /// Records an indexed draw. Must be inside a render pass.
    pub fn draw_indexed(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> RhiResult<()> {
        self.tracker.draw_indexed(index_count, instance_count)?;
        unsafe {
            self.device().cmd_draw_indexed(
                self.buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        };
        Ok(())
    }

    // =========================================================================
    // Transfer & Synchronization
    // =========================================================================

    /// Copies all of `src` into the start of `dst`, truncated to `dst`'s size.
    ///
    /// Must be recorded outside a render pass.
    pub fn copy_buffer(&mut self, src: &Buffer, dst: &Buffer) -> RhiResult<()> {
        self.tracker.transfer()?;
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size: copy_size(src.size(), dst.size()),
        };
        unsafe {
            self.device()
                .cmd_copy_buffer(self.buffer, src.handle(), dst.handle(), &[region])
        };
        Ok(())
    }

    /// Records a pipeline barrier. Must be outside a render pass.
    pub fn pipeline_barrier(
        &mut self,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
        dependency_flags: vk::DependencyFlags,
        memory_barriers: &[vk::MemoryBarrier<'_>],
        buffer_barriers: &[vk::BufferMemoryBarrier<'_>],
        image_barriers: &[vk::ImageMemoryBarrier<'_>],
    ) -> RhiResult<()> {
        self.tracker.barrier()?;
        unsafe {
            self.device().cmd_pipeline_barrier(
                self.buffer,
                src_stage,
                dst_stage,
                dependency_flags,
                memory_barriers,
                buffer_barriers,
                image_barriers,
            )
        };
        Ok(())
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        if self.tracker.gpu_pending {
            tracing::warn!("Freeing a command buffer that may still be pending on the GPU");
        }
        unsafe {
            self.pool
                .device
                .handle()
                .free_command_buffers(self.pool.pool, &[self.buffer]);
        }
    }
}

fn check_offsets(buffers: usize, offsets: usize) -> RhiResult<()> {
    if buffers == offsets {
        Ok(())
    } else {
        Err(RhiError::CountMismatch {
            what: "vertex buffer offsets",
            expected: buffers,
            actual: offsets,
        })
    }
}

/// Returns the bytes copied by [`CommandBuffer::copy_buffer`].
#[inline]
pub fn copy_size(src_size: vk::DeviceSize, dst_size: vk::DeviceSize) -> vk::DeviceSize {
    src_size.min(dst_size)
}

/// Records with `record`, submits to the graphics queue and blocks until done.
///
/// For uploads and other setup work outside the frame loop.
///
/// # Arguments
///
/// * `pool` - Pool to allocate the temporary buffer from (graphics family)
/// * `record` - Records the commands; the buffer is already begun
///
/// # Errors
///
/// Returns any error from `record`, recording, submission or the wait.
pub fn submit_one_time<F>(pool: &CommandPool, record: F) -> RhiResult<()>
where
    F: FnOnce(&mut CommandBuffer) -> RhiResult<()>,
{
    let mut buffers = pool.allocate(vk::CommandBufferLevel::PRIMARY, 1)?;
    let Some(mut cmd) = buffers.pop() else {
        return Err(RhiError::ResourceAllocation(
            "command pool returned no buffers".into(),
        ));
    };

    cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
    record(&mut cmd)?;
    cmd.end()?;

    let fence = Fence::new(pool.device().clone(), false)?;
    cmd.submit(&[], &[], fence.handle())?;
    fence.wait(u64::MAX)?;
    cmd.mark_complete();

    trace!("One-time submission complete ({:?})", cmd.stats());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording() -> CommandTracker {
        let mut tracker = CommandTracker::new();
        tracker.begin().unwrap();
        tracker
    }

    #[test]
    fn test_full_lifecycle() {
        let mut tracker = CommandTracker::new();
        assert_eq!(tracker.state(), CommandBufferState::Initial);

        tracker.begin().unwrap();
        assert_eq!(tracker.state(), CommandBufferState::Recording);
        tracker.end().unwrap();
        assert_eq!(tracker.state(), CommandBufferState::Executable);
        tracker.submit().unwrap();
        assert_eq!(tracker.state(), CommandBufferState::Pending);
        tracker.complete();
        assert_eq!(tracker.state(), CommandBufferState::Initial);
    }

    #[test]
    fn test_double_begin_fails() {
        let mut tracker = recording();
        match tracker.begin() {
            Err(RhiError::InvalidCommandBufferState { expected, actual }) => {
                assert_eq!(expected, "Initial");
                assert_eq!(actual, CommandBufferState::Recording);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_recording_requires_recording_state() {
        let mut tracker = CommandTracker::new();
        assert!(tracker.record().is_err());
        assert!(tracker.bind_pipeline().is_err());
        assert!(tracker.end().is_err());
    }

    #[test]
    fn test_submit_requires_executable() {
        let mut tracker = recording();
        assert!(tracker.submit().is_err());
        assert_eq!(tracker.state(), CommandBufferState::Recording);
    }

    #[test]
    fn test_reset_while_pending_invalidates() {
        let mut tracker = recording();
        tracker.end().unwrap();
        tracker.submit().unwrap();

        assert!(tracker.reset().is_err());
        assert_eq!(tracker.state(), CommandBufferState::Invalid);

        // Still owned by the GPU.
        assert!(tracker.reset().is_err());

        tracker.complete();
        assert_eq!(tracker.state(), CommandBufferState::Invalid);
        tracker.reset().unwrap();
        assert_eq!(tracker.state(), CommandBufferState::Initial);
    }

    #[test]
    fn test_reset_from_executable() {
        let mut tracker = recording();
        tracker.end().unwrap();
        tracker.reset().unwrap();
        assert_eq!(tracker.state(), CommandBufferState::Initial);
    }

    #[test]
    fn test_draw_requires_render_pass() {
        let mut tracker = recording();
        assert!(tracker.draw(3, 1).is_err());
        tracker.begin_render_pass().unwrap();
        tracker.draw(3, 1).unwrap();
    }

    #[test]
    fn test_render_passes_do_not_nest() {
        let mut tracker = recording();
        tracker.begin_render_pass().unwrap();
        assert!(tracker.begin_render_pass().is_err());
        assert!(tracker.end().is_err());
        tracker.end_render_pass().unwrap();
        assert!(tracker.end_render_pass().is_err());
        tracker.end().unwrap();
    }

    #[test]
    fn test_transfers_outside_render_pass() {
        let mut tracker = recording();
        tracker.transfer().unwrap();
        tracker.barrier().unwrap();
        tracker.begin_render_pass().unwrap();
        assert!(tracker.transfer().is_err());
        assert!(tracker.barrier().is_err());
    }

    #[test]
    fn test_stats_accumulate_and_reset_on_begin() {
        let mut tracker = recording();
        tracker.bind_pipeline().unwrap();
        tracker.barrier().unwrap();
        tracker.begin_render_pass().unwrap();
        tracker.draw(3, 2).unwrap();
        tracker.draw_indexed(6, 1).unwrap();
        tracker.end_render_pass().unwrap();
        tracker.end().unwrap();

        let stats = *tracker.stats();
        assert_eq!(stats.draw_calls, 2);
        assert_eq!(stats.vertices, 6);
        assert_eq!(stats.indices, 6);
        assert_eq!(stats.instances, 3);
        assert_eq!(stats.pipeline_binds, 1);
        assert_eq!(stats.barriers, 1);

        tracker.reset().unwrap();
        tracker.begin().unwrap();
        assert_eq!(*tracker.stats(), RecordingStats::default());
    }

    #[test]
    fn test_clear_value_counts() {
        assert_eq!(ClearValues::Color([0.0; 4]).count(), 1);
        assert_eq!(ClearValues::ColorDepth([0.0; 4], 1.0).count(), 2);
        assert_eq!(ClearValues::ColorDepthStencil([0.0; 4], 1.0, 0).count(), 2);
        assert_eq!(ClearValues::ColorDepth([0.0; 4], 1.0).to_vk().len(), 2);
    }

    #[test]
    fn test_clear_value_mismatch() {
        assert!(ClearValues::ColorDepth([0.0; 4], 1.0).check(2).is_ok());
        match ClearValues::Color([0.0; 4]).check(2) {
            Err(RhiError::ClearValueMismatch { expected, actual }) => {
                assert_eq!((expected, actual), (2, 1));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_offsets_must_match_buffers() {
        assert!(check_offsets(2, 2).is_ok());
        match check_offsets(2, 1) {
            Err(RhiError::CountMismatch {
                what,
                expected,
                actual,
            }) => {
                assert_eq!(what, "vertex buffer offsets");
                assert_eq!((expected, actual), (2, 1));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_abandoned_recording_can_be_reset() {
        let mut tracker = recording();
        tracker.begin_render_pass().unwrap();
        tracker.draw(3, 1).unwrap();

        // Never ended or submitted, so nothing is pending on the GPU.
        tracker.reset().unwrap();
        assert_eq!(tracker.state(), CommandBufferState::Initial);
        assert!(!tracker.in_render_pass());
        tracker.begin().unwrap();
    }

    #[test]
    fn test_copy_size_clamped_to_destination() {
        assert_eq!(copy_size(256, 128), 128);
        assert_eq!(copy_size(64, 128), 64);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(CommandBufferState::Pending.to_string(), "Pending");
    }

    #[test]
    fn test_command_buffer_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CommandBuffer>();
        assert_send::<CommandPool>();
    }
}
