//! Frame slots and their synchronization.
//!
//! The renderer keeps N frame slots (`max_frames_in_flight`). Each slot owns
//! the objects one frame needs while the GPU works on it:
//!
//! ```text
//! 1. Wait on in_flight fence     (only if the slot has a pending submission)
//! 2. Acquire swapchain image     (signals image_available)
//! 3. Record commands
//! 4. Reset fence, submit         (waits image_available, signals render_finished + fence)
//! 5. Present                     (waits render_finished)
//! 6. Advance to the next slot
//! ```
//!
//! The fence is reset only immediately before the submission that signals
//! it. A frame abandoned anywhere before step 4 leaves the fence signaled,
//! so the next wait on that slot returns at once.
//!
//! Slots live in a `Vec` indexed by frame index, allocated once.
//! [`FrameRing`] models the index bookkeeping without any GPU objects.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use vkframe_rhi::RhiResult;
use vkframe_rhi::command::{CommandBuffer, CommandPool};
use vkframe_rhi::device::Device;
use vkframe_rhi::swapchain::Swapchain;
use vkframe_rhi::sync::{Fence, Semaphore};

/// Round-robin slot index plus which slots still have GPU work pending.
///
/// A slot becomes pending on submit and is released when its fence is
/// observed signaled, which always happens before the slot is reused. At most
/// `slot_count` submissions can therefore be pending at once.
#[derive(Debug, Clone)]
pub struct FrameRing {
    /// Slot the next frame uses.
    current: usize,
    /// Per slot: a submission whose fence has not been observed yet.
    pending: Vec<bool>,
}

impl FrameRing {
    /// Creates a ring with `slot_count` slots. Zero is treated as one.
    pub fn new(slot_count: usize) -> Self {
        Self {
            current: 0,
            pending: vec![false; slot_count.max(1)],
        }
    }

    /// Returns the number of slots.
    #[inline]
    pub fn slot_count(&self) -> usize {
        self.pending.len()
    }

    /// Returns the slot the next frame uses.
    #[inline]
    pub fn current(&self) -> usize {
        self.current
    }

    /// Returns `true` if `slot` has a submission that may still be running.
    pub fn is_pending(&self, slot: usize) -> bool {
        self.pending.get(slot).copied().unwrap_or(false)
    }

    /// Returns how many slots have a submission that may still be running.
    pub fn pending_count(&self) -> usize {
        self.pending.iter().filter(|&&p| p).count()
    }

    /// Returns `true` if the current slot's fence guards a submission and
    /// must be waited on before the slot is reused.
    ///
    /// An abandoned frame never submits, so its slot needs no wait.
    pub fn needs_wait(&self) -> bool {
        self.is_pending(self.current)
    }

    /// The current slot's fence was observed signaled.
    pub fn complete_current(&mut self) {
        self.pending[self.current] = false;
    }

    /// Work for the current slot was submitted, after its fence was reset.
    pub fn submit_current(&mut self) {
        self.pending[self.current] = true;
    }

    /// Moves to the next slot and returns its index.
    pub fn advance(&mut self) -> usize {
        self.current = (self.current + 1) % self.pending.len();
        self.current
    }
}

/// Synchronization objects and command buffer for one frame in flight.
struct FrameSlot {
    /// Primary command buffer recorded once per frame.
    command_buffer: CommandBuffer,
    /// Signaled by acquire, waited on by submit.
    image_available: Semaphore,
    /// Signaled by submit, waited on by present.
    render_finished: Semaphore,
    /// Signaled by submit, waited on by the CPU. Created signaled and only
    /// unsignaled between its reset and the submission right after it.
    in_flight: Fence,
}

impl FrameSlot {
    fn new(device: &Arc<Device>, command_buffer: CommandBuffer) -> RhiResult<Self> {
        Ok(Self {
            command_buffer,
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            in_flight: Fence::new(device.clone(), true)?,
        })
    }
}

/// Owns the frame slots and drives them through the frame sequence.
///
/// # Thread Safety
///
/// Not thread-safe; used from the render thread only.
pub struct FrameManager {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// One slot per frame in flight.
    slots: Vec<FrameSlot>,
    /// Current slot and pending submissions.
    ring: FrameRing,
}

impl FrameManager {
    /// Allocates `frame_count` slots with primary command buffers from `pool`.
    ///
    /// The buffers keep the pool alive, so `pool` may be dropped afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if command buffer or synchronization object creation fails.
    pub fn new(device: Arc<Device>, pool: &CommandPool, frame_count: usize) -> RhiResult<Self> {
        let ring = FrameRing::new(frame_count);
        let buffers = pool.allocate(vk::CommandBufferLevel::PRIMARY, ring.slot_count() as u32)?;

        let slots = buffers
            .into_iter()
            .enumerate()
            .map(|(i, buffer)| {
                debug!("Creating frame slot {}", i);
                FrameSlot::new(&device, buffer)
            })
            .collect::<RhiResult<Vec<_>>>()?;

        info!("Frame manager created with {} frames in flight", slots.len());

        Ok(Self {
            device,
            slots,
            ring,
        })
    }

    /// Returns the slot index the next frame uses.
    #[inline]
    pub fn current_index(&self) -> usize {
        self.ring.current()
    }

    /// Returns the number of frame slots.
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.slots.len()
    }

    fn current(&self) -> &FrameSlot {
        &self.slots[self.ring.current()]
    }

    /// Blocks until the current slot's previous submission has completed.
    ///
    /// Returns at once if the slot has nothing pending, for example after an
    /// abandoned frame.
    ///
    /// # Errors
    ///
    /// Returns an error on device loss.
    pub fn wait_current(&mut self) -> RhiResult<()> {
        let slot = &mut self.slots[self.ring.current()];
        if self.ring.needs_wait() {
            slot.in_flight.wait(u64::MAX)?;
        }
        slot.command_buffer.mark_complete();
        self.ring.complete_current();
        Ok(())
    }

    /// Acquires the next swapchain image, signalling the slot's image-available semaphore.
    ///
    /// # Returns
    ///
    /// `(image_index, suboptimal)`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SwapchainOutOfDate`](vkframe_rhi::RhiError::SwapchainOutOfDate)
    /// when the chain must be recreated.
    pub fn acquire(&self, swapchain: &Swapchain) -> RhiResult<(u32, bool)> {
        swapchain.acquire_next_image(self.current().image_available.handle())
    }

    /// Starts recording the slot's command buffer.
    ///
    /// Leaves the fence alone, so giving up on the frame before
    /// [`submit`](Self::submit) is safe.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is still pending or cannot be reset.
    pub fn begin_recording(&mut self) -> RhiResult<&mut CommandBuffer> {
        let slot = &mut self.slots[self.ring.current()];
        slot.command_buffer.reset()?;
        slot.command_buffer
            .begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT)?;
        Ok(&mut slot.command_buffer)
    }

    /// Resets the slot fence and submits the recorded buffer to the graphics queue.
    ///
    /// # Errors
    ///
    /// Returns an error unless the buffer has been ended, or if the fence
    /// reset or the queue submission fails.
    pub fn submit(&mut self) -> RhiResult<()> {
        let slot = &mut self.slots[self.ring.current()];
        slot.in_flight.reset()?;
        slot.command_buffer.submit(
            &[(
                slot.image_available.handle(),
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            )],
            &[slot.render_finished.handle()],
            slot.in_flight.handle(),
        )?;
        self.ring.submit_current();
        Ok(())
    }

    /// Presents `image_index` once rendering has finished.
    ///
    /// # Returns
    ///
    /// `true` if the swapchain is suboptimal.
    ///
    /// # Errors
    ///
    /// Returns the present error; out-of-date is recoverable.
    pub fn present(&self, swapchain: &Swapchain, image_index: u32) -> RhiResult<bool> {
        swapchain.present(
            self.device.present_queue(),
            image_index,
            self.current().render_finished.handle(),
        )
    }

    /// Moves to the next slot and returns its index.
    pub fn advance(&mut self) -> usize {
        self.ring.advance()
    }

    /// Replaces every slot's semaphores. The device must be idle.
    ///
    /// Used after swapchain recreation, where an abandoned acquire may have
    /// left an image-available semaphore signaled.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn reset_semaphores(&mut self) -> RhiResult<()> {
        for slot in &mut self.slots {
            slot.image_available = Semaphore::new(self.device.clone())?;
            slot.render_finished = Semaphore::new(self.device.clone())?;
        }
        debug!("Reset semaphores for {} frame slots", self.slots.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_round_robin() {
        let mut ring = FrameRing::new(3);
        let order: Vec<usize> = (0..7).map(|_| ring.advance()).collect();
        assert_eq!(order, vec![1, 2, 0, 1, 2, 0, 1]);
    }

    #[test]
    fn test_zero_slots_becomes_one() {
        let mut ring = FrameRing::new(0);
        assert_eq!(ring.slot_count(), 1);
        assert_eq!(ring.advance(), 0);
    }

    #[test]
    fn test_pending_released_on_completion() {
        let mut ring = FrameRing::new(2);
        ring.submit_current();
        assert!(ring.is_pending(0));
        ring.advance();
        ring.submit_current();
        assert_eq!(ring.pending_count(), 2);

        ring.advance();
        ring.complete_current();
        assert!(!ring.is_pending(0));
        assert!(ring.is_pending(1));
        assert!(!ring.is_pending(7));
    }

    #[test]
    fn test_abandoned_frame_needs_no_wait() {
        let mut ring = FrameRing::new(2);
        assert!(!ring.needs_wait());

        // Slot 0 submits; slot 1 acquires out of date and gives up.
        ring.submit_current();
        ring.advance();
        assert!(!ring.needs_wait());

        // The retry on slot 1 must not block on a fence nothing will signal.
        assert!(!ring.needs_wait());
        ring.submit_current();
        assert!(ring.needs_wait());

        ring.advance();
        assert!(ring.needs_wait());
        ring.complete_current();
        assert!(!ring.needs_wait());
    }

    #[test]
    fn test_failed_submit_leaves_slot_idle() {
        let mut ring = FrameRing::new(1);
        ring.submit_current();
        ring.complete_current();

        // Recording or the queue submission fails, so submit_current never runs.
        assert!(!ring.needs_wait());
        assert_eq!(ring.pending_count(), 0);
    }

    #[test]
    fn test_frame_manager_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameManager>();
    }
}
