//! Integration tests for frame pacing across frame slots.
//!
//! Acquire and present results are scripted; every decision about waiting,
//! submitting, advancing and recreating comes from [`FrameLoop`] and
//! [`FrameRing`].

use vkframe_core::FrameTimer;
use vkframe_renderer::{Acquired, FrameAction, FrameLoop, FrameRing};
use vkframe_rhi::{RhiError, RhiResult};

/// What one `render_frame` call did.
#[derive(Debug, Default, PartialEq, Eq)]
struct Outcome {
    waited: bool,
    submitted: bool,
    advanced: bool,
    recreated: bool,
}

/// GPU-free stand-in for the renderer: the same state types, with the
/// swapchain replaced by scripted results.
struct Harness {
    state: FrameLoop,
    ring: FrameRing,
    timer: FrameTimer,
    recreations: usize,
}

impl Harness {
    fn new(slots: usize) -> Self {
        Self {
            state: FrameLoop::new(800, 600),
            ring: FrameRing::new(slots),
            timer: FrameTimer::new(),
            recreations: 0,
        }
    }

    fn recreate(&mut self) -> bool {
        if self.state.recreate_target().is_none() {
            return false;
        }
        self.recreations += 1;
        self.state.recreated();
        true
    }

    fn frame(
        &mut self,
        acquire: RhiResult<(u32, bool)>,
        present: RhiResult<bool>,
    ) -> RhiResult<Outcome> {
        let mut outcome = Outcome::default();

        if self.state.begin_frame() == FrameAction::Recreate {
            outcome.recreated = self.recreate();
        }
        if self.state.begin_frame() != FrameAction::Render {
            return Ok(outcome);
        }

        outcome.waited = self.ring.needs_wait();
        self.ring.complete_current();

        if self.state.on_acquire(acquire)? == Acquired::Abandon {
            outcome.recreated |= self.recreate();
            return Ok(outcome);
        }
        self.timer.tick();

        self.ring.submit_current();
        outcome.submitted = true;
        assert!(self.ring.pending_count() <= self.ring.slot_count());

        self.state.on_present(present)?;
        self.ring.advance();
        outcome.advanced = true;

        if self.state.needs_recreate() {
            outcome.recreated |= self.recreate();
        }
        Ok(outcome)
    }

    fn good_frame(&mut self) -> Outcome {
        self.frame(Ok((0, false)), Ok(false)).unwrap()
    }
}

#[test]
fn test_pending_never_exceeds_slot_count() {
    for slots in 1..=4 {
        let mut harness = Harness::new(slots);
        let mut max_pending = 0;
        for _ in 0..50 {
            harness.good_frame();
            max_pending = max_pending.max(harness.ring.pending_count());
        }
        assert_eq!(max_pending, slots);
    }
}

#[test]
fn test_frame_indices_are_round_robin() {
    for slots in 1..=4 {
        let mut harness = Harness::new(slots);
        let order: Vec<usize> = (0..12)
            .map(|_| {
                let slot = harness.ring.current();
                harness.good_frame();
                slot
            })
            .collect();
        let expected: Vec<usize> = (0..12).map(|i| i % slots).collect();
        assert_eq!(order, expected);
    }
}

#[test]
fn test_slot_waits_only_once_it_comes_around() {
    let mut harness = Harness::new(2);
    assert!(!harness.good_frame().waited);
    assert!(!harness.good_frame().waited);
    assert!(harness.good_frame().waited);
}

#[test]
fn test_out_of_date_acquire_skips_submit_and_advance() {
    let mut harness = Harness::new(2);
    harness.good_frame();
    let slot = harness.ring.current();

    let outcome = harness
        .frame(Err(RhiError::SwapchainOutOfDate), Ok(false))
        .unwrap();

    assert!(!outcome.submitted);
    assert!(!outcome.advanced);
    assert_eq!(harness.timer.frame_count(), 1);
    assert!(outcome.recreated);
    assert_eq!(harness.ring.current(), slot);
    assert!(!harness.ring.is_pending(slot));

    // The retry on the same slot has nothing to wait for.
    let retry = harness.good_frame();
    assert!(!retry.waited);
    assert!(retry.submitted);
}

#[test]
fn test_out_of_date_present_recreates_without_failing() {
    let mut harness = Harness::new(2);
    let outcome = harness
        .frame(Ok((1, false)), Err(RhiError::SwapchainOutOfDate))
        .unwrap();

    assert!(outcome.submitted);
    assert!(outcome.advanced);
    assert!(outcome.recreated);
    assert_eq!(harness.recreations, 1);
}

#[test]
fn test_suboptimal_present_recreates_after_the_frame() {
    let mut harness = Harness::new(2);
    let outcome = harness.frame(Ok((0, false)), Ok(true)).unwrap();

    assert!(outcome.submitted && outcome.advanced && outcome.recreated);
    assert!(!harness.state.needs_recreate());
}

#[test]
fn test_device_lost_is_fatal() {
    let mut harness = Harness::new(2);
    assert!(harness.frame(Err(RhiError::DeviceLost), Ok(false)).is_err());
    assert!(harness.frame(Ok((0, false)), Err(RhiError::DeviceLost)).is_err());
}

#[test]
fn test_minimize_pauses_and_restore_resumes() {
    let mut harness = Harness::new(2);
    harness.good_frame();

    harness.state.resize(0, 0);
    for _ in 0..3 {
        assert_eq!(harness.good_frame(), Outcome::default());
    }
    assert_eq!(harness.recreations, 0);
    assert_eq!(harness.timer.frame_count(), 1);

    harness.state.resize(1024, 768);
    let outcome = harness.good_frame();
    assert!(outcome.recreated && outcome.submitted);
    assert_eq!(harness.recreations, 1);
}
