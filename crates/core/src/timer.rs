//! Frame timing.

use std::time::{Duration, Instant};

/// Upper bound for a single frame delta.
///
/// A long stall (window drag, breakpoint, minimized window) would otherwise
/// hand the renderer delegate a multi-second step.
const MAX_DELTA: Duration = Duration::from_millis(250);

/// Measures per-frame delta time and counts frames.
#[derive(Debug)]
pub struct FrameTimer {
    /// Creation or last reset.
    start: Instant,
    /// Previous tick.
    last_tick: Instant,
    /// Ticks since `start`.
    frame_count: u64,
}

impl FrameTimer {
    /// Creates a timer starting now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            frame_count: 0,
        }
    }

    /// Returns the total time since creation or the last [`reset`](Self::reset).
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// [`elapsed`](Self::elapsed) in seconds.
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Advances one frame and returns the clamped time since the previous tick.
    ///
    /// Call once per submitted frame; skipped frames are folded into the next delta.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        self.frame_count += 1;
        delta.min(MAX_DELTA)
    }

    /// [`tick`](Self::tick) in seconds.
    pub fn delta_secs(&mut self) -> f32 {
        self.tick().as_secs_f32()
    }

    /// Returns the number of ticks so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Returns the mean frames per second since creation.
    pub fn average_fps(&self) -> f32 {
        let secs = self.elapsed_secs();
        if secs <= f32::EPSILON {
            0.0
        } else {
            self.frame_count as f32 / secs
        }
    }

    /// Restarts the clock and the frame count.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last_tick = now;
        self.frame_count = 0;
    }
}

impl Default for FrameTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_counts_frames() {
        let mut timer = FrameTimer::new();
        timer.tick();
        timer.tick();
        timer.tick();
        assert_eq!(timer.frame_count(), 3);
    }

    #[test]
    fn test_delta_is_clamped() {
        let mut timer = FrameTimer::new();
        if let Some(past) = Instant::now().checked_sub(Duration::from_secs(5)) {
            timer.last_tick = past;
            assert_eq!(timer.tick(), MAX_DELTA);
        }
    }

    #[test]
    fn test_skipped_time_folds_into_next_delta() {
        let mut timer = FrameTimer::new();
        timer.tick();
        if let Some(past) = Instant::now().checked_sub(Duration::from_millis(100)) {
            // Frames skipped since then never ticked.
            timer.last_tick = past;
            assert!(timer.tick() >= Duration::from_millis(100));
            assert_eq!(timer.frame_count(), 2);
        }
    }

    #[test]
    fn test_reset_clears_frames() {
        let mut timer = FrameTimer::new();
        timer.tick();
        timer.reset();
        assert_eq!(timer.frame_count(), 0);
        assert!(timer.elapsed() < Duration::from_secs(1));
    }
}
