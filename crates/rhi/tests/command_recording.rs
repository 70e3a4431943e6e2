//! Integration tests for command buffer state tracking.

use vkframe_rhi::RhiError;
use vkframe_rhi::command::{ClearValues, CommandBufferState, CommandTracker, RecordingStats};

#[test]
fn test_draw_indexed_quad_stats() {
    let mut tracker = CommandTracker::new();
    tracker.begin().unwrap();
    tracker.begin_render_pass().unwrap();
    tracker.bind_pipeline().unwrap();
    tracker.draw_indexed(6, 1).unwrap();
    tracker.end_render_pass().unwrap();
    tracker.end().unwrap();

    let stats = tracker.stats();
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.indices, 6);
    assert_eq!(stats.instances, 1);
    assert_eq!(stats.vertices, 0);
    assert_eq!(tracker.state(), CommandBufferState::Executable);
}

#[test]
fn test_second_begin_without_end_fails() {
    let mut tracker = CommandTracker::new();
    tracker.begin().unwrap();

    let err = tracker.begin().unwrap_err();
    assert_eq!(
        err.to_string(),
        "Invalid command buffer state: expected Initial, found Recording"
    );
    // The failed call leaves the recording intact.
    assert_eq!(tracker.state(), CommandBufferState::Recording);
}

#[test]
fn test_frame_cycle_repeats() {
    let mut tracker = CommandTracker::new();

    for frame in 0..3 {
        tracker.reset().unwrap();
        tracker.begin().unwrap();
        assert_eq!(*tracker.stats(), RecordingStats::default(), "frame {frame}");
        tracker.begin_render_pass().unwrap();
        tracker.draw(3, 1).unwrap();
        tracker.end_render_pass().unwrap();
        tracker.end().unwrap();
        tracker.submit().unwrap();
        assert_eq!(tracker.state(), CommandBufferState::Pending);
        tracker.complete();
    }

    assert_eq!(tracker.state(), CommandBufferState::Initial);
}

#[test]
fn test_reset_while_pending_is_rejected() {
    let mut tracker = CommandTracker::new();
    tracker.begin().unwrap();
    tracker.end().unwrap();
    tracker.submit().unwrap();

    assert!(matches!(
        tracker.reset(),
        Err(RhiError::InvalidCommandBufferState {
            actual: CommandBufferState::Pending,
            ..
        })
    ));
    assert_eq!(tracker.state(), CommandBufferState::Invalid);
    assert!(tracker.begin().is_err());
}

#[test]
fn test_clear_values_must_match_attachments() {
    let color_only = ClearValues::Color([0.0, 0.0, 0.0, 1.0]);
    let with_depth = ClearValues::ColorDepth([0.0, 0.0, 0.0, 1.0], 1.0);

    assert!(color_only.check(1).is_ok());
    assert!(with_depth.check(2).is_ok());
    assert!(matches!(
        with_depth.check(1),
        Err(RhiError::ClearValueMismatch {
            expected: 1,
            actual: 2
        })
    ));
}
