//! Shared playback controls and the driver loop's tick-to-tick state.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::media::frame::Frame;

/// Control block shared between the public engine surface and the driver
/// loop. Only independent single-word scalars live here; no invariant spans
/// more than one field, so relaxed atomics are enough.
#[derive(Debug)]
pub(crate) struct Controls {
    position: AtomicI64,
    speed: AtomicI64,
}

impl Controls {
    pub fn new() -> Self {
        Self {
            position: AtomicI64::new(1),
            speed: AtomicI64::new(1),
        }
    }

    /// Current/target display frame, 1-based.
    pub fn position(&self) -> i64 {
        self.position.load(Ordering::Relaxed)
    }

    pub fn set_position(&self, frame: i64) {
        self.position.store(frame, Ordering::Relaxed);
    }

    /// Signed frame advance per tick: 1 normal, 0 paused, negative reverse.
    pub fn speed(&self) -> i64 {
        self.speed.load(Ordering::Relaxed)
    }

    pub fn set_speed(&self, speed: i64) {
        self.speed.store(speed, Ordering::Relaxed);
    }
}

/// State owned exclusively by the driver loop between ticks.
pub(crate) struct TickState {
    /// Last frame actually displayed.
    pub last_video_position: i64,
    /// Last observed audio position, in frame units.
    pub audio_position: i64,
    /// Frame-advances accumulated since the last pause; projects the
    /// wall-clock deadline of the current frame.
    pub playback_frames: i64,
    /// Start of the current unpaused run.
    pub start_time: Instant,
    /// Last frame obtained, reused while the position has not moved.
    pub current_frame: Option<Arc<Frame>>,
    /// Whether the previous tick sat in the pause branch. Starts true so
    /// the first playing tick re-anchors the clock.
    pub paused: bool,
    /// Production cost of the most recent fetch; floor for deciding whether
    /// idle time is worth spending on look-ahead.
    pub last_fetch_cost: Duration,
}

impl TickState {
    pub fn new(position: i64) -> Self {
        Self {
            last_video_position: position,
            audio_position: 0,
            playback_frames: 0,
            start_time: Instant::now(),
            current_frame: None,
            paused: true,
            last_fetch_cost: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_controls_defaults() {
        let controls = Controls::new();
        assert_eq!(controls.position(), 1);
        assert_eq!(controls.speed(), 1);
    }

    #[test]
    fn test_tick_state_starts_paused() {
        let state = TickState::new(50);
        assert!(state.paused);
        assert_eq!(state.last_video_position, 50);
        assert_eq!(state.playback_frames, 0);
        assert!(state.current_frame.is_none());
    }
}
