//! Frame-rate and playback-clock math.
//!
//! All wall-clock arithmetic is carried in microseconds as `f64`, so
//! fractional frame rates like 30000/1001 keep their precision across a
//! long run instead of being rounded per tick.

use std::time::{Duration, Instant};

/// Rational frame rate, e.g. 30/1 or 30000/1001.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fps {
    pub num: i32,
    pub den: i32,
}

impl Fps {
    pub fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    /// Frames per second as a float.
    #[inline]
    pub fn as_f64(&self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

/// On-screen time of a single frame, in microseconds.
#[inline]
pub fn frame_duration_micros(fps: Fps) -> f64 {
    1_000_000.0 / fps.as_f64()
}

/// Microseconds left until the projected end of the current frame's display
/// slot. The deadline is anchored at the start of the current unpaused run
/// (`start_time + frame_duration * playback_frames`), not at the previous
/// tick, so sleep-call overhead cannot compound into drift. Negative means
/// the deadline has already passed. `start_time` may lie in the future
/// (resume re-anchoring pushes it out by the audio buffering latency).
#[inline]
pub fn remaining_micros(
    start_time: Instant,
    frame_duration_us: f64,
    playback_frames: i64,
    now: Instant,
) -> f64 {
    let elapsed_us = if now >= start_time {
        now.duration_since(start_time).as_secs_f64() * 1_000_000.0
    } else {
        -(start_time.duration_since(now).as_secs_f64() * 1_000_000.0)
    };
    frame_duration_us * playback_frames as f64 - elapsed_us
}

/// Clamp a pacing sleep: `None` when the deadline has passed, otherwise at
/// most `max_sleep_us`. The ceiling keeps a bad deadline (e.g. right after
/// a large backward seek) from stalling playback for an unbounded time.
#[inline]
pub fn clamp_sleep(remaining_us: f64, max_sleep_us: f64) -> Option<Duration> {
    if remaining_us <= 0.0 {
        return None;
    }
    Some(Duration::from_secs_f64(
        remaining_us.min(max_sleep_us) / 1_000_000.0,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps_as_f64() {
        assert_eq!(Fps::new(30, 1).as_f64(), 30.0);
        let ntsc = Fps::new(30000, 1001).as_f64();
        assert!((ntsc - 29.97).abs() < 0.01);
    }

    #[test]
    fn test_frame_duration() {
        let us = frame_duration_micros(Fps::new(30, 1));
        assert!((us - 33_333.333).abs() < 0.01);

        let us = frame_duration_micros(Fps::new(25, 1));
        assert_eq!(us, 40_000.0);
    }

    #[test]
    fn test_remaining_decreases_as_now_advances() {
        let start = Instant::now();
        let frame_us = 40_000.0;
        let a = remaining_micros(start, frame_us, 10, start + Duration::from_millis(1));
        let b = remaining_micros(start, frame_us, 10, start + Duration::from_millis(2));
        let c = remaining_micros(start, frame_us, 10, start + Duration::from_millis(3));
        assert!(a > b && b > c);
    }

    #[test]
    fn test_remaining_with_future_anchor() {
        // Resume re-anchoring can place start_time ahead of now; remaining
        // must grow by the same amount, not saturate at the anchor.
        let now = Instant::now();
        let anchored = now + Duration::from_millis(50);
        let plain = remaining_micros(now, 40_000.0, 1, now);
        let pushed = remaining_micros(anchored, 40_000.0, 1, now);
        assert!((pushed - plain - 50_000.0).abs() < 1_000.0);
    }

    #[test]
    fn test_clamp_sleep_ceiling() {
        let max = 4.0 * 40_000.0;
        assert_eq!(
            clamp_sleep(10_000_000.0, max),
            Some(Duration::from_secs_f64(max / 1_000_000.0))
        );
        assert_eq!(
            clamp_sleep(5_000.0, max),
            Some(Duration::from_micros(5_000))
        );
    }

    #[test]
    fn test_clamp_sleep_none_when_late() {
        assert_eq!(clamp_sleep(0.0, 160_000.0), None);
        assert_eq!(clamp_sleep(-250.0, 160_000.0), None);
    }
}
