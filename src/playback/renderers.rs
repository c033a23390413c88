//! Renderer seams: the audio and video consumers the driver keeps in sync.
//!
//! Both renderers run on their own execution contexts; the driver only
//! starts/stops them with a bounded wait and feeds or reads them per tick.

use std::sync::Arc;
use std::time::Duration;

use crate::media::frame::Frame;

/// Audio playback consumer. Reports its own position in frame units; at
/// non-unit speeds the driver forces it to follow video instead.
pub trait AudioRenderer: Send + Sync {
    fn start(&self);

    /// Stop within `timeout`. Returns false if the renderer failed to wind
    /// down in time; the caller logs that and proceeds with teardown.
    fn stop(&self, timeout: Duration) -> bool;

    /// Current audio playback position, in frame units.
    fn current_position(&self) -> i64;

    /// Jump audio playback to the given frame.
    fn seek(&self, frame: i64);

    /// Startup/buffering latency of the audio pipeline. Used to re-anchor
    /// the shared clock when resuming from pause, so audio and video agree
    /// on a zero point after the pipeline's own spin-up.
    fn buffered(&self) -> Duration;
}

/// Video display consumer: accepts one frame at a time and is signaled to
/// render it. Must treat the frame as read-only for the duration of the
/// render call.
pub trait VideoRenderer: Send + Sync {
    fn start(&self);

    /// Stop within `timeout`; false if the renderer failed to stop in time.
    fn stop(&self, timeout: Duration) -> bool;

    fn render(&self, frame: Arc<Frame>);
}
