//! Optional per-tick observability hook.
//!
//! Replaces ad hoc debug file logging with a metrics sink the embedding
//! application can install; the engine works identically without one.

/// Snapshot of one displayed driver tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickMetrics {
    /// Frame displayed this tick.
    pub position: i64,
    /// Last observed audio position, in frame units.
    pub audio_position: i64,
    /// Video minus audio position; positive when video leads.
    pub drift: i64,
    /// Budget left in the frame's display slot when measured, may be negative.
    pub remaining_micros: f64,
    /// Upcoming frames requested during this tick's idle budget.
    pub frames_primed: i64,
}

/// Metrics sink invoked once per displayed tick, after drift measurement.
/// Keep implementations cheap; the call happens on the driver thread.
pub trait PlaybackObserver: Send + Sync {
    fn on_tick(&self, metrics: &TickMetrics);
}
