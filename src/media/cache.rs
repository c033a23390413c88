//! Bounded frame cache seam, queried to size and steer the look-ahead walk.

/// The cache sitting behind a frame source.
///
/// The playback loops only ever ask it two questions; insertion happens as
/// a side effect of [`FrameSource::get_frame`](crate::media::FrameSource::get_frame),
/// never directly.
pub trait FrameCache: Send + Sync {
    /// Does the cache already hold this frame number?
    fn contains(&self, number: i64) -> bool;

    /// Configured capacity in bytes. Zero or negative disables look-ahead.
    fn max_bytes(&self) -> i64;
}
