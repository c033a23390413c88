//! Frame source seam: stream metadata and by-number frame production.

use std::sync::Arc;

use crate::core::time::Fps;
use crate::media::cache::FrameCache;
use crate::media::frame::Frame;

/// Why a frame could not be produced. Callers pattern-match on this instead
/// of relying on unwinding; within the playback loops either variant
/// degrades to "nothing to display this tick".
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The source was closed while a fetch was in flight.
    #[error("frame source is closed")]
    ReaderClosed,
    /// The requested number lies outside the stream.
    #[error("frame {0} is out of bounds")]
    OutOfBounds(i64),
}

/// Stream metadata exposed by a frame source.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub fps: Fps,
    /// Total number of frames; the last valid frame number.
    pub video_length: i64,
    pub has_video: bool,
    pub has_audio: bool,
    pub width: u32,
    pub height: u32,
    pub sample_rate: u32,
    pub channels: u32,
}

/// A producer of frames by number.
///
/// `get_frame` transparently consults and fills the source's cache, so
/// requesting an upcoming frame is how both loops prime it. Implementations
/// must tolerate concurrent calls for distinct numbers without corrupting
/// shared cache state; an index already in flight should not be produced
/// twice.
pub trait FrameSource: Send + Sync {
    fn info(&self) -> &SourceInfo;

    fn get_frame(&self, number: i64) -> Result<Arc<Frame>, FrameError>;

    /// The bounded cache behind this source, if it has one.
    fn cache(&self) -> Option<&dyn FrameCache> {
        None
    }
}
