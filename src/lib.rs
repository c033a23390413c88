//! Real-time audio/video playback synchronization.
//!
//! Two cooperating loops drive playback: [`playback::PlaybackEngine`] owns
//! the master wall-clock timeline, decides which frame should be on screen
//! "now" and paces itself against a projected deadline, while
//! [`playback::CacheThread`] independently walks ahead of (or behind) the
//! play-head so frame production latency is paid before the driver needs
//! each frame.
//!
//! Frame production, caching and rendering are external collaborators that
//! sit behind the traits in [`media`] and [`playback`]; this crate only
//! implements the clock and the coordination between them.

pub mod core;
pub mod media;
pub mod playback;
