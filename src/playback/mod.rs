pub mod cache_thread;
pub mod engine;
pub mod observer;
pub mod renderers;
mod state;

pub use cache_thread::CacheThread;
pub use engine::{PlaybackEngine, PlaybackError};
pub use observer::{PlaybackObserver, TickMetrics};
pub use renderers::{AudioRenderer, VideoRenderer};
