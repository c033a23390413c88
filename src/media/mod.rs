pub mod cache;
pub mod frame;
pub mod source;

pub use cache::FrameCache;
pub use frame::Frame;
pub use source::{FrameError, FrameSource, SourceInfo};
