pub mod time;

pub use time::Fps;
