//! A single unit of playable content: one image and/or one frame's worth
//! of audio samples, identified by a positive sequential number.

/// One produced frame. Both playback loops share frames as `Arc<Frame>`;
/// renderers get read access for the duration of a render call, the driver
/// keeps at most one live reference between ticks.
#[derive(Debug, Clone)]
pub struct Frame {
    /// 1-based frame number.
    pub number: i64,
    pub width: u32,
    pub height: u32,
    /// RGBA pixel data, when the source carries video.
    pub pixels: Option<Vec<u8>>,
    /// Interleaved audio samples, when the source carries audio.
    pub samples: Option<Vec<f32>>,
}

impl Frame {
    /// Create an empty frame shell for the given number and dimensions.
    pub fn new(number: i64, width: u32, height: u32) -> Self {
        Self {
            number,
            width,
            height,
            pixels: None,
            samples: None,
        }
    }

    pub fn has_image(&self) -> bool {
        self.pixels.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.samples.is_some()
    }

    /// Actual in-memory payload size, for cache accounting.
    pub fn size_bytes(&self) -> usize {
        let pixels = self.pixels.as_ref().map_or(0, |p| p.len());
        let samples = self.samples.as_ref().map_or(0, |s| s.len() * 4);
        pixels + samples
    }
}
