mod opencv_capture;
mod sampler;
mod sampling;

pub use opencv_capture::{VideoFileCapture, VideoFileOpener};
pub use sampler::{sample_frames, sample_video, SampledFrame};
pub use sampling::{
    ParseSamplingModeError, SamplingMode, SamplingPlan, SamplingSettings, DEFAULT_INTERVAL_SECS,
    MAX_DURATION_SECS, MAX_IMAGES,
};

use anyhow::Result;
use image::RgbImage;
use std::path::Path;

/// Trait for seekable video sources
///
/// The handle is released when the source is dropped.
pub trait FrameSource {
    /// Frames per second reported by the container
    fn fps(&self) -> f64;

    /// Total frame count reported by the container
    fn frame_count(&self) -> f64;

    /// Seek to `index` and decode one frame
    ///
    /// Returns `Ok(None)` when nothing could be decoded at that position.
    fn frame_at(&mut self, index: u64) -> Result<Option<RgbImage>>;

    /// Clip length in seconds
    fn duration(&self) -> f64 {
        self.frame_count() / self.fps()
    }
}

/// Opens a video path into a [`FrameSource`]
pub trait VideoOpener {
    type Source: FrameSource;

    fn open(&self, path: &Path) -> Result<Self::Source>;
}
