use super::{FrameSource, VideoOpener};
use anyhow::{bail, Context, Result};
use image::RgbImage;
use opencv::core::Mat;
use opencv::prelude::*;
use opencv::{imgproc, videoio};
use std::path::Path;

/// Video file decoded through OpenCV's videoio backends
pub struct VideoFileCapture {
    capture: videoio::VideoCapture,
    fps: f64,
    frame_count: f64,
}

impl VideoFileCapture {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path
            .to_str()
            .with_context(|| format!("Video path is not valid UTF-8: {}", path.display()))?;

        tracing::info!("Opening video {}", path.display());

        let capture = videoio::VideoCapture::from_file(path_str, videoio::CAP_ANY)
            .with_context(|| format!("Failed to open video {}", path.display()))?;

        if !capture.is_opened()? {
            bail!("Video backend could not open {}", path.display());
        }

        let fps = capture.get(videoio::CAP_PROP_FPS)?;
        let frame_count = capture.get(videoio::CAP_PROP_FRAME_COUNT)?;

        tracing::debug!("Video opened: fps={}, frames={}", fps, frame_count);

        Ok(Self {
            capture,
            fps,
            frame_count,
        })
    }
}

impl FrameSource for VideoFileCapture {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> f64 {
        self.frame_count
    }

    fn frame_at(&mut self, index: u64) -> Result<Option<RgbImage>> {
        self.capture
            .set(videoio::CAP_PROP_POS_FRAMES, index as f64)
            .context("Failed to seek")?;

        let mut frame = Mat::default();
        if !self.capture.read(&mut frame).context("Failed to read frame")? || frame.empty() {
            return Ok(None);
        }

        // OpenCV hands back BGR
        let mut rgb = Mat::default();
        imgproc::cvt_color_def(&frame, &mut rgb, imgproc::COLOR_BGR2RGB)
            .context("Failed to convert frame to RGB")?;

        let width = rgb.cols() as u32;
        let height = rgb.rows() as u32;
        let rgb = if rgb.is_continuous() {
            rgb
        } else {
            rgb.try_clone()?
        };
        let bytes = rgb.data_bytes()?.to_vec();

        let image = RgbImage::from_raw(width, height, bytes)
            .context("Decoded frame does not match its reported dimensions")?;

        Ok(Some(image))
    }
}

impl Drop for VideoFileCapture {
    fn drop(&mut self) {
        if let Err(err) = self.capture.release() {
            tracing::warn!("Failed to release video handle: {}", err);
        } else {
            tracing::debug!("Video handle released");
        }
    }
}

/// Opens paths with [`VideoFileCapture`]
#[derive(Debug, Clone, Copy, Default)]
pub struct VideoFileOpener;

impl VideoOpener for VideoFileOpener {
    type Source = VideoFileCapture;

    fn open(&self, path: &Path) -> Result<VideoFileCapture> {
        VideoFileCapture::open(path)
    }
}
