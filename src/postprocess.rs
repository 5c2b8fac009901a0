use crate::frame::FrameImage;
use image::imageops::FilterType;
use image::DynamicImage;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Sticker bounding box (width, height)
pub const STICKER_MAX_SIZE: (u32, u32) = (320, 270);

/// Output size choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResizeOption {
    /// Keep the video's resolution
    #[default]
    Original,
    /// Downscale to fit inside the 320x270 sticker box
    Sticker,
}

impl fmt::Display for ResizeOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Original => f.write_str("original"),
            Self::Sticker => f.write_str("sticker"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown resize option `{0}` (expected `original` or `sticker`)")]
pub struct ParseResizeError(String);

impl FromStr for ResizeOption {
    type Err = ParseResizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "original" => Ok(Self::Original),
            "sticker" => Ok(Self::Sticker),
            _ => Err(ParseResizeError(s.to_string())),
        }
    }
}

/// Target size for fitting `width`x`height` into the sticker box
///
/// `None` when the image already fits; frames are never upscaled.
pub fn sticker_dimensions(width: u32, height: u32) -> Option<(u32, u32)> {
    let (max_width, max_height) = STICKER_MAX_SIZE;
    let ratio = (max_width as f64 / width as f64).min(max_height as f64 / height as f64);

    if ratio >= 1.0 {
        return None;
    }

    let new_width = ((width as f64 * ratio) as u32).max(1);
    let new_height = ((height as f64 * ratio) as u32).max(1);
    Some((new_width, new_height))
}

/// Downscale into the sticker box with a Lanczos filter
pub fn resize_for_sticker(image: &DynamicImage) -> DynamicImage {
    match sticker_dimensions(image.width(), image.height()) {
        Some((width, height)) => image.resize_exact(width, height, FilterType::Lanczos3),
        None => image.clone(),
    }
}

/// Post-processed frames plus the human-readable size report
#[derive(Debug, Clone)]
pub struct Finished {
    pub frames: Vec<FrameImage>,
    pub summary: String,
}

/// Final per-frame touches before packaging: RGBA, DPI and optional resize
#[derive(Debug, Clone, Copy)]
pub struct PostProcessor {
    pub resize: ResizeOption,
    pub dpi: u32,
}

impl PostProcessor {
    pub fn new(resize: ResizeOption, dpi: u32) -> Self {
        Self { resize, dpi }
    }

    /// `original_size` is the resolution of the first sampled frame
    pub fn finish(
        &self,
        frames: Vec<FrameImage>,
        original_size: (u32, u32),
        background_removed: bool,
    ) -> Finished {
        let _span = tracing::debug_span!("post_process", resize = %self.resize).entered();

        let frames: Vec<FrameImage> = frames
            .into_iter()
            .map(|frame| {
                let mut frame = if background_removed {
                    frame
                } else {
                    let rgba = DynamicImage::ImageRgba8(frame.pixels.to_rgba8());
                    frame.with_pixels(rgba)
                };

                if self.resize == ResizeOption::Sticker {
                    let resized = resize_for_sticker(&frame.pixels);
                    frame = frame.with_pixels(resized);
                }

                frame.tag_dpi(self.dpi);
                frame
            })
            .collect();

        let final_size = frames
            .first()
            .map(FrameImage::dimensions)
            .unwrap_or(original_size);

        let summary = self.summarize(original_size, final_size);
        tracing::debug!("{}", summary.replace('\n', "; "));

        Finished { frames, summary }
    }

    fn summarize(&self, original: (u32, u32), final_size: (u32, u32)) -> String {
        match self.resize {
            ResizeOption::Sticker => format!(
                "Original size: {} x {} px\nOutput size: {} x {} px (sticker format)\nDPI: {}",
                original.0, original.1, final_size.0, final_size.1, self.dpi
            ),
            ResizeOption::Original => format!(
                "Output size: {} x {} px\nDPI: {}",
                original.0, original.1, self.dpi
            ),
        }
    }
}
