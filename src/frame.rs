use image::{DynamicImage, RgbImage};

/// A single extracted still plus the DPI pair that gets embedded on export.
#[derive(Debug, Clone)]
pub struct FrameImage {
    pub pixels: DynamicImage,
    pub dpi: Option<(u32, u32)>,
}

impl FrameImage {
    pub fn new(pixels: DynamicImage) -> Self {
        Self { pixels, dpi: None }
    }

    pub fn from_rgb(pixels: RgbImage) -> Self {
        Self::new(DynamicImage::ImageRgb8(pixels))
    }

    /// Replace the pixels, keeping the current DPI tag
    pub fn with_pixels(self, pixels: DynamicImage) -> Self {
        Self {
            pixels,
            dpi: self.dpi,
        }
    }

    pub fn tag_dpi(&mut self, dpi: u32) {
        self.dpi = Some((dpi, dpi));
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.pixels.width(), self.pixels.height())
    }

    pub fn has_alpha(&self) -> bool {
        self.pixels.color().has_alpha()
    }
}
