use anyhow::Result;
use image::{GrayImage, RgbImage};

/// Foreground mask: 0 = background, 255 = foreground
/// Dimensions match the input frame dimensions
pub type Matte = GrayImage;

/// Trait for segmentation models
/// Allows swapping between different backends (U²-Net, IS-Net, test doubles)
pub trait SegmentationModel {
    /// Process a frame and return its foreground mask
    ///
    /// # Arguments
    /// * `frame` - Input RGB frame
    ///
    /// # Returns
    /// * Mask at the frame's resolution
    fn segment(&mut self, frame: &RgbImage) -> Result<Matte>;

    /// Get the model's input dimensions
    ///
    /// Returns (width, height)
    fn input_size(&self) -> (u32, u32);
}
