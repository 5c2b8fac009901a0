use super::types::Matte;
use anyhow::{ensure, Result};
use image::{imageops, GrayImage, Luma, RgbImage};
use ndarray::Array4;

/// Preprocessor for converting RGB images to model input tensors
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
    mean: [f32; 3],
    std: [f32; 3],
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32, mean: [f32; 3], std: [f32; 3]) -> Self {
        Self {
            target_width,
            target_height,
            mean,
            std,
        }
    }

    /// Preprocess an RGB image into a normalized NCHW tensor
    ///
    /// Steps:
    /// 1. Resize to target dimensions
    /// 2. Scale by the brightest channel value so the maximum becomes 1.0
    /// 3. Subtract the per-channel mean and divide by the per-channel std
    /// 4. Transpose from HWC to NCHW format
    ///
    /// Returns: Array4<f32> with shape [1, 3, height, width]
    pub fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        // Resize if needed
        let resized = if image.dimensions() != (self.target_width, self.target_height) {
            imageops::resize(
                image,
                self.target_width,
                self.target_height,
                imageops::FilterType::Lanczos3,
            )
        } else {
            image.clone()
        };

        let peak = resized
            .as_raw()
            .iter()
            .copied()
            .max()
            .map(f32::from)
            .unwrap_or(0.0)
            .max(1e-6);

        let (width, height) = resized.dimensions();
        let mut tensor = Array4::<f32>::zeros((1, 3, height as usize, width as usize));

        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                let value = pixel[c] as f32 / peak;
                tensor[[0, c, y as usize, x as usize]] = (value - self.mean[c]) / self.std[c];
            }
        }

        tensor
    }

    /// Turn a single-channel saliency map into an 8-bit mask
    ///
    /// Values are min-max normalised first; a flat map becomes all background.
    pub fn saliency_to_mask(values: &[f32], width: u32, height: u32) -> Result<GrayImage> {
        ensure!(
            values.len() >= (width * height) as usize,
            "saliency map has {} values, expected {}x{}",
            values.len(),
            width,
            height
        );

        let plane = &values[..(width * height) as usize];
        let (min, max) = plane
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let range = max - min;

        Ok(GrayImage::from_fn(width, height, |x, y| {
            let v = plane[(y * width + x) as usize];
            let normalized = if range > f32::EPSILON {
                (v - min) / range
            } else {
                0.0
            };
            Luma([(normalized * 255.0).clamp(0.0, 255.0) as u8])
        }))
    }

    /// Turn per-class logits (class-major, NCHW without the batch axis) into a mask
    ///
    /// Pixels whose highest-scoring class is not 0 (background) are foreground.
    pub fn classes_to_mask(
        logits: &[f32],
        classes: usize,
        width: u32,
        height: u32,
    ) -> Result<GrayImage> {
        let plane = (width * height) as usize;
        ensure!(
            classes > 0 && logits.len() >= classes * plane,
            "class map has {} values, expected {}x{}x{}",
            logits.len(),
            classes,
            width,
            height
        );

        Ok(GrayImage::from_fn(width, height, |x, y| {
            let idx = (y * width + x) as usize;
            let best = (0..classes)
                .max_by(|&a, &b| logits[a * plane + idx].total_cmp(&logits[b * plane + idx]))
                .unwrap_or(0);
            Luma([if best == 0 { 0 } else { 255 }])
        }))
    }

    /// Resize a model-resolution mask back to frame dimensions
    pub fn postprocess_matte(mask: GrayImage, target_width: u32, target_height: u32) -> Matte {
        let _span = tracing::debug_span!("postprocess").entered();

        // If dimensions match, no resize needed
        if mask.dimensions() == (target_width, target_height) {
            return mask;
        }

        imageops::resize(
            &mask,
            target_width,
            target_height,
            imageops::FilterType::Lanczos3,
        )
    }
}
