use super::cache::{ModelLoader, SessionCache};
use super::catalog::ModelKind;
use super::matting::{alpha_matting_cutout, post_process_mask, MattingParams};
use super::types::SegmentationModel;
use crate::frame::FrameImage;
use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, RgbImage, RgbaImage};
use std::str::FromStr;
use thiserror::Error;

/// What to do when the model fails on one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelFailurePolicy {
    /// Fail the whole request
    #[default]
    Abort,
    /// Log the failure and drop that frame
    SkipFrame,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown failure policy `{0}` (expected `abort` or `skip`)")]
pub struct ParsePolicyError(String);

impl FromStr for ModelFailurePolicy {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "skip" | "skip-frame" => Ok(Self::SkipFrame),
            _ => Err(ParsePolicyError(s.to_string())),
        }
    }
}

/// Runs background removal over a batch of frames with cached model sessions
pub struct BackgroundRemover<L> {
    cache: SessionCache<L>,
    failure_policy: ModelFailurePolicy,
}

impl<L: ModelLoader> BackgroundRemover<L> {
    pub fn new(loader: L) -> Self {
        Self {
            cache: SessionCache::new(loader),
            failure_policy: ModelFailurePolicy::default(),
        }
    }

    pub fn with_failure_policy(mut self, policy: ModelFailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn failure_policy(&self) -> ModelFailurePolicy {
        self.failure_policy
    }

    pub fn cache(&self) -> &SessionCache<L> {
        &self.cache
    }

    /// Replace each frame with an RGBA cutout and tag it with `dpi`
    pub fn remove_background(
        &self,
        frames: Vec<FrameImage>,
        model: ModelKind,
        matting: &MattingParams,
        dpi: u32,
    ) -> Result<Vec<FrameImage>> {
        let _span = tracing::debug_span!("remove_background", model = %model).entered();

        let session = self.cache.get_or_load(model)?;
        let mut session = session
            .lock()
            .map_err(|_| anyhow!("model session for {} is poisoned", model))?;

        let (input_width, input_height) = session.input_size();
        tracing::debug!("{} runs at {}x{}", model, input_width, input_height);

        tracing::info!(
            "Removing background from {} frames (fg={}, bg={}, erode={})",
            frames.len(),
            matting.foreground_threshold,
            matting.background_threshold,
            matting.erode_size
        );

        let total = frames.len();
        let mut processed = Vec::with_capacity(total);
        for (index, frame) in frames.into_iter().enumerate() {
            let rgb = frame.pixels.to_rgb8();

            match cut_out(&mut **session, &rgb, matting) {
                Ok(cutout) => {
                    let mut frame = frame.with_pixels(DynamicImage::ImageRgba8(cutout));
                    frame.tag_dpi(dpi);
                    processed.push(frame);
                }
                Err(err) => match self.failure_policy {
                    ModelFailurePolicy::Abort => {
                        return Err(err.context(format!(
                            "Background removal failed on frame {} of {}",
                            index + 1,
                            total
                        )));
                    }
                    ModelFailurePolicy::SkipFrame => {
                        tracing::warn!(
                            "Background removal failed on frame {} of {}, skipping: {:#}",
                            index + 1,
                            total,
                            err
                        );
                    }
                },
            }
        }

        Ok(processed)
    }
}

fn cut_out(
    model: &mut dyn SegmentationModel,
    image: &RgbImage,
    matting: &MattingParams,
) -> Result<RgbaImage> {
    let mask = model.segment(image).context("Failed to segment frame")?;
    let mask = post_process_mask(&mask)?;
    alpha_matting_cutout(image, &mask, matting)
}
