use crate::capture::{sample_video, SamplingSettings, VideoOpener};
use crate::error::Rejection;
use crate::frame::FrameImage;
use crate::output::{package_frames, FrameArchive};
use crate::postprocess::{PostProcessor, ResizeOption};
use crate::segmentation::{
    BackgroundRemover, MattingParams, ModelFailurePolicy, ModelKind, ModelLoader,
};
use anyhow::Result;
use std::path::PathBuf;

/// Default DPI tag for exported frames
pub const DEFAULT_DPI: u32 = 300;

/// Every user-facing parameter of one extraction run
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub video: Option<PathBuf>,
    pub sampling: SamplingSettings,
    pub remove_background: bool,
    pub model: ModelKind,
    pub dpi: u32,
    pub matting: MattingParams,
    pub resize: ResizeOption,
}

impl Default for ExtractRequest {
    fn default() -> Self {
        Self {
            video: None,
            sampling: SamplingSettings::default(),
            remove_background: false,
            model: ModelKind::default(),
            dpi: DEFAULT_DPI,
            matting: MattingParams::default(),
            resize: ResizeOption::default(),
        }
    }
}

/// What the front end shows: previews, a status line and the download
#[derive(Debug)]
pub struct ExtractResponse {
    pub images: Vec<FrameImage>,
    pub status: String,
    pub archive: Option<FrameArchive>,
}

impl ExtractResponse {
    pub fn rejected(rejection: Rejection) -> Self {
        Self {
            images: Vec::new(),
            status: rejection.to_string(),
            archive: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.archive.is_some()
    }
}

/// Long-lived service that turns a video into a zip of stills
///
/// Owns the model-session cache, so loaded models are reused across requests.
pub struct FramePipeline<O, L> {
    opener: O,
    remover: BackgroundRemover<L>,
}

impl<O: VideoOpener, L: ModelLoader> FramePipeline<O, L> {
    pub fn new(opener: O, loader: L) -> Self {
        Self {
            opener,
            remover: BackgroundRemover::new(loader),
        }
    }

    pub fn with_failure_policy(mut self, policy: ModelFailurePolicy) -> Self {
        self.remover = self.remover.with_failure_policy(policy);
        self
    }

    pub fn remover(&self) -> &BackgroundRemover<L> {
        &self.remover
    }

    /// Run one request end to end
    ///
    /// Bad input yields `Ok` with an explanatory status and no archive. `Err`
    /// is reserved for model failures (under [`ModelFailurePolicy::Abort`])
    /// and I/O errors while packaging.
    pub fn extract(&self, request: &ExtractRequest) -> Result<ExtractResponse> {
        let _span = tracing::info_span!("extract").entered();

        let sampled = match sample_video(&self.opener, request.video.as_deref(), &request.sampling)
        {
            Ok(sampled) => sampled,
            Err(rejection) => {
                tracing::info!("Request rejected: {}", rejection);
                return Ok(ExtractResponse::rejected(rejection));
            }
        };

        let original_size = sampled[0].image.dimensions();
        let frames: Vec<FrameImage> = sampled
            .into_iter()
            .map(|sample| {
                let mut frame = FrameImage::from_rgb(sample.image);
                frame.tag_dpi(request.dpi);
                frame
            })
            .collect();

        let (frames, mode_text) = if request.remove_background {
            let frames = self.remover.remove_background(
                frames,
                request.model,
                &request.matting,
                request.dpi,
            )?;
            (
                frames,
                format!(" (background removed - model: {})", request.model),
            )
        } else {
            (frames, String::new())
        };

        // Only reachable when every frame was skipped by the failure policy
        if frames.is_empty() {
            return Ok(ExtractResponse::rejected(Rejection::NoFrames));
        }

        let finished = PostProcessor::new(request.resize, request.dpi).finish(
            frames,
            original_size,
            request.remove_background,
        );

        let archive = package_frames(&finished.frames, request.dpi)?;

        let status = format!(
            "Extracted {} images{}\n{}",
            finished.frames.len(),
            mode_text,
            finished.summary
        );
        tracing::info!("{}", status.replace('\n', "; "));

        Ok(ExtractResponse {
            images: finished.frames,
            status,
            archive: Some(archive),
        })
    }
}
