use super::sampling::{SamplingSettings, MAX_DURATION_SECS, MAX_IMAGES};
use super::{FrameSource, VideoOpener};
use crate::error::Rejection;
use image::RgbImage;
use std::path::Path;

/// A decoded still and where it came from
#[derive(Debug, Clone)]
pub struct SampledFrame {
    pub timestamp: f64,
    pub frame_index: u64,
    pub image: RgbImage,
}

/// Open `path` and sample it
///
/// Every failure is reported as a [`Rejection`]; the opened source is dropped
/// (and its handle released) before this returns.
pub fn sample_video<O: VideoOpener>(
    opener: &O,
    path: Option<&Path>,
    settings: &SamplingSettings,
) -> Result<Vec<SampledFrame>, Rejection> {
    let path = match path {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => return Err(Rejection::MissingVideo),
    };

    let source = match opener.open(path) {
        Ok(source) => source,
        Err(err) => {
            tracing::warn!("Failed to open {}: {:#}", path.display(), err);
            return Err(Rejection::Unreadable);
        }
    };

    sample_frames(source, settings)
}

/// Validate the clip and decode one frame per planned timestamp
///
/// Frames that fail to decode are logged and skipped. Decoding stops once
/// [`MAX_IMAGES`] stills have been collected.
pub fn sample_frames<S: FrameSource>(
    mut source: S,
    settings: &SamplingSettings,
) -> Result<Vec<SampledFrame>, Rejection> {
    let _span = tracing::debug_span!("sample_frames").entered();

    let fps = source.fps();
    let frame_count = source.frame_count();

    // Negated comparisons so NaN is rejected as well
    if !(fps > 0.0) || !(frame_count > 0.0) {
        tracing::warn!("Video reports fps={} frame_count={}", fps, frame_count);
        return Err(Rejection::MissingMetadata);
    }

    let duration = frame_count / fps;
    if duration > MAX_DURATION_SECS {
        tracing::info!("Rejecting {:.2}s clip", duration);
        return Err(Rejection::TooLong { duration });
    }

    let plan = settings.plan(duration);
    tracing::debug!(
        "Sampling {} timestamps from {:.2}s clip at {:.3} fps ({})",
        plan.len(),
        duration,
        fps,
        settings.mode
    );

    let mut frames = Vec::with_capacity(plan.len());
    for (&timestamp, frame_index) in plan.timestamps().iter().zip(plan.frame_indices(fps)) {
        match source.frame_at(frame_index) {
            Ok(Some(image)) => frames.push(SampledFrame {
                timestamp,
                frame_index,
                image,
            }),
            Ok(None) => {
                tracing::debug!("No frame at index {} ({:.3}s), skipping", frame_index, timestamp);
            }
            Err(err) => {
                tracing::warn!(
                    "Failed to decode frame {} ({:.3}s), skipping: {:#}",
                    frame_index,
                    timestamp,
                    err
                );
            }
        }

        if frames.len() >= MAX_IMAGES {
            break;
        }
    }

    if frames.is_empty() {
        return Err(Rejection::NoFrames);
    }

    tracing::info!("Sampled {} frames", frames.len());
    Ok(frames)
}
