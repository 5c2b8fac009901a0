use thiserror::Error;

use crate::capture::MAX_DURATION_SECS;

/// Input problems reported back to the user as a status message.
///
/// None of these abort the process; the pipeline turns them into an empty
/// response carrying the message.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Rejection {
    #[error("Please upload a video first.")]
    MissingVideo,

    #[error("Unable to read the video; check that the format is supported.")]
    Unreadable,

    #[error("Unable to determine video properties (the format may be unsupported).")]
    MissingMetadata,

    #[error("Video is {duration:.2} seconds long, exceeding the {limit:.1}-second limit.", limit = MAX_DURATION_SECS)]
    TooLong { duration: f64 },

    #[error("No images were extracted.")]
    NoFrames,
}
