mod archive;
mod encode;

pub use self::archive::{frame_file_name, package_frames, ArchiveWriter, FrameArchive, ARCHIVE_NAME};
pub use self::encode::{dpi_to_ppm, encode_png, ppm_to_dpi, read_png_dpi, write_png};

use crate::frame::FrameImage;
use anyhow::Result;

/// Trait for output destinations
pub trait OutputSink {
    /// Write a frame to the output
    fn write_frame(&mut self, frame: &FrameImage) -> Result<()>;

    /// Number of frames written so far
    fn frames_written(&self) -> usize;
}
