use super::encode::write_png;
use super::OutputSink;
use crate::frame::FrameImage;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

pub const ARCHIVE_NAME: &str = "frames.zip";

/// `frame_001.png` for index 1
pub fn frame_file_name(index: usize) -> String {
    format!("frame_{:03}.png", index)
}

/// Writes numbered PNGs into a fresh temporary directory
pub struct ArchiveWriter {
    dir: TempDir,
    dpi: u32,
    frames: Vec<PathBuf>,
}

impl ArchiveWriter {
    pub fn new(dpi: u32) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("frame-cutter-")
            .tempdir()
            .context("Failed to create temporary directory")?;

        tracing::debug!("Writing frames into {}", dir.path().display());

        Ok(Self {
            dir,
            dpi,
            frames: Vec::new(),
        })
    }

    pub fn directory(&self) -> &Path {
        self.dir.path()
    }

    /// Zip every written PNG (basenames only, deflated) next to them
    pub fn finish(self) -> Result<FrameArchive> {
        let _span = tracing::debug_span!("zip").entered();

        let path = self.dir.path().join(ARCHIVE_NAME);
        let file =
            File::create(&path).with_context(|| format!("Failed to create {}", path.display()))?;
        let mut zip = ZipWriter::new(BufWriter::new(file));

        // Fixed timestamp so identical frames give identical archives
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default());

        for frame_path in &self.frames {
            let name = frame_path
                .file_name()
                .and_then(|n| n.to_str())
                .with_context(|| format!("Bad frame file name {}", frame_path.display()))?;

            zip.start_file(name, options)
                .with_context(|| format!("Failed to add {} to archive", name))?;
            let mut source = File::open(frame_path)
                .with_context(|| format!("Failed to open {}", frame_path.display()))?;
            io::copy(&mut source, &mut zip)
                .with_context(|| format!("Failed to compress {}", name))?;
        }

        zip.finish().context("Failed to finish archive")?;

        tracing::info!(
            "Packaged {} frames into {}",
            self.frames.len(),
            path.display()
        );

        Ok(FrameArchive {
            dir: Some(self.dir),
            path,
            frames: self.frames,
        })
    }
}

impl OutputSink for ArchiveWriter {
    fn write_frame(&mut self, frame: &FrameImage) -> Result<()> {
        let path = self
            .dir
            .path()
            .join(frame_file_name(self.frames.len() + 1));
        write_png(&path, &frame.pixels, Some((self.dpi, self.dpi)))?;
        self.frames.push(path);
        Ok(())
    }

    fn frames_written(&self) -> usize {
        self.frames.len()
    }
}

/// A finished `frames.zip` and the PNGs beside it
///
/// The temporary directory is deleted when this is dropped unless
/// [`FrameArchive::persist`] was called.
#[derive(Debug)]
pub struct FrameArchive {
    dir: Option<TempDir>,
    path: PathBuf,
    frames: Vec<PathBuf>,
}

impl FrameArchive {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frame_paths(&self) -> &[PathBuf] {
        &self.frames
    }

    pub fn directory(&self) -> Option<&Path> {
        self.path.parent()
    }

    /// Keep the directory on disk and return the archive path
    pub fn persist(mut self) -> PathBuf {
        if let Some(dir) = self.dir.take() {
            let kept = dir.keep();
            tracing::debug!("Keeping {}", kept.display());
        }
        self.path
    }
}

/// Write every frame as a numbered PNG and bundle them into `frames.zip`
pub fn package_frames(frames: &[FrameImage], dpi: u32) -> Result<FrameArchive> {
    let _span = tracing::debug_span!("package_frames").entered();

    let mut writer = ArchiveWriter::new(dpi)?;
    for frame in frames {
        writer.write_frame(frame)?;
    }
    writer.finish()
}
