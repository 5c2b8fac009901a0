use anyhow::{bail, Result};
use frame_cutter::capture::{FrameSource, SamplingSettings, VideoOpener};
use frame_cutter::output::read_png_dpi;
use frame_cutter::postprocess::ResizeOption;
use frame_cutter::segmentation::{
    Matte, ModelFailurePolicy, ModelKind, ModelLoader, SegmentationModel,
};
use frame_cutter::{ExtractRequest, FramePipeline, Rejection};
use image::{GrayImage, Luma, Rgb, RgbImage};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use zip::ZipArchive;

/// Clip whose properties are encoded in the file name: `<w>x<h>@<fps>x<frames>.mp4`
struct SyntheticClip {
    width: u32,
    height: u32,
    fps: f64,
    frames: f64,
}

impl FrameSource for SyntheticClip {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn frame_count(&self) -> f64 {
        self.frames
    }

    fn frame_at(&mut self, index: u64) -> Result<Option<RgbImage>> {
        if index as f64 >= self.frames {
            return Ok(None);
        }
        let shade = (index % 200) as u8;
        Ok(Some(RgbImage::from_fn(self.width, self.height, |x, y| {
            Rgb([shade, (x % 256) as u8, (y % 256) as u8])
        })))
    }
}

struct SyntheticOpener;

impl VideoOpener for SyntheticOpener {
    type Source = SyntheticClip;

    fn open(&self, path: &Path) -> Result<SyntheticClip> {
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        let Some((size, timing)) = stem.split_once('@') else {
            bail!("cannot decode {}", path.display());
        };
        let (width, height) = size.split_once('x').unwrap();
        let (fps, frames) = timing.split_once('x').unwrap();
        Ok(SyntheticClip {
            width: width.parse()?,
            height: height.parse()?,
            fps: fps.parse()?,
            frames: frames.parse()?,
        })
    }
}

/// Foreground is a centred box covering the middle half of the frame
struct CentreBox {
    fail: bool,
}

impl SegmentationModel for CentreBox {
    fn segment(&mut self, frame: &RgbImage) -> Result<Matte> {
        if self.fail {
            bail!("onnx runtime error");
        }
        let (w, h) = frame.dimensions();
        Ok(GrayImage::from_fn(w, h, |x, y| {
            let inside = x >= w / 4 && x < 3 * w / 4 && y >= h / 4 && y < 3 * h / 4;
            Luma([if inside { 255 } else { 0 }])
        }))
    }

    fn input_size(&self) -> (u32, u32) {
        (320, 320)
    }
}

#[derive(Clone, Default)]
struct StubLoader {
    loads: Arc<AtomicUsize>,
    fail: bool,
}

impl ModelLoader for StubLoader {
    fn load(&self, _kind: ModelKind) -> Result<Box<dyn SegmentationModel + Send>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CentreBox { fail: self.fail }))
    }
}

fn pipeline() -> FramePipeline<SyntheticOpener, StubLoader> {
    FramePipeline::new(SyntheticOpener, StubLoader::default())
}

fn request(video: &str) -> ExtractRequest {
    ExtractRequest {
        video: Some(PathBuf::from(video)),
        ..ExtractRequest::default()
    }
}

fn zip_entry_names(path: &Path) -> Vec<String> {
    let mut zip = ZipArchive::new(File::open(path).unwrap()).unwrap();
    (0..zip.len())
        .map(|i| zip.by_index(i).unwrap().name().to_string())
        .collect()
}

#[test]
fn missing_video_is_reported_not_raised() {
    let response = pipeline().extract(&ExtractRequest::default()).unwrap();

    assert!(response.images.is_empty());
    assert!(response.archive.is_none());
    assert_eq!(response.status, Rejection::MissingVideo.to_string());
}

#[test]
fn undecodable_video_is_reported() {
    let response = pipeline().extract(&request("holiday.mp4")).unwrap();
    assert_eq!(response.status, Rejection::Unreadable.to_string());
    assert!(!response.is_success());
}

#[test]
fn long_video_is_rejected_with_its_duration() {
    let mut req = request("64x48@25x300.mp4");
    req.sampling = SamplingSettings::count(3);

    let response = pipeline().extract(&req).unwrap();

    assert!(response.images.is_empty());
    assert!(response.archive.is_none());
    assert!(response.status.contains("12.00 seconds"), "{}", response.status);
}

#[test]
fn interval_run_packages_numbered_pngs() {
    let mut req = request("64x48@30x270.mp4");
    req.sampling = SamplingSettings::interval(2.0);
    req.dpi = 150;

    let response = pipeline().extract(&req).unwrap();

    assert_eq!(response.images.len(), 5);
    assert_eq!(
        response.status,
        "Extracted 5 images\nOutput size: 64 x 48 px\nDPI: 150"
    );

    let archive = response.archive.as_ref().unwrap();
    assert_eq!(
        zip_entry_names(archive.path()),
        vec![
            "frame_001.png",
            "frame_002.png",
            "frame_003.png",
            "frame_004.png",
            "frame_005.png"
        ]
    );
    for png in archive.frame_paths() {
        assert_eq!(read_png_dpi(png).unwrap(), Some((150, 150)));
    }
}

#[test]
fn without_removal_frames_are_opaque_rgba() {
    let mut req = request("32x24@10x40.mp4");
    req.sampling = SamplingSettings::count(2);

    let response = pipeline().extract(&req).unwrap();

    for frame in &response.images {
        assert!(frame.has_alpha());
        let rgba = frame.pixels.as_rgba8().expect("rgba output");
        assert!(rgba.pixels().all(|p| p[3] == 255));
        assert_eq!(frame.dpi, Some((300, 300)));
    }
}

#[test]
fn sticker_resize_shrinks_full_hd() {
    let mut req = request("1920x1080@30x60.mp4");
    req.sampling = SamplingSettings::count(1);
    req.resize = ResizeOption::Sticker;

    let response = pipeline().extract(&req).unwrap();

    assert_eq!(response.images[0].dimensions(), (320, 180));
    assert!(response
        .status
        .contains("Original size: 1920 x 1080 px\nOutput size: 320 x 180 px (sticker format)"));
}

#[test]
fn background_removal_cuts_out_subject_and_reuses_model() {
    let loader = StubLoader::default();
    let loads = Arc::clone(&loader.loads);
    let pipeline = FramePipeline::new(SyntheticOpener, loader);

    let mut req = request("80x60@20x100.mp4");
    req.sampling = SamplingSettings::count(3);
    req.remove_background = true;
    req.model = ModelKind::IsNetAnime;

    let first = pipeline.extract(&req).unwrap();
    let second = pipeline.extract(&req).unwrap();

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert!(pipeline.remover().cache().contains(ModelKind::IsNetAnime));
    assert!(first
        .status
        .starts_with("Extracted 3 images (background removed - model: isnet-anime)\n"));

    for frame in first.images.iter().chain(second.images.iter()) {
        let rgba = frame.pixels.as_rgba8().unwrap();
        assert_eq!(rgba.get_pixel(0, 0)[3], 0);
        assert_eq!(rgba.get_pixel(40, 30)[3], 255);
    }
}

#[test]
fn identical_runs_produce_identical_archives() {
    let pipeline = pipeline();
    let mut req = request("48x36@24x120.mp4");
    req.remove_background = true;
    req.resize = ResizeOption::Sticker;

    let a = pipeline.extract(&req).unwrap();
    let b = pipeline.extract(&req).unwrap();

    let a = a.archive.unwrap();
    let b = b.archive.unwrap();
    assert_ne!(a.path(), b.path());
    assert_eq!(std::fs::read(a.path()).unwrap(), std::fs::read(b.path()).unwrap());
}

#[test]
fn model_failure_aborts_by_default() {
    let loader = StubLoader {
        fail: true,
        ..StubLoader::default()
    };
    let pipeline = FramePipeline::new(SyntheticOpener, loader);
    let mut req = request("32x24@10x40.mp4");
    req.remove_background = true;

    let err = pipeline.extract(&req).unwrap_err();

    assert!(format!("{:#}", err).contains("onnx runtime error"));
}

#[test]
fn skipping_every_failed_frame_reports_no_images() {
    let loader = StubLoader {
        fail: true,
        ..StubLoader::default()
    };
    let pipeline = FramePipeline::new(SyntheticOpener, loader)
        .with_failure_policy(ModelFailurePolicy::SkipFrame);
    let mut req = request("32x24@10x40.mp4");
    req.remove_background = true;

    let response = pipeline.extract(&req).unwrap();

    assert_eq!(response.status, Rejection::NoFrames.to_string());
    assert!(response.archive.is_none());
}
