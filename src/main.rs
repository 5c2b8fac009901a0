use anyhow::{Context, Result};
use clap::Parser;
use frame_cutter::capture::{SamplingMode, SamplingSettings, VideoFileOpener};
use frame_cutter::controls::{background_controls, sampling_controls};
use frame_cutter::postprocess::ResizeOption;
use frame_cutter::segmentation::{MattingParams, ModelFailurePolicy, ModelKind, OnnxModelLoader};
use frame_cutter::{ExtractRequest, FramePipeline};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input video (at most 10 seconds long)
    video: Option<PathBuf>,

    /// Sampling mode: `interval` or `count`
    #[arg(short, long, default_value = "interval")]
    mode: SamplingMode,

    /// Seconds between stills in interval mode
    #[arg(short, long, default_value_t = 1.0)]
    interval: f64,

    /// Number of stills in count mode
    #[arg(short = 'n', long, default_value_t = 5, value_parser = clap::value_parser!(i64).range(1..=20))]
    count: i64,

    /// Cut out the background of every still
    #[arg(long)]
    remove_background: bool,

    /// Background-removal model (see --list-models)
    #[arg(long, default_value = "u2net")]
    model: ModelKind,

    /// DPI written into every PNG
    #[arg(long, default_value_t = 300, value_parser = clap::value_parser!(u32).range(72..=300))]
    dpi: u32,

    /// Alpha matting: mask values above this are certain foreground
    #[arg(long, default_value_t = 240, value_parser = clap::value_parser!(u8).range(180..=255))]
    fg_threshold: u8,

    /// Alpha matting: mask values below this are certain background
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u8).range(0..=30))]
    bg_threshold: u8,

    /// Alpha matting: erosion size in pixels
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u32).range(0..=20))]
    erode_size: u32,

    /// Output size: `original` or `sticker` (fit within 320x270)
    #[arg(long, default_value = "original")]
    resize: ResizeOption,

    /// Where to copy the finished zip
    #[arg(short, long, default_value = "frames.zip")]
    output: PathBuf,

    /// Leave the temporary PNGs and zip on disk
    #[arg(long)]
    keep_temp: bool,

    /// Directory holding the ONNX model files
    #[arg(long, env = "U2NET_HOME")]
    model_dir: Option<PathBuf>,

    /// Never download missing models
    #[arg(long)]
    offline: bool,

    /// What to do when the model fails on a frame: `abort` or `skip`
    #[arg(long, default_value = "abort")]
    on_model_failure: ModelFailurePolicy,

    /// Print the available models and exit
    #[arg(long)]
    list_models: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if args.list_models {
        for kind in ModelKind::ALL {
            println!("{:<18} {}", kind.name(), kind.description());
        }
        return Ok(ExitCode::SUCCESS);
    }

    tracing::info!("frame-cutter starting");

    if sampling_controls(args.mode).interval_input {
        tracing::info!("Sampling: one still every {}s", args.interval);
    } else {
        tracing::info!("Sampling: {} stills", args.count);
    }

    let controls = background_controls(args.remove_background);
    if controls.model_selector {
        tracing::info!("Model: {} ({})", args.model, args.model.description());
    }
    if controls.alpha_matting {
        tracing::info!(
            "Alpha matting: fg={}, bg={}, erode={}",
            args.fg_threshold,
            args.bg_threshold,
            args.erode_size
        );
    }
    tracing::info!("Resize: {}, DPI: {}", args.resize, args.dpi);

    let model_dir = args
        .model_dir
        .clone()
        .unwrap_or_else(OnnxModelLoader::default_model_dir);
    let loader = OnnxModelLoader::new(model_dir, !args.offline);

    let pipeline =
        FramePipeline::new(VideoFileOpener, loader).with_failure_policy(args.on_model_failure);

    tracing::debug!(
        "Model failure policy: {:?}",
        pipeline.remover().failure_policy()
    );

    let request = ExtractRequest {
        video: args.video.clone(),
        sampling: SamplingSettings {
            mode: args.mode,
            interval_secs: Some(args.interval),
            frame_count: Some(args.count),
        },
        remove_background: args.remove_background,
        model: args.model,
        dpi: args.dpi,
        matting: MattingParams {
            foreground_threshold: args.fg_threshold,
            background_threshold: args.bg_threshold,
            erode_size: args.erode_size,
        },
        resize: args.resize,
    };

    let response = pipeline.extract(&request).context("Extraction failed")?;
    println!("{}", response.status);

    let Some(archive) = response.archive else {
        return Ok(ExitCode::FAILURE);
    };

    std::fs::copy(archive.path(), &args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    println!("Archive: {}", args.output.display());

    if args.keep_temp {
        let kept = archive.persist();
        println!("Temporary archive kept at {}", kept.display());
    }

    Ok(ExitCode::SUCCESS)
}
