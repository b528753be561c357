//! capest CLI: capacity estimate for one side-view photograph.

use clap::Parser;
use std::path::{Path, PathBuf};

use capest::{CapacityPipeline, EstimateRequest, PipelineConfig, VolumeResult};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Parser)]
#[command(name = "capest")]
#[command(about = "Estimate the capacity of an axisymmetric container from a single side view")]
#[command(version)]
struct Cli {
    /// Path to the input image.
    #[arg(long)]
    image: PathBuf,

    /// Explicit scale in millimeters per pixel. Skips marker detection.
    #[arg(long)]
    mm_per_px: Option<f64>,

    /// Physical side length of the fiducial marker in millimeters.
    #[arg(long)]
    aruco_mm: Option<f64>,

    /// Wall thickness subtracted from each radius (metric results only).
    #[arg(long, default_value = "0.0")]
    wall_mm: f64,

    /// Directory for intermediate debug images.
    #[arg(long)]
    debug: Option<PathBuf>,

    /// Margin in pixels around the rotated mask's bounding box.
    #[arg(long, default_value = "20")]
    crop_margin: u32,

    /// Ask the external visual estimator for a scale when nothing else resolves.
    #[arg(long)]
    use_gemini: bool,

    /// External estimator model identifier.
    #[arg(long)]
    gemini_model: Option<String>,

    /// Directory for `<stem>_outline.png` overlays.
    #[arg(long)]
    outlines_dir: Option<PathBuf>,

    /// Segmentation model (ONNX path with the `onnx` feature).
    #[arg(long)]
    yolo_model: Option<String>,

    /// Segmentation confidence threshold in [0, 1].
    #[arg(long)]
    yolo_conf: Option<f32>,

    /// Segmentation inference size (default: max(640, min(h, w))).
    #[arg(long)]
    yolo_imgsz: Option<u32>,

    /// Pipeline configuration JSON. Flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Built-in fiducial marker dictionary (default DICT_5X5_100).
    #[arg(long)]
    marker_dictionary: Option<String>,
}

fn build_config(cli: &Cli) -> CliResult<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    }
    .with_env_overrides()?;

    if let Some(model) = &cli.gemini_model {
        config.external.model = model.clone();
    }
    if let Some(dir) = &cli.outlines_dir {
        config.outlines_dir = dir.clone();
    }
    if let Some(model) = &cli.yolo_model {
        config.segmentation.model = model.clone();
    }
    if let Some(conf) = cli.yolo_conf {
        config.segmentation.confidence = conf;
    }
    if let Some(imgsz) = cli.yolo_imgsz {
        config.segmentation.imgsz = Some(imgsz);
    }
    if let Some(dict) = &cli.marker_dictionary {
        config.fiducial.dictionary = dict.clone();
    }
    Ok(config)
}

fn build_request(cli: &Cli) -> EstimateRequest {
    EstimateRequest {
        mm_per_px: cli.mm_per_px,
        marker_mm: cli.aruco_mm,
        wall_mm: cli.wall_mm,
        crop_margin_px: cli.crop_margin,
        use_external: cli.use_gemini,
        debug_dir: cli.debug.clone(),
    }
}

/// `<dir>/<stem>_capacity.json` next to the input image.
fn result_path(image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    image.with_file_name(format!("{stem}_capacity.json"))
}

fn write_result(path: &Path, result: &VolumeResult) -> CliResult<()> {
    let json = serde_json::to_string_pretty(result)?;
    std::fs::write(path, json)?;
    Ok(())
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let pipeline = CapacityPipeline::new(build_config(&cli)?)?;
    tracing::info!("Loading image: {}", cli.image.display());

    let result = pipeline.process(&cli.image, &build_request(&cli))?;
    for line in result.summary_lines() {
        println!("{line}");
    }

    let out = result_path(&cli.image);
    match write_result(&out, &result) {
        Ok(()) => println!("Saved: {}", out.display()),
        Err(e) => tracing::warn!("failed to write {}: {e}", out.display()),
    }
    if let Some(outline) = &result.outline_path {
        println!("Saved outline: {outline}");
    }
    Ok(())
}
