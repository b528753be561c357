//! Pipeline configuration.
//!
//! Every section carries its own `Default`, and the whole tree deserializes
//! with `#[serde(default)]`, so a JSON file only needs the fields it
//! overrides. Environment overrides mirror the variables used by the
//! deployment scripts (`GEMINI_API_KEY`, `YOLO_MODEL`, ...).

use std::path::{Path, PathBuf};

use crate::error::CapacityError;

/// Default segmentation model identifier.
pub const DEFAULT_SEGMENTATION_MODEL: &str = "yolov8n-seg.onnx";
/// Default external estimator model identifier.
pub const DEFAULT_EXTERNAL_MODEL: &str = "gemini-2.5-flash";
/// Default external estimator API root.
pub const DEFAULT_EXTERNAL_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
/// Default directory for audit outlines.
pub const DEFAULT_OUTLINES_DIR: &str = "outputs/outlines";

/// Instance-segmentation extractor settings.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Model identifier (a path for the ONNX backend).
    pub model: String,
    /// Minimum detection confidence in [0, 1].
    pub confidence: f32,
    /// IoU threshold used by non-maximum suppression.
    pub iou: f32,
    /// Inference resolution override. `None` means `max(640, min(h, w))`.
    pub imgsz: Option<u32>,
    /// Closing kernel side (square) applied to the chosen instance mask.
    pub close_kernel: u32,
    /// Closing iterations applied to the chosen instance mask.
    pub close_iterations: u32,
    /// Label preferred over the largest-mask rule (case-insensitive).
    pub preferred_label: String,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_SEGMENTATION_MODEL.to_string(),
            confidence: 0.25,
            iou: 0.5,
            imgsz: None,
            close_kernel: 5,
            close_iterations: 2,
            preferred_label: "bottle".to_string(),
        }
    }
}

impl SegmentationConfig {
    /// Inference resolution for a frame of the given size.
    pub fn inference_size(&self, width: u32, height: u32) -> u32 {
        self.imgsz.unwrap_or_else(|| width.min(height).max(640))
    }
}

/// Threshold-based contour extractor settings.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ContourConfig {
    /// Adaptive-threshold neighbourhood (odd, pixels).
    pub block_size: u32,
    /// Constant subtracted from the Gaussian-weighted local mean.
    pub offset: f32,
    /// Median filter kernel side (odd, pixels).
    pub median_kernel: u32,
    /// Closing kernel side (square).
    pub close_kernel: u32,
    /// Closing iterations.
    pub close_iterations: u32,
}

impl Default for ContourConfig {
    fn default() -> Self {
        Self {
            block_size: 31,
            offset: 2.0,
            median_kernel: 5,
            close_kernel: 5,
            close_iterations: 2,
        }
    }
}

pub const DEFAULT_MARKER_DICTIONARY: &str = "DICT_5X5_100";

/// Fiducial marker detection settings.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FiducialConfig {
    /// Built-in marker dictionary name, e.g. `DICT_5X5_100`.
    pub dictionary: String,
    /// Border width in cells.
    pub border_bits: usize,
    /// Maximum Hamming distance accepted when matching a dictionary codeword.
    pub max_hamming: u8,
    /// Adaptive-threshold neighbourhood (odd, pixels).
    pub threshold_block: u32,
    /// Constant subtracted from the local mean during thresholding.
    pub threshold_offset: f32,
    /// Polygon approximation tolerance as a fraction of the contour perimeter.
    pub polygon_accuracy: f64,
    /// Minimum quad perimeter in pixels.
    pub min_perimeter_px: f64,
    /// Maximum allowed ratio between the longest and shortest quad side.
    pub max_side_ratio: f64,
}

impl Default for FiducialConfig {
    fn default() -> Self {
        Self {
            dictionary: DEFAULT_MARKER_DICTIONARY.to_string(),
            border_bits: 1,
            max_hamming: 1,
            threshold_block: 23,
            threshold_offset: 7.0,
            polygon_accuracy: 0.03,
            min_perimeter_px: 40.0,
            max_side_ratio: 4.0,
        }
    }
}

/// External visual-reasoning estimator settings.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ExternalConfig {
    /// API credential. Never serialized.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Model identifier.
    pub model: String,
    /// API root, without the `/models/...` suffix.
    pub endpoint: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for ExternalConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_EXTERNAL_MODEL.to_string(),
            endpoint: DEFAULT_EXTERNAL_ENDPOINT.to_string(),
            timeout_secs: 60,
        }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Gaussian pre-blur kernel side applied before contour extraction.
    pub blur_kernel: u32,
    /// Directory receiving `<stem>_outline.png` audit images.
    pub outlines_dir: PathBuf,
    pub segmentation: SegmentationConfig,
    pub contour: ContourConfig,
    pub fiducial: FiducialConfig,
    pub external: ExternalConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            blur_kernel: 5,
            outlines_dir: PathBuf::from(DEFAULT_OUTLINES_DIR),
            segmentation: SegmentationConfig::default(),
            contour: ContourConfig::default(),
            fiducial: FiducialConfig::default(),
            external: ExternalConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file. Missing fields keep defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, CapacityError> {
        let data = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self, CapacityError> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup (environment-shaped).
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self, CapacityError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("GEMINI_API_KEY") {
            self.external.api_key = Some(key);
        }
        if let Some(model) = get("GEMINI_MODEL") {
            self.external.model = model;
        }
        if let Some(model) = get("YOLO_MODEL") {
            self.segmentation.model = model;
        }
        if let Some(conf) = get("YOLO_CONF") {
            self.segmentation.confidence = conf
                .trim()
                .parse()
                .map_err(|e| CapacityError::Config(format!("YOLO_CONF={conf}: {e}")))?;
        }
        if let Some(imgsz) = get("YOLO_IMGSZ") {
            self.segmentation.imgsz = Some(
                imgsz
                    .trim()
                    .parse()
                    .map_err(|e| CapacityError::Config(format!("YOLO_IMGSZ={imgsz}: {e}")))?,
            );
        }
        if let Some(dir) = get("OUTLINES_DIR") {
            self.outlines_dir = PathBuf::from(dir);
        }

        self.validate()?;
        Ok(self)
    }

    /// Reject values the extractors cannot work with.
    pub fn validate(&self) -> Result<(), CapacityError> {
        let odd = |name: &str, v: u32| {
            if v == 0 || v % 2 == 0 {
                Err(CapacityError::Config(format!("{name} must be odd, got {v}")))
            } else {
                Ok(())
            }
        };
        odd("blur_kernel", self.blur_kernel)?;
        odd("contour.block_size", self.contour.block_size)?;
        odd("contour.median_kernel", self.contour.median_kernel)?;
        odd("contour.close_kernel", self.contour.close_kernel)?;
        odd("segmentation.close_kernel", self.segmentation.close_kernel)?;
        odd("fiducial.threshold_block", self.fiducial.threshold_block)?;

        if !(0.0..=1.0).contains(&self.segmentation.confidence) {
            return Err(CapacityError::Config(format!(
                "segmentation.confidence must be in [0, 1], got {}",
                self.segmentation.confidence
            )));
        }
        #[cfg(feature = "fiducial")]
        if calib_targets_aruco::builtins::builtin_dictionary(&self.fiducial.dictionary).is_none() {
            return Err(CapacityError::Config(format!(
                "fiducial.dictionary: unknown built-in dictionary {:?}",
                self.fiducial.dictionary
            )));
        }
        if self.fiducial.border_bits == 0 {
            return Err(CapacityError::Config(
                "fiducial.border_bits must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-invocation inputs.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EstimateRequest {
    /// Explicit scale. When present no other scale source is consulted.
    pub mm_per_px: Option<f64>,
    /// Physical side length of the fiducial marker in millimeters.
    pub marker_mm: Option<f64>,
    /// Wall thickness subtracted from each radius (metric mode only).
    pub wall_mm: f64,
    /// Margin added around the rotated mask's bounding box.
    pub crop_margin_px: u32,
    /// Consult the external visual estimator as a last resort.
    pub use_external: bool,
    /// Directory for intermediate debug images.
    pub debug_dir: Option<PathBuf>,
}

impl Default for EstimateRequest {
    fn default() -> Self {
        Self {
            mm_per_px: None,
            marker_mm: None,
            wall_mm: 0.0,
            crop_margin_px: 20,
            use_external: false,
            debug_dir: None,
        }
    }
}
