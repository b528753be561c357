//! The externally visible result record.

use serde::{Deserialize, Serialize};

use crate::mask::MaskSource;
use crate::scale::{EstimatorReport, ScaleMethod};

pub const NOTE_PIXEL_UNITS: &str = "No scale resolved; reporting in pixel units.";
pub const NOTE_INNER_CAPACITY: &str = "Inner capacity (wall subtracted).";
pub const NOTE_OUTER_VOLUME: &str = "Outer volume (no wall subtraction).";

/// Unit labels of a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Units {
    pub volume: String,
    pub height: String,
}

impl Units {
    pub fn pixel() -> Self {
        Self {
            volume: "px^3".to_string(),
            height: "px".to_string(),
        }
    }

    pub fn metric() -> Self {
        Self {
            volume: "mL".to_string(),
            height: "mm".to_string(),
        }
    }

    pub fn is_metric(&self) -> bool {
        self.volume == "mL"
    }
}

/// Capacity estimate for one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeResult {
    /// px³ or mL.
    pub volume: f64,
    /// px or mm.
    pub height: f64,
    pub units: Units,
    pub notes: String,
    pub rotation_applied_deg: f64,
    /// `[y1, y2, x1, x2]`, inclusive, in the rotated frame.
    pub crop: [u32; 4],
    pub mask_source: MaskSource,
    pub outline_path: Option<String>,
    pub scale_mm_per_px: Option<f64>,
    pub scale_source: Option<ScaleMethod>,
    pub scale_estimator_output: Option<EstimatorReport>,
}

impl VolumeResult {
    /// Human-readable summary, one line per item.
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if self.units.is_metric() {
            lines.push(format!("Estimated volume: {:.2} {}", self.volume, self.units.volume));
            lines.push(format!("Estimated height: {:.1} {}", self.height, self.units.height));
            if let Some(s) = self.scale_mm_per_px {
                lines.push(format!("Scale: {s:.6} mm/px"));
            }
        } else {
            lines.push(format!("Estimated volume: {:.0} {}", self.volume, self.units.volume));
            lines.push(format!("Estimated height: {:.1} {}", self.height, self.units.height));
            if let Some(EstimatorReport::Estimate(est)) = &self.scale_estimator_output {
                if let Some(s) = est.mm_per_px {
                    lines.push(format!("External scale estimate: {s:.6} mm/px"));
                }
            }
        }
        lines.push(self.notes.clone());
        lines
    }
}
