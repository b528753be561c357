//! Output shapes of the collaborating services, and the mass arithmetic that
//! combines them with a capacity estimate.
//!
//! Only the boundary lives here: the detection service and the density
//! service are run elsewhere and their outputs are handed in as text.

use serde::{Deserialize, Serialize};

/// Density used when the density service gives nothing usable (water).
pub const DEFAULT_DENSITY_G_ML: f64 = 1.0;

/// Marker line preceding the detection JSON in the detection service output.
pub const DETECTION_RESULTS_MARKER: &str = "--- Detection Results ---";

/// Non-food classes (plate, utensils, ...) never picked as the main food.
pub const IGNORED_CLASSES: [i64; 10] = [58, 31, 42, 70, 83, 25, 27, 22, 11, 8];
/// Leftover/garbage classes.
pub const GARBAGE_CLASSES: [i64; 1] = [35];

/// One detected object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub label: f64,
    #[serde(default)]
    pub label_name: Option<String>,
    #[serde(default)]
    pub area: f64,
}

impl DetectedObject {
    fn class_id(&self) -> Option<i64> {
        (self.label.fract() == 0.0).then_some(self.label as i64)
    }

    fn is_food(&self) -> bool {
        self.class_id()
            .map_or(true, |c| !IGNORED_CLASSES.contains(&c) && !GARBAGE_CLASSES.contains(&c))
    }
}

/// Detection service report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    /// Share of the plate covered by food, 0 to 100.
    pub food_percentage: f64,
    #[serde(default)]
    pub objects: Vec<DetectedObject>,
}

impl DetectionReport {
    /// Food share as a fraction in [0, 1].
    pub fn food_fraction(&self) -> f64 {
        self.food_percentage / 100.0
    }

    /// Name of the largest-area food object.
    pub fn main_food(&self) -> Option<&str> {
        let mut best: Option<&DetectedObject> = None;
        for obj in self.objects.iter().filter(|o| o.is_food()) {
            if obj.area > best.map_or(0.0, |b| b.area) {
                best = Some(obj);
            }
        }
        best.and_then(|o| o.label_name.as_deref())
    }
}

/// Pull the detection JSON out of the detection service's stdout.
pub fn parse_detection_output(stdout: &str) -> Option<DetectionReport> {
    let start = stdout.find(DETECTION_RESULTS_MARKER)? + DETECTION_RESULTS_MARKER.len();
    let json = first_json_object(&stdout[start..])?;
    serde_json::from_str(json).ok()
}

/// Density service answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityEstimate {
    pub density_g_ml: f64,
    pub food_identified: String,
    #[serde(default)]
    pub rationale: Option<String>,
}

/// Widest `{ ... }` span in `text`.
fn first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Density in g/mL from the density service's free-text answer.
///
/// A numeric `density_g_ml` is used even if the rest of the schema is
/// missing; anything else falls back to [`DEFAULT_DENSITY_G_ML`].
pub fn parse_density_response(text: &str) -> f64 {
    let json = first_json_object(text).unwrap_or(text);
    let value: serde_json::Value = match serde_json::from_str(json) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!("density response is not JSON ({e}); assuming water");
            return DEFAULT_DENSITY_G_ML;
        }
    };
    match serde_json::from_value::<DensityEstimate>(value.clone()) {
        Ok(est) => {
            tracing::info!("density for '{}': {} g/mL", est.food_identified, est.density_g_ml);
            est.density_g_ml
        }
        Err(e) => match value.get("density_g_ml").and_then(|d| d.as_f64()) {
            Some(d) => {
                tracing::warn!("density schema incomplete ({e}), using density_g_ml={d}");
                d
            }
            None => {
                tracing::warn!("density response does not match schema ({e}); assuming water");
                DEFAULT_DENSITY_G_ML
            }
        },
    }
}

/// Prompt sent to the density service for `food_name`.
pub fn density_prompt(food_name: &str) -> String {
    format!(
        "Provide the density (in g/mL) for this food item and return only JSON with keys: \
         density_g_ml (number), food_identified (string), rationale (optional string). \
         Food: {food_name}"
    )
}

/// Extract `Estimated volume: <x> mL` from a capacity summary.
pub fn parse_summary_volume_ml(summary: &str) -> Option<f64> {
    summary.lines().find_map(|line| {
        let rest = line.trim().strip_prefix("Estimated volume:")?;
        let value = rest.trim().strip_suffix("mL")?;
        value.trim().parse().ok()
    })
}

/// Food mass in grams: container volume × food share × density.
pub fn estimate_food_mass_g(volume_ml: f64, food_fraction: f64, density_g_ml: f64) -> f64 {
    volume_ml * food_fraction * density_g_ml
}
