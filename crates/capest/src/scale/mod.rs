//! Pixel-to-millimeter scale resolution.
//!
//! Sources are tried in a fixed order and the first success wins:
//! explicit value → fiducial marker → external estimator. When every source
//! fails or is skipped the scale stays unresolved and the pipeline reports
//! pixel units. Source failures are [`ScaleError`] values, never propagated.

mod external;
mod fiducial;

use image::RgbImage;

use crate::error::ScaleError;

#[cfg(feature = "external")]
pub use external::GeminiScaleEstimator;
pub use external::{
    parse_scale_response, EstimatorReport, ScaleEstimate, ScaleQueryMeta, VisualScaleEstimator,
};
pub use fiducial::{DetectedMarker, FiducialMarkerEstimator};

/// Measures the scale from a marker of known physical size.
pub trait MarkerScaleSource {
    fn estimate_mm_per_px(&self, frame: &RgbImage, marker_mm: f64) -> Result<f64, ScaleError>;
}

/// Where an applied scale came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMethod {
    Explicit,
    Fiducial,
    External,
}

impl ScaleMethod {
    /// Resolution order.
    pub const CHAIN: [ScaleMethod; 3] = [Self::Explicit, Self::Fiducial, Self::External];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Explicit => "explicit",
            Self::Fiducial => "fiducial",
            Self::External => "external",
        }
    }
}

impl std::fmt::Display for ScaleMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to one resolution.
#[derive(Debug, Clone, Copy)]
pub struct ScaleQuery<'a> {
    /// Unrotated source frame.
    pub frame: &'a RgbImage,
    pub explicit_mm_per_px: Option<f64>,
    pub marker_mm: Option<f64>,
    pub use_external: bool,
    /// Pixel-unit measurement, passed to the external estimator.
    pub meta: &'a ScaleQueryMeta,
}

/// Outcome of the chain.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScaleResolution {
    pub mm_per_px: Option<f64>,
    pub method: Option<ScaleMethod>,
    /// External estimator answer (or failure) when it was consulted.
    pub estimator_output: Option<EstimatorReport>,
    /// Non-fatal faults of sources that were tried.
    pub notes: Vec<String>,
}

enum Attempt {
    Resolved(f64),
    Skipped,
    Failed(ScaleError),
}

/// Runs the scale priority chain.
pub struct ScaleResolver<'a> {
    marker: &'a dyn MarkerScaleSource,
    external: Option<&'a dyn VisualScaleEstimator>,
}

impl<'a> ScaleResolver<'a> {
    pub fn new(
        marker: &'a dyn MarkerScaleSource,
        external: Option<&'a dyn VisualScaleEstimator>,
    ) -> Self {
        Self { marker, external }
    }

    pub fn resolve(&self, query: &ScaleQuery<'_>) -> ScaleResolution {
        let mut out = ScaleResolution::default();
        for method in ScaleMethod::CHAIN {
            match self.attempt(method, query, &mut out) {
                Attempt::Resolved(mm_per_px) => {
                    tracing::info!("scale {mm_per_px:.6} mm/px from {method}");
                    out.mm_per_px = Some(mm_per_px);
                    out.method = Some(method);
                    return out;
                }
                Attempt::Skipped => {}
                Attempt::Failed(err) => {
                    tracing::warn!("{method} scale unavailable: {err}");
                    out.notes.push(format!("{method} scale unavailable: {err}"));
                }
            }
        }
        tracing::info!("no scale resolved");
        out
    }

    fn attempt(
        &self,
        method: ScaleMethod,
        query: &ScaleQuery<'_>,
        out: &mut ScaleResolution,
    ) -> Attempt {
        match method {
            ScaleMethod::Explicit => match query.explicit_mm_per_px {
                Some(v) => Attempt::Resolved(v),
                None => Attempt::Skipped,
            },
            ScaleMethod::Fiducial => match query.marker_mm {
                Some(mm) => match self.marker.estimate_mm_per_px(query.frame, mm) {
                    Ok(v) => Attempt::Resolved(v),
                    Err(e) => Attempt::Failed(e),
                },
                None => Attempt::Skipped,
            },
            ScaleMethod::External => {
                if !query.use_external {
                    return Attempt::Skipped;
                }
                let Some(estimator) = self.external else {
                    return Attempt::Failed(ScaleError::CapabilityUnavailable(
                        "external scale estimation",
                    ));
                };
                match estimator.estimate(query.frame, query.meta) {
                    Ok(estimate) => {
                        let usable = estimate.usable_scale();
                        out.estimator_output = Some(EstimatorReport::Estimate(estimate));
                        usable.map_or(Attempt::Failed(ScaleError::Declined), Attempt::Resolved)
                    }
                    Err(e) => {
                        out.estimator_output = Some(EstimatorReport::Failed {
                            error: e.to_string(),
                        });
                        Attempt::Failed(e)
                    }
                }
            }
        }
    }
}
