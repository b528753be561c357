//! capest: single-view capacity estimation for axisymmetric objects.
//!
//! A side-view photograph of a bottle, jar or glass is turned into a
//! solid-of-revolution volume estimate. The pipeline stages are:
//!
//! 1. **Mask**: instance segmentation, with an adaptive-threshold contour
//!    extractor as automatic fallback.
//! 2. **Rotation**: principal axis of the contour brought to vertical.
//! 3. **Integration**: disk stacking over the rows of the cropped mask.
//! 4. **Scale**: explicit value, then a square fiducial marker, then an
//!    optional external visual estimator. Without a scale the result stays in
//!    pixel units.
//!
//! # Public API
//! - [`CapacityPipeline`] with [`PipelineConfig`] and [`EstimateRequest`]
//! - [`VolumeResult`] as the result record
//! - stage traits ([`MaskExtractor`], [`InstanceSegmenter`],
//!   [`MarkerScaleSource`], [`VisualScaleEstimator`]) for custom backends

mod api;
pub mod collab;
pub mod config;
pub mod debug_dump;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod mask;
pub mod outline;
pub mod pipeline;
pub mod scale;

#[cfg(test)]
pub(crate) mod test_utils;

pub use api::CapacityPipeline;
pub use config::{
    ContourConfig, EstimateRequest, ExternalConfig, FiducialConfig, PipelineConfig,
    SegmentationConfig,
};
pub use error::{CapacityError, MaskError, ScaleError, VolumeError};
pub use geometry::{RotationAligner, RotationResult, VolumeIntegrator};
pub use mask::{
    ContourMaskExtractor, ExtractedMask, Instance, InstanceSegmenter, MaskExtractor, MaskSource,
    SegmentationMaskExtractor, SegmenterCache, SegmenterLoader,
};
pub use pipeline::{Units, VolumeResult};
pub use scale::{
    FiducialMarkerEstimator, MarkerScaleSource, ScaleEstimate, ScaleMethod, ScaleResolver,
    VisualScaleEstimator,
};
