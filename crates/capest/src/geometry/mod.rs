//! Silhouette geometry: axis alignment and solid-of-revolution integration.

mod integration;
mod rotation;

pub use integration::{VolumeIntegrator, MIN_ROWS};
pub use rotation::{principal_axis_angle, vertical_correction, RotationAligner, RotationResult};
