//! Error taxonomy for the capacity pipeline.
//!
//! Geometry-stage errors ([`MaskError`], [`VolumeError`], and the
//! frame/crop variants of [`CapacityError`]) abort an invocation.
//! [`ScaleError`] is only ever carried as a value: the scale resolver turns
//! it into a note and moves on to the next source.

use std::path::PathBuf;

use thiserror::Error;

/// Failures of a single mask extractor.
#[derive(Debug, Error)]
pub enum MaskError {
    /// The segmentation model returned zero instances.
    #[error("segmentation found no instances")]
    NoInstance,
    /// Post-processing erased the selected instance mask.
    #[error("mask is empty after post-processing")]
    EmptyMask,
    /// Thresholding produced no external contour.
    #[error("no contours found")]
    NoContour,
    /// The segmentation model could not be loaded.
    #[error("segmentation model unavailable: {0}")]
    ModelUnavailable(String),
    /// The segmentation backend failed while running inference.
    #[error("segmentation inference failed: {0}")]
    Inference(String),
}

/// Failures of the disk-stacking integrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VolumeError {
    /// Fewer foreground rows than the integrator requires.
    #[error("object too small: {rows} foreground rows, need at least {min_rows}")]
    ObjectTooSmall {
        /// Foreground rows found in the mask.
        rows: usize,
        /// Minimum number of rows required.
        min_rows: usize,
    },
}

/// Failures of one scale source. Never fatal.
#[derive(Debug, Error)]
pub enum ScaleError {
    /// No fiducial marker was found in the frame.
    #[error("no fiducial marker detected")]
    NoMarker,
    /// The requested scale source is not compiled into this build.
    #[error("{0} support is not available in this build")]
    CapabilityUnavailable(&'static str),
    /// The configured marker dictionary is not a known built-in family.
    #[error("unknown marker dictionary: {0}")]
    UnknownDictionary(String),
    /// The physical marker size is not a positive finite number.
    #[error("invalid marker size: {0} mm")]
    InvalidMarkerSize(f64),
    /// The external estimator has no API credential configured.
    #[error("no API key configured for the external estimator")]
    MissingCredential,
    /// The external estimator could not be reached.
    #[error("external estimator transport failure: {0}")]
    Transport(String),
    /// The external estimator answered but could not provide a scale.
    #[error("external estimator declined to estimate a scale")]
    Declined,
    /// The external estimator response was not a usable scale estimate.
    #[error("malformed external estimator response: {0}")]
    MalformedResponse(String),
}

/// Fatal errors of one pipeline invocation.
#[derive(Debug, Error)]
pub enum CapacityError {
    /// The input image is missing or cannot be decoded.
    #[error("failed to load image {}: {source}", path.display())]
    FrameLoad {
        /// Path that was requested.
        path: PathBuf,
        /// Decoder or I/O failure.
        #[source]
        source: image::ImageError,
    },
    /// Both the segmentation extractor and the contour fallback failed.
    #[error("mask extraction failed (segmentation: {primary}; contour fallback: {fallback})")]
    MaskExtraction {
        /// Error raised by the segmentation extractor.
        primary: MaskError,
        /// Error raised by the contour extractor.
        fallback: MaskError,
    },
    /// Volume integration rejected the mask.
    #[error(transparent)]
    Volume(#[from] VolumeError),
    /// The rotated or cropped mask has no foreground pixels.
    #[error("mask vanished after rotation/crop")]
    MaskVanished,
    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Filesystem failure outside the non-fatal artifact writers.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Configuration JSON could not be parsed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
