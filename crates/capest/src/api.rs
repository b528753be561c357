//! High-level estimation API.
//!
//! [`CapacityPipeline`] is the primary entry point. It owns a
//! [`PipelineConfig`], the segmentation model cache, and the scale sources,
//! so one instance can be reused across many images.

use std::path::Path;
use std::sync::Arc;

use image::RgbImage;

use crate::config::{EstimateRequest, PipelineConfig};
use crate::error::CapacityError;
use crate::frame::load_frame;
use crate::mask::{
    ContourMaskExtractor, DefaultSegmenterLoader, SegmentationMaskExtractor, SegmenterCache,
    SegmenterLoader,
};
use crate::outline::OutlineDrawer;
use crate::pipeline::{self, StageSet, VolumeResult};
use crate::scale::{FiducialMarkerEstimator, MarkerScaleSource, VisualScaleEstimator};

/// Primary estimation interface.
///
/// # Examples
///
/// ```no_run
/// use capest::{CapacityPipeline, EstimateRequest, PipelineConfig};
/// use std::path::Path;
///
/// let pipeline = CapacityPipeline::new(PipelineConfig::default()).unwrap();
/// let request = EstimateRequest {
///     marker_mm: Some(50.0),
///     ..Default::default()
/// };
/// let result = pipeline.process(Path::new("bottle.jpg"), &request).unwrap();
/// for line in result.summary_lines() {
///     println!("{line}");
/// }
/// ```
pub struct CapacityPipeline {
    config: PipelineConfig,
    segmenters: SegmenterCache,
    loader: Arc<dyn SegmenterLoader>,
    marker: Box<dyn MarkerScaleSource + Send + Sync>,
    external: Option<Box<dyn VisualScaleEstimator>>,
    outline: OutlineDrawer,
}

impl std::fmt::Debug for CapacityPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapacityPipeline")
            .field("config", &self.config)
            .field("segmenters", &self.segmenters)
            .field("external", &self.external.is_some())
            .finish()
    }
}

impl CapacityPipeline {
    /// Create a pipeline with the backends compiled into this build.
    pub fn new(config: PipelineConfig) -> Result<Self, CapacityError> {
        config.validate()?;
        let marker = Box::new(FiducialMarkerEstimator::new(config.fiducial.clone()));
        Ok(Self {
            external: default_external(&config),
            marker,
            config,
            segmenters: SegmenterCache::new(),
            loader: Arc::new(DefaultSegmenterLoader),
            outline: OutlineDrawer::default(),
        })
    }

    /// Share a segmentation model cache with other pipelines.
    pub fn with_segmenter_cache(mut self, cache: SegmenterCache) -> Self {
        self.segmenters = cache;
        self
    }

    /// Replace the loader used on segmentation cache misses.
    pub fn with_segmenter_loader(mut self, loader: Arc<dyn SegmenterLoader>) -> Self {
        self.loader = loader;
        self
    }

    /// Replace the fiducial scale source.
    pub fn with_marker_source(mut self, marker: Box<dyn MarkerScaleSource + Send + Sync>) -> Self {
        self.marker = marker;
        self
    }

    /// Replace the external visual estimator.
    pub fn with_external_estimator(mut self, estimator: Box<dyn VisualScaleEstimator>) -> Self {
        self.external = Some(estimator);
        self
    }

    pub fn with_outline_drawer(mut self, outline: OutlineDrawer) -> Self {
        self.outline = outline;
        self
    }

    /// Access the current configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Segmentation models loaded so far.
    pub fn segmenter_cache(&self) -> &SegmenterCache {
        &self.segmenters
    }

    /// Load an image and estimate its capacity. The outline file is named
    /// after the image's file stem.
    pub fn process(
        &self,
        image_path: &Path,
        request: &EstimateRequest,
    ) -> Result<VolumeResult, CapacityError> {
        let frame = load_frame(image_path)?;
        let stem = image_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        self.run(&frame, &stem, Some(image_path), request)
    }

    /// Estimate capacity for an already decoded frame.
    pub fn process_frame(
        &self,
        frame: &RgbImage,
        stem: &str,
        request: &EstimateRequest,
    ) -> Result<VolumeResult, CapacityError> {
        self.run(frame, stem, None, request)
    }

    fn run(
        &self,
        frame: &RgbImage,
        stem: &str,
        source_path: Option<&Path>,
        request: &EstimateRequest,
    ) -> Result<VolumeResult, CapacityError> {
        let segmentation = SegmentationMaskExtractor::new(
            self.config.segmentation.clone(),
            self.segmenters.clone(),
            Arc::clone(&self.loader),
        );
        let contour = ContourMaskExtractor::new(self.config.contour.clone());
        let stages = StageSet {
            segmentation: &segmentation,
            contour: &contour,
            marker: self.marker.as_ref(),
            external: self.external.as_deref(),
            outline: self.outline,
            blur_kernel: self.config.blur_kernel,
            outlines_dir: Some(self.config.outlines_dir.as_path()),
        };
        pipeline::run(frame, stem, source_path, request, &stages)
    }
}

#[cfg(feature = "external")]
fn default_external(config: &PipelineConfig) -> Option<Box<dyn VisualScaleEstimator>> {
    Some(Box::new(crate::scale::GeminiScaleEstimator::new(
        config.external.clone(),
    )))
}

#[cfg(not(feature = "external"))]
fn default_external(_config: &PipelineConfig) -> Option<Box<dyn VisualScaleEstimator>> {
    None
}
