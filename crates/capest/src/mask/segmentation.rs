//! Instance-segmentation mask extractor.
//!
//! The model backend sits behind [`InstanceSegmenter`]; loaded backends are
//! shared through an explicit [`SegmenterCache`] owned by whoever builds the
//! pipeline. Nothing here is process-global.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use image::imageops::FilterType;
use image::{GrayImage, RgbImage};

use super::{close_binary, largest_external_contour, Contour, MaskExtractor, MaskInput};
use crate::config::SegmentationConfig;
use crate::error::MaskError;
use crate::frame::{binarize, foreground_count};

/// One detected object instance.
#[derive(Debug, Clone)]
pub struct Instance {
    /// Class label as reported by the model.
    pub label: String,
    /// Detection confidence.
    pub score: f32,
    /// Binary mask; expected at frame resolution.
    pub mask: GrayImage,
}

/// Per-call inference settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceParams {
    /// Square inference resolution.
    pub imgsz: u32,
    /// Confidence threshold.
    pub confidence: f32,
    /// IoU threshold for non-maximum suppression.
    pub iou: f32,
}

/// A loaded instance-segmentation model.
pub trait InstanceSegmenter: Send + Sync {
    /// Detect instances in `frame`. Masks are returned at frame resolution.
    fn segment(&self, frame: &RgbImage, params: &InferenceParams)
        -> Result<Vec<Instance>, MaskError>;
}

/// Cache key: model identifier plus the inference configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelKey {
    pub model: String,
    confidence_bits: u32,
    iou_bits: u32,
    imgsz: Option<u32>,
}

impl ModelKey {
    pub fn from_config(config: &SegmentationConfig) -> Self {
        Self {
            model: config.model.clone(),
            confidence_bits: config.confidence.to_bits(),
            iou_bits: config.iou.to_bits(),
            imgsz: config.imgsz,
        }
    }
}

/// Creates segmenters on cache misses.
pub trait SegmenterLoader: Send + Sync {
    fn load(&self, key: &ModelKey) -> Result<Arc<dyn InstanceSegmenter>, MaskError>;
}

/// Loader for the backends compiled into this build.
///
/// With the `onnx` feature the model identifier is an ONNX file path;
/// without it every load fails with [`MaskError::ModelUnavailable`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSegmenterLoader;

impl SegmenterLoader for DefaultSegmenterLoader {
    #[cfg(feature = "onnx")]
    fn load(&self, key: &ModelKey) -> Result<Arc<dyn InstanceSegmenter>, MaskError> {
        let seg = super::onnx::OnnxYoloSegmenter::load(std::path::Path::new(&key.model))?;
        Ok(Arc::new(seg))
    }

    #[cfg(not(feature = "onnx"))]
    fn load(&self, key: &ModelKey) -> Result<Arc<dyn InstanceSegmenter>, MaskError> {
        Err(MaskError::ModelUnavailable(format!(
            "{}: built without the `onnx` feature",
            key.model
        )))
    }
}

/// Shared, lazily populated segmenter cache. Clones share entries.
#[derive(Clone, Default)]
pub struct SegmenterCache {
    entries: Arc<Mutex<HashMap<ModelKey, Arc<dyn InstanceSegmenter>>>>,
}

impl std::fmt::Debug for SegmenterCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmenterCache")
            .field("len", &self.len())
            .finish()
    }
}

impl SegmenterCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached segmenter for `key`, loading it on first use.
    ///
    /// Failed loads are not cached.
    pub fn get_or_load(
        &self,
        key: &ModelKey,
        loader: &dyn SegmenterLoader,
    ) -> Result<Arc<dyn InstanceSegmenter>, MaskError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(seg) = entries.get(key) {
            return Ok(Arc::clone(seg));
        }
        tracing::info!("loading segmentation model {}", key.model);
        let seg = loader.load(key)?;
        entries.insert(key.clone(), Arc::clone(&seg));
        Ok(seg)
    }

    /// Pre-populate an entry.
    pub fn insert(&self, key: ModelKey, segmenter: Arc<dyn InstanceSegmenter>) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, segmenter);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Pick the instance to measure.
///
/// The first instance whose label equals `preferred_label` (ignoring case)
/// wins; otherwise the instance with the most mask pixels.
pub fn select_instance(instances: &[Instance], preferred_label: &str) -> Option<usize> {
    if let Some(i) = instances
        .iter()
        .position(|inst| inst.label.eq_ignore_ascii_case(preferred_label))
    {
        return Some(i);
    }
    let mut best: Option<(usize, usize)> = None;
    for (i, inst) in instances.iter().enumerate() {
        let area = foreground_count(&inst.mask);
        if best.map_or(true, |(_, a)| area > a) {
            best = Some((i, area));
        }
    }
    best.map(|(i, _)| i)
}

/// Primary mask extractor backed by an instance-segmentation model.
pub struct SegmentationMaskExtractor {
    config: SegmentationConfig,
    cache: SegmenterCache,
    loader: Arc<dyn SegmenterLoader>,
}

impl SegmentationMaskExtractor {
    pub fn new(
        config: SegmentationConfig,
        cache: SegmenterCache,
        loader: Arc<dyn SegmenterLoader>,
    ) -> Self {
        Self {
            config,
            cache,
            loader,
        }
    }

    pub fn config(&self) -> &SegmentationConfig {
        &self.config
    }
}

impl MaskExtractor for SegmentationMaskExtractor {
    fn extract(&self, input: &MaskInput<'_>) -> Result<(GrayImage, Contour), MaskError> {
        let frame = input.frame;
        let (w, h) = frame.dimensions();
        let key = ModelKey::from_config(&self.config);
        let segmenter = self.cache.get_or_load(&key, self.loader.as_ref())?;

        let params = InferenceParams {
            imgsz: self.config.inference_size(w, h),
            confidence: self.config.confidence,
            iou: self.config.iou,
        };
        let instances = segmenter.segment(frame, &params)?;
        tracing::debug!("{} instances detected", instances.len());

        let pick =
            select_instance(&instances, &self.config.preferred_label).ok_or(MaskError::NoInstance)?;
        let chosen = &instances[pick];
        tracing::info!(
            "segmentation picked instance {} ('{}', score {:.2})",
            pick,
            chosen.label,
            chosen.score
        );

        let raw = if chosen.mask.dimensions() == (w, h) {
            binarize(&chosen.mask)
        } else {
            binarize(&image::imageops::resize(
                &chosen.mask,
                w,
                h,
                FilterType::Nearest,
            ))
        };
        let closed = close_binary(
            &raw,
            self.config.close_kernel,
            self.config.close_iterations,
        );
        let contour = largest_external_contour(&closed).ok_or(MaskError::EmptyMask)?;
        Ok((closed, contour))
    }
}
