use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use capest::mask::{InferenceParams, ModelKey};
use capest::{Instance, InstanceSegmenter, MaskError, SegmenterLoader};
use image::{GrayImage, RgbImage};

/// Segmenter that always reports one instance with a fixed mask.
pub struct FixedSegmenter {
    pub label: String,
    pub mask: GrayImage,
}

impl InstanceSegmenter for FixedSegmenter {
    fn segment(&self, _: &RgbImage, _: &InferenceParams) -> Result<Vec<Instance>, MaskError> {
        Ok(vec![Instance {
            label: self.label.clone(),
            score: 0.9,
            mask: self.mask.clone(),
        }])
    }
}

/// Loader handing out a [`FixedSegmenter`]; counts loads.
pub struct FixedLoader {
    pub mask: GrayImage,
    pub loads: AtomicUsize,
}

impl FixedLoader {
    pub fn new(mask: GrayImage) -> Arc<Self> {
        Arc::new(Self {
            mask,
            loads: AtomicUsize::new(0),
        })
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl SegmenterLoader for FixedLoader {
    fn load(&self, _: &ModelKey) -> Result<Arc<dyn InstanceSegmenter>, MaskError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(FixedSegmenter {
            label: "bottle".to_string(),
            mask: self.mask.clone(),
        }))
    }
}

/// Loader that never has a model.
pub struct MissingModelLoader;

impl SegmenterLoader for MissingModelLoader {
    fn load(&self, key: &ModelKey) -> Result<Arc<dyn InstanceSegmenter>, MaskError> {
        Err(MaskError::ModelUnavailable(key.model.clone()))
    }
}
