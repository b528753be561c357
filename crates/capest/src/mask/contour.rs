//! Threshold-based fallback extractor.

use image::GrayImage;

use super::{close_binary, fill_contour, largest_external_contour, Contour, MaskExtractor, MaskInput};
use crate::config::ContourConfig;
use crate::error::MaskError;
use crate::frame::adaptive_threshold_inv;

/// Extracts the dominant dark-on-light object from a blurred gray frame.
///
/// equalize → inverted Gaussian adaptive threshold → median → closing →
/// largest external contour, filled.
#[derive(Debug, Clone, Default)]
pub struct ContourMaskExtractor {
    config: ContourConfig,
}

impl ContourMaskExtractor {
    pub fn new(config: ContourConfig) -> Self {
        Self { config }
    }

    /// Run the extractor directly on a gray image.
    pub fn extract_gray(&self, gray: &GrayImage) -> Result<(GrayImage, Contour), MaskError> {
        let cfg = &self.config;
        let eq = imageproc::contrast::equalize_histogram(gray);
        let thr = adaptive_threshold_inv(&eq, cfg.block_size, cfg.offset);
        let radius = cfg.median_kernel / 2;
        let thr = imageproc::filter::median_filter(&thr, radius, radius);
        let thr = close_binary(&thr, cfg.close_kernel, cfg.close_iterations);

        let contour = largest_external_contour(&thr).ok_or(MaskError::NoContour)?;
        let (w, h) = gray.dimensions();
        tracing::debug!("contour fallback: {} boundary points", contour.len());
        Ok((fill_contour(w, h, &contour), contour))
    }
}

impl MaskExtractor for ContourMaskExtractor {
    fn extract(&self, input: &MaskInput<'_>) -> Result<(GrayImage, Contour), MaskError> {
        self.extract_gray(input.gray_blurred)
    }
}
