//! Binary object masks and their boundary contours.
//!
//! Two extractors produce the same `(mask, contour)` pair:
//! - [`SegmentationMaskExtractor`]: instance segmentation (primary)
//! - [`ContourMaskExtractor`]: adaptive threshold + contour tracing (fallback)
//!
//! The fallback policy is not part of either extractor; the pipeline chains
//! them through [`extract_with_fallback`].

mod contour;
#[cfg(feature = "onnx")]
mod onnx;
mod segmentation;

use image::{GrayImage, Luma, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::point::Point;

use crate::error::{CapacityError, MaskError};
use crate::frame::FOREGROUND;

pub use contour::ContourMaskExtractor;
#[cfg(feature = "onnx")]
pub use onnx::OnnxYoloSegmenter;
pub use segmentation::{
    select_instance, DefaultSegmenterLoader, InferenceParams, Instance, InstanceSegmenter,
    ModelKey, SegmentationMaskExtractor, SegmenterCache, SegmenterLoader,
};

/// Closed polygon (integer pixel coordinates) around a mask's foreground.
pub type Contour = Vec<Point<i32>>;

/// Inputs available to every extractor.
#[derive(Debug, Clone, Copy)]
pub struct MaskInput<'a> {
    /// Original color frame.
    pub frame: &'a RgbImage,
    /// Grayscale frame after the Gaussian pre-blur.
    pub gray_blurred: &'a GrayImage,
}

/// A mask extraction strategy.
pub trait MaskExtractor {
    /// Produce a binary mask (values {0, 255}) and the contour enclosing it.
    fn extract(&self, input: &MaskInput<'_>) -> Result<(GrayImage, Contour), MaskError>;
}

/// Which extractor produced the mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskSource {
    Segmentation,
    Contour,
}

/// Mask, contour, and provenance after the fallback policy ran.
#[derive(Debug, Clone)]
pub struct ExtractedMask {
    pub mask: GrayImage,
    pub contour: Contour,
    pub source: MaskSource,
}

/// Run `primary`; on any error retry with `fallback` on the same input.
pub fn extract_with_fallback(
    primary: &dyn MaskExtractor,
    fallback: &dyn MaskExtractor,
    input: &MaskInput<'_>,
) -> Result<ExtractedMask, CapacityError> {
    let primary_err = match primary.extract(input) {
        Ok((mask, contour)) => {
            return Ok(ExtractedMask {
                mask,
                contour,
                source: MaskSource::Segmentation,
            })
        }
        Err(e) => e,
    };
    tracing::warn!("segmentation mask failed ({primary_err}); using contour fallback");

    match fallback.extract(input) {
        Ok((mask, contour)) => Ok(ExtractedMask {
            mask,
            contour,
            source: MaskSource::Contour,
        }),
        Err(fallback_err) => Err(CapacityError::MaskExtraction {
            primary: primary_err,
            fallback: fallback_err,
        }),
    }
}

/// Morphological closing with a square `kernel` applied `iterations` times.
///
/// Repeated dilation (then erosion) by a square is a single dilation by a
/// square of radius `iterations * kernel / 2`, which is what `close` takes.
pub fn close_binary(mask: &GrayImage, kernel: u32, iterations: u32) -> GrayImage {
    let radius = (kernel / 2).saturating_mul(iterations).min(u8::MAX as u32) as u8;
    if radius == 0 {
        return mask.clone();
    }
    imageproc::morphology::close(mask, Norm::LInf, radius)
}

/// Shoelace area of a closed polygon.
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut acc = 0i64;
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        acc += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    (acc as f64 * 0.5).abs()
}

/// Outer borders that are not nested inside any hole.
pub fn external_contours(mask: &GrayImage) -> Vec<Contour> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| c.points)
        .filter(|pts| !pts.is_empty())
        .collect()
}

/// External contour with the largest enclosed area (first wins on ties).
pub fn largest_external_contour(mask: &GrayImage) -> Option<Contour> {
    let mut best: Option<(f64, Contour)> = None;
    for c in external_contours(mask) {
        let area = polygon_area(&c);
        match &best {
            Some((best_area, _)) if *best_area >= area => {}
            _ => best = Some((area, c)),
        }
    }
    best.map(|(_, c)| c)
}

/// Rasterize a contour as a filled polygon (boundary included).
pub fn fill_contour(width: u32, height: u32, contour: &[Point<i32>]) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    let mut poly: Vec<Point<i32>> = Vec::with_capacity(contour.len());
    for &p in contour {
        if poly.last() != Some(&p) {
            poly.push(p);
        }
    }
    while poly.len() > 1 && poly.first() == poly.last() {
        poly.pop();
    }
    if poly.len() >= 3 {
        imageproc::drawing::draw_polygon_mut(&mut mask, &poly, Luma([FOREGROUND]));
    }
    for p in contour {
        if p.x >= 0 && p.y >= 0 && (p.x as u32) < width && (p.y as u32) < height {
            mask.put_pixel(p.x as u32, p.y as u32, Luma([FOREGROUND]));
        }
    }
    mask
}
