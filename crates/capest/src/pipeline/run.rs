//! Top-level orchestration of one capacity estimate.

use std::path::{Path, PathBuf};

use image::{GrayImage, RgbImage};

use super::result::{Units, VolumeResult, NOTE_INNER_CAPACITY, NOTE_OUTER_VOLUME, NOTE_PIXEL_UNITS};
use crate::config::EstimateRequest;
use crate::debug_dump::{DebugArtifacts, DebugDumpV1, ImageDebugV1, DEBUG_SCHEMA_V1};
use crate::error::CapacityError;
use crate::frame::{foreground_bbox, foreground_count, gaussian_blur};
use crate::geometry::{RotationAligner, VolumeIntegrator};
use crate::mask::{extract_with_fallback, MaskExtractor, MaskInput};
use crate::outline::OutlineDrawer;
use crate::scale::{MarkerScaleSource, ScaleQuery, ScaleQueryMeta, ScaleResolver, VisualScaleEstimator};

/// Notes attached to the pixel-unit measurement handed to the external estimator.
pub const NOTE_META_PIXEL_UNITS: &str = "No scale provided; pixel units.";

/// Stage implementations for one run. Borrowed, so callers can keep the
/// expensive ones (segmentation model, HTTP client) across frames.
pub struct StageSet<'a> {
    pub segmentation: &'a dyn MaskExtractor,
    pub contour: &'a dyn MaskExtractor,
    pub marker: &'a dyn MarkerScaleSource,
    pub external: Option<&'a dyn VisualScaleEstimator>,
    pub outline: OutlineDrawer,
    /// Gaussian pre-blur kernel side.
    pub blur_kernel: u32,
    /// `None` disables the outline overlay.
    pub outlines_dir: Option<&'a Path>,
}

fn validate_request(request: &EstimateRequest) -> Result<(), CapacityError> {
    if let Some(s) = request.mm_per_px {
        if !(s.is_finite() && s > 0.0) {
            return Err(CapacityError::Config(format!(
                "mm_per_px must be a positive number, got {s}"
            )));
        }
    }
    if !(request.wall_mm.is_finite() && request.wall_mm >= 0.0) {
        return Err(CapacityError::Config(format!(
            "wall_mm must be non-negative, got {}",
            request.wall_mm
        )));
    }
    Ok(())
}

/// Crop `mask` to its foreground bounding box grown by `margin`, clamped to
/// the image. Returns the crop and its inclusive `[y1, y2, x1, x2]` box.
pub fn crop_to_mask(mask: &GrayImage, margin: u32) -> Result<(GrayImage, [u32; 4]), CapacityError> {
    let (y1, y2, x1, x2) = foreground_bbox(mask).ok_or(CapacityError::MaskVanished)?;
    let (w, h) = mask.dimensions();
    let y1 = y1.saturating_sub(margin);
    let x1 = x1.saturating_sub(margin);
    let y2 = y2.saturating_add(margin).min(h - 1);
    let x2 = x2.saturating_add(margin).min(w - 1);
    let cropped = image::imageops::crop_imm(mask, x1, y1, x2 - x1 + 1, y2 - y1 + 1).to_image();
    if foreground_count(&cropped) == 0 {
        return Err(CapacityError::MaskVanished);
    }
    Ok((cropped, [y1, y2, x1, x2]))
}

/// Run every stage on `frame`.
///
/// `stem` names the outline file; `source_path` is only recorded in the
/// debug summary.
pub fn run(
    frame: &RgbImage,
    stem: &str,
    source_path: Option<&Path>,
    request: &EstimateRequest,
    stages: &StageSet<'_>,
) -> Result<VolumeResult, CapacityError> {
    validate_request(request)?;
    let (w, h) = frame.dimensions();
    tracing::info!("processing {stem} ({w}x{h})");

    let gray = image::imageops::grayscale(frame);
    let blurred = gaussian_blur(&gray, stages.blur_kernel);
    let input = MaskInput {
        frame,
        gray_blurred: &blurred,
    };
    let extracted = extract_with_fallback(stages.segmentation, stages.contour, &input)?;
    tracing::info!(
        "mask from {:?}: {} px, {} contour points",
        extracted.source,
        foreground_count(&extracted.mask),
        extracted.contour.len()
    );

    let outline_path: Option<PathBuf> = stages
        .outlines_dir
        .and_then(|dir| stages.outline.draw_and_save(frame, &extracted.contour, dir, stem));

    let rotated = RotationAligner::new().rotate_to_vertical(frame, &extracted.mask, &extracted.contour);
    tracing::info!("rotation applied: {:.2} deg", rotated.angle_degrees);

    let (cropped, crop) = crop_to_mask(&rotated.mask, request.crop_margin_px)?;
    tracing::info!("crop [y1 y2 x1 x2] = {crop:?}");

    if let Some(dir) = &request.debug_dir {
        let dbg = DebugArtifacts::new(dir);
        dbg.write_gray(&gray);
        dbg.write_raw_mask(&extracted.mask);
        dbg.write_rotated_mask(&cropped);
        dbg.write_summary(&DebugDumpV1 {
            schema_version: DEBUG_SCHEMA_V1.to_string(),
            image: ImageDebugV1 {
                path: source_path.map(|p| p.display().to_string()),
                width: w,
                height: h,
            },
            mask_source: extracted.source,
            contour_points: extracted.contour.len(),
            mask_foreground_px: foreground_count(&extracted.mask),
            rotation_applied_deg: rotated.angle_degrees,
            crop,
        });
    }

    let integrator = VolumeIntegrator::new();
    let (volume_px, height_px) = integrator.integrate_px(&cropped)?;
    let meta = ScaleQueryMeta {
        volume: volume_px,
        height: height_px,
        units: Units::pixel(),
        notes: NOTE_META_PIXEL_UNITS.to_string(),
        rotation_applied_deg: rotated.angle_degrees,
        crop,
    };

    let resolution = ScaleResolver::new(stages.marker, stages.external).resolve(&ScaleQuery {
        frame,
        explicit_mm_per_px: request.mm_per_px,
        marker_mm: request.marker_mm,
        use_external: request.use_external,
        meta: &meta,
    });

    let (volume, height, units, mut notes) = match (resolution.mm_per_px, resolution.method) {
        (Some(mm_per_px), Some(method)) => {
            let (volume_mm3, height_mm) =
                integrator.integrate_mm(&cropped, mm_per_px, request.wall_mm)?;
            let kind = if request.wall_mm > 0.0 {
                NOTE_INNER_CAPACITY
            } else {
                NOTE_OUTER_VOLUME
            };
            let notes = vec![kind.to_string(), format!("Scale source: {method}.")];
            (volume_mm3 / 1000.0, height_mm, Units::metric(), notes)
        }
        _ => (volume_px, height_px, Units::pixel(), vec![NOTE_PIXEL_UNITS.to_string()]),
    };
    notes.extend(resolution.notes.iter().cloned());
    tracing::info!("volume {volume:.2} {}, height {height:.1} {}", units.volume, units.height);

    Ok(VolumeResult {
        volume,
        height,
        units,
        notes: notes.join(" "),
        rotation_applied_deg: rotated.angle_degrees,
        crop,
        mask_source: extracted.source,
        outline_path: outline_path.map(|p| p.display().to_string()),
        scale_mm_per_px: resolution.mm_per_px,
        scale_source: resolution.method,
        scale_estimator_output: resolution.estimator_output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{MaskError, ScaleError};
    use crate::mask::{Contour, ContourMaskExtractor, MaskSource};
    use crate::scale::{EstimatorReport, ScaleEstimate, ScaleMethod};
    use crate::test_utils::{draw_cylinder_mask, draw_rect_mask};
    use approx::assert_relative_eq;
    use std::cell::Cell;
    use std::f64::consts::PI;

    struct FixedMask(GrayImage);
    impl MaskExtractor for FixedMask {
        fn extract(&self, _: &MaskInput<'_>) -> Result<(GrayImage, Contour), MaskError> {
            let contour =
                crate::mask::largest_external_contour(&self.0).ok_or(MaskError::EmptyMask)?;
            Ok((self.0.clone(), contour))
        }
    }

    struct Failing;
    impl MaskExtractor for Failing {
        fn extract(&self, _: &MaskInput<'_>) -> Result<(GrayImage, Contour), MaskError> {
            Err(MaskError::ModelUnavailable("test".into()))
        }
    }

    struct Marker(Option<f64>, Cell<usize>);
    impl MarkerScaleSource for Marker {
        fn estimate_mm_per_px(&self, _: &RgbImage, marker_mm: f64) -> Result<f64, ScaleError> {
            self.1.set(self.1.get() + 1);
            self.0.map(|px| marker_mm / px).ok_or(ScaleError::NoMarker)
        }
    }

    struct Declining;
    impl VisualScaleEstimator for Declining {
        fn estimate(&self, _: &RgbImage, meta: &ScaleQueryMeta) -> Result<ScaleEstimate, ScaleError> {
            assert_eq!(meta.units, Units::pixel());
            Ok(ScaleEstimate {
                can_estimate: false,
                ..Default::default()
            })
        }
    }

    fn stages<'a>(seg: &'a dyn MaskExtractor, marker: &'a Marker) -> StageSet<'a> {
        StageSet {
            segmentation: seg,
            contour: &Failing,
            marker,
            external: None,
            outline: OutlineDrawer::default(),
            blur_kernel: 5,
            outlines_dir: None,
        }
    }

    fn cylinder() -> GrayImage {
        draw_cylinder_mask(200, 200, 100.0, 50, 30.0, 100)
    }

    #[test]
    fn marker_scale_gives_metric_units() {
        let seg = FixedMask(cylinder());
        let marker = Marker(Some(50.0), Cell::new(0));
        let frame = RgbImage::new(200, 200);
        let req = EstimateRequest {
            marker_mm: Some(50.0),
            ..Default::default()
        };
        let r = run(&frame, "cyl", None, &req, &stages(&seg, &marker)).unwrap();
        assert_eq!(r.units, Units::metric());
        assert_eq!(r.scale_source, Some(ScaleMethod::Fiducial));
        assert_relative_eq!(r.height, 100.0);
        assert_relative_eq!(r.volume, 100.0 * PI * 900.0 / 1000.0, max_relative = 0.01);
        assert!(r.notes.starts_with(NOTE_OUTER_VOLUME));
        assert!(r.notes.contains("Scale source: fiducial."));
        assert_eq!(r.mask_source, MaskSource::Segmentation);
        assert_eq!(r.crop, [30, 169, 50, 149]);
    }

    #[test]
    fn unresolved_scale_reports_pixels_with_fault_notes() {
        let seg = FixedMask(cylinder());
        let marker = Marker(None, Cell::new(0));
        let frame = RgbImage::new(200, 200);
        let req = EstimateRequest {
            marker_mm: Some(50.0),
            use_external: true,
            ..Default::default()
        };
        let mut st = stages(&seg, &marker);
        st.external = Some(&Declining);
        let r = run(&frame, "cyl", None, &req, &st).unwrap();
        assert_eq!(r.units, Units::pixel());
        assert_relative_eq!(r.volume, 100.0 * PI * 900.0, max_relative = 0.01);
        assert!(r.notes.starts_with(NOTE_PIXEL_UNITS));
        assert!(r.notes.contains("no fiducial marker"));
        assert!(r.notes.contains("declined"));
        assert!(matches!(r.scale_estimator_output, Some(EstimatorReport::Estimate(_))));
    }

    #[test]
    fn explicit_scale_and_wall_give_inner_capacity() {
        let seg = FixedMask(draw_rect_mask(100, 100, 30, 10, 70, 90));
        let marker = Marker(Some(10.0), Cell::new(0));
        let frame = RgbImage::new(100, 100);
        let req = EstimateRequest {
            mm_per_px: Some(1.0),
            marker_mm: Some(50.0),
            wall_mm: 5.0,
            ..Default::default()
        };
        let r = run(&frame, "rect", None, &req, &stages(&seg, &marker)).unwrap();
        assert_eq!(marker.1.get(), 0);
        assert!(r.notes.starts_with(NOTE_INNER_CAPACITY));
        assert_relative_eq!(r.volume, 80.0 * PI * 15.0 * 15.0 / 1000.0, max_relative = 1e-9);
    }

    #[test]
    fn contour_fallback_runs_when_segmentation_fails() {
        let mut frame = RgbImage::from_pixel(200, 200, image::Rgb([230, 230, 230]));
        for y in 40..160 {
            for x in 70..130 {
                frame.put_pixel(x, y, image::Rgb([20, 20, 20]));
            }
        }
        let contour = ContourMaskExtractor::default();
        let marker = Marker(None, Cell::new(0));
        let st = StageSet {
            contour: &contour,
            ..stages(&Failing, &marker)
        };
        let r = run(&frame, "dark", None, &EstimateRequest::default(), &st).unwrap();
        assert_eq!(r.mask_source, MaskSource::Contour);
        assert_eq!(r.units, Units::pixel());
        assert!(r.height >= 118.0 && r.height <= 128.0, "height {}", r.height);
    }

    #[test]
    fn both_extractors_failing_is_fatal() {
        let marker = Marker(None, Cell::new(0));
        let err = run(
            &RgbImage::new(20, 20),
            "x",
            None,
            &EstimateRequest::default(),
            &stages(&Failing, &marker),
        )
        .unwrap_err();
        assert!(matches!(err, CapacityError::MaskExtraction { .. }));
    }

    #[test]
    fn tiny_object_is_too_small() {
        let seg = FixedMask(draw_rect_mask(50, 50, 20, 10, 23, 18));
        let marker = Marker(None, Cell::new(0));
        let err = run(
            &RgbImage::new(50, 50),
            "x",
            None,
            &EstimateRequest::default(),
            &stages(&seg, &marker),
        )
        .unwrap_err();
        assert!(matches!(err, CapacityError::Volume(_)));
    }

    #[test]
    fn invalid_request_is_rejected_up_front() {
        let seg = FixedMask(cylinder());
        let marker = Marker(None, Cell::new(0));
        let req = EstimateRequest {
            wall_mm: -1.0,
            ..Default::default()
        };
        let err = run(&RgbImage::new(200, 200), "x", None, &req, &stages(&seg, &marker)).unwrap_err();
        assert!(matches!(err, CapacityError::Config(_)));
    }

    #[test]
    fn crop_is_clamped_and_empty_mask_vanishes() {
        let mask = draw_rect_mask(40, 40, 2, 30, 10, 39);
        let (cropped, crop) = crop_to_mask(&mask, 20).unwrap();
        assert_eq!(crop, [10, 39, 0, 29]);
        assert_eq!(cropped.dimensions(), (30, 30));
        assert!(matches!(
            crop_to_mask(&GrayImage::new(10, 10), 5),
            Err(CapacityError::MaskVanished)
        ));
    }

    #[test]
    fn debug_artifacts_and_outline_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let seg = FixedMask(cylinder());
        let marker = Marker(None, Cell::new(0));
        let outlines = dir.path().join("outlines");
        let st = StageSet {
            outlines_dir: Some(&outlines),
            ..stages(&seg, &marker)
        };
        let req = EstimateRequest {
            debug_dir: Some(dir.path().join("dbg")),
            ..Default::default()
        };
        let r = run(&RgbImage::new(200, 200), "cyl", None, &req, &st).unwrap();
        assert_eq!(
            r.outline_path.as_deref(),
            Some(outlines.join("cyl_outline.png").display().to_string().as_str())
        );
        for name in ["01_gray.jpg", "02_mask_raw.png", "03_mask_rotated.png", "debug.json"] {
            assert!(dir.path().join("dbg").join(name).exists(), "{name}");
        }
    }
}
