//! Square binary fiducial markers.
//!
//! A marker is a dark border `border_bits` cells wide around an `n x n`
//! data grid (white = 1) whose bits form a codeword of a built-in ArUco
//! dictionary (`DICT_5X5_100` by default). Detection:
//! 1. inverted adaptive threshold of the gray frame
//! 2. outer contours → Douglas-Peucker quads (convex, bounded aspect)
//! 3. corners pushed out to pixel edges
//! 4. per-quad decoding and dictionary match (`calib_targets_aruco`)
//!
//! Quads that match no codeword are not markers. The scale comes from the
//! accepted marker with the largest perimeter.

#[cfg(feature = "fiducial")]
mod decode;
#[cfg(feature = "fiducial")]
mod quad;

use image::RgbImage;

use super::MarkerScaleSource;
use crate::config::FiducialConfig;
use crate::error::ScaleError;

/// A decoded marker in image coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedMarker {
    /// Outer corners, clockwise as displayed, at pixel-edge precision.
    pub corners: [[f64; 2]; 4],
    /// Data bits as read.
    pub code: u64,
    /// Dictionary index.
    pub id: usize,
    /// Quarter turns relative to the dictionary entry.
    pub rotation: u8,
}

impl DetectedMarker {
    pub fn perimeter_px(&self) -> f64 {
        self.side_lengths_px().iter().sum()
    }

    pub fn side_lengths_px(&self) -> [f64; 4] {
        let c = &self.corners;
        let d = |a: [f64; 2], b: [f64; 2]| ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt();
        [d(c[0], c[1]), d(c[1], c[2]), d(c[2], c[3]), d(c[3], c[0])]
    }

    pub fn mean_side_px(&self) -> f64 {
        self.perimeter_px() / 4.0
    }
}

/// Scale from a printed marker of known physical size.
#[derive(Debug, Clone, Default)]
pub struct FiducialMarkerEstimator {
    config: FiducialConfig,
}

impl FiducialMarkerEstimator {
    pub fn new(config: FiducialConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FiducialConfig {
        &self.config
    }

    /// Codeword `id` of the configured dictionary, row-major with the first
    /// cell in the most significant of the `n * n` used bits.
    #[cfg(feature = "fiducial")]
    pub fn codeword(&self, id: usize) -> Result<Option<u64>, ScaleError> {
        let dict = self.load_dictionary()?;
        Ok(dict.codes.get(id).copied())
    }

    #[cfg(feature = "fiducial")]
    fn load_dictionary(&self) -> Result<calib_targets_aruco::Dictionary, ScaleError> {
        decode::dictionary(&self.config.dictionary)
            .ok_or_else(|| ScaleError::UnknownDictionary(self.config.dictionary.clone()))
    }

    /// All decodable markers, largest perimeter first.
    #[cfg(feature = "fiducial")]
    pub fn detect(&self, frame: &RgbImage) -> Result<Vec<DetectedMarker>, ScaleError> {
        let gray = image::imageops::grayscale(frame);
        let decoder = decode::MarkerDecoder::new(self.load_dictionary()?, &self.config);

        let mut markers: Vec<DetectedMarker> = quad::find_quads(&gray, &self.config)
            .into_iter()
            .filter_map(|q| {
                let m = decoder.decode(&gray, &q)?;
                Some(DetectedMarker {
                    corners: q,
                    code: m.code,
                    id: m.id,
                    rotation: m.rotation,
                })
            })
            .collect();
        markers.sort_by(|a, b| b.perimeter_px().total_cmp(&a.perimeter_px()));
        tracing::debug!(
            "{} {} markers decoded",
            markers.len(),
            self.config.dictionary
        );
        Ok(markers)
    }

    #[cfg(not(feature = "fiducial"))]
    pub fn detect(&self, _frame: &RgbImage) -> Result<Vec<DetectedMarker>, ScaleError> {
        Err(ScaleError::CapabilityUnavailable("fiducial marker detection"))
    }
}

impl MarkerScaleSource for FiducialMarkerEstimator {
    fn estimate_mm_per_px(&self, frame: &RgbImage, marker_mm: f64) -> Result<f64, ScaleError> {
        if !(marker_mm.is_finite() && marker_mm > 0.0) {
            return Err(ScaleError::InvalidMarkerSize(marker_mm));
        }
        let markers = self.detect(frame)?;
        let best = markers.first().ok_or(ScaleError::NoMarker)?;
        let side = best.mean_side_px();
        tracing::info!(
            "fiducial marker: mean side {:.2} px (id {}), {:.4} mm/px",
            side,
            best.id,
            marker_mm / side
        );
        Ok(marker_mm / side)
    }
}

#[cfg(all(test, feature = "fiducial"))]
mod tests {
    use super::*;
    use crate::test_utils::{draw_dark_rect_rgb, draw_marker, draw_marker_rotated, marker_payload};
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use image::Rgb;

    fn white(w: u32, h: u32) -> RgbImage {
        RgbImage::from_pixel(w, h, Rgb([255, 255, 255]))
    }

    fn expect_no_marker(frame: &RgbImage) {
        let err = FiducialMarkerEstimator::default()
            .estimate_mm_per_px(frame, 50.0)
            .unwrap_err();
        assert!(matches!(err, ScaleError::NoMarker), "got {err:?}");
    }

    #[test]
    fn axis_aligned_marker_gives_exact_scale() {
        let mut frame = white(200, 160);
        draw_marker(&mut frame, 60, 40, 50, &marker_payload(0));
        let est = FiducialMarkerEstimator::default();
        let s = est.estimate_mm_per_px(&frame, 50.0).unwrap();
        assert_abs_diff_eq!(s, 1.0, epsilon = 1e-9);
        let s = est.estimate_mm_per_px(&frame, 25.0).unwrap();
        assert_abs_diff_eq!(s, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn decoded_id_matches_drawn_codeword() {
        let mut frame = white(200, 160);
        draw_marker(&mut frame, 60, 40, 70, &marker_payload(12));
        let markers = FiducialMarkerEstimator::default().detect(&frame).unwrap();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].id, 12);
    }

    #[test]
    fn rotated_marker_scale_is_close() {
        let mut frame = white(240, 240);
        draw_marker_rotated(&mut frame, 120.0, 120.0, 80.0, 20.0, &marker_payload(5));
        let s = FiducialMarkerEstimator::default()
            .estimate_mm_per_px(&frame, 40.0)
            .unwrap();
        assert_relative_eq!(s, 0.5, max_relative = 0.03);
    }

    #[test]
    fn largest_marker_wins() {
        let mut frame = white(320, 160);
        draw_marker(&mut frame, 20, 40, 42, &marker_payload(1));
        draw_marker(&mut frame, 140, 20, 84, &marker_payload(2));
        let est = FiducialMarkerEstimator::default();
        assert_eq!(est.detect(&frame).unwrap()[0].id, 2);
        let s = est.estimate_mm_per_px(&frame, 42.0).unwrap();
        assert_abs_diff_eq!(s, 0.5, epsilon = 1e-9);
    }

    #[test]
    fn dark_blob_is_not_a_marker() {
        let mut frame = white(200, 200);
        draw_dark_rect_rgb(&mut frame, 70, 50, 130, 150, 60);
        expect_no_marker(&frame);
    }

    #[test]
    fn blank_frame_has_no_marker() {
        expect_no_marker(&white(100, 100));
    }

    #[test]
    fn non_dictionary_square_is_not_a_marker() {
        // Black square with a single light spot: intact border, no codeword.
        let mut frame = white(200, 200);
        draw_dark_rect_rgb(&mut frame, 50, 50, 120, 120, 0);
        draw_dark_rect_rgb(&mut frame, 80, 80, 90, 90, 255);
        expect_no_marker(&frame);
    }

    #[test]
    fn labelled_container_is_not_a_marker() {
        let mut frame = white(200, 200);
        draw_dark_rect_rgb(&mut frame, 70, 50, 130, 150, 0);
        draw_dark_rect_rgb(&mut frame, 70, 95, 130, 125, 255);
        expect_no_marker(&frame);
    }

    #[test]
    fn unknown_dictionary_is_reported() {
        let est = FiducialMarkerEstimator::new(FiducialConfig {
            dictionary: "DICT_BOGUS".into(),
            ..Default::default()
        });
        let err = est.estimate_mm_per_px(&white(50, 50), 50.0).unwrap_err();
        assert!(matches!(err, ScaleError::UnknownDictionary(_)));
    }

    #[test]
    fn codeword_lookup_follows_dictionary() {
        let est = FiducialMarkerEstimator::default();
        assert!(est.codeword(0).unwrap().is_some());
        assert!(est.codeword(100).unwrap().is_none());
    }

    #[test]
    fn non_positive_marker_size_is_rejected() {
        let err = FiducialMarkerEstimator::default()
            .estimate_mm_per_px(&white(10, 10), 0.0)
            .unwrap_err();
        assert!(matches!(err, ScaleError::InvalidMarkerSize(_)));
    }
}
