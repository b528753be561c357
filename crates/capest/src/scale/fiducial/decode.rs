//! Per-quad decoding against a built-in ArUco dictionary.

use calib_targets_aruco::{
    builtins, decode_marker_in_cell, Dictionary, MarkerCell, Matcher, ScanDecodeConfig,
};
use calib_targets_core::{GrayImageView, GridCoords};
use image::GrayImage;
use nalgebra::Point2;

use super::quad::Quad;
use crate::config::FiducialConfig;

/// Decoded marker payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DecodedMarker {
    /// Observed bits (white = 1), in the decoder's row-major layout.
    pub code: u64,
    /// Index into the dictionary.
    pub id: usize,
    /// Quarter turns between the observed orientation and the codeword.
    pub rotation: u8,
}

/// Dictionary matcher plus sampling settings, built once per detection.
pub(crate) struct MarkerDecoder {
    matcher: Matcher,
    scan: ScanDecodeConfig,
}

/// Look up a built-in dictionary by name (`DICT_5X5_100`, `DICT_4X4_50`, ...).
pub(crate) fn dictionary(name: &str) -> Option<Dictionary> {
    builtins::builtin_dictionary(name)
}

impl MarkerDecoder {
    pub(crate) fn new(dict: Dictionary, config: &FiducialConfig) -> Self {
        Self {
            matcher: Matcher::new(dict, config.max_hamming),
            scan: ScanDecodeConfig {
                border_bits: config.border_bits,
                // The quad is the marker outline, not a surrounding board cell.
                marker_size_rel: 1.0,
                ..ScanDecodeConfig::default()
            },
        }
    }

    /// Decode the marker bounded by `quad`. `None` when the border is broken
    /// or the bits match no codeword within the Hamming budget.
    pub(crate) fn decode(&self, gray: &GrayImage, quad: &Quad) -> Option<DecodedMarker> {
        let view = GrayImageView {
            width: gray.width() as usize,
            height: gray.height() as usize,
            data: gray.as_raw(),
        };
        let cell = MarkerCell {
            gc: GridCoords { i: 0, j: 0 },
            corners_img: quad.map(|[x, y]| Point2::new(x as f32, y as f32)),
        };
        let det = decode_marker_in_cell(&view, &cell, &self.scan, &self.matcher)?;
        Some(DecodedMarker {
            code: det.code,
            id: det.id as usize,
            rotation: det.rotation,
        })
    }
}
