//! Disk-stacking volume integration.
//!
//! Each foreground row is a circular cross-section whose diameter is the
//! row's horizontal foreground extent (`right - left + 1`). Rows with fewer
//! than two foreground pixels inside the vertical span are gaps and add no
//! area, but they still count toward the height.

use std::f64::consts::PI;

use image::GrayImage;

use crate::error::VolumeError;

/// Minimum number of foreground rows for a meaningful estimate.
pub const MIN_ROWS: usize = 10;

/// Foreground extents of a mask, row by row.
#[derive(Debug, Clone, PartialEq)]
struct RowProfile {
    /// Number of rows in the top..=bottom foreground span.
    span_rows: usize,
    /// Diameter in pixels of every row that contributes area.
    widths: Vec<f64>,
}

fn row_profile(mask: &GrayImage, min_rows: usize) -> Result<RowProfile, VolumeError> {
    let (w, h) = mask.dimensions();
    let mut rows_with_fg = 0usize;
    let mut top: Option<u32> = None;
    let mut bottom = 0u32;
    let mut extents: Vec<Option<(u32, u32, usize)>> = Vec::with_capacity(h as usize);

    for y in 0..h {
        let mut left = None;
        let mut right = 0u32;
        let mut count = 0usize;
        for x in 0..w {
            if mask.get_pixel(x, y)[0] > 0 {
                left.get_or_insert(x);
                right = x;
                count += 1;
            }
        }
        match left {
            Some(l) => {
                rows_with_fg += 1;
                top.get_or_insert(y);
                bottom = y;
                extents.push(Some((l, right, count)));
            }
            None => extents.push(None),
        }
    }

    let Some(top) = top else {
        return Err(VolumeError::ObjectTooSmall {
            rows: 0,
            min_rows,
        });
    };
    if rows_with_fg < min_rows {
        return Err(VolumeError::ObjectTooSmall {
            rows: rows_with_fg,
            min_rows,
        });
    }

    let widths = extents[top as usize..=bottom as usize]
        .iter()
        .flatten()
        .filter(|(_, _, count)| *count >= 2)
        .map(|(l, r, _)| (r - l + 1) as f64)
        .collect();

    Ok(RowProfile {
        span_rows: (bottom - top + 1) as usize,
        widths,
    })
}

/// Solid-of-revolution volume estimator over a vertically aligned mask.
#[derive(Debug, Clone, Copy)]
pub struct VolumeIntegrator {
    min_rows: usize,
}

impl Default for VolumeIntegrator {
    fn default() -> Self {
        Self { min_rows: MIN_ROWS }
    }
}

impl VolumeIntegrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Volume in px³ and height in px.
    pub fn integrate_px(&self, mask: &GrayImage) -> Result<(f64, f64), VolumeError> {
        let profile = row_profile(mask, self.min_rows)?;
        let volume = profile
            .widths
            .iter()
            .map(|w| {
                let r = w / 2.0;
                PI * r * r
            })
            .sum();
        Ok((volume, profile.span_rows as f64))
    }

    /// Volume in mm³ and height in mm.
    ///
    /// `wall_mm` is subtracted from every radius; radii never go below zero.
    pub fn integrate_mm(
        &self,
        mask: &GrayImage,
        mm_per_px: f64,
        wall_mm: f64,
    ) -> Result<(f64, f64), VolumeError> {
        let profile = row_profile(mask, self.min_rows)?;
        let volume = profile
            .widths
            .iter()
            .map(|w| {
                let r = (w / 2.0 * mm_per_px - wall_mm).max(0.0);
                PI * r * r * mm_per_px
            })
            .sum();
        Ok((volume, profile.span_rows as f64 * mm_per_px))
    }
}
