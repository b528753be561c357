//! Principal-axis alignment.
//!
//! Angles use the y-up convention: 0° points right, 90° points up. A
//! positive correction rotates the image counter-clockwise as displayed.

use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::point::Point;
use nalgebra::{Matrix2, Matrix3, Vector3};

/// Rotated frame and mask plus the applied correction.
#[derive(Debug, Clone)]
pub struct RotationResult {
    pub frame: RgbImage,
    pub mask: GrayImage,
    /// Correction in degrees, normalized to (-90, 90].
    pub angle_degrees: f64,
}

/// Orientation of the dominant principal axis of a point cloud, in degrees
/// from the horizontal, or `None` for degenerate clouds.
pub fn principal_axis_angle(points: &[Point<i32>]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mx = points.iter().map(|p| p.x as f64).sum::<f64>() / n;
    let my = points.iter().map(|p| p.y as f64).sum::<f64>() / n;
    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for p in points {
        let dx = p.x as f64 - mx;
        let dy = p.y as f64 - my;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    if sxx + syy < 1e-12 {
        return None;
    }

    let eig = Matrix2::new(sxx, sxy, sxy, syy).symmetric_eigen();
    let major = if eig.eigenvalues[0] >= eig.eigenvalues[1] { 0 } else { 1 };
    let v = eig.eigenvectors.column(major);
    // Image rows grow downward.
    Some((-v[1]).atan2(v[0]).to_degrees())
}

/// Fold an angle into (-90, 90]; axes are direction-less.
fn normalize_axis_angle(deg: f64) -> f64 {
    let mut a = deg % 180.0;
    if a <= -90.0 {
        a += 180.0;
    } else if a > 90.0 {
        a -= 180.0;
    }
    a
}

/// Correction that brings the contour's principal axis to vertical.
pub fn vertical_correction(contour: &[Point<i32>]) -> f64 {
    principal_axis_angle(contour).map_or(0.0, |theta| normalize_axis_angle(90.0 - theta))
}

/// Forward affine for a counter-clockwise rotation by `deg` about `(cx, cy)`.
fn rotation_about(cx: f64, cy: f64, deg: f64) -> Matrix3<f64> {
    let (s, c) = deg.to_radians().sin_cos();
    Matrix3::new(
        c, s, (1.0 - c) * cx - s * cy,
        -s, c, s * cx + (1.0 - c) * cy,
        0.0, 0.0, 1.0,
    )
}

fn bilinear_replicate(img: &RgbImage, x: f64, y: f64) -> Rgb<u8> {
    let (w, h) = img.dimensions();
    let xc = x.clamp(0.0, (w - 1) as f64);
    let yc = y.clamp(0.0, (h - 1) as f64);
    let x0 = xc.floor() as u32;
    let y0 = yc.floor() as u32;
    let x1 = (x0 + 1).min(w - 1);
    let y1 = (y0 + 1).min(h - 1);
    let fx = xc - x0 as f64;
    let fy = yc - y0 as f64;

    let (p00, p10) = (img.get_pixel(x0, y0), img.get_pixel(x1, y0));
    let (p01, p11) = (img.get_pixel(x0, y1), img.get_pixel(x1, y1));
    let mut out = [0u8; 3];
    for (c, o) in out.iter_mut().enumerate() {
        let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
        let bot = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
        *o = (top * (1.0 - fy) + bot * fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

/// Rotates frames and masks so the object's long axis is vertical.
#[derive(Debug, Clone, Copy, Default)]
pub struct RotationAligner;

impl RotationAligner {
    pub fn new() -> Self {
        Self
    }

    /// Rotate `frame` and `mask` about the image center by the correction
    /// derived from `contour`. Output sizes equal the input sizes.
    ///
    /// The frame is sampled bilinearly with replicated borders; the mask is
    /// sampled nearest-neighbour with zero fill so it stays binary.
    pub fn rotate_to_vertical(
        &self,
        frame: &RgbImage,
        mask: &GrayImage,
        contour: &[Point<i32>],
    ) -> RotationResult {
        let angle = vertical_correction(contour);
        if angle.abs() < 1e-9 || frame.width() == 0 || frame.height() == 0 {
            return RotationResult {
                frame: frame.clone(),
                mask: mask.clone(),
                angle_degrees: angle,
            };
        }

        let (w, h) = frame.dimensions();
        let forward = rotation_about(w as f64 / 2.0, h as f64 / 2.0, angle);
        let inverse = forward.try_inverse().unwrap_or_else(Matrix3::identity);

        let mut rotated_frame = RgbImage::new(w, h);
        let mut rotated_mask = GrayImage::new(mask.width(), mask.height());
        for y in 0..h {
            for x in 0..w {
                let src = inverse * Vector3::new(x as f64, y as f64, 1.0);
                rotated_frame.put_pixel(x, y, bilinear_replicate(frame, src.x, src.y));
            }
        }
        let (mw, mh) = mask.dimensions();
        for y in 0..mh {
            for x in 0..mw {
                let src = inverse * Vector3::new(x as f64, y as f64, 1.0);
                let sx = src.x.round();
                let sy = src.y.round();
                if sx >= 0.0 && sy >= 0.0 && sx < mw as f64 && sy < mh as f64 {
                    let v = mask.get_pixel(sx as u32, sy as u32)[0];
                    rotated_mask.put_pixel(x, y, Luma([v]));
                }
            }
        }

        tracing::debug!("rotated by {angle:.2} deg");
        RotationResult {
            frame: rotated_frame,
            mask: rotated_mask,
            angle_degrees: angle,
        }
    }
}
