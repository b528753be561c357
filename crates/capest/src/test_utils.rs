//! Shared synthetic images for unit tests.

use image::{GrayImage, Luma, Rgb, RgbImage};

use crate::frame::FOREGROUND;

/// Row-major 5x5 cell grid of a codeword (first cell in the most
/// significant of the 25 used bits, 1 = white).
#[cfg(feature = "fiducial")]
pub(crate) fn payload_from_code(code: u64) -> [[u8; 5]; 5] {
    let mut payload = [[0u8; 5]; 5];
    for (r, row) in payload.iter_mut().enumerate() {
        for (c, cell) in row.iter_mut().enumerate() {
            *cell = ((code >> (24 - (r * 5 + c))) & 1) as u8;
        }
    }
    payload
}

/// Payload of `DICT_5X5_100` marker `id`.
#[cfg(feature = "fiducial")]
pub(crate) fn marker_payload(id: usize) -> [[u8; 5]; 5] {
    let dict = calib_targets_aruco::builtins::builtin_dictionary("DICT_5X5_100")
        .expect("built-in dictionary");
    payload_from_code(dict.codes[id])
}

/// Binary mask with foreground on `[x0, x1) x [y0, y1)`.
pub(crate) fn draw_rect_mask(w: u32, h: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> GrayImage {
    let mut img = GrayImage::new(w, h);
    for y in y0..y1.min(h) {
        for x in x0..x1.min(w) {
            img.put_pixel(x, y, Luma([FOREGROUND]));
        }
    }
    img
}

/// Light gray frame (230) with a dark (20) rectangle on `[x0, x1) x [y0, y1)`.
pub(crate) fn draw_dark_rect(w: u32, h: u32, x0: u32, y0: u32, x1: u32, y1: u32) -> GrayImage {
    let mut img = GrayImage::from_pixel(w, h, Luma([230]));
    for y in y0..y1.min(h) {
        for x in x0..x1.min(w) {
            img.put_pixel(x, y, Luma([20]));
        }
    }
    img
}

/// Side view of an upright cylinder: rows `top..top + height`, pixels whose
/// center lies within `radius` of column `cx`.
pub(crate) fn draw_cylinder_mask(
    w: u32,
    h: u32,
    cx: f64,
    top: u32,
    radius: f64,
    height: u32,
) -> GrayImage {
    let mut img = GrayImage::new(w, h);
    for y in top..(top + height).min(h) {
        for x in 0..w {
            if (x as f64 + 0.5 - cx).abs() <= radius {
                img.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }
    }
    img
}

/// Bar centered in the image whose long axis makes `angle_deg` with the
/// x axis, measured counter-clockwise with y pointing up.
pub(crate) fn draw_tilted_bar(
    w: u32,
    h: u32,
    angle_deg: f64,
    length: f64,
    thickness: f64,
) -> GrayImage {
    let (s, c) = angle_deg.to_radians().sin_cos();
    let (cx, cy) = (w as f64 / 2.0, h as f64 / 2.0);
    let mut img = GrayImage::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let dx = x as f64 + 0.5 - cx;
            let dy = y as f64 + 0.5 - cy;
            // Image rows grow downwards.
            let along = dx * c - dy * s;
            let across = dx * s + dy * c;
            if along.abs() <= length / 2.0 && across.abs() <= thickness / 2.0 {
                img.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }
    }
    img
}

/// Fill `[x0, x1) x [y0, y1)` of an RGB frame with gray `value`.
pub(crate) fn draw_dark_rect_rgb(frame: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32, value: u8) {
    for y in y0..y1.min(frame.height()) {
        for x in x0..x1.min(frame.width()) {
            frame.put_pixel(x, y, Rgb([value; 3]));
        }
    }
}

/// Cell color of a 7x7 marker (one-cell black border around `payload`).
fn marker_cell(payload: &[[u8; 5]; 5], row: usize, col: usize) -> Rgb<u8> {
    if row == 0 || col == 0 || row >= 6 || col >= 6 {
        return Rgb([0, 0, 0]);
    }
    if payload[row - 1][col - 1] == 1 {
        Rgb([255, 255, 255])
    } else {
        Rgb([0, 0, 0])
    }
}

/// Axis-aligned marker with its top-left corner at `(x0, y0)`.
pub(crate) fn draw_marker(frame: &mut RgbImage, x0: u32, y0: u32, side: u32, payload: &[[u8; 5]; 5]) {
    let cells = 7.0 / side as f64;
    for py in 0..side {
        for px in 0..side {
            let (x, y) = (x0 + px, y0 + py);
            if x >= frame.width() || y >= frame.height() {
                continue;
            }
            let col = ((px as f64 + 0.5) * cells).floor() as usize;
            let row = ((py as f64 + 0.5) * cells).floor() as usize;
            frame.put_pixel(x, y, marker_cell(payload, row, col));
        }
    }
}

/// Marker centered at `(cx, cy)`, rotated by `angle_deg` in image coordinates.
pub(crate) fn draw_marker_rotated(
    frame: &mut RgbImage,
    cx: f64,
    cy: f64,
    side: f64,
    angle_deg: f64,
    payload: &[[u8; 5]; 5],
) {
    let (s, c) = angle_deg.to_radians().sin_cos();
    let half = side / 2.0;
    for y in 0..frame.height() {
        for x in 0..frame.width() {
            let dx = x as f64 + 0.5 - cx;
            let dy = y as f64 + 0.5 - cy;
            let u = dx * c + dy * s + half;
            let v = -dx * s + dy * c + half;
            if u < 0.0 || v < 0.0 || u >= side || v >= side {
                continue;
            }
            let col = (u * 7.0 / side).floor() as usize;
            let row = (v * 7.0 / side).floor() as usize;
            frame.put_pixel(x, y, marker_cell(payload, row, col));
        }
    }
}
