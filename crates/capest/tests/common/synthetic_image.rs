use capest::FiducialMarkerEstimator;
use image::{GrayImage, Luma, Rgb, RgbImage};

/// Upright cylinder silhouette: rows `top..top + height`, columns whose
/// pixel center lies within `radius` of `cx`.
pub fn cylinder_mask(w: u32, h: u32, cx: f64, top: u32, radius: f64, height: u32) -> GrayImage {
    let mut img = GrayImage::new(w, h);
    for y in top..(top + height).min(h) {
        for x in 0..w {
            if (x as f64 + 0.5 - cx).abs() <= radius {
                img.put_pixel(x, y, Luma([255]));
            }
        }
    }
    img
}

/// Paint every mask pixel of `mask` into `frame` with `color`.
pub fn paint_mask(frame: &mut RgbImage, mask: &GrayImage, color: [u8; 3]) {
    for (x, y, p) in mask.enumerate_pixels() {
        if p[0] > 0 {
            frame.put_pixel(x, y, Rgb(color));
        }
    }
}

/// 7x7-cell marker (black border, 5x5 payload with white = 1) with its
/// top-left corner at `(x0, y0)`.
pub fn draw_marker(frame: &mut RgbImage, x0: u32, y0: u32, side: u32, payload: &[[u8; 5]; 5]) {
    for py in 0..side {
        for px in 0..side {
            let col = ((px as f64 + 0.5) * 7.0 / side as f64).floor() as usize;
            let row = ((py as f64 + 0.5) * 7.0 / side as f64).floor() as usize;
            let white = (1..6).contains(&row) && (1..6).contains(&col) && payload[row - 1][col - 1] == 1;
            let v = if white { 255 } else { 0 };
            frame.put_pixel(x0 + px, y0 + py, Rgb([v, v, v]));
        }
    }
}

/// Payload of marker `id` of the default `DICT_5X5_100` dictionary,
/// row-major from the most significant of the 25 used bits (1 = white).
pub fn marker_payload(id: usize) -> [[u8; 5]; 5] {
    let code = FiducialMarkerEstimator::default()
        .codeword(id)
        .expect("default dictionary is built in")
        .expect("id within dictionary");
    let mut payload = [[0u8; 5]; 5];
    for (r, row) in payload.iter_mut().enumerate() {
        for (c, cell) in row.iter_mut().enumerate() {
            *cell = ((code >> (24 - (r * 5 + c))) & 1) as u8;
        }
    }
    payload
}
