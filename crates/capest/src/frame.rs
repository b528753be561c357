//! Frame loading and shared raster helpers.

use std::io::Cursor;
use std::path::Path;

use image::{GrayImage, ImageBuffer, ImageFormat, Luma, RgbImage};

use crate::error::CapacityError;

/// Foreground value used in every binary mask.
pub const FOREGROUND: u8 = 255;

/// Load a color frame from disk.
pub fn load_frame(path: &Path) -> Result<RgbImage, CapacityError> {
    let img = image::open(path).map_err(|source| CapacityError::FrameLoad {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(img.to_rgb8())
}

/// Gaussian sigma OpenCV derives from an odd kernel size when sigma is 0.
pub fn kernel_sigma(ksize: u32) -> f32 {
    0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Gaussian-blurred copy of a gray image as f32 values in [0, 255].
pub(crate) fn blur_f32(gray: &GrayImage, sigma: f32) -> ImageBuffer<Luma<f32>, Vec<f32>> {
    let (w, h) = gray.dimensions();
    let mut f = ImageBuffer::<Luma<f32>, Vec<f32>>::new(w, h);
    for (x, y, p) in gray.enumerate_pixels() {
        f.put_pixel(x, y, Luma([p[0] as f32]));
    }
    imageproc::filter::gaussian_blur_f32(&f, sigma)
}

/// Gaussian blur with an OpenCV-style square kernel size.
pub fn gaussian_blur(gray: &GrayImage, ksize: u32) -> GrayImage {
    let blurred = blur_f32(gray, kernel_sigma(ksize));
    let (w, h) = gray.dimensions();
    let mut out = GrayImage::new(w, h);
    for (x, y, p) in blurred.enumerate_pixels() {
        out.put_pixel(x, y, Luma([p[0].round().clamp(0.0, 255.0) as u8]));
    }
    out
}

/// Inverted adaptive threshold against a Gaussian-weighted local mean.
///
/// A pixel becomes foreground when it is darker than `mean - offset`.
pub fn adaptive_threshold_inv(gray: &GrayImage, block_size: u32, offset: f32) -> GrayImage {
    let mean = blur_f32(gray, kernel_sigma(block_size));
    let (w, h) = gray.dimensions();
    let mut out = GrayImage::new(w, h);
    for (x, y, p) in gray.enumerate_pixels() {
        let t = mean.get_pixel(x, y)[0] - offset;
        if (p[0] as f32) <= t {
            out.put_pixel(x, y, Luma([FOREGROUND]));
        }
    }
    out
}

/// Force a raster to strictly {0, FOREGROUND}.
pub fn binarize(mask: &GrayImage) -> GrayImage {
    let mut out = mask.clone();
    for p in out.pixels_mut() {
        p[0] = if p[0] > 0 { FOREGROUND } else { 0 };
    }
    out
}

/// Number of foreground pixels.
pub fn foreground_count(mask: &GrayImage) -> usize {
    mask.pixels().filter(|p| p[0] > 0).count()
}

/// Inclusive bounding box `(y1, y2, x1, x2)` of the foreground, if any.
pub fn foreground_bbox(mask: &GrayImage) -> Option<(u32, u32, u32, u32)> {
    let mut bbox: Option<(u32, u32, u32, u32)> = None;
    for (x, y, p) in mask.enumerate_pixels() {
        if p[0] == 0 {
            continue;
        }
        bbox = Some(match bbox {
            None => (y, y, x, x),
            Some((y1, y2, x1, x2)) => (y1.min(y), y2.max(y), x1.min(x), x2.max(x)),
        });
    }
    bbox
}

/// Encode a frame as PNG bytes.
pub fn encode_png(frame: &RgbImage) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Cursor::new(Vec::new());
    frame.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}
