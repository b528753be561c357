//! Audit overlay of the detected boundary.

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_line_segment_mut;
use imageproc::point::Point;

/// Draws the object contour over a copy of the frame.
#[derive(Debug, Clone, Copy)]
pub struct OutlineDrawer {
    pub color: Rgb<u8>,
    /// Stroke width in pixels.
    pub thickness: u32,
}

impl Default for OutlineDrawer {
    fn default() -> Self {
        Self {
            color: Rgb([0, 255, 0]),
            thickness: 2,
        }
    }
}

/// `<stem>_outline.png`
pub fn outline_file_name(stem: &str) -> String {
    format!("{stem}_outline.png")
}

impl OutlineDrawer {
    pub fn draw(&self, frame: &RgbImage, contour: &[Point<i32>]) -> RgbImage {
        let mut out = frame.clone();
        if contour.is_empty() {
            return out;
        }
        let n = contour.len();
        for i in 0..n {
            let a = contour[i];
            let b = contour[(i + 1) % n];
            for dy in 0..self.thickness {
                for dx in 0..self.thickness {
                    let (ox, oy) = (dx as f32, dy as f32);
                    draw_line_segment_mut(
                        &mut out,
                        (a.x as f32 + ox, a.y as f32 + oy),
                        (b.x as f32 + ox, b.y as f32 + oy),
                        self.color,
                    );
                }
            }
        }
        out
    }

    /// Draw and write `<stem>_outline.png` into `dir`.
    ///
    /// Failures are logged and yield `None`; the overlay is never required.
    pub fn draw_and_save(
        &self,
        frame: &RgbImage,
        contour: &[Point<i32>],
        dir: &Path,
        stem: &str,
    ) -> Option<PathBuf> {
        if let Err(e) = std::fs::create_dir_all(dir) {
            tracing::warn!("cannot create outline directory {}: {e}", dir.display());
            return None;
        }
        let path = dir.join(outline_file_name(stem));
        match self.draw(frame, contour).save(&path) {
            Ok(()) => {
                tracing::info!("outline written to {}", path.display());
                Some(path)
            }
            Err(e) => {
                tracing::warn!("failed to write outline {}: {e}", path.display());
                None
            }
        }
    }
}
