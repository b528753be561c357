//! Intermediate artifacts for manual inspection.
//!
//! Written only when a debug directory is requested. Nothing here feeds back
//! into the measurement, and every write failure is logged and ignored.

use std::path::{Path, PathBuf};

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::mask::MaskSource;

pub const DEBUG_SCHEMA_V1: &str = "capest.debug.v1";

pub const GRAY_FILE: &str = "01_gray.jpg";
pub const RAW_MASK_FILE: &str = "02_mask_raw.png";
pub const ROTATED_MASK_FILE: &str = "03_mask_rotated.png";
pub const SUMMARY_FILE: &str = "debug.json";

/// Stage summary written next to the images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugDumpV1 {
    pub schema_version: String,
    pub image: ImageDebugV1,
    pub mask_source: MaskSource,
    pub contour_points: usize,
    pub mask_foreground_px: usize,
    pub rotation_applied_deg: f64,
    pub crop: [u32; 4],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDebugV1 {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub width: u32,
    pub height: u32,
}

/// Writer bound to one debug directory.
#[derive(Debug, Clone)]
pub struct DebugArtifacts {
    dir: PathBuf,
}

impl DebugArtifacts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> bool {
        match std::fs::create_dir_all(&self.dir) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("cannot create debug directory {}: {e}", self.dir.display());
                false
            }
        }
    }

    fn save_gray(&self, name: &str, img: &GrayImage) {
        if !self.ensure_dir() {
            return;
        }
        let path = self.dir.join(name);
        match img.save(&path) {
            Ok(()) => tracing::debug!("wrote {}", path.display()),
            Err(e) => tracing::warn!("failed to write {}: {e}", path.display()),
        }
    }

    pub fn write_gray(&self, gray: &GrayImage) {
        self.save_gray(GRAY_FILE, gray);
    }

    pub fn write_raw_mask(&self, mask: &GrayImage) {
        self.save_gray(RAW_MASK_FILE, mask);
    }

    pub fn write_rotated_mask(&self, mask: &GrayImage) {
        self.save_gray(ROTATED_MASK_FILE, mask);
    }

    pub fn write_summary(&self, dump: &DebugDumpV1) {
        if !self.ensure_dir() {
            return;
        }
        let path = self.dir.join(SUMMARY_FILE);
        let written = serde_json::to_string_pretty(dump)
            .map_err(std::io::Error::from)
            .and_then(|json| std::fs::write(&path, json));
        if let Err(e) = written {
            tracing::warn!("failed to write {}: {e}", path.display());
        }
    }
}
