#![cfg(feature = "fiducial")]

mod common;

use std::f64::consts::PI;

use approx::assert_relative_eq;
use capest::{
    CapacityPipeline, EstimateRequest, MaskSource, PipelineConfig, ScaleMethod, Units,
};
use common::segmenter::{FixedLoader, MissingModelLoader};
use common::synthetic_image::{cylinder_mask, draw_marker, marker_payload, paint_mask};
use image::{GrayImage, RgbImage};

const W: u32 = 320;
const H: u32 = 240;

fn cylinder() -> GrayImage {
    cylinder_mask(W, H, 100.0, 60, 30.0, 100)
}

/// Light frame with a gray cylinder and, optionally, a 50 px marker.
fn scene(with_marker: bool) -> RgbImage {
    let mut frame = RgbImage::from_pixel(W, H, image::Rgb([235, 235, 235]));
    paint_mask(&mut frame, &cylinder(), [40, 40, 40]);
    if with_marker {
        draw_marker(&mut frame, 220, 40, 50, &marker_payload(4));
    }
    frame
}

fn pipeline(outlines: &std::path::Path) -> (CapacityPipeline, std::sync::Arc<FixedLoader>) {
    let config = PipelineConfig {
        outlines_dir: outlines.to_path_buf(),
        ..Default::default()
    };
    let loader = FixedLoader::new(cylinder());
    let pipeline = CapacityPipeline::new(config)
        .expect("default config is valid")
        .with_segmenter_loader(loader.clone());
    (pipeline, loader)
}

#[test]
fn cylinder_with_marker_reports_millilitres() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, _) = pipeline(dir.path());
    let request = EstimateRequest {
        marker_mm: Some(50.0),
        ..Default::default()
    };
    let result = pipeline.process_frame(&scene(true), "cyl", &request).unwrap();

    assert_eq!(result.units, Units::metric());
    assert_eq!(result.scale_source, Some(ScaleMethod::Fiducial));
    assert_relative_eq!(result.scale_mm_per_px.unwrap(), 1.0, epsilon = 1e-9);
    assert_relative_eq!(result.height, 100.0, epsilon = 1e-9);
    assert_relative_eq!(result.volume, 100.0 * PI * 30.0 * 30.0 / 1000.0, max_relative = 0.01);
    assert_eq!(result.mask_source, MaskSource::Segmentation);
    assert!(result.rotation_applied_deg.abs() < 2.0);
}

#[test]
fn no_scale_reports_pixel_units() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, _) = pipeline(dir.path());
    let result = pipeline
        .process_frame(&scene(false), "cyl", &EstimateRequest::default())
        .unwrap();

    assert_eq!(result.units, Units::pixel());
    assert_relative_eq!(result.volume, 282_743.3, max_relative = 0.01);
    assert_eq!(result.height, 100.0);
    assert!(result.notes.contains("pixel units"), "notes: {}", result.notes);
    assert!(result.scale_mm_per_px.is_none());
    assert!(result.scale_source.is_none());
}

#[test]
fn explicit_scale_skips_marker_detection() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, _) = pipeline(dir.path());
    let request = EstimateRequest {
        mm_per_px: Some(0.5),
        marker_mm: Some(50.0),
        ..Default::default()
    };
    let result = pipeline.process_frame(&scene(true), "cyl", &request).unwrap();
    assert_eq!(result.scale_source, Some(ScaleMethod::Explicit));
    assert_relative_eq!(result.height, 50.0, epsilon = 1e-9);
    assert_relative_eq!(
        result.volume,
        100.0 * PI * 15.0 * 15.0 * 0.5 / 1000.0,
        max_relative = 0.01
    );
}

#[test]
fn missing_model_falls_back_to_contour_extraction() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig {
        outlines_dir: dir.path().to_path_buf(),
        ..Default::default()
    };
    let pipeline = CapacityPipeline::new(config)
        .unwrap()
        .with_segmenter_loader(std::sync::Arc::new(MissingModelLoader));
    let result = pipeline
        .process_frame(&scene(false), "cyl", &EstimateRequest::default())
        .unwrap();

    assert_eq!(result.mask_source, MaskSource::Contour);
    assert_eq!(result.units, Units::pixel());
    // Threshold edges sit a few pixels outside the painted silhouette.
    assert!((98.0..=110.0).contains(&result.height), "height {}", result.height);
    let expected = 100.0 * PI * 30.0 * 30.0;
    assert!(
        result.volume > 0.9 * expected && result.volume < 1.4 * expected,
        "volume {}",
        result.volume
    );
}

#[test]
fn process_writes_outline_named_after_image() {
    let dir = tempfile::tempdir().unwrap();
    let outlines = dir.path().join("outlines");
    let (pipeline, loader) = pipeline(&outlines);
    let image_path = dir.path().join("bottle_07.png");
    scene(true).save(&image_path).unwrap();

    let request = EstimateRequest {
        marker_mm: Some(50.0),
        ..Default::default()
    };
    let first = pipeline.process(&image_path, &request).unwrap();
    let expected = outlines.join("bottle_07_outline.png");
    assert_eq!(first.outline_path.as_deref(), Some(expected.to_str().unwrap()));
    assert!(expected.exists());

    // The model is loaded once and reused.
    pipeline.process(&image_path, &request).unwrap();
    assert_eq!(loader.loads(), 1);
    assert_eq!(pipeline.segmenter_cache().len(), 1);

    let json = serde_json::to_value(&first).unwrap();
    assert_eq!(json["units"]["volume"], "mL");
    assert_eq!(json["scale_source"], "fiducial");
}
