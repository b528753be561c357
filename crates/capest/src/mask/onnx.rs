//! YOLOv8-seg ONNX backend (feature `onnx`).
//!
//! Expects the standard ultralytics export:
//! - `output0`: `[1, 4 + nc + 32, N]` boxes (cx, cy, w, h), class scores,
//!   mask coefficients
//! - `output1`: `[1, 32, mh, mw]` mask prototypes
//!
//! The frame is stretch-resized to `imgsz x imgsz`, so box and mask
//! coordinates map back with independent x/y scale factors.

use std::path::Path;
use std::sync::Mutex;

use image::imageops::FilterType;
use image::{GrayImage, Luma, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;

use super::segmentation::{InferenceParams, Instance, InstanceSegmenter};
use crate::error::MaskError;
use crate::frame::FOREGROUND;

const MASK_COEFFS: usize = 32;

/// COCO-80 class names in ultralytics index order.
pub const COCO_NAMES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// ONNX Runtime session wrapping a YOLOv8-seg export.
pub struct OnnxYoloSegmenter {
    session: Mutex<Session>,
}

#[derive(Debug, Clone)]
struct RawDetection {
    bbox: [f32; 4], // x1, y1, x2, y2 in input pixels
    score: f32,
    class_id: usize,
    coeffs: [f32; MASK_COEFFS],
}

impl OnnxYoloSegmenter {
    /// Load a model from an ONNX file.
    pub fn load(path: &Path) -> Result<Self, MaskError> {
        if !path.exists() {
            return Err(MaskError::ModelUnavailable(format!(
                "model file not found: {}",
                path.display()
            )));
        }
        let session = Session::builder()
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| MaskError::ModelUnavailable(format!("{}: {e}", path.display())))?;
        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let inter = ix * iy;
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Class-aware greedy NMS; input order is irrelevant, output is by score.
fn nms(mut dets: Vec<RawDetection>, iou_thresh: f32) -> Vec<RawDetection> {
    dets.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut keep: Vec<RawDetection> = Vec::new();
    for d in dets {
        let suppressed = keep
            .iter()
            .any(|k| k.class_id == d.class_id && iou(&k.bbox, &d.bbox) > iou_thresh);
        if !suppressed {
            keep.push(d);
        }
    }
    keep
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn decode_detections(
    shape: &[usize],
    data: &[f32],
    confidence: f32,
) -> Result<Vec<RawDetection>, MaskError> {
    if shape.len() != 3 || shape[1] <= 4 + MASK_COEFFS {
        return Err(MaskError::Inference(format!(
            "unexpected detection output shape {shape:?}"
        )));
    }
    let (channels, n) = (shape[1], shape[2]);
    let nc = channels - 4 - MASK_COEFFS;
    let at = |c: usize, i: usize| data[c * n + i];

    let mut dets = Vec::new();
    for i in 0..n {
        let mut best = (0usize, f32::MIN);
        for c in 0..nc {
            let s = at(4 + c, i);
            if s > best.1 {
                best = (c, s);
            }
        }
        if best.1 < confidence {
            continue;
        }
        let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
        let mut coeffs = [0.0f32; MASK_COEFFS];
        for (k, c) in coeffs.iter_mut().enumerate() {
            *c = at(4 + nc + k, i);
        }
        dets.push(RawDetection {
            bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
            score: best.1,
            class_id: best.0,
            coeffs,
        });
    }
    Ok(dets)
}

/// Compose one instance mask at frame resolution.
fn compose_mask(
    det: &RawDetection,
    protos: &[f32],
    proto_hw: (usize, usize),
    imgsz: u32,
    frame_wh: (u32, u32),
) -> GrayImage {
    let (mh, mw) = proto_hw;
    let plane = mh * mw;
    let sx = mw as f32 / imgsz as f32;
    let sy = mh as f32 / imgsz as f32;
    let bx1 = (det.bbox[0] * sx).floor().max(0.0) as usize;
    let by1 = (det.bbox[1] * sy).floor().max(0.0) as usize;
    let bx2 = ((det.bbox[2] * sx).ceil() as usize).min(mw);
    let by2 = ((det.bbox[3] * sy).ceil() as usize).min(mh);

    let mut low = vec![false; plane];
    for y in by1..by2 {
        for x in bx1..bx2 {
            let idx = y * mw + x;
            let v: f32 = det
                .coeffs
                .iter()
                .enumerate()
                .map(|(k, c)| c * protos[k * plane + idx])
                .sum();
            low[idx] = sigmoid(v) > 0.5;
        }
    }

    let (fw, fh) = frame_wh;
    let mut mask = GrayImage::new(fw, fh);
    for y in 0..fh {
        let py = ((y as f32 + 0.5) * mh as f32 / fh as f32) as usize;
        for x in 0..fw {
            let px = ((x as f32 + 0.5) * mw as f32 / fw as f32) as usize;
            if low[py.min(mh - 1) * mw + px.min(mw - 1)] {
                mask.put_pixel(x, y, Luma([FOREGROUND]));
            }
        }
    }
    mask
}

impl InstanceSegmenter for OnnxYoloSegmenter {
    fn segment(
        &self,
        frame: &RgbImage,
        params: &InferenceParams,
    ) -> Result<Vec<Instance>, MaskError> {
        let size = params.imgsz as usize;
        let resized = image::imageops::resize(frame, params.imgsz, params.imgsz, FilterType::Triangle);
        let mut input = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, p) in resized.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] = p[c] as f32 / 255.0;
            }
        }

        let infer = |e: ort::Error| MaskError::Inference(e.to_string());
        let tensor = TensorRef::from_array_view(&input).map_err(infer)?;
        let mut session = self.session.lock().unwrap_or_else(|e| e.into_inner());
        let outputs = session.run(ort::inputs!["images" => tensor]).map_err(infer)?;
        if outputs.len() < 2 {
            return Err(MaskError::Inference(format!(
                "expected 2 outputs, got {}",
                outputs.len()
            )));
        }

        let (det_shape, det_data) = outputs[0].try_extract_tensor::<f32>().map_err(infer)?;
        let det_shape: Vec<usize> = det_shape.iter().map(|&d| d as usize).collect();
        let (proto_shape, proto_data) = outputs[1].try_extract_tensor::<f32>().map_err(infer)?;
        let proto_shape: Vec<usize> = proto_shape.iter().map(|&d| d as usize).collect();
        if proto_shape.len() != 4 || proto_shape[1] != MASK_COEFFS {
            return Err(MaskError::Inference(format!(
                "unexpected prototype output shape {proto_shape:?}"
            )));
        }

        let dets = nms(
            decode_detections(&det_shape, det_data, params.confidence)?,
            params.iou,
        );
        tracing::debug!("yolo-seg: {} detections after NMS", dets.len());

        let proto_hw = (proto_shape[2], proto_shape[3]);
        Ok(dets
            .iter()
            .map(|d| Instance {
                label: COCO_NAMES
                    .get(d.class_id)
                    .map_or_else(|| format!("class_{}", d.class_id), |s| s.to_string()),
                score: d.score,
                mask: compose_mask(d, proto_data, proto_hw, params.imgsz, frame.dimensions()),
            })
            .collect())
    }
}
