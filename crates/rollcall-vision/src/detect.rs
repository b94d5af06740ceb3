//! SCRFD face detector via ONNX Runtime.
//!
//! Anchor-free decoding over three stride levels, followed by NMS. The
//! model takes a 640×640 letterboxed RGB tensor and exports nine outputs
//! in the standard insightface order: scores for strides 8/16/32, then
//! box offsets, then keypoints.

use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const SCRFD_INPUT: usize = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_SCORE_THRESHOLD: f32 = 0.5;
const SCRFD_NMS_IOU: f32 = 0.4;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const ANCHORS_PER_CELL: usize = 2;
const SCRFD_OUTPUTS: usize = 9;

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("model file not found: {0} — download det_10g.onnx from insightface")]
    ModelNotFound(String),
    #[error("frame buffer too small: {got} bytes for {width}x{height} RGB")]
    BadInput { got: usize, width: u32, height: u32 },
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// A detected face in source-frame pixel coordinates.
#[derive(Debug, Clone)]
pub struct RawFace {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    /// Five landmarks: left eye, right eye, nose, left mouth, right mouth.
    pub landmarks: [(f32, f32); 5],
}

/// Mapping between source-frame and letterboxed coordinates.
struct Letterbox {
    scale: f32,
    off_x: f32,
    off_y: f32,
}

impl Letterbox {
    /// Map a point from letterboxed model space back to the source frame.
    fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.off_x) / self.scale, (y - self.off_y) / self.scale)
    }
}

pub struct ScrfdDetector {
    session: Session,
}

impl ScrfdDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, DetectError> {
        if !Path::new(model_path).exists() {
            return Err(DetectError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        let num_outputs = session.outputs().len();
        if num_outputs != SCRFD_OUTPUTS {
            return Err(DetectError::InferenceFailed(format!(
                "SCRFD export must have {SCRFD_OUTPUTS} outputs (3 strides × score/box/kps), got {num_outputs}"
            )));
        }

        tracing::info!(path = model_path, "SCRFD detector loaded");
        Ok(Self { session })
    }

    /// Detect faces in an interleaved RGB8 frame, highest confidence first.
    pub fn detect(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<RawFace>, DetectError> {
        let expected = width as usize * height as usize * 3;
        if rgb.len() < expected {
            return Err(DetectError::BadInput {
                got: rgb.len(),
                width,
                height,
            });
        }

        let (input, letterbox) = letterbox_rgb(rgb, width as usize, height as usize, SCRFD_INPUT);
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut faces = Vec::new();
        for (level, &stride) in SCRFD_STRIDES.iter().enumerate() {
            // Standard export layout: [0-2] scores, [3-5] boxes, [6-8] kps.
            let (_, scores) = outputs[level]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, boxes) = outputs[level + 3]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectError::InferenceFailed(format!("boxes stride {stride}: {e}")))?;
            let (_, kps) = outputs[level + 6]
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectError::InferenceFailed(format!("kps stride {stride}: {e}")))?;

            faces.extend(decode_level(
                scores,
                boxes,
                kps,
                stride,
                &letterbox,
                SCRFD_SCORE_THRESHOLD,
            ));
        }

        Ok(non_max_suppress(faces, SCRFD_NMS_IOU))
    }
}

/// Letterbox an RGB frame into a normalized NCHW tensor.
///
/// The frame is scaled to fit, bilinearly resampled straight into the
/// tensor, and centered; padding stays at 0.0, which is exactly the
/// normalized value of the SCRFD mean.
fn letterbox_rgb(rgb: &[u8], width: usize, height: usize, dst: usize) -> (Array4<f32>, Letterbox) {
    let scale = (dst as f32 / width as f32).min(dst as f32 / height as f32);
    let new_w = ((width as f32 * scale).round() as usize).min(dst);
    let new_h = ((height as f32 * scale).round() as usize).min(dst);
    let off_x = (dst - new_w) / 2;
    let off_y = (dst - new_h) / 2;

    let mut tensor = Array4::<f32>::zeros((1, 3, dst, dst));
    let inv = 1.0 / scale;

    for y in 0..new_h {
        let sy = (y as f32 + 0.5) * inv - 0.5;
        let y0 = (sy.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = (sy - sy.floor()).clamp(0.0, 1.0);

        for x in 0..new_w {
            let sx = (x as f32 + 0.5) * inv - 0.5;
            let x0 = (sx.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (sx - sx.floor()).clamp(0.0, 1.0);

            for c in 0..3 {
                let at = |px: usize, py: usize| rgb[(py * width + px) * 3 + c] as f32;
                let top = at(x0, y0) * (1.0 - fx) + at(x1, y0) * fx;
                let bottom = at(x0, y1) * (1.0 - fx) + at(x1, y1) * fx;
                let value = top * (1.0 - fy) + bottom * fy;
                tensor[[0, c, y + off_y, x + off_x]] = (value - SCRFD_MEAN) / SCRFD_STD;
            }
        }
    }

    (
        tensor,
        Letterbox {
            scale,
            off_x: off_x as f32,
            off_y: off_y as f32,
        },
    )
}

/// Decode one stride level's anchors into faces above the score threshold.
fn decode_level(
    scores: &[f32],
    boxes: &[f32],
    kps: &[f32],
    stride: usize,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<RawFace> {
    let grid = SCRFD_INPUT / stride;
    let anchors = grid * grid * ANCHORS_PER_CELL;
    let mut faces = Vec::new();

    for idx in 0..anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let cell = idx / ANCHORS_PER_CELL;
        let anchor_x = ((cell % grid) * stride) as f32;
        let anchor_y = ((cell / grid) * stride) as f32;

        // Box offsets are [left, top, right, bottom] in stride units.
        let b = idx * 4;
        if b + 3 >= boxes.len() {
            continue;
        }
        let s = stride as f32;
        let (x1, y1) = letterbox.to_frame(anchor_x - boxes[b] * s, anchor_y - boxes[b + 1] * s);
        let (x2, y2) =
            letterbox.to_frame(anchor_x + boxes[b + 2] * s, anchor_y + boxes[b + 3] * s);

        // Five keypoint pairs per anchor; a truncated block means a
        // malformed export, skip the anchor.
        let k = idx * 10;
        if k + 9 >= kps.len() {
            continue;
        }
        let mut landmarks = [(0.0f32, 0.0f32); 5];
        for (i, lm) in landmarks.iter_mut().enumerate() {
            *lm = letterbox.to_frame(
                anchor_x + kps[k + i * 2] * s,
                anchor_y + kps[k + i * 2 + 1] * s,
            );
        }

        faces.push(RawFace {
            x1,
            y1,
            x2,
            y2,
            confidence: score,
            landmarks,
        });
    }

    faces
}

/// Greedy NMS: walk candidates by descending confidence and keep each one
/// that does not overlap an already-kept face beyond `iou_limit`.
fn non_max_suppress(mut faces: Vec<RawFace>, iou_limit: f32) -> Vec<RawFace> {
    faces.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<RawFace> = Vec::new();
    'candidates: for face in faces {
        for winner in &kept {
            if iou(winner, &face) > iou_limit {
                continue 'candidates;
            }
        }
        kept.push(face);
    }
    kept
}

/// Intersection-over-union of two face boxes.
fn iou(a: &RawFace, b: &RawFace) -> f32 {
    let ix = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let iy = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = ix * iy;

    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    let union = area_a + area_b - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}
