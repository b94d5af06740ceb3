//! The full detect-align-embed pipeline behind the provider contract.

use crate::align;
use crate::detect::{DetectError, RawFace, ScrfdDetector};
use crate::embed::{ArcFaceEmbedder, EmbedError};
use rollcall_core::{BoundingBox, DetectedFace, FaceProvider, ProviderError};
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VisionError {
    #[error(transparent)]
    Detect(#[from] DetectError),
    #[error(transparent)]
    Embed(#[from] EmbedError),
}

/// One reusable provider instance: both ONNX sessions loaded once, shared
/// by every frame handler. `ort` sessions need exclusive access to run, so
/// each sits behind its own mutex; callers already run on the blocking
/// pool, so a blocking lock is fine here.
pub struct OnnxFaceAnalyzer {
    detector: Mutex<ScrfdDetector>,
    embedder: Mutex<ArcFaceEmbedder>,
}

impl OnnxFaceAnalyzer {
    /// Load both models, failing fast if either file is missing or broken.
    pub fn load(detector_path: &str, embedder_path: &str) -> Result<Self, VisionError> {
        let detector = ScrfdDetector::load(detector_path)?;
        let embedder = ArcFaceEmbedder::load(embedder_path)?;
        Ok(Self {
            detector: Mutex::new(detector),
            embedder: Mutex::new(embedder),
        })
    }
}

impl FaceProvider for OnnxFaceAnalyzer {
    fn detect_faces(
        &self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<DetectedFace>, ProviderError> {
        let faces = self
            .detector
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .detect(rgb, width, height)
            .map_err(|e| match e {
                DetectError::BadInput { .. } => ProviderError::BadFrame(e.to_string()),
                DetectError::ModelNotFound(_) => ProviderError::ModelUnavailable(e.to_string()),
                other => ProviderError::Inference(other.to_string()),
            })?;

        let mut embedder = self.embedder.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out = Vec::with_capacity(faces.len());
        for face in faces {
            let aligned = align::align_face(rgb, width, height, &face.landmarks);
            let embedding = embedder
                .embed(&aligned)
                .map_err(|e| ProviderError::Inference(e.to_string()))?;
            out.push(DetectedFace {
                embedding,
                bbox: to_bbox(&face),
            });
        }

        tracing::debug!(faces = out.len(), "frame analyzed");
        Ok(out)
    }
}

fn to_bbox(face: &RawFace) -> BoundingBox {
    BoundingBox {
        x: face.x1,
        y: face.y1,
        width: face.x2 - face.x1,
        height: face.y2 - face.y1,
        confidence: face.confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_conversion() {
        let face = RawFace {
            x1: 10.0,
            y1: 20.0,
            x2: 110.0,
            y2: 170.0,
            confidence: 0.87,
            landmarks: [(0.0, 0.0); 5],
        };
        let bbox = to_bbox(&face);
        assert_eq!(bbox.x, 10.0);
        assert_eq!(bbox.y, 20.0);
        assert_eq!(bbox.width, 100.0);
        assert_eq!(bbox.height, 150.0);
        assert!((bbox.confidence - 0.87).abs() < 1e-6);
    }
}
