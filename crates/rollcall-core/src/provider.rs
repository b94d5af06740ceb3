//! Embedding provider contract.
//!
//! The daemon only ever sees this trait; the ONNX pipeline in
//! `rollcall-vision` is one implementation, test doubles are another.

use crate::types::Embedding;
use thiserror::Error;

/// Axis-aligned box around a detected face, in source-image pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// One face found in a frame, with its embedding already extracted.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub embedding: Embedding,
    pub bbox: BoundingBox,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("model unavailable: {0}")]
    ModelUnavailable(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("bad frame: {0}")]
    BadFrame(String),
}

/// Face detection + embedding extraction over one RGB frame.
///
/// `rgb` is tightly-packed interleaved RGB8, `width * height * 3` bytes.
/// A frame with zero faces is a successful call with an empty result.
/// Implementations must be cheap to reuse across calls and must surface
/// failures as `ProviderError`, never panic.
pub trait FaceProvider: Send + Sync {
    fn detect_faces(
        &self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<DetectedFace>, ProviderError>;
}
