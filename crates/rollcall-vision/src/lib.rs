//! rollcall-vision — The embedding provider, made concrete.
//!
//! SCRFD face detection plus ArcFace embedding extraction over ONNX
//! Runtime, the same det_10g / w600k_r50 model pair the enrollment side
//! uses, wired up behind [`rollcall_core::FaceProvider`]. Input is the
//! interleaved RGB8 of a decoded webcam frame.

pub mod align;
pub mod analyzer;
pub mod detect;
pub mod embed;

pub use analyzer::{OnnxFaceAnalyzer, VisionError};

use std::path::PathBuf;

/// System-wide default location of the ONNX model files.
pub fn default_model_dir() -> PathBuf {
    PathBuf::from("/usr/share/rollcall/models")
}
