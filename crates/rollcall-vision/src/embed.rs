//! ArcFace embedding extraction via ONNX Runtime.
//!
//! Consumes the 112×112 aligned RGB crop produced by [`crate::align`] and
//! emits an L2-normalized 512-dimensional embedding.

use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use rollcall_core::Embedding;
use std::path::Path;
use thiserror::Error;

const ARCFACE_INPUT: usize = 112;
const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5; // symmetric normalization, unlike SCRFD's 128.0
const EMBEDDING_DIM: usize = 512;

#[derive(Error, Debug)]
pub enum EmbedError {
    #[error("model file not found: {0} — download w600k_r50.onnx from insightface")]
    ModelNotFound(String),
    #[error("aligned crop must be {expected} bytes, got {got}")]
    BadCrop { expected: usize, got: usize },
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

pub struct ArcFaceEmbedder {
    session: Session,
}

impl ArcFaceEmbedder {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &str) -> Result<Self, EmbedError> {
        if !Path::new(model_path).exists() {
            return Err(EmbedError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(path = model_path, "ArcFace embedder loaded");
        Ok(Self { session })
    }

    /// Extract the embedding of one aligned 112×112 RGB face crop.
    pub fn embed(&mut self, aligned_rgb: &[u8]) -> Result<Embedding, EmbedError> {
        let input = preprocess(aligned_rgb)?;

        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EmbedError::InferenceFailed(format!("embedding output: {e}")))?;

        if raw.len() != EMBEDDING_DIM {
            return Err(EmbedError::InferenceFailed(format!(
                "expected {EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Embedding::new(l2_normalize(raw)))
    }
}

/// Aligned RGB crop → normalized NCHW tensor.
fn preprocess(aligned_rgb: &[u8]) -> Result<Array4<f32>, EmbedError> {
    let expected = ARCFACE_INPUT * ARCFACE_INPUT * 3;
    if aligned_rgb.len() != expected {
        return Err(EmbedError::BadCrop {
            expected,
            got: aligned_rgb.len(),
        });
    }

    let mut tensor = Array4::<f32>::zeros((1, 3, ARCFACE_INPUT, ARCFACE_INPUT));
    for y in 0..ARCFACE_INPUT {
        for x in 0..ARCFACE_INPUT {
            let base = (y * ARCFACE_INPUT + x) * 3;
            for c in 0..3 {
                tensor[[0, c, y, x]] = (aligned_rgb[base + c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
            }
        }
    }
    Ok(tensor)
}

/// Scale a raw embedding to unit length. A zero vector is passed through
/// untouched rather than dividing by zero.
fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|v| v / norm).collect()
    } else {
        raw.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preprocess_shape() {
        let crop = vec![128u8; ARCFACE_INPUT * ARCFACE_INPUT * 3];
        let tensor = preprocess(&crop).unwrap();
        assert_eq!(tensor.shape(), &[1, 3, ARCFACE_INPUT, ARCFACE_INPUT]);
    }

    #[test]
    fn test_preprocess_rejects_wrong_size() {
        let err = preprocess(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, EmbedError::BadCrop { .. }));
    }

    #[test]
    fn test_preprocess_normalization_range() {
        // 0 maps to -1, 255 maps to +1.
        let mut crop = vec![0u8; ARCFACE_INPUT * ARCFACE_INPUT * 3];
        crop[0] = 255;
        let tensor = preprocess(&crop).unwrap();
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 1e-2);
        assert!((tensor[[0, 1, 0, 0]] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_keeps_channels_apart() {
        let mut crop = vec![0u8; ARCFACE_INPUT * ARCFACE_INPUT * 3];
        // One magenta-ish pixel: R=200, G=0, B=100.
        crop[0] = 200;
        crop[2] = 100;
        let tensor = preprocess(&crop).unwrap();
        assert!(tensor[[0, 0, 0, 0]] > tensor[[0, 2, 0, 0]]);
        assert!(tensor[[0, 2, 0, 0]] > tensor[[0, 1, 0, 0]]);
    }

    #[test]
    fn test_l2_normalize_unit_length() {
        let v = l2_normalize(&[3.0, 4.0]);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize_zero_vector() {
        assert_eq!(l2_normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
    }
}
