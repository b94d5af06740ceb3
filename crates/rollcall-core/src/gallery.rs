//! Per-class gallery of (embedding, student) pairs.
//!
//! On disk a gallery is a pair of parallel `encodings`/`metadata` sequences;
//! in memory the two are zipped into one entry list so the index alignment
//! invariant cannot be violated by a single-sided mutation.

use crate::types::{ClassId, Embedding, StudentRecord};
use std::sync::Arc;
use thiserror::Error;

/// One enrolled face: an embedding and the student it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct GalleryEntry {
    pub embedding: Embedding,
    pub student: StudentRecord,
}

/// The comparison set for one class. Entry order is irrelevant to matching
/// correctness but is preserved across load/save.
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

/// Parallel-sequence length mismatch found while assembling a gallery.
#[derive(Debug, Error)]
#[error("gallery shape mismatch: {encodings} encodings vs {metadata} metadata entries")]
pub struct GalleryShapeError {
    pub encodings: usize,
    pub metadata: usize,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zip the serialized parallel sequences into entries. A length mismatch
    /// means the resource was corrupted by a partial write somewhere and is
    /// rejected rather than silently truncated.
    pub fn from_parts(
        encodings: Vec<Embedding>,
        metadata: Vec<StudentRecord>,
    ) -> Result<Self, GalleryShapeError> {
        if encodings.len() != metadata.len() {
            return Err(GalleryShapeError {
                encodings: encodings.len(),
                metadata: metadata.len(),
            });
        }
        let entries = encodings
            .into_iter()
            .zip(metadata)
            .map(|(embedding, student)| GalleryEntry { embedding, student })
            .collect();
        Ok(Self { entries })
    }

    /// Split back into the parallel on-disk sequences.
    pub fn into_parts(self) -> (Vec<Embedding>, Vec<StudentRecord>) {
        self.entries
            .into_iter()
            .map(|e| (e.embedding, e.student))
            .unzip()
    }

    pub fn push(&mut self, entry: GalleryEntry) {
        self.entries.push(entry);
    }

    /// Drop every entry for the given roll number (a student may have
    /// several enrolled embeddings). Returns how many were removed.
    pub fn remove_student(&mut self, roll_no: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.student.roll_no != roll_no);
        before - self.entries.len()
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &GalleryEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Failure modes of loading a gallery resource.
///
/// `NotFound` and `Unreadable` are user-displayable outcomes ("no students
/// registered yet" / "re-register students"), never crashes.
#[derive(Debug, Error)]
pub enum GalleryError {
    #[error("no gallery for class {0}")]
    NotFound(ClassId),
    #[error("gallery for class {class} is unreadable: {reason}")]
    Unreadable { class: ClassId, reason: String },
    #[error("gallery io: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of per-class galleries. Loading is a pure read; implementations
/// may cache as long as writes through the same source invalidate.
pub trait GallerySource: Send + Sync {
    fn load(&self, class: &ClassId) -> Result<Arc<Gallery>, GalleryError>;
}
