//! rollcall-core — Domain model for live classroom attendance.
//!
//! Holds the types shared by every crate in the workspace: class and student
//! identity, face embeddings, the per-class gallery, the nearest-neighbor
//! matcher, and the contracts (`FaceProvider`, `GallerySource`) the daemon is
//! wired against.

pub mod gallery;
pub mod matcher;
pub mod provider;
pub mod types;

pub use gallery::{Gallery, GalleryEntry, GalleryError, GallerySource};
pub use matcher::{EuclideanMatcher, Matcher, NearestMatch, DEFAULT_TOLERANCE};
pub use provider::{BoundingBox, DetectedFace, FaceProvider, ProviderError};
pub use types::{
    AttendanceRecord, AttendanceStatus, ClassId, Embedding, LectureInfo, StudentMark,
    StudentRecord,
};
