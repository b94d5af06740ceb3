//! Nearest-neighbor matching of a probe embedding against a gallery.

use crate::gallery::Gallery;
use crate::types::{Embedding, StudentRecord};

/// Euclidean distance below which a probe counts as a match. Shared by
/// every call site — enrollment dedup, batch, and live sessions — unless
/// explicitly overridden.
pub const DEFAULT_TOLERANCE: f32 = 0.85;

/// A successful match: the gallery entry nearest to the probe.
#[derive(Debug, Clone)]
pub struct NearestMatch<'g> {
    pub student: &'g StudentRecord,
    pub distance: f32,
    /// Index of the matched entry within the gallery.
    pub index: usize,
}

/// Strategy for resolving a probe embedding against a gallery.
///
/// Currently a linear scan; an indexed nearest-neighbor structure would
/// slot in behind this same trait if galleries outgrow it.
pub trait Matcher {
    fn nearest<'g>(
        &self,
        probe: &Embedding,
        gallery: &'g Gallery,
        tolerance: f32,
    ) -> Option<NearestMatch<'g>>;
}

/// Linear-scan Euclidean matcher.
///
/// Scans every entry, keeps the global minimum distance, and matches only
/// when `min < tolerance` (strict: a probe at exactly the tolerance is a
/// non-match). Exact-equal minimal distances resolve to the first entry in
/// gallery order. An empty gallery is a non-match, never an error.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn nearest<'g>(
        &self,
        probe: &Embedding,
        gallery: &'g Gallery,
        tolerance: f32,
    ) -> Option<NearestMatch<'g>> {
        let mut best: Option<(usize, f32)> = None;

        for (i, entry) in gallery.iter().enumerate() {
            let dist = probe.euclidean_distance(&entry.embedding);
            // Strictly-less keeps the first entry on exact ties.
            match best {
                Some((_, d)) if dist >= d => {}
                _ => best = Some((i, dist)),
            }
        }

        let (index, distance) = best?;
        if distance < tolerance {
            Some(NearestMatch {
                student: &gallery.entries()[index].student,
                distance,
                index,
            })
        } else {
            None
        }
    }
}
