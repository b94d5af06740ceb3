//! Test doubles shared by the session and service tests.

use rollcall_core::gallery::{GalleryEntry, GallerySource};
use rollcall_core::{
    BoundingBox, ClassId, DetectedFace, Embedding, FaceProvider, Gallery, GalleryError,
    ProviderError, StudentRecord,
};
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Frame tag that makes [`ScriptedProvider`] fail inference.
pub const FRAME_FAIL: u8 = 255;

/// Encode a tiny PNG whose red channel carries `tag`; the scripted provider
/// keys off it after the daemon decodes the frame.
pub fn png_frame(tag: u8) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(8, 8, image::Rgb([tag, 0, 0]));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("png encode");
    bytes
}

/// In-memory gallery source with a poison switch for simulating a resource
/// that turns unreadable mid-session.
pub struct MapGallery {
    galleries: HashMap<ClassId, Arc<Gallery>>,
    poisoned: AtomicBool,
}

impl MapGallery {
    pub fn empty() -> Self {
        Self {
            galleries: HashMap::new(),
            poisoned: AtomicBool::new(false),
        }
    }

    /// One class whose gallery holds `(roll_no, name, embedding)` triples,
    /// all in section "A".
    pub fn with_students(class: &ClassId, students: Vec<(&str, &str, Vec<f32>)>) -> Self {
        let mut gallery = Gallery::new();
        for (roll_no, name, values) in students {
            gallery.push(GalleryEntry {
                embedding: Embedding::new(values),
                student: StudentRecord {
                    roll_no: roll_no.into(),
                    name: name.into(),
                    branch: class.branch.clone(),
                    semester: class.semester,
                    section: "A".into(),
                },
            });
        }
        let mut galleries = HashMap::new();
        galleries.insert(class.clone(), Arc::new(gallery));
        Self {
            galleries,
            poisoned: AtomicBool::new(false),
        }
    }

    /// Make every subsequent load fail as `Unreadable`.
    pub fn poison(&self) {
        self.poisoned.store(true, Ordering::SeqCst);
    }
}

impl GallerySource for MapGallery {
    fn load(&self, class: &ClassId) -> Result<Arc<Gallery>, GalleryError> {
        if self.poisoned.load(Ordering::SeqCst) {
            return Err(GalleryError::Unreadable {
                class: class.clone(),
                reason: "poisoned by test".into(),
            });
        }
        self.galleries
            .get(class)
            .cloned()
            .ok_or_else(|| GalleryError::NotFound(class.clone()))
    }
}

/// Face provider scripted by frame tag: the first byte of the decoded RGB
/// frame selects which embeddings "appear" in it.
pub struct ScriptedProvider {
    by_tag: HashMap<u8, Vec<Embedding>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            by_tag: HashMap::new(),
        }
    }

    /// Add a face that shows up in frames tagged `tag`.
    pub fn face(mut self, tag: u8, embedding: Embedding) -> Self {
        self.by_tag.entry(tag).or_default().push(embedding);
        self
    }

    /// Register `tag` as a frame in which no face is found.
    pub fn empty(mut self, tag: u8) -> Self {
        self.by_tag.entry(tag).or_default();
        self
    }
}

impl FaceProvider for ScriptedProvider {
    fn detect_faces(
        &self,
        rgb: &[u8],
        _width: u32,
        _height: u32,
    ) -> Result<Vec<DetectedFace>, ProviderError> {
        let tag = rgb.first().copied().unwrap_or(0);
        if tag == FRAME_FAIL {
            return Err(ProviderError::Inference("scripted failure".into()));
        }
        let faces = self.by_tag.get(&tag).cloned().unwrap_or_default();
        Ok(faces
            .into_iter()
            .map(|embedding| DetectedFace {
                embedding,
                bbox: BoundingBox {
                    x: 0.0,
                    y: 0.0,
                    width: 8.0,
                    height: 8.0,
                    confidence: 0.99,
                },
            })
            .collect())
    }
}
