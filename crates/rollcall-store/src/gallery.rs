//! File-backed gallery store with a per-class cache.
//!
//! One JSON file per class under the gallery directory, named
//! `<branch>_<semester>.json`, holding a format version and the parallel
//! `encodings`/`metadata` sequences. Anything that cannot be decoded into a
//! well-formed gallery — bad JSON, a different format version, sequences of
//! different length — is reported as `Unreadable` so callers can tell the
//! user to re-register students instead of crashing.

use rollcall_core::gallery::GallerySource;
use rollcall_core::{ClassId, Embedding, Gallery, GalleryError, StudentRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

/// Bumped whenever the file layout changes; older files are `Unreadable`
/// and must be regenerated by re-registering students.
pub const GALLERY_FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct GalleryFile {
    version: u32,
    encodings: Vec<Embedding>,
    metadata: Vec<StudentRecord>,
}

/// Loads and saves per-class galleries.
///
/// Loads are cached per class; `save` invalidates the class it wrote, so
/// the repeated load on every frame of a live session costs one file read
/// per class until the next enrollment write.
pub struct GalleryStore {
    dir: PathBuf,
    cache: RwLock<HashMap<ClassId, Arc<Gallery>>>,
}

impl GalleryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, class: &ClassId) -> PathBuf {
        self.dir.join(format!("{class}.json"))
    }

    fn read_file(&self, class: &ClassId) -> Result<Gallery, GalleryError> {
        let path = self.path_for(class);
        if !path.exists() {
            return Err(GalleryError::NotFound(class.clone()));
        }

        let raw = std::fs::read(&path)?;
        let file: GalleryFile =
            serde_json::from_slice(&raw).map_err(|e| GalleryError::Unreadable {
                class: class.clone(),
                reason: e.to_string(),
            })?;

        if file.version != GALLERY_FORMAT_VERSION {
            return Err(GalleryError::Unreadable {
                class: class.clone(),
                reason: format!(
                    "format version {} (expected {GALLERY_FORMAT_VERSION})",
                    file.version
                ),
            });
        }

        Gallery::from_parts(file.encodings, file.metadata).map_err(|e| {
            GalleryError::Unreadable {
                class: class.clone(),
                reason: e.to_string(),
            }
        })
    }

    /// Write a gallery for `class`, creating the directory if needed.
    /// Writes via a temp file + rename so readers never observe a partial
    /// file, then drops the cached copy.
    pub fn save(&self, class: &ClassId, gallery: &Gallery) -> Result<(), GalleryError> {
        std::fs::create_dir_all(&self.dir)?;

        let (encodings, metadata) = gallery.clone().into_parts();
        let file = GalleryFile {
            version: GALLERY_FORMAT_VERSION,
            encodings,
            metadata,
        };
        let json = serde_json::to_vec(&file)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let path = self.path_for(class);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;

        self.invalidate(class);
        tracing::debug!(class = %class, entries = gallery.len(), "gallery saved");
        Ok(())
    }

    /// Drop the cached gallery for `class`, forcing the next load to hit
    /// the file.
    pub fn invalidate(&self, class: &ClassId) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(class);
    }
}

impl GallerySource for GalleryStore {
    fn load(&self, class: &ClassId) -> Result<Arc<Gallery>, GalleryError> {
        if let Some(g) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(class)
        {
            return Ok(Arc::clone(g));
        }

        let gallery = Arc::new(self.read_file(class)?);
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(class.clone(), Arc::clone(&gallery));
        tracing::debug!(class = %class, entries = gallery.len(), "gallery loaded");
        Ok(gallery)
    }
}
