//! Live attendance session store — the concurrency core of the daemon.
//!
//! Many short-lived request handlers share one table of active sessions.
//! Every table mutation happens under one mutex with short critical
//! sections; the expensive per-frame work (image decode, inference,
//! matching) runs on the blocking pool with no lock held, so `poll` and
//! `stop` are never stuck behind a slow frame. A frame whose session was
//! stopped mid-inference is discarded at merge time instead of
//! resurrecting the session.

use rollcall_core::gallery::GallerySource;
use rollcall_core::{ClassId, EuclideanMatcher, FaceProvider, GalleryError, Matcher};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session not found")]
    NotFound,
    #[error("session is not active")]
    Inactive,
    #[error(transparent)]
    Gallery(#[from] GalleryError),
}

/// One active session. Only ever touched under the store mutex.
struct Session {
    faculty_email: String,
    class_id: ClassId,
    recognized: HashSet<String>,
    is_active: bool,
    model_verified: bool,
    started_at: chrono::DateTime<chrono::Utc>,
    last_activity: Instant,
}

/// Result of one processed frame.
#[derive(Debug, Clone, Serialize)]
pub struct FrameOutcome {
    /// Student keys recognized for the first time by this frame.
    pub added_this_frame: Vec<String>,
    pub total_recognized: usize,
    pub model_verified: bool,
}

/// Read-only view of a session returned by `poll`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub recognized_students: Vec<String>,
    pub count: usize,
    pub is_active: bool,
    pub model_verified: bool,
}

/// A session removed from the table by `stop`, carrying everything the
/// reconciler needs.
#[derive(Debug)]
pub struct FinishedSession {
    pub session_id: String,
    pub faculty_email: String,
    pub class_id: ClassId,
    pub recognized: HashSet<String>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

/// What one frame's inference produced. Gallery failures surface to the
/// caller; provider and decode failures are absorbed into
/// `inference_ok = false`.
struct FrameInference {
    recognized: HashSet<String>,
    inference_ok: bool,
}

/// The shared table of active sessions.
///
/// Constructor-created and injected into request handlers; owns its own
/// exclusion primitive rather than living in ambient global state.
pub struct SessionStore {
    sessions: Mutex<HashMap<String, Session>>,
    galleries: Arc<dyn GallerySource>,
    provider: Arc<dyn FaceProvider>,
    tolerance: f32,
}

impl SessionStore {
    pub fn new(
        galleries: Arc<dyn GallerySource>,
        provider: Arc<dyn FaceProvider>,
        tolerance: f32,
    ) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            galleries,
            provider,
            tolerance,
        }
    }

    fn table(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create a session for a lecture. The gallery is validated first so a
    /// session can never point at a class nobody has enrolled for.
    pub fn start(&self, faculty_email: &str, class_id: ClassId) -> Result<String, SessionError> {
        self.galleries.load(&class_id)?;

        let id = uuid::Uuid::new_v4().to_string();
        let session = Session {
            faculty_email: faculty_email.to_string(),
            class_id: class_id.clone(),
            recognized: HashSet::new(),
            is_active: true,
            model_verified: false,
            started_at: chrono::Utc::now(),
            last_activity: Instant::now(),
        };

        let mut table = self.table();
        table.insert(id.clone(), session);
        tracing::info!(
            session = %id,
            class = %class_id,
            faculty = faculty_email,
            active = table.len(),
            "attendance session started"
        );
        Ok(id)
    }

    /// Run recognition over one frame and merge the result into the session.
    ///
    /// A successful inference call — even one that finds zero faces — flips
    /// `model_verified`. A provider or decode failure contributes nothing
    /// and leaves `model_verified` untouched for this call.
    pub async fn process_frame(
        &self,
        session_id: &str,
        image_bytes: Vec<u8>,
    ) -> Result<FrameOutcome, SessionError> {
        let class_id = {
            let table = self.table();
            let session = table.get(session_id).ok_or(SessionError::NotFound)?;
            if !session.is_active {
                return Err(SessionError::Inactive);
            }
            session.class_id.clone()
        };

        let galleries = Arc::clone(&self.galleries);
        let provider = Arc::clone(&self.provider);
        let tolerance = self.tolerance;
        let joined = tokio::task::spawn_blocking(move || {
            recognize_frame(
                galleries.as_ref(),
                provider.as_ref(),
                &class_id,
                &image_bytes,
                tolerance,
            )
        })
        .await;

        let inference = match joined {
            Ok(result) => result?,
            Err(e) => {
                tracing::error!(session = session_id, error = %e, "frame task aborted");
                FrameInference {
                    recognized: HashSet::new(),
                    inference_ok: false,
                }
            }
        };

        let mut table = self.table();
        // The session may have been stopped while inference ran; discard
        // the merge rather than resurrecting it.
        let session = table.get_mut(session_id).ok_or(SessionError::NotFound)?;
        if !session.is_active {
            return Err(SessionError::Inactive);
        }

        if inference.inference_ok {
            session.model_verified = true;
        }
        let added_this_frame: Vec<String> = inference
            .recognized
            .iter()
            .filter(|key| !session.recognized.contains(*key))
            .cloned()
            .collect();
        session.recognized.extend(inference.recognized);
        session.last_activity = Instant::now();

        Ok(FrameOutcome {
            added_this_frame,
            total_recognized: session.recognized.len(),
            model_verified: session.model_verified,
        })
    }

    /// Snapshot a session. Safe to call arbitrarily often, concurrently
    /// with in-flight frames.
    pub fn poll(&self, session_id: &str) -> Result<SessionSnapshot, SessionError> {
        let table = self.table();
        let session = table.get(session_id).ok_or(SessionError::NotFound)?;
        Ok(SessionSnapshot {
            recognized_students: session.recognized.iter().cloned().collect(),
            count: session.recognized.len(),
            is_active: session.is_active,
            model_verified: session.model_verified,
        })
    }

    /// Finish a session: flip it inactive and remove it from the table in
    /// one critical section. Once this returns, the id resolves to
    /// `NotFound` everywhere.
    pub fn stop(&self, session_id: &str) -> Result<FinishedSession, SessionError> {
        let mut session = self
            .table()
            .remove(session_id)
            .ok_or(SessionError::NotFound)?;
        session.is_active = false;

        tracing::info!(
            session = session_id,
            recognized = session.recognized.len(),
            "attendance session stopped"
        );
        Ok(FinishedSession {
            session_id: session_id.to_string(),
            faculty_email: session.faculty_email,
            class_id: session.class_id,
            recognized: session.recognized,
            started_at: session.started_at,
        })
    }

    /// Ids of sessions with no frame activity for longer than `older_than`.
    /// The store never expires sessions itself; an external sweeper decides
    /// what to do with these.
    pub fn list_stale(&self, older_than: Duration) -> Vec<String> {
        self.table()
            .iter()
            .filter(|(_, s)| s.last_activity.elapsed() > older_than)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.table().len()
    }
}

/// The per-frame pipeline, run on the blocking pool: load the (cached)
/// gallery, decode the image, run face inference, match each face.
fn recognize_frame(
    galleries: &dyn GallerySource,
    provider: &dyn FaceProvider,
    class_id: &ClassId,
    image_bytes: &[u8],
    tolerance: f32,
) -> Result<FrameInference, SessionError> {
    let gallery = galleries.load(class_id)?;

    let absorbed = FrameInference {
        recognized: HashSet::new(),
        inference_ok: false,
    };

    let image = match image::load_from_memory(image_bytes) {
        Ok(img) => img.to_rgb8(),
        Err(e) => {
            tracing::warn!(class = %class_id, error = %e, "frame decode failed, frame skipped");
            return Ok(absorbed);
        }
    };

    let (width, height) = image.dimensions();
    let faces = match provider.detect_faces(image.as_raw(), width, height) {
        Ok(faces) => faces,
        Err(e) => {
            tracing::warn!(class = %class_id, error = %e, "face inference failed, frame skipped");
            return Ok(absorbed);
        }
    };

    let mut recognized = HashSet::new();
    for face in &faces {
        if let Some(m) = EuclideanMatcher.nearest(&face.embedding, &gallery, tolerance) {
            tracing::debug!(
                class = %class_id,
                student = m.student.key(),
                distance = m.distance,
                "face matched"
            );
            recognized.insert(m.student.key().to_string());
        }
    }

    Ok(FrameInference {
        recognized,
        inference_ok: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{png_frame, MapGallery, ScriptedProvider, FRAME_FAIL};
    use rollcall_core::Embedding;

    fn store_with(gallery: Arc<MapGallery>, provider: Arc<ScriptedProvider>) -> SessionStore {
        SessionStore::new(gallery, provider, rollcall_core::DEFAULT_TOLERANCE)
    }

    fn two_student_setup() -> (SessionStore, ClassId) {
        let class = ClassId::new("CSE", 4);
        let gallery = MapGallery::with_students(
            &class,
            vec![
                ("001", "Alice", vec![1.0, 0.0, 0.0]),
                ("002", "Bob", vec![0.0, 1.0, 0.0]),
            ],
        );
        // Frame tag 1 shows Alice's face, tag 2 Bob's, tag 3 nobody.
        let provider = ScriptedProvider::new()
            .face(1, Embedding::new(vec![1.0, 0.0, 0.0]))
            .face(2, Embedding::new(vec![0.0, 1.0, 0.0]))
            .empty(3);
        (store_with(Arc::new(gallery), Arc::new(provider)), class)
    }

    #[test]
    fn test_start_requires_gallery() {
        let store = store_with(
            Arc::new(MapGallery::empty()),
            Arc::new(ScriptedProvider::new()),
        );
        let err = store
            .start("prof@example.edu", ClassId::new("CSE", 4))
            .unwrap_err();
        assert!(matches!(err, SessionError::Gallery(GalleryError::NotFound(_))));
        assert_eq!(store.active_count(), 0);
    }

    #[tokio::test]
    async fn test_recognized_set_is_a_union_across_frames() {
        let (store, class) = two_student_setup();
        let id = store.start("prof@example.edu", class).unwrap();

        let first = store.process_frame(&id, png_frame(1)).await.unwrap();
        assert_eq!(first.added_this_frame, vec!["001".to_string()]);
        assert_eq!(first.total_recognized, 1);
        assert!(first.model_verified);

        // Same face again: counted once, nothing newly added.
        let second = store.process_frame(&id, png_frame(1)).await.unwrap();
        assert!(second.added_this_frame.is_empty());
        assert_eq!(second.total_recognized, 1);

        let third = store.process_frame(&id, png_frame(2)).await.unwrap();
        assert_eq!(third.added_this_frame, vec!["002".to_string()]);
        assert_eq!(third.total_recognized, 2);

        let snap = store.poll(&id).unwrap();
        assert_eq!(snap.count, 2);
        let mut keys = snap.recognized_students.clone();
        keys.sort();
        assert_eq!(keys, vec!["001".to_string(), "002".to_string()]);
    }

    #[tokio::test]
    async fn test_zero_face_frame_still_verifies_model() {
        let (store, class) = two_student_setup();
        let id = store.start("prof@example.edu", class).unwrap();

        let outcome = store.process_frame(&id, png_frame(3)).await.unwrap();
        assert!(outcome.added_this_frame.is_empty());
        assert_eq!(outcome.total_recognized, 0);
        assert!(outcome.model_verified);
    }

    #[tokio::test]
    async fn test_provider_failure_is_absorbed() {
        let (store, class) = two_student_setup();
        let id = store.start("prof@example.edu", class).unwrap();

        let outcome = store.process_frame(&id, png_frame(FRAME_FAIL)).await.unwrap();
        assert_eq!(outcome.total_recognized, 0);
        assert!(!outcome.model_verified);

        // The session survives and keeps working.
        let next = store.process_frame(&id, png_frame(1)).await.unwrap();
        assert_eq!(next.total_recognized, 1);
        assert!(next.model_verified);

        // A later failed frame leaves the verified flag set.
        let after = store.process_frame(&id, png_frame(FRAME_FAIL)).await.unwrap();
        assert!(after.model_verified);
    }

    #[tokio::test]
    async fn test_undecodable_frame_is_absorbed() {
        let (store, class) = two_student_setup();
        let id = store.start("prof@example.edu", class).unwrap();

        let outcome = store
            .process_frame(&id, b"definitely not an image".to_vec())
            .await
            .unwrap();
        assert_eq!(outcome.total_recognized, 0);
        assert!(!outcome.model_verified);
    }

    #[tokio::test]
    async fn test_gallery_turning_unreadable_surfaces_typed_error() {
        let class = ClassId::new("CSE", 4);
        let gallery = Arc::new(MapGallery::with_students(
            &class,
            vec![("001", "Alice", vec![1.0, 0.0, 0.0])],
        ));
        let provider = Arc::new(ScriptedProvider::new().face(1, Embedding::new(vec![1.0, 0.0, 0.0])));
        let store = store_with(Arc::clone(&gallery), provider);

        let id = store.start("prof@example.edu", class).unwrap();

        // Break the gallery after start; the next frame must surface
        // Unreadable rather than absorbing it like a provider failure.
        gallery.poison();
        let err = store.process_frame(&id, png_frame(1)).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Gallery(GalleryError::Unreadable { .. })
        ));

        // The session itself is untouched and still active.
        assert!(store.poll(&id).unwrap().is_active);
    }

    #[tokio::test]
    async fn test_poll_unknown_session_is_not_found() {
        let (store, _class) = two_student_setup();
        assert!(matches!(
            store.poll("no-such-session"),
            Err(SessionError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_stop_removes_the_session() {
        let (store, class) = two_student_setup();
        let id = store.start("prof@example.edu", class).unwrap();
        store.process_frame(&id, png_frame(1)).await.unwrap();

        let finished = store.stop(&id).unwrap();
        assert_eq!(finished.recognized.len(), 1);
        assert!(finished.recognized.contains("001"));
        assert_eq!(store.active_count(), 0);

        assert!(matches!(store.poll(&id), Err(SessionError::NotFound)));
        assert!(matches!(
            store.process_frame(&id, png_frame(1)).await,
            Err(SessionError::NotFound)
        ));
        assert!(matches!(store.stop(&id), Err(SessionError::NotFound)));
    }

    #[tokio::test]
    async fn test_concurrent_frames_both_merge() {
        let (store, class) = two_student_setup();
        let id = store.start("prof@example.edu", class).unwrap();

        let (a, b) = tokio::join!(
            store.process_frame(&id, png_frame(1)),
            store.process_frame(&id, png_frame(2)),
        );
        a.unwrap();
        b.unwrap();

        let snap = store.poll(&id).unwrap();
        assert_eq!(snap.count, 2, "both concurrent frames must merge");
    }

    #[tokio::test]
    async fn test_stale_listing() {
        let (store, class) = two_student_setup();
        let a = store.start("prof@example.edu", class.clone()).unwrap();
        let b = store.start("prof@example.edu", class).unwrap();

        std::thread::sleep(Duration::from_millis(10));
        let mut stale = store.list_stale(Duration::ZERO);
        stale.sort();
        let mut expected = vec![a.clone(), b.clone()];
        expected.sort();
        assert_eq!(stale, expected);

        assert!(store.list_stale(Duration::from_secs(3600)).is_empty());

        // Fresh activity takes a session off the stale list.
        store.process_frame(&a, png_frame(1)).await.unwrap();
        let stale = store.list_stale(Duration::from_millis(5));
        assert_eq!(stale, vec![b]);
    }
}
