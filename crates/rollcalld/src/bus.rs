use crate::service::{AttendanceService, ServiceError};
use crate::session::SessionError;
use rollcall_core::GalleryError;
use serde::Serialize;
use std::sync::Arc;
use zbus::interface;

/// D-Bus interface for the rollcall attendance daemon.
///
/// Bus name: org.rollcall.Attendance1
/// Object path: /org/rollcall/Attendance1
///
/// Payloads are JSON strings; the surrounding web tier speaks whatever it
/// likes to browsers and relays frames here.
pub struct AttendanceBus {
    service: Arc<AttendanceService>,
}

impl AttendanceBus {
    pub fn new(service: Arc<AttendanceService>) -> Self {
        Self { service }
    }
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceBus {
    /// Start a live attendance session for a class id ("<branch>_<semester>").
    async fn start_session(
        &self,
        faculty_email: &str,
        class_id: &str,
    ) -> zbus::fdo::Result<String> {
        tracing::info!(faculty_email, class_id, "start_session requested");
        let started = self.service.start(faculty_email, class_id).map_err(to_fdo)?;
        to_json(&started)
    }

    /// Feed one camera frame (encoded image bytes) into a session.
    async fn process_frame(&self, session_id: &str, frame: Vec<u8>) -> zbus::fdo::Result<String> {
        let outcome = self
            .service
            .process_frame(session_id, frame)
            .await
            .map_err(to_fdo)?;
        to_json(&outcome)
    }

    /// Snapshot a session's recognized set and flags.
    async fn poll_session(&self, session_id: &str) -> zbus::fdo::Result<String> {
        let snapshot = self.service.poll(session_id).map_err(to_fdo)?;
        to_json(&snapshot)
    }

    /// Stop a session, reconcile against the roster, persist the records.
    async fn stop_session(&self, session_id: &str) -> zbus::fdo::Result<String> {
        tracing::info!(session_id, "stop_session requested");
        let summary = self.service.stop(session_id).await.map_err(to_fdo)?;
        to_json(&summary)
    }

    /// Ids of sessions idle longer than `older_than_secs`, for the sweeper.
    async fn list_stale(&self, older_than_secs: u64) -> zbus::fdo::Result<String> {
        to_json(&self.service.stale_sessions(older_than_secs))
    }

    /// Present/Absent totals for a faculty member's lectures today.
    async fn today_summary(&self, faculty_email: &str) -> zbus::fdo::Result<String> {
        let summary = self
            .service
            .today_summary(faculty_email)
            .await
            .map_err(to_fdo)?;
        to_json(&summary)
    }

    /// Daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            // Model loading is fail-fast at startup; a serving daemon
            // always has them.
            "models_loaded": true,
            "active_sessions": self.service.active_sessions(),
        })
        .to_string())
    }
}

fn to_json<T: Serialize>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

/// Map service errors onto D-Bus error replies. Everything here is a
/// recoverable, user-displayable outcome — the daemon never drops the
/// connection over them.
fn to_fdo(err: ServiceError) -> zbus::fdo::Error {
    match &err {
        ServiceError::BadClassId(_) => zbus::fdo::Error::InvalidArgs(err.to_string()),
        ServiceError::Session(SessionError::Gallery(GalleryError::NotFound(_))) => {
            zbus::fdo::Error::Failed(format!("{err} — no students registered for this class"))
        }
        ServiceError::Session(SessionError::Gallery(GalleryError::Unreadable { .. })) => {
            zbus::fdo::Error::Failed(format!("{err} — please re-register students"))
        }
        _ => zbus::fdo::Error::Failed(err.to_string()),
    }
}
