//! Request-facing attendance operations, composed over the session store
//! and the storage layer. The bus surface is a thin shell around this.

use crate::reconcile::reconcile;
use crate::session::{FrameOutcome, SessionError, SessionSnapshot, SessionStore};
use chrono::Local;
use rollcall_core::types::ClassIdParseError;
use rollcall_core::{AttendanceStatus, ClassId};
use rollcall_store::{AttendanceDb, StoreError, TodaySummary};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    BadClassId(#[from] ClassIdParseError),
    #[error("no lecture on the timetable for {faculty} and class {class}")]
    LectureNotFound { faculty: String, class: ClassId },
}

#[derive(Debug, Clone, Serialize)]
pub struct StartedSession {
    pub session_id: String,
}

/// What a finished session wrote: the final present-set and the shape of
/// the reconciled write-set.
#[derive(Debug, Clone, Serialize)]
pub struct StopSummary {
    pub recognized_students: Vec<String>,
    pub count: usize,
    pub present: usize,
    pub absent: usize,
}

pub struct AttendanceService {
    sessions: SessionStore,
    db: AttendanceDb,
}

impl AttendanceService {
    pub fn new(sessions: SessionStore, db: AttendanceDb) -> Self {
        Self { sessions, db }
    }

    /// Start a live session for `class_id` (as `"<branch>_<semester>"`).
    pub fn start(&self, faculty_email: &str, class_id: &str) -> Result<StartedSession, ServiceError> {
        let class: ClassId = class_id.parse()?;
        let session_id = self.sessions.start(faculty_email, class)?;
        Ok(StartedSession { session_id })
    }

    pub async fn process_frame(
        &self,
        session_id: &str,
        frame: Vec<u8>,
    ) -> Result<FrameOutcome, ServiceError> {
        Ok(self.sessions.process_frame(session_id, frame).await?)
    }

    pub fn poll(&self, session_id: &str) -> Result<SessionSnapshot, ServiceError> {
        Ok(self.sessions.poll(session_id)?)
    }

    /// Stop a session and persist the reconciled attendance for its class.
    ///
    /// The session is removed before reconciliation, so a failed timetable
    /// or roster lookup surfaces as an error with the session already gone
    /// — stopping is final either way.
    pub async fn stop(&self, session_id: &str) -> Result<StopSummary, ServiceError> {
        let finished = self.sessions.stop(session_id)?;

        let lecture = self
            .db
            .find_lecture(
                &finished.faculty_email,
                &finished.class_id.branch,
                finished.class_id.semester,
            )
            .await?
            .ok_or_else(|| ServiceError::LectureNotFound {
                faculty: finished.faculty_email.clone(),
                class: finished.class_id.clone(),
            })?;

        let roster = self
            .db
            .find_students(
                &finished.class_id.branch,
                finished.class_id.semester,
                &lecture.section,
            )
            .await?;

        let date = Local::now().date_naive();
        let records = reconcile(
            &roster,
            &finished.recognized,
            &finished.class_id,
            &lecture,
            &finished.faculty_email,
            date,
        );
        let present = records
            .iter()
            .filter(|r| r.student.status == AttendanceStatus::Present)
            .count();
        let written = self.db.insert_attendance(records).await?;

        tracing::info!(
            session = %finished.session_id,
            class = %finished.class_id,
            started_at = %finished.started_at,
            written,
            present,
            "attendance reconciled"
        );

        Ok(StopSummary {
            recognized_students: finished.recognized.iter().cloned().collect(),
            count: finished.recognized.len(),
            present,
            absent: written - present,
        })
    }

    /// Sessions idle for more than `older_than_secs`, for an external sweeper.
    pub fn stale_sessions(&self, older_than_secs: u64) -> Vec<String> {
        self.sessions
            .list_stale(Duration::from_secs(older_than_secs))
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.active_count()
    }

    /// Present/Absent totals across a faculty member's lectures today.
    pub async fn today_summary(&self, faculty_email: &str) -> Result<TodaySummary, ServiceError> {
        Ok(self
            .db
            .today_summary(faculty_email, Local::now().date_naive())
            .await?)
    }
}
