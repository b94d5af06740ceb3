//! SQLite attendance store via `tokio-rusqlite`.
//!
//! Holds the student roster, the timetable, and the append-only attendance
//! table. Reconciliation inserts its whole write-set in one transaction so a
//! failed stop never leaves a half-recorded lecture.

use chrono::NaiveDate;
use rollcall_core::{AttendanceRecord, LectureInfo, StudentRecord};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use thiserror::Error;
use tokio_rusqlite::Connection;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS students (
    roll_no   TEXT NOT NULL,
    name      TEXT NOT NULL,
    branch    TEXT NOT NULL,
    semester  INTEGER NOT NULL,
    section   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_students_class
    ON students (branch, semester, section);

CREATE TABLE IF NOT EXISTS timetable (
    faculty_email TEXT NOT NULL,
    day           TEXT NOT NULL,
    branch        TEXT NOT NULL,
    semester      INTEGER NOT NULL,
    section       TEXT NOT NULL,
    subject       TEXT NOT NULL,
    classroom     TEXT NOT NULL,
    start_time    TEXT NOT NULL,
    end_time      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS attendance (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    date          TEXT NOT NULL,
    subject       TEXT NOT NULL,
    faculty_email TEXT NOT NULL,
    classroom     TEXT NOT NULL,
    branch        TEXT NOT NULL,
    semester      INTEGER NOT NULL,
    section       TEXT NOT NULL,
    roll_no       TEXT NOT NULL,
    student_name  TEXT NOT NULL,
    status        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_attendance_faculty_date
    ON attendance (faculty_email, date);
";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database: {0}")]
    Db(#[from] tokio_rusqlite::Error),
}

/// Present/Absent counts for one faculty member on one date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TodaySummary {
    pub present: u64,
    pub absent: u64,
}

/// Handle to the attendance database. Cheap to clone.
#[derive(Clone)]
pub struct AttendanceDb {
    conn: Connection,
}

impl AttendanceDb {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub async fn open(path: &std::path::Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path).await?;
        let db = Self { conn };
        db.migrate().await?;
        Ok(db)
    }

    /// In-memory database, used by tests.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        let db = Self { conn };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        self.conn
            .call(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await?;
        tracing::debug!("attendance schema ready");
        Ok(())
    }

    /// Append the full reconciliation write-set in one transaction.
    /// Returns the number of rows written.
    pub async fn insert_attendance(
        &self,
        records: Vec<AttendanceRecord>,
    ) -> Result<usize, StoreError> {
        let written = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                {
                    let mut stmt = tx.prepare_cached(
                        "INSERT INTO attendance
                           (date, subject, faculty_email, classroom,
                            branch, semester, section,
                            roll_no, student_name, status)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    )?;
                    for r in &records {
                        stmt.execute(params![
                            r.date.to_string(),
                            r.subject,
                            r.faculty_email,
                            r.classroom,
                            r.branch,
                            r.semester,
                            r.section,
                            r.student.roll_no,
                            r.student.name,
                            r.student.status.as_str(),
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(records.len())
            })
            .await?;
        tracing::info!(rows = written, "attendance records written");
        Ok(written)
    }

    /// Full roster of a (branch, semester, section) class.
    pub async fn find_students(
        &self,
        branch: &str,
        semester: u32,
        section: &str,
    ) -> Result<Vec<StudentRecord>, StoreError> {
        let branch = branch.to_string();
        let section = section.to_string();
        let students = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT roll_no, name, branch, semester, section
                       FROM students
                      WHERE branch = ?1 AND semester = ?2 AND section = ?3
                      ORDER BY roll_no",
                )?;
                let rows = stmt
                    .query_map(params![branch, semester, section], |row| {
                        Ok(StudentRecord {
                            roll_no: row.get(0)?,
                            name: row.get(1)?,
                            branch: row.get(2)?,
                            semester: row.get(3)?,
                            section: row.get(4)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;
        Ok(students)
    }

    /// Look up the lecture a faculty member teaches for a class.
    ///
    /// Mirrors the stop-time lookup: keyed by faculty and class, not by
    /// day — a faculty member has at most one timetable row per class.
    pub async fn find_lecture(
        &self,
        faculty_email: &str,
        branch: &str,
        semester: u32,
    ) -> Result<Option<LectureInfo>, StoreError> {
        let faculty_email = faculty_email.trim().to_lowercase();
        let branch = branch.to_string();
        let lecture = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT subject, section, classroom, start_time, end_time
                       FROM timetable
                      WHERE lower(faculty_email) = ?1
                        AND branch = ?2 AND semester = ?3
                      LIMIT 1",
                )?;
                let row = stmt
                    .query_row(params![faculty_email, branch, semester], |row| {
                        Ok(LectureInfo {
                            subject: row.get(0)?,
                            section: row.get(1)?,
                            classroom: row.get(2)?,
                            start_time: row.get(3)?,
                            end_time: row.get(4)?,
                        })
                    })
                    .optional()?;
                Ok(row)
            })
            .await?;
        Ok(lecture)
    }

    /// Present/Absent counts across all of a faculty member's lectures on
    /// one date.
    pub async fn today_summary(
        &self,
        faculty_email: &str,
        date: NaiveDate,
    ) -> Result<TodaySummary, StoreError> {
        let faculty_email = faculty_email.to_string();
        let date = date.to_string();
        let summary = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT status, COUNT(*)
                       FROM attendance
                      WHERE faculty_email = ?1 AND date = ?2
                      GROUP BY status",
                )?;
                let mut summary = TodaySummary::default();
                let rows = stmt.query_map(params![faculty_email, date], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
                })?;
                for row in rows {
                    let (status, count) = row?;
                    match status.as_str() {
                        "Present" => summary.present = count,
                        "Absent" => summary.absent = count,
                        _ => {}
                    }
                }
                Ok(summary)
            })
            .await?;
        Ok(summary)
    }

    /// Seed one student row (setup flows and tests).
    pub async fn insert_student(&self, student: StudentRecord) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO students (roll_no, name, branch, semester, section)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        student.roll_no,
                        student.name,
                        student.branch,
                        student.semester,
                        student.section
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Seed one timetable row (setup flows and tests).
    pub async fn insert_lecture(
        &self,
        faculty_email: &str,
        day: &str,
        branch: &str,
        semester: u32,
        lecture: LectureInfo,
    ) -> Result<(), StoreError> {
        let faculty_email = faculty_email.to_string();
        let day = day.to_string();
        let branch = branch.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO timetable
                       (faculty_email, day, branch, semester, section,
                        subject, classroom, start_time, end_time)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        faculty_email,
                        day,
                        branch,
                        semester,
                        lecture.section,
                        lecture.subject,
                        lecture.classroom,
                        lecture.start_time,
                        lecture.end_time
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}
