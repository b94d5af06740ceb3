use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Face embedding vector (512-dimensional for the ArcFace family).
///
/// Serialized as a bare float array so gallery files stay compact and
/// compatible with the `encodings` sequences written by enrollment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance between two embeddings.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Gallery partition key: one gallery per (branch, semester).
///
/// Section is intentionally not part of the key — all sections of a
/// branch/semester share one enrollment gallery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassId {
    pub branch: String,
    pub semester: u32,
}

impl ClassId {
    pub fn new(branch: impl Into<String>, semester: u32) -> Self {
        Self {
            branch: branch.into(),
            semester,
        }
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.branch, self.semester)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid class id {0:?}, expected \"<branch>_<semester>\"")]
pub struct ClassIdParseError(pub String);

impl FromStr for ClassId {
    type Err = ClassIdParseError;

    /// Parse `"<branch>_<semester>"`. The semester is the segment after the
    /// last underscore, so branch names may themselves contain underscores.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (branch, semester) = s
            .rsplit_once('_')
            .ok_or_else(|| ClassIdParseError(s.to_string()))?;
        if branch.is_empty() {
            return Err(ClassIdParseError(s.to_string()));
        }
        let semester = semester
            .parse()
            .map_err(|_| ClassIdParseError(s.to_string()))?;
        Ok(Self {
            branch: branch.to_string(),
            semester,
        })
    }
}

/// An enrolled student, as stored alongside each gallery embedding and in
/// the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub roll_no: String,
    pub name: String,
    pub branch: String,
    pub semester: u32,
    pub section: String,
}

impl StudentRecord {
    /// Identity key used in recognized sets and reconciliation: the roll
    /// number, falling back to the name when no roll number is on record.
    pub fn key(&self) -> &str {
        if self.roll_no.is_empty() {
            &self.name
        } else {
            &self.roll_no
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
        }
    }
}

impl FromStr for AttendanceStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Present" => Ok(AttendanceStatus::Present),
            "Absent" => Ok(AttendanceStatus::Absent),
            _ => Err(()),
        }
    }
}

/// The per-student part of an attendance record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentMark {
    pub roll_no: String,
    pub name: String,
    pub status: AttendanceStatus,
}

/// One persisted attendance row: one student, one lecture, one day.
/// Rows are append-only; reconciliation never updates in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub date: NaiveDate,
    pub subject: String,
    pub faculty_email: String,
    pub classroom: String,
    pub branch: String,
    pub semester: u32,
    pub section: String,
    pub student: StudentMark,
}

/// Timetable lookup result — the lecture context stamped onto attendance
/// records when a session stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LectureInfo {
    pub subject: String,
    pub section: String,
    pub classroom: String,
    pub start_time: String,
    pub end_time: String,
}
