//! Roster reconciliation — the final step of a session.

use chrono::NaiveDate;
use rollcall_core::{
    AttendanceRecord, AttendanceStatus, ClassId, LectureInfo, StudentMark, StudentRecord,
};
use std::collections::HashSet;

/// Turn the accumulated present-set plus the full class roster into the
/// complete write-set for one lecture.
///
/// Exactly one record per roster member: `Present` if the member's key is
/// in `recognized`, `Absent` otherwise. Recognized keys with no roster
/// counterpart produce nothing — the roster is the authority on who gets a
/// record. Runs once, synchronously, at stop time.
pub fn reconcile(
    roster: &[StudentRecord],
    recognized: &HashSet<String>,
    class: &ClassId,
    lecture: &LectureInfo,
    faculty_email: &str,
    date: NaiveDate,
) -> Vec<AttendanceRecord> {
    roster
        .iter()
        .map(|student| {
            let status = if recognized.contains(student.key()) {
                AttendanceStatus::Present
            } else {
                AttendanceStatus::Absent
            };
            AttendanceRecord {
                date,
                subject: lecture.subject.clone(),
                faculty_email: faculty_email.to_string(),
                classroom: lecture.classroom.clone(),
                branch: class.branch.clone(),
                semester: class.semester,
                section: lecture.section.clone(),
                student: StudentMark {
                    roll_no: student.roll_no.clone(),
                    name: student.name.clone(),
                    status,
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn student(roll: &str, name: &str) -> StudentRecord {
        StudentRecord {
            roll_no: roll.into(),
            name: name.into(),
            branch: "CSE".into(),
            semester: 4,
            section: "A".into(),
        }
    }

    fn lecture() -> LectureInfo {
        LectureInfo {
            subject: "Algorithms".into(),
            section: "A".into(),
            classroom: "LH-2".into(),
            start_time: "09:00".into(),
            end_time: "10:00".into(),
        }
    }

    fn run(roster: &[StudentRecord], recognized: &[&str]) -> Vec<AttendanceRecord> {
        let recognized: HashSet<String> = recognized.iter().map(|s| s.to_string()).collect();
        reconcile(
            roster,
            &recognized,
            &ClassId::new("CSE", 4),
            &lecture(),
            "prof@example.edu",
            NaiveDate::from_ymd_opt(2025, 11, 3).unwrap(),
        )
    }

    #[test]
    fn test_one_record_per_roster_member() {
        let roster = vec![
            student("001", "Alice"),
            student("002", "Bob"),
            student("003", "Carol"),
        ];
        let records = run(&roster, &["001"]);

        assert_eq!(records.len(), 3);
        let present: Vec<_> = records
            .iter()
            .filter(|r| r.student.status == AttendanceStatus::Present)
            .map(|r| r.student.roll_no.as_str())
            .collect();
        assert_eq!(present, vec!["001"]);
        assert_eq!(
            records
                .iter()
                .filter(|r| r.student.status == AttendanceStatus::Absent)
                .count(),
            2
        );
    }

    #[test]
    fn test_alice_present_bob_carol_absent() {
        let roster = vec![
            student("001", "Alice"),
            student("002", "Bob"),
            student("003", "Carol"),
        ];
        let records = run(&roster, &["001"]);

        let by_roll = |roll: &str| {
            records
                .iter()
                .find(|r| r.student.roll_no == roll)
                .map(|r| r.student.status)
        };
        assert_eq!(by_roll("001"), Some(AttendanceStatus::Present));
        assert_eq!(by_roll("002"), Some(AttendanceStatus::Absent));
        assert_eq!(by_roll("003"), Some(AttendanceStatus::Absent));
    }

    #[test]
    fn test_empty_recognized_marks_everyone_absent() {
        let roster = vec![student("001", "Alice"), student("002", "Bob")];
        let records = run(&roster, &[]);
        assert!(records
            .iter()
            .all(|r| r.student.status == AttendanceStatus::Absent));
    }

    #[test]
    fn test_unknown_recognized_key_produces_no_record() {
        let roster = vec![student("001", "Alice")];
        let records = run(&roster, &["001", "999"]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].student.roll_no, "001");
    }

    #[test]
    fn test_name_fallback_key_matches() {
        // A student with no roll number is keyed (and recognized) by name.
        let roster = vec![student("", "Dana"), student("002", "Bob")];

        let records = run(&roster, &["Dana"]);
        assert_eq!(records[0].student.status, AttendanceStatus::Present);
        assert_eq!(records[1].student.status, AttendanceStatus::Absent);
    }

    #[test]
    fn test_record_carries_lecture_context() {
        let records = run(&[student("001", "Alice")], &["001"]);
        let r = &records[0];
        assert_eq!(r.subject, "Algorithms");
        assert_eq!(r.classroom, "LH-2");
        assert_eq!(r.branch, "CSE");
        assert_eq!(r.semester, 4);
        assert_eq!(r.section, "A");
        assert_eq!(r.faculty_email, "prof@example.edu");
    }

    #[test]
    fn test_empty_roster_is_empty_write_set() {
        assert!(run(&[], &["001"]).is_empty());
    }
}
