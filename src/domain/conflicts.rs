use crate::domain::change_set::{AttendanceChanges, BlockChanges};
use crate::domain::effective_state::{effective_attendance_type, AttendanceSnapshot};
use crate::domain::models::{
    practice_name, AttendanceType, BlockDraft, Practice, PracticeId, RecordId,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Persisted attendance that a new block would invalidate.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AttendanceConflict {
    pub record_id: RecordId,
    pub date: NaiveDate,
    pub practice_id: PracticeId,
    pub practice_name: String,
    pub attendance_type: AttendanceType,
}

/// How the caller settles conflicts before a block addition is committed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConflictResolution {
    CancelBlockStaging,
    RemoveConflictingAttendance,
}

impl ConflictResolution {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "cancel" | "cancel_block_staging" => Some(Self::CancelBlockStaging),
            "remove" | "remove_conflicting_attendance" => Some(Self::RemoveConflictingAttendance),
            _ => None,
        }
    }
}

/// Persisted, non-removed attendance inside the candidate's inclusive span,
/// ordered by date then practice name. Types reflect staged updates.
pub fn detect_conflicts(
    candidate: &BlockDraft,
    snapshot: &AttendanceSnapshot,
    changes: &AttendanceChanges,
    practices: &[Practice],
) -> Vec<AttendanceConflict> {
    let mut conflicts = snapshot
        .in_range(candidate.start_date, candidate.end_date)
        .filter(|record| !changes.is_removed(record.id))
        .map(|record| AttendanceConflict {
            record_id: record.id,
            date: record.date,
            practice_id: record.practice_id,
            practice_name: practice_name(practices, record.practice_id),
            attendance_type: effective_attendance_type(record, changes),
        })
        .collect::<Vec<_>>();
    sort_conflicts(&mut conflicts);
    conflicts
}

/// Conflicts across every staged block addition, each record reported once.
pub fn detect_staged_conflicts(
    block_changes: &BlockChanges,
    snapshot: &AttendanceSnapshot,
    changes: &AttendanceChanges,
    practices: &[Practice],
) -> Vec<AttendanceConflict> {
    let mut seen = BTreeSet::new();
    let mut conflicts = Vec::new();
    for (_, draft) in block_changes.additions() {
        for conflict in detect_conflicts(draft, snapshot, changes, practices) {
            if seen.insert(conflict.record_id) {
                conflicts.push(conflict);
            }
        }
    }
    sort_conflicts(&mut conflicts);
    conflicts
}

fn sort_conflicts(conflicts: &mut [AttendanceConflict]) {
    conflicts.sort_by(|left, right| {
        left.date
            .cmp(&right.date)
            .then_with(|| left.practice_name.cmp(&right.practice_name))
            .then_with(|| left.record_id.cmp(&right.record_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AttendancePatch, AttendanceRecord};

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").expect("valid date")
    }

    fn record(id: RecordId, day: &str, practice_id: PracticeId) -> AttendanceRecord {
        AttendanceRecord {
            id,
            practice_id,
            date: date(day),
            attendance_type: AttendanceType::FullDay,
            check_in_time: None,
            check_out_time: None,
            notes: None,
        }
    }

    fn practices() -> Vec<Practice> {
        vec![
            Practice {
                id: 1,
                name: "Riverside".to_string(),
                location: None,
            },
            Practice {
                id: 2,
                name: "Abbey Road".to_string(),
                location: Some("North".to_string()),
            },
        ]
    }

    fn candidate() -> BlockDraft {
        BlockDraft {
            start_date: date("2024-06-10"),
            end_date: date("2024-06-12"),
            reason: "Course".to_string(),
        }
    }

    #[test]
    fn reports_records_inside_inclusive_span() {
        let snapshot = AttendanceSnapshot::from_records(vec![
            record(1, "2024-06-09", 1),
            record(2, "2024-06-10", 1),
            record(3, "2024-06-12", 1),
            record(4, "2024-06-12", 2),
            record(5, "2024-06-13", 2),
        ]);

        let conflicts = detect_conflicts(&candidate(), &snapshot, &AttendanceChanges::new(), &practices());

        let pairs = conflicts
            .iter()
            .map(|conflict| (conflict.date, conflict.practice_name.as_str()))
            .collect::<Vec<_>>();
        assert_eq!(
            pairs,
            vec![
                (date("2024-06-10"), "Riverside"),
                (date("2024-06-12"), "Abbey Road"),
                (date("2024-06-12"), "Riverside"),
            ]
        );
    }

    #[test]
    fn removed_records_do_not_conflict() {
        let snapshot = AttendanceSnapshot::from_records(vec![record(2, "2024-06-11", 1)]);
        let mut changes = AttendanceChanges::new();
        changes.stage_removal(2);

        assert!(detect_conflicts(&candidate(), &snapshot, &changes, &practices()).is_empty());
    }

    #[test]
    fn conflict_reports_the_staged_attendance_type() {
        let snapshot = AttendanceSnapshot::from_records(vec![record(2, "2024-06-11", 1)]);
        let mut changes = AttendanceChanges::new();
        changes.stage_update(2, AttendancePatch::attendance_type(AttendanceType::HalfDay));

        let conflicts = detect_conflicts(&candidate(), &snapshot, &changes, &practices());
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].attendance_type, AttendanceType::HalfDay);
    }

    #[test]
    fn empty_when_no_attendance_in_span() {
        let snapshot = AttendanceSnapshot::from_records(vec![record(1, "2024-06-20", 1)]);
        assert!(
            detect_conflicts(&candidate(), &snapshot, &AttendanceChanges::new(), &practices()).is_empty()
        );
    }

    #[test]
    fn staged_conflicts_are_deduplicated_across_additions() {
        let snapshot = AttendanceSnapshot::from_records(vec![record(7, "2024-06-11", 9)]);
        let mut block_changes = BlockChanges::new();
        block_changes.stage_addition(date("2024-06-11"), BlockDraft::single_day(date("2024-06-11"), "Leave"));
        block_changes.stage_addition(
            date("2024-06-10"),
            BlockDraft {
                start_date: date("2024-06-10"),
                end_date: date("2024-06-11"),
                reason: "Leave".to_string(),
            },
        );

        let conflicts =
            detect_staged_conflicts(&block_changes, &snapshot, &AttendanceChanges::new(), &practices());
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].practice_name, "Practice #9");
    }
}
