use crate::domain::calendar::qualifying_days;
use crate::domain::change_set::AttendanceChanges;
use crate::domain::effective_state::{
    attendance_cell_state, effective_attendance_type, AttendanceCellState, AttendanceSnapshot,
};
use crate::domain::models::{
    AttendanceDraft, AttendanceKey, AttendancePatch, AttendanceType, PracticeId,
};
use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceBulkAction {
    Select,
    Deselect,
}

impl AttendanceBulkAction {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "select" => Some(Self::Select),
            "deselect" => Some(Self::Deselect),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceBulkCriteria {
    pub action: AttendanceBulkAction,
    pub practice_id: PracticeId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub weekdays: HashSet<Weekday>,
    /// Type to stage on selected cells; `None` leaves existing types alone.
    pub attendance_type: Option<AttendanceType>,
}

/// Advances one attendance cell through its click cycle and returns the new state.
///
/// Without a persisted record: Empty -> FullDay -> HalfDay -> Empty.
/// With one: FullDay -> HalfDay -> staged removal, which stays put until revert.
pub fn toggle_attendance_cell(
    snapshot: &AttendanceSnapshot,
    changes: &mut AttendanceChanges,
    key: AttendanceKey,
) -> AttendanceCellState {
    if let Some(record) = snapshot.find(&key) {
        let id = record.id;
        if !changes.is_removed(id) {
            match effective_attendance_type(record, changes) {
                AttendanceType::FullDay => {
                    if record.attendance_type == AttendanceType::HalfDay {
                        changes.clear_update(id);
                    } else {
                        changes.stage_update(id, AttendancePatch::attendance_type(AttendanceType::HalfDay));
                    }
                }
                AttendanceType::HalfDay => {
                    changes.stage_removal(id);
                }
            }
        }
        return attendance_cell_state(snapshot, changes, &key);
    }

    match changes.addition(&key).map(AttendanceDraft::resolved_type) {
        None => {
            changes.stage_addition(key, AttendanceDraft::new(key, Some(AttendanceType::FullDay)));
        }
        Some(AttendanceType::FullDay) => {
            if let Some(draft) = changes.addition_mut(&key) {
                draft.attendance_type = Some(AttendanceType::HalfDay);
            }
        }
        Some(AttendanceType::HalfDay) => {
            changes.discard_addition(&key);
        }
    }
    attendance_cell_state(snapshot, changes, &key)
}

/// Applies one uniform action to every qualifying day and returns how many days qualified.
///
/// Re-applying the same criteria leaves the change set unchanged.
pub fn apply_attendance_bulk(
    snapshot: &AttendanceSnapshot,
    changes: &mut AttendanceChanges,
    criteria: &AttendanceBulkCriteria,
) -> usize {
    let mut visited = 0;
    for date in qualifying_days(criteria.start_date, criteria.end_date, &criteria.weekdays) {
        let key = AttendanceKey::new(date, criteria.practice_id);
        match criteria.action {
            AttendanceBulkAction::Select => select_cell(snapshot, changes, key, criteria.attendance_type),
            AttendanceBulkAction::Deselect => deselect_cell(snapshot, changes, key),
        }
        visited += 1;
    }
    visited
}

fn select_cell(
    snapshot: &AttendanceSnapshot,
    changes: &mut AttendanceChanges,
    key: AttendanceKey,
    attendance_type: Option<AttendanceType>,
) {
    if let Some(record) = snapshot.find(&key) {
        changes.unstage_removal(record.id);
        if let Some(attendance_type) = attendance_type {
            if attendance_type == record.attendance_type {
                changes.clear_update(record.id);
            } else {
                changes.stage_update(record.id, AttendancePatch::attendance_type(attendance_type));
            }
        }
        return;
    }

    match changes.addition_mut(&key) {
        Some(draft) => {
            if attendance_type.is_some() {
                draft.attendance_type = attendance_type;
            }
        }
        None => changes.stage_addition(key, AttendanceDraft::new(key, attendance_type)),
    }
}

fn deselect_cell(snapshot: &AttendanceSnapshot, changes: &mut AttendanceChanges, key: AttendanceKey) {
    changes.discard_addition(&key);
    if let Some(record) = snapshot.find(&key) {
        changes.stage_removal(record.id);
    }
}
